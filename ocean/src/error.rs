use thiserror::Error;
use wgpu_types::TextureFormat;

use crate::backend::KernelKind;
use crate::grid::{FormatRequest, LodDataKind};

/// Fatal failures while bringing a grid up. Any of these leaves the grid
/// permanently disabled with neutral data bound in its place.
#[derive(Debug, Error)]
pub enum LodError {
    #[error("no backend format satisfies {request:?} for the {kind} grid")]
    NoCompatibleFormat {
        kind: LodDataKind,
        request: FormatRequest,
    },
    #[error("the {kind} grid needs the {kernel:?} kernel, which the backend does not provide")]
    MissingKernel {
        kind: LodDataKind,
        kernel: KernelKind,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("texture format {0:?} is not supported")]
    UnsupportedFormat(TextureFormat),
    #[error("texture array `{label}` ({resolution}x{resolution}x{slices}) could not be allocated")]
    AllocationFailed {
        label: String,
        resolution: u32,
        slices: u32,
    },
    #[error("unknown texture handle {0}")]
    UnknownTexture(u32),
}

/// Rejections from [`crate::LodConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("cascade count {0} is outside 1..={max}", max = crate::constants::MAX_CASCADES)]
    CascadeCount(usize),
    #[error(
        "resolution {0} must be a positive multiple of {align} no larger than {max}",
        align = crate::constants::RESOLUTION_ALIGNMENT,
        max = crate::constants::MAX_RESOLUTION
    )]
    Resolution(u32),
    #[error("{field} must be greater than zero (got {value})")]
    NotPositive { field: &'static str, value: f32 },
    #[error("max scale {max} is below min scale {min}")]
    ScaleOrder { min: f32, max: f32 },
    #[error("max substeps per frame for {0} must be at least one")]
    SubstepCap(LodDataKind),
}
