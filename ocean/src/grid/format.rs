use serde::{Deserialize, Serialize};
use wgpu_types::TextureFormat;

use super::LodDataKind;

/// Logical texture format request, resolved against what the backend can
/// render to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FormatRequest {
    /// Precision if available, otherwise the performance format.
    #[default]
    Automatic,
    /// Half precision, falling back to full precision.
    Performance,
    /// Full precision only.
    Precision,
    /// Exactly this format.
    Manual(TextureFormat),
}

impl FormatRequest {
    /// Candidate physical formats for `kind`, most preferred first.
    pub fn candidates(self, kind: LodDataKind) -> Vec<TextureFormat> {
        match self {
            FormatRequest::Automatic => vec![kind.precision_format(), kind.performance_format()],
            FormatRequest::Performance => {
                vec![kind.performance_format(), kind.precision_format()]
            }
            FormatRequest::Precision => vec![kind.precision_format()],
            FormatRequest::Manual(format) => vec![format],
        }
    }

    /// First candidate the backend supports.
    pub fn resolve(
        self,
        kind: LodDataKind,
        supports: impl Fn(TextureFormat) -> bool,
    ) -> Option<TextureFormat> {
        self.candidates(kind).into_iter().find(|format| supports(*format))
    }
}
