//! The seam between grid logic and whatever executes the GPU work.
//!
//! Grids only ever talk to a [`RenderBackend`]: allocate arrays, clear,
//! rasterise inputs with a cascade's camera, dispatch kernels, read back,
//! and publish global bindings. [`SoftwareBackend`] runs all of it on the CPU.

mod pending;
mod software;

use std::fmt;
use std::ops::Range;

use bevy::math::{Mat4, Rect, Vec2, Vec4};
use wgpu_types::TextureFormat;

use crate::cascade::CascadeSampling;
use crate::error::BackendError;

pub use pending::{pending, poll_now, Pending, ReadbackError, Resolver};
pub use software::{BackendStats, SoftwareBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureArrayDesc {
    pub label: String,
    pub resolution: u32,
    /// Array depth, one slice per cascade.
    pub slices: u32,
    pub format: TextureFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Replace,
    Additive,
}

/// Work the backend knows how to run as a compute kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    Combine,
    Foam,
    DynamicWaves,
}

/// Per-texel program evaluated at a world (x, z) position.
pub trait TexelShader {
    fn shade(&self, world: Vec2) -> Vec4;
}

impl<F: Fn(Vec2) -> Vec4> TexelShader for F {
    fn shade(&self, world: Vec2) -> Vec4 {
        self(world)
    }
}

/// One raster draw into one slice through a cascade's camera.
pub struct RasterCommand<'a> {
    pub target: TextureId,
    pub slice: u32,
    pub view_projection: Mat4,
    /// Only texels whose centre lies inside this world rect are touched.
    pub clip: Option<Rect>,
    pub blend: BlendMode,
    pub weight: f32,
    pub shader: &'a dyn TexelShader,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CombineLayout {
    /// Source already holds (x, y, z) displacement.
    Displacement,
    /// Source `.x` is a height, moved into displacement `.y`.
    HeightToDisplacement,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub dt: f32,
    /// History is invalid; the kernel should read it as zero.
    pub prewarm: bool,
    pub damping: f32,
    pub wave_speed_scale: f32,
}

pub enum Dispatch<'a> {
    /// A compute input covering a range of slices.
    Shader {
        target: TextureId,
        slices: Range<u32>,
        sampling: &'a [CascadeSampling],
        clip: Option<Rect>,
        blend: BlendMode,
        weight: f32,
        shader: &'a dyn TexelShader,
    },
    /// `target[slice] = source[slice] + resample(target[slice + 1])`, with
    /// `.w` taken from `level` when given.
    Combine {
        target: TextureId,
        source: TextureId,
        slice: u32,
        layout: CombineLayout,
        include_coarser: bool,
        sampling: &'a [CascadeSampling],
        level: Option<TextureId>,
    },
    /// `target[slice].xyz += source[slice].xyz`
    Accumulate {
        target: TextureId,
        source: TextureId,
        slice: u32,
    },
    /// Advance a persistent field by one substep.
    Simulate {
        kernel: KernelKind,
        target: TextureId,
        source: TextureId,
        slices: Range<u32>,
        sampling: &'a [CascadeSampling],
        source_sampling: &'a [CascadeSampling],
        params: SimulationParams,
    },
}

impl Dispatch<'_> {
    pub fn kernel(&self) -> Option<KernelKind> {
        match self {
            Dispatch::Shader { .. } => None,
            Dispatch::Combine { .. } | Dispatch::Accumulate { .. } => Some(KernelKind::Combine),
            Dispatch::Simulate { kernel, .. } => Some(*kernel),
        }
    }
}

/// Bilinear lookup at normalised `uv` in one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleLookup {
    pub slice: u32,
    pub uv: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalTexture {
    Array(TextureId),
    /// A flat 1x1 texture holding this value, bound for disabled grids.
    Neutral(Vec4),
}

pub trait RenderBackend {
    fn supports_format(&self, format: TextureFormat) -> bool;

    fn supports_kernel(&self, kernel: KernelKind) -> bool;

    fn create_texture_array(&mut self, desc: &TextureArrayDesc) -> Result<TextureId, BackendError>;

    fn release_texture_array(&mut self, texture: TextureId);

    /// Sets every texel of the slice range to `value`.
    fn clear(&mut self, texture: TextureId, slices: Range<u32>, value: Vec4);

    /// Sets the outermost ring of texels of every slice to `value`.
    fn clear_border(&mut self, texture: TextureId, value: Vec4);

    fn copy_texture_array(&mut self, source: TextureId, destination: TextureId);

    fn draw(&mut self, command: RasterCommand<'_>);

    fn dispatch(&mut self, dispatch: Dispatch<'_>);

    /// Queues a readback. The result arrives no earlier than the next frame.
    fn read_samples(&mut self, texture: TextureId, lookups: Vec<SampleLookup>) -> Pending<Vec<Vec4>>;

    fn bind_global_texture(&mut self, name: &str, texture: GlobalTexture);

    fn bind_global_vectors(&mut self, name: &str, values: Vec<Vec4>);

    /// Submits the frame and completes readbacks that became due.
    fn end_frame(&mut self);
}
