//! Asynchronous surface queries for gameplay code (buoyancy, spawning, ...).
//!
//! A consumer submits world positions and gets a [`Pending`] back. The GPU
//! provider reads the displacement grid back a frame or more later, the CPU
//! provider evaluates the wave set immediately. Either way the result is a
//! list of [`QuerySample`]s in submission order.

mod cpu;
mod gpu;

use bevy::math::{Vec3, Vec4};
use bevy_log::info;

use crate::backend::{Pending, RenderBackend};
use crate::grid::LodGrid;

pub use cpu::CpuQueryProvider;
pub use gpu::GpuQueryProvider;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuerySample {
    pub displacement: Vec3,
    /// World height of the surface above the queried point.
    pub height: f32,
    /// False when the point fell outside the data or no data was available.
    pub valid: bool,
}

impl QuerySample {
    /// Undisturbed water at `sea_level`.
    pub fn flat(sea_level: f32) -> Self {
        Self {
            displacement: Vec3::ZERO,
            height: sea_level,
            valid: false,
        }
    }

    /// Decodes one displacement texel: `.xyz` offset, `.w` water level.
    pub fn from_texel(texel: Vec4, sea_level: f32) -> Self {
        Self {
            displacement: texel.truncate(),
            height: sea_level + texel.y + texel.w,
            valid: true,
        }
    }
}

/// What a provider may look at during its per-frame update.
pub struct QueryContext<'a> {
    pub backend: &'a mut dyn RenderBackend,
    /// The displacement grid, `None` when it does not exist.
    pub grid: Option<&'a LodGrid>,
    pub time: f32,
    pub sea_level: f32,
}

pub trait QueryProvider {
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool {
        true
    }

    /// Queues a batch of world positions. Only `x` and `z` are used.
    fn submit(&mut self, positions: Vec<Vec3>) -> Pending<Vec<QuerySample>>;

    /// Issues queued work and delivers finished results. Called once per
    /// frame after the grids have ticked.
    fn update(&mut self, ctx: &mut QueryContext<'_>);

    /// Cancels every request that has not been delivered yet.
    fn cancel_all(&mut self);

    /// Requests submitted but not yet delivered.
    fn in_flight(&self) -> usize;
}

/// Owns the active provider and routes submissions to it.
pub struct QueryService {
    provider: Box<dyn QueryProvider>,
    sea_level: f32,
}

impl Default for QueryService {
    fn default() -> Self {
        Self::new(Box::new(GpuQueryProvider::new()))
    }
}

impl QueryService {
    pub fn new(provider: Box<dyn QueryProvider>) -> Self {
        Self {
            provider,
            sea_level: 0.0,
        }
    }

    /// Sea level for flat results before the first update.
    pub fn with_sea_level(mut self, sea_level: f32) -> Self {
        self.sea_level = sea_level;
        self
    }

    pub fn provider(&self) -> &dyn QueryProvider {
        self.provider.as_ref()
    }

    pub fn provider_mut(&mut self) -> &mut dyn QueryProvider {
        self.provider.as_mut()
    }

    /// Swaps providers. The outgoing one has its outstanding requests
    /// cancelled first and is handed back.
    pub fn set_provider(&mut self, provider: Box<dyn QueryProvider>) -> Box<dyn QueryProvider> {
        self.provider.cancel_all();
        info!("query provider {} -> {}", self.provider.name(), provider.name());
        std::mem::replace(&mut self.provider, provider)
    }

    pub fn submit(&mut self, positions: Vec<Vec3>) -> Pending<Vec<QuerySample>> {
        if !self.provider.enabled() {
            return Pending::ready(vec![QuerySample::flat(self.sea_level); positions.len()]);
        }
        self.provider.submit(positions)
    }

    pub fn update(&mut self, ctx: &mut QueryContext<'_>) {
        self.sea_level = ctx.sea_level;
        self.provider.update(ctx);
    }

    pub fn cancel_all(&mut self) {
        self.provider.cancel_all();
    }

    pub fn in_flight(&self) -> usize {
        self.provider.in_flight()
    }
}
