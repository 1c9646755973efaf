use bevy::math::{Vec2, Vec3};

use super::{QueryContext, QueryProvider, QuerySample};
use crate::backend::Pending;
use crate::waves::{WaveConfig, WaveSampler};

/// Evaluates the wave set on the CPU, resolving every submission on the
/// spot. It has no cascade chain, so every point is in range.
pub struct CpuQueryProvider {
    sampler: WaveSampler,
    time: f32,
    sea_level: f32,
    disabled: bool,
}

impl CpuQueryProvider {
    pub fn new(config: WaveConfig) -> Self {
        Self {
            sampler: WaveSampler::new(config),
            time: 0.0,
            sea_level: 0.0,
            disabled: false,
        }
    }

    pub fn sampler(&self) -> &WaveSampler {
        &self.sampler
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.disabled = !enabled;
    }
}

impl QueryProvider for CpuQueryProvider {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn enabled(&self) -> bool {
        !self.disabled
    }

    fn submit(&mut self, positions: Vec<Vec3>) -> Pending<Vec<QuerySample>> {
        if self.disabled {
            return Pending::ready(vec![QuerySample::flat(self.sea_level); positions.len()]);
        }
        let points: Vec<Vec2> = positions.iter().map(|p| Vec2::new(p.x, p.z)).collect();
        let mut displacements = vec![Vec3::ZERO; points.len()];
        self.sampler.sample_batch(&points, self.time, &mut displacements);
        Pending::ready(
            displacements
                .into_iter()
                .map(|displacement| QuerySample {
                    displacement,
                    height: self.sea_level + displacement.y,
                    valid: true,
                })
                .collect(),
        )
    }

    fn update(&mut self, ctx: &mut QueryContext<'_>) {
        self.time = ctx.time;
        self.sea_level = ctx.sea_level;
    }

    fn cancel_all(&mut self) {}

    fn in_flight(&self) -> usize {
        0
    }
}
