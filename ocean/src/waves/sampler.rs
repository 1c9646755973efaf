//! CPU evaluation of a whole wave set.
//!
//! Sums the same waves the displacement inputs draw, so CPU queries agree
//! with the GPU path up to texture resolution.

use bevy::math::{Vec2, Vec3};

use super::config::WaveConfig;
use super::gerstner::GerstnerWave;

pub struct WaveSampler {
    config: WaveConfig,
    waves: Vec<GerstnerWave>,
}

impl WaveSampler {
    pub fn new(config: WaveConfig) -> Self {
        let waves = config
            .active_waves()
            .map(|params| GerstnerWave::new(params, config.amplitude_scale))
            .collect();
        Self { config, waves }
    }

    pub fn config(&self) -> &WaveConfig {
        &self.config
    }

    pub fn waves(&self) -> &[GerstnerWave] {
        &self.waves
    }

    /// Summed displacement at one (x, z) point.
    #[inline]
    pub fn displacement(&self, position: Vec2, time: f32) -> Vec3 {
        self.waves
            .iter()
            .map(|wave| wave.displacement(position, time))
            .sum()
    }

    pub fn sample_batch(&self, points: &[Vec2], time: f32, results: &mut [Vec3]) {
        debug_assert_eq!(points.len(), results.len());

        for (result, &point) in results.iter_mut().zip(points) {
            *result = self.displacement(point, time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waves::WavePreset;

    #[test]
    fn test_still_water_is_flat() {
        let sampler = WaveSampler::new(WavePreset::Still.to_config());
        assert_eq!(sampler.displacement(Vec2::new(3.0, 4.0), 1.0), Vec3::ZERO);
    }

    #[test]
    fn test_height_bounded_by_amplitude_sum() {
        let sampler = WaveSampler::new(WavePreset::Ocean.to_config());
        let bound: f32 = sampler.waves().iter().map(GerstnerWave::amplitude).sum();
        for i in 0..100 {
            let p = Vec2::new(i as f32 * 1.7, i as f32 * -0.9);
            assert!(sampler.displacement(p, i as f32 * 0.1).y.abs() <= bound + 1e-4);
        }
    }

    #[test]
    fn test_batch_matches_single() {
        let sampler = WaveSampler::new(WavePreset::Lake.to_config());
        let points = [Vec2::ZERO, Vec2::new(5.0, -2.0), Vec2::new(-8.0, 1.0)];
        let mut results = [Vec3::ZERO; 3];
        sampler.sample_batch(&points, 2.5, &mut results);
        for (point, result) in points.iter().zip(results) {
            assert_eq!(result, sampler.displacement(*point, 2.5));
        }
    }
}
