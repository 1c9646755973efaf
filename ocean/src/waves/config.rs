//! Wave set shared by the displacement inputs and the CPU query provider, so
//! both see the same ocean.

use bevy::math::Vec2;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Maximum number of waves in one set.
pub const MAX_WAVES: usize = 8;

/// Configuration for a single Gerstner wave.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveParams {
    /// Travel direction in (x, z), normalized
    pub direction: Vec2,
    /// 0.0 = sine wave, 1.0 = sharp crest
    pub steepness: f32,
    /// Wavelength in world units
    pub wavelength: f32,
    /// Multiplier on the deep-water phase speed
    pub speed: f32,
}

impl WaveParams {
    pub fn new(direction: Vec2, steepness: f32, wavelength: f32, speed: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            steepness: steepness.clamp(0.0, 1.0),
            wavelength: wavelength.max(0.1),
            speed,
        }
    }

    /// k = 2π / wavelength
    #[inline(always)]
    pub fn wave_number(&self) -> f32 {
        2.0 * PI / self.wavelength
    }
}

impl Default for WaveParams {
    fn default() -> Self {
        Self::new(Vec2::X, 0.3, 16.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveConfig {
    pub waves: Vec<WaveParams>,
    /// Global amplitude multiplier
    pub amplitude_scale: f32,
}

impl Default for WaveConfig {
    fn default() -> Self {
        WavePreset::default().to_config()
    }
}

impl WaveConfig {
    pub fn empty() -> Self {
        Self {
            waves: Vec::new(),
            amplitude_scale: 1.0,
        }
    }

    /// Add a wave. Returns false once [`MAX_WAVES`] is reached.
    pub fn add_wave(&mut self, params: WaveParams) -> bool {
        if self.waves.len() < MAX_WAVES {
            self.waves.push(params);
            true
        } else {
            false
        }
    }

    pub fn active_waves(&self) -> impl Iterator<Item = &WaveParams> {
        self.waves.iter()
    }
}

/// Named wave sets. Wavelengths span several octaves so every cascade band
/// gets something to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WavePreset {
    Calm,
    Lake,
    #[default]
    Ocean,
    Storm,
    /// No waves
    Still,
}

impl WavePreset {
    pub fn to_config(self) -> WaveConfig {
        let mut config = WaveConfig::empty();

        match self {
            WavePreset::Still => {}
            WavePreset::Calm => {
                config.amplitude_scale = 0.3;
                config.add_wave(WaveParams::new(Vec2::new(1.0, 0.2), 0.2, 12.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(0.4, 1.0), 0.15, 3.0, 1.0));
            }
            WavePreset::Lake => {
                config.amplitude_scale = 0.5;
                config.add_wave(WaveParams::new(Vec2::new(1.0, 0.0), 0.3, 6.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(0.3, 1.0), 0.2, 2.5, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(-0.6, 0.8), 0.2, 1.2, 1.0));
            }
            WavePreset::Ocean => {
                config.add_wave(WaveParams::new(Vec2::new(1.0, 0.3), 0.5, 64.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(-0.7, 1.0), 0.45, 28.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(0.5, -1.0), 0.4, 12.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(-1.0, -0.5), 0.3, 5.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(0.8, 0.6), 0.25, 2.0, 1.0));
            }
            WavePreset::Storm => {
                config.amplitude_scale = 1.5;
                config.add_wave(WaveParams::new(Vec2::new(1.0, 0.2), 0.7, 120.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(-0.5, 1.0), 0.6, 60.0, 1.1));
                config.add_wave(WaveParams::new(Vec2::new(0.7, -0.7), 0.55, 30.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(-1.0, -0.3), 0.5, 14.0, 1.2));
                config.add_wave(WaveParams::new(Vec2::new(0.2, 1.0), 0.4, 6.0, 1.0));
                config.add_wave(WaveParams::new(Vec2::new(0.9, -0.2), 0.3, 2.5, 1.0));
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_wave_counts() {
        assert_eq!(WavePreset::Still.to_config().waves.len(), 0);
        assert_eq!(WavePreset::Calm.to_config().waves.len(), 2);
        assert_eq!(WavePreset::Lake.to_config().waves.len(), 3);
        assert_eq!(WavePreset::Ocean.to_config().waves.len(), 5);
        assert_eq!(WavePreset::Storm.to_config().waves.len(), 6);
    }

    #[test]
    fn test_add_wave_respects_limit() {
        let mut config = WaveConfig::empty();
        for _ in 0..MAX_WAVES {
            assert!(config.add_wave(WaveParams::default()));
        }
        assert!(!config.add_wave(WaveParams::default()));
    }

    #[test]
    fn test_params_are_sanitised() {
        let wave = WaveParams::new(Vec2::new(3.0, 4.0), 2.0, 0.0, 1.0);
        assert!((wave.direction.length() - 1.0).abs() < 1e-6);
        assert_eq!(wave.steepness, 1.0);
        assert_eq!(wave.wavelength, 0.1);
    }
}
