//! Gerstner wave evaluation.
//!
//! Phase speed follows deep-water dispersion, `ω = sqrt(g·k)`, scaled by the
//! wave's speed multiplier.

use bevy::math::{Vec2, Vec3};

use super::config::WaveParams;
use crate::backend::BlendMode;
use crate::constants::GRAVITY;
use crate::input::{DrawContext, LodInput};

/// Precomputed constants for a single wave.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GerstnerWave {
    pub direction: Vec2,
    pub wavelength: f32,
    /// Wave number k = 2π / wavelength
    k: f32,
    /// Angular frequency ω = sqrt(g·k) · speed
    omega: f32,
    /// Amplitude = steepness / k · amplitude scale
    amplitude: f32,
}

impl GerstnerWave {
    pub fn new(params: &WaveParams, amplitude_scale: f32) -> Self {
        let k = params.wave_number();
        Self {
            direction: params.direction,
            wavelength: params.wavelength,
            k,
            omega: (GRAVITY * k).sqrt() * params.speed,
            amplitude: params.steepness / k * amplitude_scale,
        }
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Displacement of the surface point that rests at `position`.
    #[inline]
    pub fn displacement(&self, position: Vec2, time: f32) -> Vec3 {
        let phase = self.k * self.direction.dot(position) - self.omega * time;
        let (sin_phase, cos_phase) = phase.sin_cos();
        let horizontal = self.direction * (self.amplitude * sin_phase);
        Vec3::new(horizontal.x, self.amplitude * cos_phase, horizontal.y)
    }
}

/// One wave drawn into the displacement grid, routed to cascades by its
/// wavelength.
pub struct GerstnerWaveInput {
    wave: GerstnerWave,
}

impl GerstnerWaveInput {
    pub fn new(params: &WaveParams, amplitude_scale: f32) -> Self {
        Self {
            wave: GerstnerWave::new(params, amplitude_scale),
        }
    }
}

impl LodInput for GerstnerWaveInput {
    fn wavelength(&self) -> f32 {
        self.wave.wavelength
    }

    fn draw(&self, ctx: &mut DrawContext<'_>, weight: f32) {
        let wave = self.wave;
        let time = ctx.time();
        ctx.fill(
            &move |world: Vec2| wave.displacement(world, time).extend(0.0),
            BlendMode::Additive,
            weight,
        );
    }
}
