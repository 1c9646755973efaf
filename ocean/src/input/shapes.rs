//! Small stock inputs: constants, foam splashes, dynamic-wave forcing and a
//! flat sea floor.

use std::cell::Cell;

use bevy::math::{Rect, Vec2, Vec4};

use super::{DrawContext, LodInput};
use crate::backend::BlendMode;

/// Writes one value everywhere inside its bound.
pub struct ConstantInput {
    pub value: Vec4,
    pub blend: BlendMode,
    pub rect: Rect,
    pub wavelength: f32,
    pub compute: bool,
    enabled: Cell<bool>,
}

impl ConstantInput {
    pub fn new(value: Vec4) -> Self {
        Self {
            value,
            blend: BlendMode::Additive,
            rect: Rect::default(),
            wavelength: 0.0,
            compute: false,
            enabled: Cell::new(true),
        }
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    pub fn with_wavelength(mut self, wavelength: f32) -> Self {
        self.wavelength = wavelength;
        self
    }

    pub fn as_compute(mut self) -> Self {
        self.compute = true;
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}

impl LodInput for ConstantInput {
    fn enabled(&self) -> bool {
        self.enabled.get()
    }

    fn is_compute(&self) -> bool {
        self.compute
    }

    fn wavelength(&self) -> f32 {
        self.wavelength
    }

    fn rect(&self) -> Rect {
        self.rect
    }

    fn draw(&self, ctx: &mut DrawContext<'_>, weight: f32) {
        let value = self.value;
        ctx.fill(&move |_: Vec2| value, self.blend, weight);
    }
}

/// Adds foam at `strength` per second inside a disc, fading to the rim.
pub struct FoamSplash {
    pub center: Cell<Vec2>,
    pub radius: f32,
    pub strength: f32,
}

impl FoamSplash {
    pub fn new(center: Vec2, radius: f32, strength: f32) -> Self {
        Self {
            center: Cell::new(center),
            radius,
            strength,
        }
    }
}

impl LodInput for FoamSplash {
    fn rect(&self) -> Rect {
        Rect::from_center_half_size(self.center.get(), Vec2::splat(self.radius))
    }

    fn draw(&self, ctx: &mut DrawContext<'_>, weight: f32) {
        let center = self.center.get();
        let radius = self.radius;
        let amount = self.strength * ctx.delta_time();
        ctx.fill(
            &move |world: Vec2| {
                let falloff = (1.0 - world.distance(center) / radius).max(0.0);
                Vec4::new(amount * falloff, 0.0, 0.0, 0.0)
            },
            BlendMode::Additive,
            weight,
        );
    }
}

/// Pushes the dynamic-wave velocity field up and down like a bobbing hull.
pub struct DynamicWaveImpulse {
    pub center: Cell<Vec2>,
    pub radius: f32,
    pub amplitude: f32,
    /// Seconds per bob; 0 applies a constant push.
    pub period: f32,
}

impl DynamicWaveImpulse {
    pub fn new(center: Vec2, radius: f32, amplitude: f32, period: f32) -> Self {
        Self {
            center: Cell::new(center),
            radius,
            amplitude,
            period,
        }
    }
}

impl LodInput for DynamicWaveImpulse {
    fn is_compute(&self) -> bool {
        true
    }

    fn rect(&self) -> Rect {
        Rect::from_center_half_size(self.center.get(), Vec2::splat(self.radius))
    }

    fn draw(&self, ctx: &mut DrawContext<'_>, weight: f32) {
        let phase = if self.period > 0.0 {
            (ctx.time() * std::f32::consts::TAU / self.period).cos()
        } else {
            1.0
        };
        let push = self.amplitude * phase * ctx.delta_time();
        let center = self.center.get();
        let radius = self.radius;
        ctx.fill(
            &move |world: Vec2| {
                let falloff = (1.0 - world.distance(center) / radius).max(0.0);
                Vec4::new(0.0, push * falloff, 0.0, 0.0)
            },
            BlendMode::Additive,
            weight,
        );
    }
}

/// Constant water depth and level offset over a rect, for the depth grid.
pub struct FlatSeaFloor {
    pub depth: f32,
    pub level_offset: f32,
    pub rect: Rect,
}

impl LodInput for FlatSeaFloor {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn draw(&self, ctx: &mut DrawContext<'_>, weight: f32) {
        let value = Vec4::new(self.depth, self.level_offset, 0.0, 0.0);
        ctx.fill(&move |_: Vec2| value, BlendMode::Replace, weight);
    }
}
