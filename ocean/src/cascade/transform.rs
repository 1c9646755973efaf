use bevy::math::{Mat4, Vec2, Vec3};
use bevy_log::debug;

use super::CascadeChain;
use crate::config::{LodConfig, ScaleMode};
use crate::constants::{CASCADE_CAMERA_FAR, CASCADE_CAMERA_HEIGHT};

/// Orthographic top-down camera for one cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeView {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
}

/// Places the cascade chain around the viewer each frame.
#[derive(Debug, Clone)]
pub struct LodTransform {
    resolution: u32,
    cascade_count: usize,
    min_texels_per_wave: f32,
    scale_mode: ScaleMode,
    sea_level: f32,
    chain: CascadeChain,
    views: Vec<CascadeView>,
    scale: f32,
    altitude_alpha: f32,
    frame: u64,
}

impl LodTransform {
    pub fn new(config: &LodConfig) -> Self {
        let mut transform = Self {
            resolution: config.resolution,
            cascade_count: config.cascade_count,
            min_texels_per_wave: config.min_texels_per_wave,
            scale_mode: config.scale,
            sea_level: config.sea_level,
            chain: CascadeChain::new(Vec2::ZERO, 1.0, config.resolution, 0, 1.0),
            views: Vec::new(),
            scale: 0.0,
            altitude_alpha: 0.0,
            frame: 0,
        };
        transform.rebuild(Vec3::new(0.0, config.sea_level, 0.0));
        transform
    }

    /// Recomputes the chain for `viewer` and returns how far the finest
    /// cascade's snapped centre moved since the previous update.
    pub fn update(&mut self, viewer: Vec3) -> Vec2 {
        let before = self.finest_center();
        self.rebuild(viewer);
        self.frame += 1;
        self.finest_center() - before
    }

    pub fn set_resolution(&mut self, resolution: u32) {
        debug!("cascade resolution {} -> {}", self.resolution, resolution);
        self.resolution = resolution;
    }

    pub fn chain(&self) -> &CascadeChain {
        &self.chain
    }

    pub fn views(&self) -> &[CascadeView] {
        &self.views
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Texel size of cascade 0.
    pub fn base_texel_size(&self) -> f32 {
        self.chain
            .finest()
            .map(|cascade| cascade.texel_size)
            .unwrap_or_default()
    }

    /// Power-of-two scale before dividing by resolution.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Fractional part of the viewer's altitude level, used to cross-fade
    /// the longest waves between the last two cascades.
    pub fn altitude_alpha(&self) -> f32 {
        self.altitude_alpha
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn finest_center(&self) -> Vec2 {
        self.chain
            .finest()
            .map(|cascade| cascade.snapped_position)
            .unwrap_or(Vec2::ZERO)
    }

    fn rebuild(&mut self, viewer: Vec3) {
        let (scale, alpha, base_texel) = match self.scale_mode {
            ScaleMode::Fixed { base_texel_size } => {
                (base_texel_size * self.resolution as f32 / 4.0, 0.0, base_texel_size)
            }
            ScaleMode::Altitude {
                min_scale,
                max_scale,
            } => {
                let level = (viewer.y - self.sea_level)
                    .abs()
                    .clamp(min_scale, 1.99 * max_scale);
                let l2 = level.log2();
                let floor = l2.floor();
                let scale = 2f32.powf(floor);
                let alpha = if scale >= max_scale { 0.0 } else { l2 - floor };
                (scale, alpha, 4.0 * scale / self.resolution as f32)
            }
        };
        self.scale = scale;
        self.altitude_alpha = alpha;
        self.chain = CascadeChain::new(
            Vec2::new(viewer.x, viewer.z),
            base_texel,
            self.resolution,
            self.cascade_count,
            self.min_texels_per_wave,
        );
        self.views = self
            .chain
            .iter()
            .map(|cascade| {
                let eye = Vec3::new(
                    cascade.snapped_position.x,
                    self.sea_level + CASCADE_CAMERA_HEIGHT,
                    cascade.snapped_position.y,
                );
                // Up is -Z so texel rows increase with world z.
                let view = Mat4::look_to_rh(eye, Vec3::NEG_Y, Vec3::NEG_Z);
                let half = cascade.world_size() * 0.5;
                let projection =
                    Mat4::orthographic_rh(-half, half, -half, half, 0.0, CASCADE_CAMERA_FAR);
                CascadeView {
                    view,
                    projection,
                    view_projection: projection * view,
                }
            })
            .collect();
    }
}
