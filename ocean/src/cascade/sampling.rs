use bevy::math::{Rect, Vec2, Vec4};

use super::{Cascade, CascadeChain};
use crate::backend::RenderBackend;
use crate::buffer::BufferedData;
use crate::constants::{PARAMS_SUFFIX, POS_SCALE_SUFFIX, SOURCE_SUFFIX};

/// Per-cascade vectors kernels use to map world positions into a slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeSampling {
    /// (snapped x, snapped z, world size, 0)
    pub pos_scale: Vec4,
    /// (texel size, resolution, 1, 1 / resolution)
    pub params: Vec4,
}

impl CascadeSampling {
    pub fn from_cascade(cascade: &Cascade) -> Self {
        let resolution = cascade.resolution as f32;
        Self {
            pos_scale: Vec4::new(
                cascade.snapped_position.x,
                cascade.snapped_position.y,
                cascade.world_size(),
                0.0,
            ),
            params: Vec4::new(cascade.texel_size, resolution, 1.0, 1.0 / resolution),
        }
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.pos_scale.truncate().truncate()
    }

    #[inline]
    pub fn world_size(&self) -> f32 {
        self.pos_scale.z
    }

    #[inline]
    pub fn texel_size(&self) -> f32 {
        self.params.x
    }

    #[inline]
    pub fn resolution(&self) -> u32 {
        self.params.y as u32
    }

    pub fn rect(&self) -> Rect {
        Rect::from_center_size(self.center(), Vec2::splat(self.world_size()))
    }

    /// Normalised slice coordinates of a world (x, z) position. Values
    /// outside `[0, 1]` fall off the cascade.
    #[inline]
    pub fn world_to_uv(&self, world: Vec2) -> Vec2 {
        (world - self.center()) / self.world_size() + Vec2::splat(0.5)
    }

    /// World (x, z) position of the centre of texel `(x, y)`.
    #[inline]
    pub fn texel_center(&self, x: u32, y: u32) -> Vec2 {
        let uv = (Vec2::new(x as f32, y as f32) + Vec2::splat(0.5)) * self.params.w;
        self.center() + (uv - Vec2::splat(0.5)) * self.world_size()
    }
}

/// Double-buffered sampling vectors for every cascade of one grid.
///
/// Always two slots, even for single-buffered grids, so kernels can
/// reconstruct where last frame's data was.
#[derive(Debug, Clone)]
pub struct SamplingTable {
    data: BufferedData<Vec<CascadeSampling>>,
}

impl Default for SamplingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingTable {
    pub fn new() -> Self {
        Self {
            data: BufferedData::new(2, Vec::new),
        }
    }

    pub fn flip(&mut self) {
        self.data.flip();
    }

    pub fn write(&mut self, chain: &CascadeChain) {
        let current = self.data.current_mut();
        current.clear();
        current.extend(chain.iter().map(CascadeSampling::from_cascade));
    }

    pub fn current(&self) -> &[CascadeSampling] {
        self.data.current()
    }

    pub fn previous(&self) -> &[CascadeSampling] {
        self.data.previous(1)
    }

    /// Copies the current frame over the previous one. Used when history is
    /// invalidated so kernels do not resample from a stale frame.
    pub fn sync_previous(&mut self) {
        let current = self.data.current().clone();
        self.data.for_each_mut(|slot| slot.clone_from(&current));
    }

    /// Binds `<name>_pos_scale`, `<name>_params` and their `_source`
    /// counterparts from the previous frame.
    pub fn bind<B: RenderBackend + ?Sized>(&self, backend: &mut B, name: &str) {
        let (pos_scale, params) = split(self.current());
        backend.bind_global_vectors(&format!("{name}{POS_SCALE_SUFFIX}"), pos_scale);
        backend.bind_global_vectors(&format!("{name}{PARAMS_SUFFIX}"), params);

        let (pos_scale, params) = split(self.previous());
        backend.bind_global_vectors(
            &format!("{name}{POS_SCALE_SUFFIX}{SOURCE_SUFFIX}"),
            pos_scale,
        );
        backend.bind_global_vectors(&format!("{name}{PARAMS_SUFFIX}{SOURCE_SUFFIX}"), params);
    }

    /// Binds all four sampling arrays as zeros, for a grid with nothing to
    /// sample.
    pub fn bind_neutral<B: RenderBackend + ?Sized>(backend: &mut B, name: &str, cascade_count: usize) {
        for suffix in [POS_SCALE_SUFFIX, PARAMS_SUFFIX] {
            backend.bind_global_vectors(&format!("{name}{suffix}"), vec![Vec4::ZERO; cascade_count]);
            backend.bind_global_vectors(
                &format!("{name}{suffix}{SOURCE_SUFFIX}"),
                vec![Vec4::ZERO; cascade_count],
            );
        }
    }
}

fn split(entries: &[CascadeSampling]) -> (Vec<Vec4>, Vec<Vec4>) {
    entries.iter().map(|e| (e.pos_scale, e.params)).unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_match_cascade() {
        let cascade = Cascade::new(Vec2::new(5.0, -3.0), 2.0, 16);
        let sampling = CascadeSampling::from_cascade(&cascade);
        assert_eq!(sampling.pos_scale, Vec4::new(4.0, -4.0, 32.0, 0.0));
        assert_eq!(sampling.params, Vec4::new(2.0, 16.0, 1.0, 1.0 / 16.0));
        assert_eq!(sampling.rect(), cascade.texel_rect());
    }

    #[test]
    fn test_uv_and_texel_centres_agree() {
        let cascade = Cascade::new(Vec2::new(100.0, 20.0), 0.5, 32);
        let sampling = CascadeSampling::from_cascade(&cascade);
        let world = sampling.texel_center(3, 30);
        let uv = sampling.world_to_uv(world);
        assert!((uv - Vec2::new(3.5, 30.5) / 32.0).length() < 1e-5);
        assert!((sampling.world_to_uv(sampling.center()) - Vec2::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn test_table_keeps_previous_frame() {
        let mut table = SamplingTable::new();
        table.write(&CascadeChain::new(Vec2::ZERO, 1.0, 8, 2, 3.0));
        table.flip();
        table.write(&CascadeChain::new(Vec2::new(10.0, 0.0), 1.0, 8, 2, 3.0));
        assert_eq!(table.previous()[0].center(), Vec2::ZERO);
        assert_eq!(table.current()[0].center(), Vec2::new(10.0, 0.0));

        table.sync_previous();
        assert_eq!(table.previous()[0].center(), Vec2::new(10.0, 0.0));
    }
}
