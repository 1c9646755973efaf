//! Cascade geometry: snapping, texel-space bounds and index suggestions.
//!
//! Cascade `i` covers `resolution` texels of size `base * 2^i` around the
//! viewer. Index 0 is the finest. Every cascade snaps its centre to a
//! two-texel grid so texels stay world-locked as the viewer moves.

mod sampling;
mod transform;

use std::ops::{Index, Range};

use bevy::math::{Rect, Vec2};

pub use sampling::{CascadeSampling, SamplingTable};
pub use transform::{CascadeView, LodTransform};

/// Snaps `position` down to the nearest multiple of two texels on each axis.
///
/// Uses floored division so negative coordinates snap towards negative
/// infinity, keeping `0 <= position - snapped < 2 * texel_size`.
#[inline]
pub fn snap_position(position: Vec2, texel_size: f32) -> Vec2 {
    let step = 2.0 * texel_size;
    (position / step).floor() * step
}

/// True when two rects share a region of positive area.
#[inline]
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.min.x < b.max.x && b.min.x < a.max.x && a.min.y < b.max.y && b.min.y < a.max.y
}

#[inline]
fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    outer.min.x <= inner.min.x
        && outer.min.y <= inner.min.y
        && inner.max.x <= outer.max.x
        && inner.max.y <= outer.max.y
}

/// A zero-sized rect means "no bound": the input covers every cascade.
#[inline]
pub fn is_unbounded(rect: Rect) -> bool {
    rect.size() == Vec2::ZERO
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cascade {
    /// World-space (x, z) centre, snapped to the two-texel grid.
    pub snapped_position: Vec2,
    pub texel_size: f32,
    pub resolution: u32,
}

impl Cascade {
    pub fn new(center: Vec2, texel_size: f32, resolution: u32) -> Self {
        Self {
            snapped_position: snap_position(center, texel_size),
            texel_size,
            resolution,
        }
    }

    #[inline]
    pub fn world_size(&self) -> f32 {
        self.texel_size * self.resolution as f32
    }

    /// World rect covered by the cascade's texels.
    pub fn texel_rect(&self) -> Rect {
        Rect::from_center_size(self.snapped_position, Vec2::splat(self.world_size()))
    }

    /// Texel rect shrunk by one texel per side, the region safe to sample
    /// bilinearly.
    pub fn inner_rect(&self) -> Rect {
        self.texel_rect().inflate(-self.texel_size)
    }
}

/// Cascades for one frame, finest first.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeChain {
    cascades: Vec<Cascade>,
    min_texels_per_wave: f32,
}

impl CascadeChain {
    pub fn new(
        center: Vec2,
        base_texel_size: f32,
        resolution: u32,
        count: usize,
        min_texels_per_wave: f32,
    ) -> Self {
        let cascades = (0..count)
            .map(|i| Cascade::new(center, base_texel_size * (1u32 << i) as f32, resolution))
            .collect();
        Self {
            cascades,
            min_texels_per_wave,
        }
    }

    pub fn len(&self) -> usize {
        self.cascades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cascades.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cascade> {
        self.cascades.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cascade> {
        self.cascades.iter()
    }

    pub fn finest(&self) -> Option<&Cascade> {
        self.cascades.first()
    }

    pub fn min_texels_per_wave(&self) -> f32 {
        self.min_texels_per_wave
    }

    /// Longest wavelength cascade `index` is responsible for (exclusive).
    pub fn max_wavelength(&self, index: usize) -> f32 {
        2.0 * self.cascades[index].texel_size * self.min_texels_per_wave
    }

    /// Shortest wavelength cascade `index` can represent without aliasing.
    pub fn min_wavelength(&self, index: usize) -> f32 {
        self.max_wavelength(index) * 0.5
    }

    /// Finest cascade whose inner rect fully contains `rect`.
    pub fn suggest_index(&self, rect: Rect) -> Option<usize> {
        self.cascades
            .iter()
            .position(|cascade| rect_contains_rect(cascade.inner_rect(), rect))
    }

    /// Like [`CascadeChain::suggest_index`], but skips cascades whose
    /// shortest wave would repeat more than twice across the footprint,
    /// unless there is nothing coarser left.
    pub fn suggest_index_for_waves(&self, rect: Rect, min_spatial_length: f32) -> Option<usize> {
        let first = self.suggest_index(rect)?;
        let last = self.cascades.len() - 1;
        (first..=last).find(|&i| {
            rect_contains_rect(self.cascades[i].inner_rect(), rect)
                && (i == last || self.min_wavelength(i) >= min_spatial_length * 0.5)
        })
    }

    /// Slice range whose texel rects overlap `bound`.
    ///
    /// Walks coarsest to finest and stops at the first cascade that no longer
    /// overlaps; everything finer is assumed out of reach as well.
    pub fn overlapping_slices(&self, bound: Rect) -> Range<usize> {
        let count = self.cascades.len();
        if is_unbounded(bound) {
            return 0..count;
        }
        let mut first = count;
        for index in (0..count).rev() {
            if !rects_overlap(self.cascades[index].texel_rect(), bound) {
                break;
            }
            first = index;
        }
        first..count
    }
}

impl Index<usize> for CascadeChain {
    type Output = Cascade;

    fn index(&self, index: usize) -> &Cascade {
        &self.cascades[index]
    }
}

impl<'a> IntoIterator for &'a CascadeChain {
    type Item = &'a Cascade;
    type IntoIter = std::slice::Iter<'a, Cascade>;

    fn into_iter(self) -> Self::IntoIter {
        self.cascades.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_snap_invariant_for_random_positions() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10_000 {
            let p = Vec2::new(rng.gen_range(-1.0e4..1.0e4), rng.gen_range(-1.0e4..1.0e4));
            let texel = 2f32.powi(rng.gen_range(-4..6));
            let step = 2.0 * texel;
            let snapped = snap_position(p, texel);

            for axis in 0..2 {
                let cells = snapped[axis] / step;
                assert!(
                    (cells - cells.round()).abs() < 1e-3,
                    "{snapped} is not on the {step} grid"
                );
                let offset = p[axis] - snapped[axis];
                assert!(offset >= -1e-3 && offset < step + 1e-3, "offset {offset}");
            }
        }
    }

    #[test]
    fn test_snap_negative_coordinates_floor() {
        assert_eq!(snap_position(Vec2::new(-0.1, 0.1), 1.0), Vec2::new(-2.0, 0.0));
        assert_eq!(snap_position(Vec2::new(-2.0, 3.9), 1.0), Vec2::new(-2.0, 2.0));
    }

    #[test]
    fn test_texel_sizes_double() {
        let chain = CascadeChain::new(Vec2::ZERO, 0.5, 64, 5, 3.0);
        for i in 1..chain.len() {
            assert_eq!(chain[i].texel_size, 2.0 * chain[i - 1].texel_size);
        }
        assert_eq!(chain.max_wavelength(0), 3.0);
        assert_eq!(chain.min_wavelength(0), 1.5);
    }

    #[test]
    fn test_suggest_index_nested_containment() {
        let mut rng = StdRng::seed_from_u64(7);
        let chain = CascadeChain::new(Vec2::new(13.0, -7.0), 1.0, 32, 6, 3.0);
        for _ in 0..2_000 {
            let center = Vec2::new(rng.gen_range(-400.0..400.0), rng.gen_range(-400.0..400.0));
            let size = Vec2::new(rng.gen_range(0.5..300.0), rng.gen_range(0.5..300.0));
            let rect = Rect::from_center_size(center, size);
            match chain.suggest_index(rect) {
                Some(i) => {
                    assert!(rect_contains_rect(chain[i].inner_rect(), rect));
                    for finer in 0..i {
                        assert!(!rect_contains_rect(chain[finer].inner_rect(), rect));
                    }
                }
                None => {
                    for cascade in &chain {
                        assert!(!rect_contains_rect(cascade.inner_rect(), rect));
                    }
                }
            }
        }
    }

    #[test]
    fn test_suggest_index_for_waves_skips_short_bands() {
        let chain = CascadeChain::new(Vec2::ZERO, 1.0, 32, 4, 1.0);
        let rect = Rect::from_center_size(Vec2::ZERO, Vec2::splat(4.0));
        // min wavelengths: 1, 2, 4, 8. A 10 unit footprint needs >= 5.
        assert_eq!(chain.suggest_index(rect), Some(0));
        assert_eq!(chain.suggest_index_for_waves(rect, 10.0), Some(3));
        assert_eq!(chain.suggest_index_for_waves(rect, 4.0), Some(1));
        // Nothing qualifies on bandwidth: the last cascade still accepts.
        assert_eq!(chain.suggest_index_for_waves(rect, 1000.0), Some(3));
    }

    #[test]
    fn test_overlapping_slices() {
        let chain = CascadeChain::new(Vec2::ZERO, 1.0, 16, 4, 3.0);
        // Extents: 16, 32, 64, 128 centred near the origin.
        assert_eq!(chain.overlapping_slices(Rect::default()), 0..4);

        let far = Rect::from_center_size(Vec2::new(30.0, 0.0), Vec2::splat(4.0));
        assert_eq!(chain.overlapping_slices(far), 2..4);

        let outside = Rect::from_center_size(Vec2::new(500.0, 0.0), Vec2::splat(4.0));
        assert!(chain.overlapping_slices(outside).is_empty());
    }

    #[test]
    fn test_point_footprint_picks_finest_holding_cascade() {
        let chain = CascadeChain::new(Vec2::ZERO, 1.0, 16, 3, 3.0);
        let point = |x: f32| Rect::from_center_size(Vec2::new(x, 0.0), Vec2::ZERO);
        assert_eq!(chain.suggest_index_for_waves(point(0.0), 0.0), Some(0));
        assert_eq!(chain.suggest_index_for_waves(point(10.0), 0.0), Some(1));
        assert_eq!(chain.suggest_index_for_waves(point(100.0), 0.0), None);
    }
}
