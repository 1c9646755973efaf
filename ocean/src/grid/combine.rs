//! Merges per-octave wave contributions into one displacement field.
//!
//! Each wave lands in the single cascade whose band holds its wavelength.
//! Combining coarsest to finest then sums every coarser cascade into each
//! finer one, so cascade `i` ends up holding all waves of band `i` and longer.

use bevy::math::Vec4;

use crate::backend::{CombineLayout, Dispatch, RenderBackend, TextureId};
use crate::cascade::{is_unbounded, CascadeChain};
use crate::input::{submit_inputs, DrawContext, GridState, InputRegistry};

use super::ExternalLayers;

/// Weight of a wave of `wavelength` in cascade `index`.
///
/// The longest waves (at or beyond the coarsest band's minimum) are shared
/// between the last two cascades according to the viewer's altitude blend.
pub fn filter_by_wavelength(
    chain: &CascadeChain,
    wavelength: f32,
    index: usize,
    altitude_alpha: f32,
) -> f32 {
    let count = chain.len();
    if wavelength <= 0.0 || index >= count {
        return 0.0;
    }
    let last = count - 1;
    if wavelength >= chain.min_wavelength(last) {
        if count == 1 {
            return 1.0;
        }
        return if index == last {
            altitude_alpha
        } else if index == last - 1 {
            1.0 - altitude_alpha
        } else {
            0.0
        };
    }
    let min = chain.min_wavelength(index);
    if wavelength >= min && wavelength < 2.0 * min {
        1.0
    } else {
        0.0
    }
}

pub(crate) struct CombineState {
    /// Per-octave wave contributions before combining.
    pub scratch: Option<TextureId>,
    /// Combined dynamic-wave displacement.
    pub dynamic_scratch: Option<TextureId>,
    pub combine_enabled: bool,
}

impl CombineState {
    pub fn new(combine_enabled: bool) -> Self {
        Self {
            scratch: None,
            dynamic_scratch: None,
            combine_enabled,
        }
    }

    pub fn textures(&self) -> impl Iterator<Item = TextureId> {
        self.scratch.into_iter().chain(self.dynamic_scratch)
    }

    pub fn run(
        &self,
        backend: &mut dyn RenderBackend,
        registry: &InputRegistry,
        state: &GridState<'_>,
        target: TextureId,
        layers: ExternalLayers,
    ) {
        let (Some(scratch), Some(dynamic_scratch)) = (self.scratch, self.dynamic_scratch) else {
            return;
        };
        let count = state.chain.len() as u32;
        backend.clear(scratch, 0..count, Vec4::ZERO);

        // Wavelength-filtered inputs, each into its own band.
        for (_, input) in registry.iter() {
            let wavelength = input.wavelength();
            if !input.enabled() || wavelength <= 0.0 {
                continue;
            }
            let bound = input.rect();
            let clip = (!is_unbounded(bound)).then_some(bound);
            for index in state.chain.overlapping_slices(bound).rev() {
                let weight =
                    filter_by_wavelength(state.chain, wavelength, index, state.altitude_alpha);
                if weight <= 0.0 {
                    continue;
                }
                let slice = index as u32;
                let mut ctx = if input.is_compute() {
                    DrawContext::compute(&mut *backend, state, scratch, slice..slice + 1, clip)
                } else {
                    DrawContext::raster(&mut *backend, state, scratch, slice, clip)
                };
                input.draw(&mut ctx, weight);
            }
        }

        for slice in (0..count).rev() {
            backend.dispatch(Dispatch::Combine {
                target,
                source: scratch,
                slice,
                layout: CombineLayout::Displacement,
                include_coarser: self.combine_enabled,
                sampling: state.sampling,
                level: layers.sea_floor_depth,
            });
        }

        // Inputs without a wavelength preference skip the band loop.
        submit_inputs(registry, backend, state, target, |input| input.wavelength() <= 0.0);

        if let Some(dynamic_waves) = layers.dynamic_waves {
            for slice in (0..count).rev() {
                backend.dispatch(Dispatch::Combine {
                    target: dynamic_scratch,
                    source: dynamic_waves,
                    slice,
                    layout: CombineLayout::HeightToDisplacement,
                    include_coarser: self.combine_enabled,
                    sampling: state.sampling,
                    level: None,
                });
            }
            for slice in 0..count {
                backend.dispatch(Dispatch::Accumulate {
                    target,
                    source: dynamic_scratch,
                    slice,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Vec2;

    fn chain() -> CascadeChain {
        // Bands: [1, 2), [2, 4), [4, 8), [8, ..)
        CascadeChain::new(Vec2::ZERO, 1.0, 16, 4, 1.0)
    }

    #[test]
    fn test_wave_lands_in_its_band_only() {
        let chain = chain();
        let weights: Vec<f32> = (0..4)
            .map(|i| filter_by_wavelength(&chain, 3.0, i, 0.3))
            .collect();
        assert_eq!(weights, [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_band_edges_are_half_open() {
        let chain = chain();
        assert_eq!(filter_by_wavelength(&chain, 2.0, 1, 0.0), 1.0);
        assert_eq!(filter_by_wavelength(&chain, 2.0, 0, 0.0), 0.0);
        assert_eq!(filter_by_wavelength(&chain, 3.999, 1, 0.0), 1.0);
        assert_eq!(filter_by_wavelength(&chain, 4.0, 2, 0.0), 1.0);
    }

    #[test]
    fn test_longest_waves_cross_fade_last_two() {
        let chain = chain();
        for wavelength in [8.0, 50.0] {
            assert_eq!(filter_by_wavelength(&chain, wavelength, 3, 0.25), 0.25);
            assert_eq!(filter_by_wavelength(&chain, wavelength, 2, 0.25), 0.75);
            assert_eq!(filter_by_wavelength(&chain, wavelength, 1, 0.25), 0.0);
        }
    }

    #[test]
    fn test_zero_and_too_short_wavelengths_get_nothing() {
        let chain = chain();
        for i in 0..4 {
            assert_eq!(filter_by_wavelength(&chain, 0.0, i, 0.5), 0.0);
            assert_eq!(filter_by_wavelength(&chain, 0.5, i, 0.5), 0.0);
        }
    }

    #[test]
    fn test_single_cascade_takes_everything_long() {
        let chain = CascadeChain::new(Vec2::ZERO, 1.0, 16, 1, 1.0);
        assert_eq!(filter_by_wavelength(&chain, 100.0, 0, 0.7), 1.0);
    }
}
