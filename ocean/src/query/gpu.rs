use bevy::math::{Rect, Vec2, Vec3, Vec4};
use bevy_log::{debug, warn};

use super::{QueryContext, QueryProvider, QuerySample};
use crate::backend::{pending, poll_now, Pending, Resolver, SampleLookup};

struct Queued {
    positions: Vec<Vec3>,
    resolver: Resolver<Vec<QuerySample>>,
}

struct InFlight {
    readback: Pending<Vec<Vec4>>,
    /// Index into the readback values per submitted point, `None` for points
    /// outside every cascade.
    slots: Vec<Option<usize>>,
    sea_level: f32,
    resolver: Resolver<Vec<QuerySample>>,
}

/// Reads the displacement grid back from the backend.
///
/// Submissions wait for the next update, are then issued as one readback
/// each against the grid's current array, and resolve once the backend
/// delivers, at least a frame after issue.
///
/// Each point reads the cascade suggested for a square footprint of
/// `min_spatial_length` around it. Zero means the finest cascade holding the
/// point.
#[derive(Default)]
pub struct GpuQueryProvider {
    queued: Vec<Queued>,
    in_flight: Vec<InFlight>,
    min_spatial_length: f32,
    disabled: bool,
}

impl GpuQueryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest feature the caller cares about, e.g. a hull's length. Longer
    /// footprints read coarser cascades with fewer short waves.
    pub fn with_min_spatial_length(mut self, length: f32) -> Self {
        self.min_spatial_length = length.max(0.0);
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.cancel_all();
        }
        self.disabled = !enabled;
    }

    fn poll_in_flight(&mut self) {
        for mut request in std::mem::take(&mut self.in_flight) {
            if request.resolver.is_cancelled() {
                request.readback.cancel();
                continue;
            }
            match poll_now(&mut request.readback) {
                None => self.in_flight.push(request),
                Some(Ok(values)) => {
                    let samples = request
                        .slots
                        .iter()
                        .map(|slot| match slot.and_then(|i| values.get(i)) {
                            Some(texel) => QuerySample::from_texel(*texel, request.sea_level),
                            None => QuerySample::flat(request.sea_level),
                        })
                        .collect();
                    request.resolver.resolve(samples);
                }
                Some(Err(err)) => {
                    warn!("query readback failed: {}", err);
                    request.resolver.fail(err);
                }
            }
        }
    }

    fn issue(&mut self, ctx: &mut QueryContext<'_>) {
        let grid = ctx.grid.filter(|grid| grid.is_active());
        let source = grid.and_then(|grid| Some((grid.current_texture()?, grid.chain()?, grid)));
        for request in std::mem::take(&mut self.queued) {
            if request.resolver.is_cancelled() {
                continue;
            }
            let flat = || vec![QuerySample::flat(ctx.sea_level); request.positions.len()];
            let Some((texture, chain, grid)) = source else {
                request.resolver.resolve(flat());
                continue;
            };
            let sampling = grid.sampling().current();

            let mut lookups = Vec::new();
            let slots = request
                .positions
                .iter()
                .map(|position| {
                    let point = Vec2::new(position.x, position.z);
                    let footprint =
                        Rect::from_center_size(point, Vec2::splat(self.min_spatial_length));
                    let index = chain.suggest_index_for_waves(footprint, self.min_spatial_length)?;
                    let cascade = sampling.get(index)?;
                    lookups.push(SampleLookup {
                        slice: index as u32,
                        uv: cascade.world_to_uv(point),
                    });
                    Some(lookups.len() - 1)
                })
                .collect();

            if lookups.is_empty() {
                request.resolver.resolve(flat());
                continue;
            }
            debug!("issuing query readback for {} points", lookups.len());
            self.in_flight.push(InFlight {
                readback: ctx.backend.read_samples(texture, lookups),
                slots,
                sea_level: ctx.sea_level,
                resolver: request.resolver,
            });
        }
    }
}

impl QueryProvider for GpuQueryProvider {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn enabled(&self) -> bool {
        !self.disabled
    }

    fn submit(&mut self, positions: Vec<Vec3>) -> Pending<Vec<QuerySample>> {
        let (resolver, result) = pending();
        self.queued.push(Queued {
            positions,
            resolver,
        });
        result
    }

    fn update(&mut self, ctx: &mut QueryContext<'_>) {
        self.poll_in_flight();
        self.issue(ctx);
    }

    fn cancel_all(&mut self) {
        let cancelled = self.queued.len() + self.in_flight.len();
        for request in self.queued.drain(..) {
            request.resolver.cancel();
        }
        for request in self.in_flight.drain(..) {
            request.readback.cancel();
            request.resolver.cancel();
        }
        if cancelled > 0 {
            debug!("cancelled {} gpu queries", cancelled);
        }
    }

    fn in_flight(&self) -> usize {
        self.queued.len() + self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ReadbackError, RenderBackend, SoftwareBackend};
    use crate::cascade::LodTransform;
    use crate::config::LodConfig;
    use crate::grid::{ExternalLayers, FrameContext, LodDataKind, LodGrid};
    use crate::input::ConstantInput;
    use std::rc::Rc;

    fn ticked_grid(backend: &mut SoftwareBackend, config: &LodConfig) -> LodGrid {
        let mut transform = LodTransform::new(config);
        transform.update(Vec3::ZERO);
        let mut grid = LodGrid::new(LodDataKind::AnimatedWaves, config);
        assert!(grid.enable(backend));
        grid.register_input(
            Rc::new(ConstantInput::new(Vec4::new(0.0, 1.5, 0.0, 0.0))),
            0,
            0,
        );
        grid.tick(
            backend,
            &FrameContext {
                transform: &transform,
                time: 0.0,
                delta_time: 0.1,
                    teleported: false,
            },
            ExternalLayers::default(),
        );
        grid
    }

    #[test]
    fn test_results_arrive_a_frame_after_issue() {
        let config = LodConfig {
            cascade_count: 3,
            resolution: 16,
            ..Default::default()
        };
        let mut backend = SoftwareBackend::new();
        let grid = ticked_grid(&mut backend, &config);
        let mut provider = GpuQueryProvider::new();
        let far = Vec3::new(1.0e6, 0.0, 0.0);
        let mut pending = provider.submit(vec![Vec3::ZERO, far]);

        let update = |provider: &mut GpuQueryProvider, backend: &mut SoftwareBackend| {
            provider.update(&mut QueryContext {
                backend: &mut *backend,
                grid: Some(&grid),
                time: 0.0,
                sea_level: 2.0,
            });
            backend.end_frame();
        };

        update(&mut provider, &mut backend);
        assert!(poll_now(&mut pending).is_none());
        assert_eq!(backend.pending_readbacks(), 0);
        update(&mut provider, &mut backend);

        let samples = poll_now(&mut pending).unwrap().unwrap();
        assert!((samples[0].height - 3.5).abs() < 1e-4);
        assert!(samples[0].valid);
        assert_eq!(samples[1], QuerySample::flat(2.0));
        assert_eq!(provider.in_flight(), 0);
    }

    #[test]
    fn test_no_grid_resolves_flat() {
        let mut backend = SoftwareBackend::new();
        let mut provider = GpuQueryProvider::new();
        let mut pending = provider.submit(vec![Vec3::ZERO]);
        provider.update(&mut QueryContext {
            backend: &mut backend,
            grid: None,
            time: 0.0,
            sea_level: 1.0,
        });
        assert_eq!(poll_now(&mut pending), Some(Ok(vec![QuerySample::flat(1.0)])));
    }

    #[test]
    fn test_dropped_consumer_skips_readback() {
        let config = LodConfig {
            cascade_count: 2,
            resolution: 8,
            ..Default::default()
        };
        let mut backend = SoftwareBackend::new();
        let grid = ticked_grid(&mut backend, &config);
        let mut provider = GpuQueryProvider::new();
        drop(provider.submit(vec![Vec3::ZERO]));
        provider.update(&mut QueryContext {
            backend: &mut backend,
            grid: Some(&grid),
            time: 0.0,
            sea_level: 0.0,
        });
        assert_eq!(backend.stats().readbacks_issued, 0);
        assert_eq!(provider.in_flight(), 0);
    }

    #[test]
    fn test_cancel_all_cancels_readbacks() {
        let config = LodConfig {
            cascade_count: 2,
            resolution: 8,
            ..Default::default()
        };
        let mut backend = SoftwareBackend::new();
        let grid = ticked_grid(&mut backend, &config);
        let mut provider = GpuQueryProvider::new();
        let mut pending = provider.submit(vec![Vec3::ZERO]);
        provider.update(&mut QueryContext {
            backend: &mut backend,
            grid: Some(&grid),
            time: 0.0,
            sea_level: 0.0,
        });
        provider.cancel_all();
        backend.end_frame();
        assert_eq!(poll_now(&mut pending), Some(Err(ReadbackError::Cancelled)));
        assert_eq!(backend.stats().readbacks_cancelled, 1);
    }
}
