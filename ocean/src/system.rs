//! The whole framework for one viewer: transform, grids and queries.

use std::rc::Rc;

use bevy::math::Vec3;
use bevy_log::{debug, info};

use crate::backend::RenderBackend;
use crate::cascade::LodTransform;
use crate::config::{validate_resolution, LodConfig};
use crate::error::ConfigError;
use crate::grid::{ExternalLayers, FormatRequest, FrameContext, LodDataKind, LodGrid};
use crate::input::{InputId, LodInput};
use crate::query::{QueryContext, QueryService};
use crate::waves::{GerstnerWaveInput, WaveConfig};

/// Per-frame viewer input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewerState {
    pub position: Vec3,
    pub delta_time: f32,
    /// Set by the host when the viewer jumped (respawn, cutscene cut).
    pub teleported: bool,
}

pub struct LodSystem<B: RenderBackend> {
    config: LodConfig,
    backend: B,
    transform: LodTransform,
    /// In tick order.
    grids: Vec<LodGrid>,
    queries: QueryService,
    time: f32,
    frame: u64,
}

impl<B: RenderBackend> LodSystem<B> {
    pub fn new(config: LodConfig, backend: B) -> Result<Self, ConfigError> {
        config.validate()?;
        let grids = LodDataKind::TICK_ORDER
            .iter()
            .map(|&kind| LodGrid::new(kind, &config))
            .collect();
        Ok(Self {
            transform: LodTransform::new(&config),
            backend,
            grids,
            queries: QueryService::default().with_sea_level(config.sea_level),
            config,
            time: 0.0,
            frame: 0,
        })
    }

    /// Brings up every grid enabled in the configuration. Returns how many
    /// came up.
    pub fn enable(&mut self) -> usize {
        let mut active = 0;
        for grid in &mut self.grids {
            if self.config.settings(grid.kind()).enabled && grid.enable(&mut self.backend) {
                active += 1;
            }
        }
        info!(
            "ocean lod enabled: {} of {} grids, {} cascades at {}x{}",
            active,
            self.grids.len(),
            self.config.cascade_count,
            self.config.resolution,
            self.config.resolution
        );
        active
    }

    pub fn disable(&mut self) {
        self.queries.cancel_all();
        for grid in &mut self.grids {
            grid.disable(&mut self.backend);
        }
    }

    pub fn grid(&self, kind: LodDataKind) -> Option<&LodGrid> {
        self.grids.iter().find(|grid| grid.kind() == kind)
    }

    pub fn grid_mut(&mut self, kind: LodDataKind) -> Option<&mut LodGrid> {
        self.grids.iter_mut().find(|grid| grid.kind() == kind)
    }

    pub fn grids(&self) -> impl Iterator<Item = &LodGrid> {
        self.grids.iter()
    }

    fn displacement_active(&self) -> bool {
        self.grid(LodDataKind::AnimatedWaves).is_some_and(LodGrid::is_active)
    }

    /// Outstanding queries were issued against arrays that no longer exist
    /// once the displacement grid goes down, however it went down.
    fn cancel_queries_if_displacement_lost(&mut self, was_active: bool) {
        if was_active && !self.displacement_active() {
            debug!("displacement grid went down, cancelling queries");
            self.queries.cancel_all();
        }
    }

    /// Turns one grid on or off at runtime. Turning displacement off also
    /// cancels outstanding queries against it.
    pub fn set_grid_enabled(&mut self, kind: LodDataKind, enabled: bool) -> bool {
        self.config.settings_mut(kind).enabled = enabled;
        let displacement_was_active = self.displacement_active();
        let Some(grid) = self.grids.iter_mut().find(|grid| grid.kind() == kind) else {
            return false;
        };
        let active = if enabled {
            grid.enable(&mut self.backend)
        } else {
            grid.disable(&mut self.backend);
            false
        };
        self.cancel_queries_if_displacement_lost(displacement_was_active);
        active
    }

    /// Switches a grid's format request. A format the backend cannot provide
    /// disables the grid for good.
    pub fn set_grid_format(&mut self, kind: LodDataKind, request: FormatRequest) {
        self.config.settings_mut(kind).format = request;
        let displacement_was_active = self.displacement_active();
        if let Some(grid) = self.grids.iter_mut().find(|grid| grid.kind() == kind) {
            grid.set_format(&mut self.backend, request);
        }
        self.cancel_queries_if_displacement_lost(displacement_was_active);
    }

    /// Changes cascade resolution, rebuilding every active grid.
    pub fn reallocate(&mut self, resolution: u32) -> Result<(), ConfigError> {
        validate_resolution(resolution)?;
        if resolution == self.config.resolution {
            return Ok(());
        }
        info!("reallocating ocean lod: {} -> {}", self.config.resolution, resolution);
        self.config.resolution = resolution;
        self.transform.set_resolution(resolution);
        let displacement_was_active = self.displacement_active();
        for grid in &mut self.grids {
            grid.reallocate(&mut self.backend, resolution);
        }
        self.cancel_queries_if_displacement_lost(displacement_was_active);
        Ok(())
    }

    pub fn register_input(
        &mut self,
        kind: LodDataKind,
        input: Rc<dyn LodInput>,
        queue: i32,
        tiebreak: i32,
    ) -> Option<InputId> {
        self.grid_mut(kind)
            .map(|grid| grid.register_input(input, queue, tiebreak))
    }

    pub fn unregister_input(&mut self, kind: LodDataKind, id: InputId) -> Option<Rc<dyn LodInput>> {
        self.grid_mut(kind)?.registry_mut().unregister(id)
    }

    pub fn set_input_queue(&mut self, kind: LodDataKind, id: InputId, queue: i32) -> bool {
        self.grid_mut(kind)
            .is_some_and(|grid| grid.registry_mut().set_queue(id, queue))
    }

    /// Registers one displacement input per active wave, tiebroken by index.
    pub fn add_wave_set(&mut self, waves: &WaveConfig, queue: i32) -> Vec<InputId> {
        waves
            .active_waves()
            .enumerate()
            .filter_map(|(i, params)| {
                let input = Rc::new(GerstnerWaveInput::new(params, waves.amplitude_scale));
                self.register_input(LodDataKind::AnimatedWaves, input, queue, i as i32)
            })
            .collect()
    }

    /// Runs one frame: place cascades, tick every grid, service queries,
    /// and end the backend frame.
    pub fn tick(&mut self, viewer: ViewerState) {
        let delta_time = viewer.delta_time.max(0.0);
        self.time += delta_time;
        let origin_shift = self.transform.update(viewer.position);
        let teleported =
            viewer.teleported || origin_shift.length() > self.config.teleport_distance;
        if teleported {
            debug!("viewer teleported, origin moved by {}", origin_shift);
        }

        let frame = FrameContext {
            transform: &self.transform,
            time: self.time,
            delta_time,
            teleported,
        };
        let mut layers = ExternalLayers::default();
        for grid in &mut self.grids {
            grid.tick(&mut self.backend, &frame, layers);
            match grid.kind() {
                LodDataKind::SeaFloorDepth => layers.sea_floor_depth = grid.current_texture(),
                LodDataKind::DynamicWaves => layers.dynamic_waves = grid.current_texture(),
                _ => {}
            }
        }

        let displacement = self
            .grids
            .iter()
            .find(|grid| grid.kind() == LodDataKind::AnimatedWaves);
        self.queries.update(&mut QueryContext {
            backend: &mut self.backend,
            grid: displacement,
            time: self.time,
            sea_level: self.config.sea_level,
        });

        self.backend.end_frame();
        self.frame += 1;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn transform(&self) -> &LodTransform {
        &self.transform
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    pub fn queries_mut(&mut self) -> &mut QueryService {
        &mut self.queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GlobalTexture, SoftwareBackend};
    use crate::input::FoamSplash;
    use bevy::math::Vec2;

    fn system() -> LodSystem<SoftwareBackend> {
        let config = LodConfig {
            cascade_count: 4,
            resolution: 16,
            ..Default::default()
        };
        LodSystem::new(config, SoftwareBackend::new()).unwrap()
    }

    fn step(system: &mut LodSystem<SoftwareBackend>, position: Vec3) {
        system.tick(ViewerState {
            position,
            delta_time: 1.0 / 60.0,
            teleported: false,
        });
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = LodConfig {
            resolution: 12,
            ..Default::default()
        };
        assert!(matches!(
            LodSystem::new(config, SoftwareBackend::new()),
            Err(ConfigError::Resolution(12))
        ));
    }

    #[test]
    fn test_enable_brings_up_every_grid() {
        let mut system = system();
        assert_eq!(system.enable(), LodDataKind::ALL.len());
        step(&mut system, Vec3::ZERO);
        for kind in LodDataKind::ALL {
            assert!(system.grid(kind).unwrap().is_active(), "{kind}");
            assert!(matches!(
                system.backend().global_texture(&kind.binding_name()),
                Some(GlobalTexture::Array(_))
            ));
        }
        assert_eq!(system.frame(), 1);
        assert_eq!(system.backend().frame(), 1);
    }

    #[test]
    fn test_far_jump_triggers_prewarm() {
        let mut system = system();
        system.enable();
        step(&mut system, Vec3::ZERO);
        step(&mut system, Vec3::ZERO);
        assert!(!system.grid(LodDataKind::Foam).unwrap().last_prewarmed());
        step(&mut system, Vec3::new(5000.0, 0.0, 0.0));
        assert!(system.grid(LodDataKind::Foam).unwrap().last_prewarmed());
    }

    #[test]
    fn test_disabling_displacement_binds_neutral() {
        let mut system = system();
        system.enable();
        system.set_grid_enabled(LodDataKind::AnimatedWaves, false);
        step(&mut system, Vec3::ZERO);
        assert_eq!(
            system.backend().global_texture("lod_animated_waves"),
            Some(GlobalTexture::Neutral(bevy::math::Vec4::ZERO))
        );
        assert!(system.set_grid_enabled(LodDataKind::AnimatedWaves, true));
    }

    #[test]
    fn test_inputs_route_to_their_grid() {
        let mut system = system();
        system.enable();
        let splash = Rc::new(FoamSplash::new(Vec2::ZERO, 4.0, 10.0));
        let id = system
            .register_input(LodDataKind::Foam, splash, 0, 0)
            .unwrap();
        assert_eq!(system.grid(LodDataKind::Foam).unwrap().registry().len(), 1);
        assert!(system.set_input_queue(LodDataKind::Foam, id, 3));
        assert!(system.unregister_input(LodDataKind::Foam, id).is_some());
        assert!(system.unregister_input(LodDataKind::Foam, id).is_none());
    }

    #[test]
    fn test_reallocate_validates_resolution() {
        let mut system = system();
        system.enable();
        assert_eq!(system.reallocate(20), Err(ConfigError::Resolution(20)));
        assert!(system.reallocate(32).is_ok());
        assert_eq!(system.transform().resolution(), 32);
    }
}
