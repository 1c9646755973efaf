//! Bevy integration for the ocean lod system.

use bevy::prelude::*;
use bevy_log::error;

use crate::backend::RenderBackend;
use crate::config::LodConfig;
use crate::system::{LodSystem, ViewerState};

/// Where the water is being looked at from. Hosts write this every frame.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct Viewer {
    pub position: Vec3,
    /// Consumed by the next tick.
    pub teleported: bool,
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct OceanLodSet;

/// Plugin that drives a [`LodSystem`] once per `Update`.
///
/// This plugin:
/// - Validates the configuration and enables every configured grid
/// - Stores the system as a non-send resource (inputs are `Rc`-shared)
/// - Ticks it from [`Viewer`] and [`Time`] each frame
pub struct OceanLodPlugin<B> {
    pub config: LodConfig,
    pub make_backend: fn() -> B,
}

impl<B: RenderBackend + 'static> Plugin for OceanLodPlugin<B> {
    fn build(&self, app: &mut App) {
        let mut system = match LodSystem::new(self.config.clone(), (self.make_backend)()) {
            Ok(system) => system,
            Err(err) => {
                error!("ocean lod not started: {}", err);
                return;
            }
        };
        system.enable();

        app.insert_non_send_resource(system)
            .init_resource::<Viewer>()
            .configure_sets(Update, OceanLodSet)
            .add_systems(Update, tick_lod_system::<B>.in_set(OceanLodSet));
    }
}

fn tick_lod_system<B: RenderBackend + 'static>(
    mut lod: NonSendMut<LodSystem<B>>,
    time: Res<Time>,
    mut viewer: ResMut<Viewer>,
) {
    lod.tick(ViewerState {
        position: viewer.position,
        delta_time: time.delta_secs(),
        teleported: viewer.teleported,
    });
    viewer.teleported = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::grid::LodDataKind;
    use std::time::Duration;

    #[test]
    fn test_plugin_ticks_each_update() {
        let mut app = App::new();
        app.init_resource::<Time>().add_plugins(OceanLodPlugin {
            config: LodConfig {
                cascade_count: 2,
                resolution: 8,
                ..Default::default()
            },
            make_backend: SoftwareBackend::new,
        });

        for _ in 0..3 {
            app.world_mut()
                .resource_mut::<Time>()
                .advance_by(Duration::from_millis(16));
            app.update();
        }

        let lod = app.world().non_send_resource::<LodSystem<SoftwareBackend>>();
        assert_eq!(lod.frame(), 3);
        assert!(lod.grid(LodDataKind::Foam).is_some_and(|grid| grid.is_active()));
        assert!(!app.world().resource::<Viewer>().teleported);
    }

    #[test]
    fn test_invalid_config_skips_setup() {
        let mut app = App::new();
        app.add_plugins(OceanLodPlugin {
            config: LodConfig {
                cascade_count: 0,
                ..Default::default()
            },
            make_backend: SoftwareBackend::new,
        });
        assert!(app
            .world()
            .get_non_send_resource::<LodSystem<SoftwareBackend>>()
            .is_none());
    }
}
