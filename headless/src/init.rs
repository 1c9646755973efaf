use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use bevy::math::Rect;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use bevy_app::ScheduleRunnerPlugin;
use bevy_log::{debug, error, info, warn};
use ocean::backend::{poll_now, Pending, ReadbackError, SoftwareBackend};
use ocean::input::{DynamicWaveImpulse, FlatSeaFloor, FoamSplash};
use ocean::query::{CpuQueryProvider, GpuQueryProvider, QuerySample};
use ocean::waves::WaveConfig;
use ocean::{LodDataKind, LodSystem, OceanLodPlugin, OceanLodSet, Viewer};
use rand::Rng;

use crate::config::{load_config, write_config};
use crate::ProviderKind;

type Lod = LodSystem<SoftwareBackend>;

/// Distance of the mid-run teleport.
const TELEPORT_JUMP: f32 = 10_000.0;
/// Size of the thing the probes stand in for, roughly a small boat.
const PROBE_FOOTPRINT: f32 = 4.0;

#[derive(Resource, Debug, Clone, Copy)]
pub struct RunSettings {
    pub frames: u64,
    pub fps: f64,
    pub fast: bool,
    pub speed: f32,
    pub altitude: f32,
    pub provider: ProviderKind,
    pub query_every: u64,
}

#[derive(Resource)]
struct Scene {
    waves: WaveConfig,
    splashes: u32,
    sea_floor_depth: f32,
}

/// Outstanding surface probe. Holds an `Rc`, so it lives as a non-send
/// resource next to the lod system.
#[derive(Default)]
struct Probe {
    pending: Option<(u64, Pending<Vec<QuerySample>>)>,
    provider: Option<ProviderKind>,
    delivered: u64,
    cancelled: u64,
}

pub fn init(config_path: &Path, write: bool, settings: RunSettings) {
    let mut app = App::new();
    let frame_time = Duration::from_secs_f64(1.0 / settings.fps);
    let wait = if settings.fast {
        Duration::ZERO
    } else {
        frame_time
    };
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(wait)));
    app.add_plugins(bevy::log::LogPlugin::default());

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load {}: {}", config_path.display(), err);
            std::process::exit(1);
        }
    };
    if write {
        if let Err(err) = write_config(&config, config_path) {
            error!("Failed to write {}: {}", config_path.display(), err);
            std::process::exit(1);
        }
        return;
    }

    // Every frame advances by exactly one frame time, however long it took.
    app.insert_resource(TimeUpdateStrategy::ManualDuration(frame_time));
    app.add_plugins(OceanLodPlugin {
        config: config.lod.clone(),
        make_backend: SoftwareBackend::new,
    });

    app.insert_resource(settings);
    app.insert_resource(Scene {
        waves: config.waves.to_config(),
        splashes: config.splashes,
        sea_floor_depth: config.sea_floor_depth,
    });
    app.insert_resource(Viewer {
        position: Vec3::new(0.0, config.lod.sea_level + settings.altitude, 0.0),
        teleported: false,
    });
    app.insert_non_send_resource(Probe::default());

    app.add_systems(Startup, setup_scene);
    app.add_systems(
        Update,
        (
            fly_viewer.before(OceanLodSet),
            (probe_surface, exit_after_frames)
                .chain()
                .after(OceanLodSet),
        ),
    );

    info!(
        "Starting headless ocean run: {} frames at {} fps, {:?} waves, {:?} queries",
        settings.frames, settings.fps, config.waves, settings.provider
    );
    app.run();
}

fn setup_scene(
    lod: Option<NonSendMut<Lod>>,
    mut probe: NonSendMut<Probe>,
    scene: Res<Scene>,
    settings: Res<RunSettings>,
) {
    let Some(mut lod) = lod else {
        return;
    };

    let waves = lod.add_wave_set(&scene.waves, 0);

    lod.register_input(
        LodDataKind::SeaFloorDepth,
        Rc::new(FlatSeaFloor {
            depth: scene.sea_floor_depth,
            level_offset: 0.0,
            rect: Rect::default(),
        }),
        0,
        0,
    );

    for i in 0..scene.splashes {
        let angle = i as f32 * std::f32::consts::TAU / scene.splashes as f32;
        let center = Vec2::from_angle(angle) * 6.0;
        lod.register_input(
            LodDataKind::Foam,
            Rc::new(FoamSplash::new(center, 3.0, 4.0)),
            0,
            i as i32,
        );
    }

    lod.register_input(
        LodDataKind::DynamicWaves,
        Rc::new(DynamicWaveImpulse::new(Vec2::new(4.0, 0.0), 2.0, 1.5, 2.0)),
        0,
        0,
    );

    set_provider(&mut lod, settings.provider, &scene.waves);
    probe.provider = Some(settings.provider);
    info!(
        "Scene ready: {} wave inputs, {} foam splashes",
        waves.len(),
        scene.splashes
    );
}

fn set_provider(lod: &mut Lod, kind: ProviderKind, waves: &WaveConfig) {
    let provider: Box<dyn ocean::query::QueryProvider> = match kind {
        ProviderKind::Gpu => {
            Box::new(GpuQueryProvider::new().with_min_spatial_length(PROBE_FOOTPRINT))
        }
        ProviderKind::Cpu => Box::new(CpuQueryProvider::new(waves.clone())),
    };
    lod.queries_mut().set_provider(provider);
}

fn fly_viewer(
    time: Res<Time>,
    settings: Res<RunSettings>,
    mut viewer: ResMut<Viewer>,
    mut frame: Local<u64>,
) {
    *frame += 1;
    viewer.position.x += settings.speed * time.delta_secs();

    if *frame == settings.frames / 2 {
        viewer.position.z += TELEPORT_JUMP;
        viewer.teleported = true;
        info!("Teleporting viewer to {}", viewer.position);
    }
}

fn probe_surface(
    lod: Option<NonSendMut<Lod>>,
    mut probe: NonSendMut<Probe>,
    settings: Res<RunSettings>,
    scene: Res<Scene>,
    viewer: Res<Viewer>,
) {
    let Some(mut lod) = lod else {
        return;
    };
    let frame = lod.frame();

    if let Some((submitted, mut pending)) = probe.pending.take() {
        match poll_now(&mut pending) {
            None => probe.pending = Some((submitted, pending)),
            Some(Ok(samples)) => {
                probe.delivered += 1;
                let heights: Vec<String> = samples
                    .iter()
                    .map(|s| {
                        if s.valid {
                            format!("{:.3}", s.height)
                        } else {
                            "-".to_string()
                        }
                    })
                    .collect();
                info!(
                    "frame {}: probe from frame {} landed, heights [{}]",
                    frame,
                    submitted,
                    heights.join(", ")
                );
            }
            Some(Err(ReadbackError::Cancelled)) => {
                probe.cancelled += 1;
                debug!("frame {}: probe from frame {} was cancelled", frame, submitted);
            }
            Some(Err(err)) => warn!("frame {}: probe failed: {}", frame, err),
        }
    }

    if frame == settings.frames * 3 / 4 {
        let next = match probe.provider {
            Some(ProviderKind::Gpu) => ProviderKind::Cpu,
            _ => ProviderKind::Gpu,
        };
        set_provider(&mut lod, next, &scene.waves);
        probe.provider = Some(next);
    }

    if probe.pending.is_none() && frame % settings.query_every == 0 {
        let mut rng = rand::thread_rng();
        let positions = (0..4)
            .map(|_| {
                let offset = Vec3::new(
                    rng.gen_range(-20.0..20.0),
                    0.0,
                    rng.gen_range(-20.0..20.0),
                );
                viewer.position.with_y(0.0) + offset
            })
            .collect();
        probe.pending = Some((frame, lod.queries_mut().submit(positions)));
    }
}

fn exit_after_frames(
    lod: Option<NonSend<Lod>>,
    probe: NonSend<Probe>,
    settings: Res<RunSettings>,
    mut exit: EventWriter<AppExit>,
) {
    let Some(lod) = lod else {
        error!("ocean lod system is missing, stopping");
        exit.write(AppExit::error());
        return;
    };
    if lod.frame() < settings.frames {
        return;
    }

    let stats = lod.backend().stats();
    info!(
        "Finished {} frames ({:.1}s simulated): {} draws, {} dispatches, {} readbacks ({} cancelled)",
        lod.frame(),
        lod.time(),
        stats.draws,
        stats.dispatches,
        stats.readbacks_issued,
        stats.readbacks_cancelled
    );
    for grid in lod.grids() {
        match grid.substep_ledger() {
            Some(ledger) => info!(
                "  {}: {:?}, {} substeps, {:.3}s dropped",
                grid.kind(),
                grid.lifecycle(),
                ledger.total_substeps(),
                ledger.total_dropped()
            ),
            None => info!("  {}: {:?}", grid.kind(), grid.lifecycle()),
        }
    }
    info!(
        "Probes: {} delivered, {} cancelled",
        probe.delivered, probe.cancelled
    );
    exit.write(AppExit::Success);
}
