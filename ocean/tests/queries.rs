use std::rc::Rc;

use bevy::math::{Vec2, Vec3, Vec4};
use ocean::backend::{poll_now, ReadbackError, SoftwareBackend};
use ocean::grid::FormatRequest;
use ocean::input::ConstantInput;
use ocean::query::{CpuQueryProvider, GpuQueryProvider, QuerySample};
use ocean::waves::{WavePreset, WaveSampler};
use ocean::{LodConfig, LodDataKind, LodError, LodSystem, ScaleMode, ViewerState};
use wgpu_types::TextureFormat;

fn config() -> LodConfig {
    LodConfig {
        cascade_count: 3,
        resolution: 16,
        sea_level: 1.0,
        ..Default::default()
    }
}

fn system() -> LodSystem<SoftwareBackend> {
    system_with(SoftwareBackend::new())
}

fn system_with(backend: SoftwareBackend) -> LodSystem<SoftwareBackend> {
    let mut system = LodSystem::new(config(), backend).unwrap();
    system.enable();
    system
        .register_input(
            LodDataKind::AnimatedWaves,
            Rc::new(ConstantInput::new(Vec4::new(0.0, 0.75, 0.0, 0.0))),
            0,
            0,
        )
        .unwrap();
    system
}

fn tick(system: &mut LodSystem<SoftwareBackend>) {
    system.tick(ViewerState {
        position: Vec3::ZERO,
        delta_time: 1.0 / 60.0,
        teleported: false,
    });
}

#[test]
fn gpu_query_lands_a_frame_later() {
    let mut system = system();
    tick(&mut system);
    let mut pending = system.queries_mut().submit(vec![Vec3::new(0.3, 0.0, -0.2)]);

    tick(&mut system);
    assert!(poll_now(&mut pending).is_none());
    tick(&mut system);

    let samples = poll_now(&mut pending).unwrap().unwrap();
    assert!(samples[0].valid);
    assert!((samples[0].height - 1.75).abs() < 1e-4);
    assert_eq!(system.backend().stats().readbacks_completed, 1);
}

#[test]
fn switching_provider_cancels_in_flight_queries() {
    let mut system = system();
    tick(&mut system);
    let mut pending = system.queries_mut().submit(vec![Vec3::ZERO]);
    tick(&mut system);
    assert_eq!(system.queries().in_flight(), 1);

    let cpu = CpuQueryProvider::new(WavePreset::Calm.to_config());
    let old = system.queries_mut().set_provider(Box::new(cpu));
    assert_eq!(old.name(), "gpu");
    assert_eq!(old.in_flight(), 0);
    assert_eq!(poll_now(&mut pending), Some(Err(ReadbackError::Cancelled)));
}

#[test]
fn disabling_displacement_cancels_queries() {
    let mut system = system();
    tick(&mut system);
    let mut pending = system.queries_mut().submit(vec![Vec3::ZERO]);
    system.set_grid_enabled(LodDataKind::AnimatedWaves, false);
    assert_eq!(poll_now(&mut pending), Some(Err(ReadbackError::Cancelled)));

    // Later queries fall back to flat water.
    let mut pending = system.queries_mut().submit(vec![Vec3::ZERO]);
    tick(&mut system);
    let samples = poll_now(&mut pending).unwrap().unwrap();
    assert!(!samples[0].valid);
    assert_eq!(samples[0].height, 1.0);
}

#[test]
fn fatal_format_change_cancels_issued_queries() {
    let mut system = system();
    tick(&mut system);
    let mut pending = system.queries_mut().submit(vec![Vec3::ZERO]);
    tick(&mut system);
    assert_eq!(system.backend().pending_readbacks(), 1);

    // No backend format satisfies a single 8-bit channel for displacement.
    system.set_grid_format(
        LodDataKind::AnimatedWaves,
        FormatRequest::Manual(TextureFormat::R8Unorm),
    );
    let grid = system.grid(LodDataKind::AnimatedWaves).unwrap();
    assert!(!grid.is_active());
    assert!(matches!(grid.error(), Some(LodError::NoCompatibleFormat { .. })));
    assert_eq!(system.queries().in_flight(), 0);

    tick(&mut system);
    assert_eq!(poll_now(&mut pending), Some(Err(ReadbackError::Cancelled)));
    assert_eq!(system.backend().stats().readbacks_completed, 0);
    assert_eq!(system.backend().stats().readbacks_cancelled, 1);

    let mut pending = system.queries_mut().submit(vec![Vec3::ZERO]);
    tick(&mut system);
    assert_eq!(poll_now(&mut pending), Some(Ok(vec![QuerySample::flat(1.0)])));
}

#[test]
fn failed_reallocation_cancels_issued_queries() {
    // Exactly what every grid needs at the starting resolution.
    let budget = system().backend().live_texels();

    let mut system = system_with(SoftwareBackend::new().with_texel_budget(budget));
    assert!(system.grid(LodDataKind::AnimatedWaves).unwrap().is_active());
    tick(&mut system);
    let mut pending = system.queries_mut().submit(vec![Vec3::ZERO]);
    tick(&mut system);
    assert_eq!(system.queries().in_flight(), 1);

    // Four times the texels no longer fit the budget.
    assert!(system.reallocate(32).is_ok());
    let grid = system.grid(LodDataKind::AnimatedWaves).unwrap();
    assert!(matches!(grid.error(), Some(LodError::Backend(_))));
    tick(&mut system);
    assert_eq!(poll_now(&mut pending), Some(Err(ReadbackError::Cancelled)));
}

#[test]
fn flat_fallback_uses_configured_sea_level_before_first_tick() {
    let mut system = system();
    let mut provider = CpuQueryProvider::new(WavePreset::Calm.to_config());
    provider.set_enabled(false);
    system.queries_mut().set_provider(Box::new(provider));

    let mut pending = system.queries_mut().submit(vec![Vec3::ZERO, Vec3::X]);
    assert_eq!(
        poll_now(&mut pending),
        Some(Ok(vec![QuerySample::flat(1.0); 2]))
    );
}

#[test]
fn long_footprint_reads_a_coarser_cascade() {
    // Texel sizes 1, 2, 4, 8 with wave bands starting at 1, 2, 4, 8.
    let config = LodConfig {
        cascade_count: 4,
        resolution: 16,
        scale: ScaleMode::Fixed {
            base_texel_size: 1.0,
        },
        min_texels_per_wave: 1.0,
        ..Default::default()
    };
    let mut system = LodSystem::new(config, SoftwareBackend::new()).unwrap();
    system.enable();
    // Only the finest cascade carries a 1.5m ripple.
    let ripple = ConstantInput::new(Vec4::new(0.0, 1.0, 0.0, 0.0)).with_wavelength(1.5);
    system
        .register_input(LodDataKind::AnimatedWaves, Rc::new(ripple), 0, 0)
        .unwrap();
    tick(&mut system);

    let mut heights = Vec::new();
    for length in [0.0, 6.0] {
        let provider = GpuQueryProvider::new().with_min_spatial_length(length);
        system.queries_mut().set_provider(Box::new(provider));
        let mut pending = system.queries_mut().submit(vec![Vec3::ZERO]);
        tick(&mut system);
        tick(&mut system);
        let samples = poll_now(&mut pending).unwrap().unwrap();
        assert!(samples[0].valid);
        heights.push(samples[0].height);
    }
    assert!((heights[0] - 1.0).abs() < 1e-4, "{heights:?}");
    assert!(heights[1].abs() < 1e-4, "{heights:?}");
}

#[test]
fn cpu_query_matches_the_wave_set() {
    let waves = WavePreset::Ocean.to_config();
    let mut system = system();
    system.add_wave_set(&waves, 0);
    system
        .queries_mut()
        .set_provider(Box::new(CpuQueryProvider::new(waves.clone())));
    for _ in 0..5 {
        tick(&mut system);
    }

    let position = Vec3::new(14.0, 0.0, -3.5);
    let mut pending = system.queries_mut().submit(vec![position]);
    let samples = poll_now(&mut pending).unwrap().unwrap();

    let expected = WaveSampler::new(waves).displacement(Vec2::new(14.0, -3.5), system.time());
    assert!((samples[0].displacement - expected).length() < 1e-5);
    assert!((samples[0].height - (1.0 + expected.y)).abs() < 1e-5);
}
