//! Fixed-timestep advancement of grids whose data carries over frames.
//!
//! Real frame time accumulates as debt; every `1 / frequency` of debt buys
//! one substep. Substeps ping-pong between the grid's current slot and a
//! scratch array, and the result always ends up in the current slot.

use bevy_log::{debug, warn};

use crate::backend::{Dispatch, KernelKind, RenderBackend, SimulationParams, TextureId};
use crate::cascade::CascadeSampling;
use crate::config::SimSettings;
use crate::input::{submit_inputs, GridState, InputRegistry};

/// Substeps granted for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Substeps {
    pub count: u32,
    /// Per-substep delta; 0 when no full step was due.
    pub dt: f32,
    /// Simulated time dropped by the per-frame cap.
    pub dropped: f64,
}

#[derive(Debug, Clone)]
pub struct SubstepLedger {
    debt: f64,
    frequency: f64,
    previous_substep_dt: f32,
    total_substeps: u64,
    total_dropped: f64,
}

impl SubstepLedger {
    pub fn new(frequency: f32) -> Self {
        Self {
            debt: 0.0,
            frequency: frequency as f64,
            previous_substep_dt: 0.0,
            total_substeps: 0,
            total_dropped: 0.0,
        }
    }

    /// Adds `elapsed` seconds of debt and pays off as many whole substeps as
    /// are due, at most `cap`. With nothing due a single zero-dt substep runs
    /// so inputs still get drawn.
    pub fn advance(&mut self, elapsed: f32, cap: u32) -> Substeps {
        self.debt += elapsed.max(0.0) as f64;
        let step = 1.0 / self.frequency;
        // Tolerate float noise from accumulating f32 frame times.
        let due = (self.debt * self.frequency + 1e-6).floor().max(0.0) as u64;
        if due == 0 {
            self.previous_substep_dt = 0.0;
            return Substeps {
                count: 1,
                dt: 0.0,
                dropped: 0.0,
            };
        }

        self.debt -= due as f64 * step;
        let count = due.min(cap.max(1) as u64);
        let dropped = (due - count) as f64 * step;
        if dropped > 0.0 {
            warn!(
                "{} substeps due this frame, running {} and dropping {:.3}s of simulation",
                due, count, dropped
            );
            self.total_dropped += dropped;
        }
        self.previous_substep_dt = step as f32;
        self.total_substeps += count;
        Substeps {
            count: count as u32,
            dt: step as f32,
            dropped,
        }
    }

    pub fn debt(&self) -> f64 {
        self.debt
    }

    pub fn previous_substep_dt(&self) -> f32 {
        self.previous_substep_dt
    }

    pub fn total_substeps(&self) -> u64 {
        self.total_substeps
    }

    pub fn total_dropped(&self) -> f64 {
        self.total_dropped
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.frequency as f32);
    }
}

/// What the persistent pass needs from the owning grid this frame.
pub(crate) struct PersistentFrame<'a> {
    pub primary: TextureId,
    /// Slot holding last frame's result. Equal to `primary` when the flip was
    /// skipped.
    pub history: TextureId,
    pub history_sampling: &'a [CascadeSampling],
    pub state: GridState<'a>,
    pub teleported: bool,
}

pub(crate) struct PersistentState {
    pub sim: SimSettings,
    pub kernel: KernelKind,
    pub ledger: SubstepLedger,
    pub scratch: Option<TextureId>,
    pub prewarm: bool,
    pub last_substeps: u32,
    pub last_prewarmed: bool,
}

impl PersistentState {
    pub fn new(sim: SimSettings, kernel: KernelKind) -> Self {
        Self {
            sim,
            kernel,
            ledger: SubstepLedger::new(sim.frequency),
            scratch: None,
            prewarm: true,
            last_substeps: 0,
            last_prewarmed: false,
        }
    }

    pub fn run(
        &mut self,
        backend: &mut dyn RenderBackend,
        registry: &InputRegistry,
        frame: PersistentFrame<'_>,
    ) {
        let Some(scratch) = self.scratch else {
            return;
        };
        if frame.teleported {
            self.prewarm = true;
        }
        let substeps = self.ledger.advance(frame.state.delta_time, self.sim.max_substeps_per_frame);
        let slices = 0..frame.state.chain.len() as u32;
        // Reading and writing one array in a kernel is not allowed, so when
        // history already lives in the primary slot the first write goes to
        // scratch.
        let scratch_first = frame.history == frame.primary;

        let mut source = frame.history;
        let mut source_sampling = frame.history_sampling;
        let mut last_target = frame.primary;
        self.last_prewarmed = self.prewarm;
        if self.prewarm {
            debug!("prewarming {} simulation", frame.state.kind);
        }

        for step in 0..substeps.count {
            let target = if (step % 2 == 0) != scratch_first {
                frame.primary
            } else {
                scratch
            };
            backend.dispatch(Dispatch::Simulate {
                kernel: self.kernel,
                target,
                source,
                slices: slices.clone(),
                sampling: frame.state.sampling,
                source_sampling,
                params: SimulationParams {
                    dt: substeps.dt,
                    prewarm: self.prewarm,
                    damping: self.sim.damping,
                    wave_speed_scale: self.sim.wave_speed_scale,
                },
            });
            self.prewarm = false;

            let state = GridState {
                delta_time: substeps.dt,
                ..frame.state
            };
            submit_inputs(registry, backend, &state, target, |_| true);

            source = target;
            source_sampling = frame.state.sampling;
            last_target = target;
        }

        if last_target != frame.primary {
            backend.copy_texture_array(last_target, frame.primary);
        }
        self.last_substeps = substeps.count;
    }
}
