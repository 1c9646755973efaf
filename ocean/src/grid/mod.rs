//! One multi-resolution grid of a single data kind.
//!
//! A grid owns its texture arrays, its sampling table and its input
//! registry. Every tick it flips history, writes where the cascades are,
//! draws inputs (plain), advances a simulation (persistent) or merges octaves
//! (combine), then publishes itself globally. A grid that fails to come up
//! stays disabled and publishes neutral data instead.

mod combine;
mod format;
mod kind;
mod persistent;

use std::rc::Rc;

use bevy_log::{debug, error, info};
use wgpu_types::TextureFormat;

use crate::backend::{GlobalTexture, KernelKind, RenderBackend, TextureArrayDesc, TextureId};
use crate::buffer::BufferedData;
use crate::cascade::{CascadeChain, CascadeSampling, CascadeView, LodTransform, SamplingTable};
use crate::config::{GridSettings, LodConfig};
use crate::error::LodError;
use crate::input::{submit_inputs, GridState, InputId, InputRegistry, LodInput};

pub use combine::filter_by_wavelength;
pub use format::FormatRequest;
pub use kind::LodDataKind;
pub use persistent::{SubstepLedger, Substeps};

use combine::CombineState;
use persistent::{PersistentFrame, PersistentState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridLifecycle {
    Disabled,
    Initializing,
    Active,
    Reallocating,
}

/// Everything a grid needs to know about the current frame.
pub struct FrameContext<'a> {
    pub transform: &'a LodTransform,
    pub time: f32,
    pub delta_time: f32,
    /// Viewer teleported, or the finest cascade jumped further than the
    /// teleport distance.
    pub teleported: bool,
}

/// Current textures of other grids, read by the displacement combine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExternalLayers {
    pub dynamic_waves: Option<TextureId>,
    pub sea_floor_depth: Option<TextureId>,
}

enum Behaviour {
    Plain,
    Persistent(PersistentState),
    Combine(CombineState),
}

pub struct LodGrid {
    kind: LodDataKind,
    settings: GridSettings,
    lifecycle: GridLifecycle,
    resolution: u32,
    cascade_count: usize,
    format: Option<TextureFormat>,
    buffers: Option<BufferedData<TextureId>>,
    sampling: SamplingTable,
    views: Vec<CascadeView>,
    chain: Option<CascadeChain>,
    registry: InputRegistry,
    behaviour: Behaviour,
    clear_pending: bool,
    error: Option<LodError>,
    skipped_flips: u64,
    ticks: u64,
}

impl LodGrid {
    pub fn new(kind: LodDataKind, config: &LodConfig) -> Self {
        let behaviour = match (kind, config.simulation(kind), kind.simulation_kernel()) {
            (LodDataKind::AnimatedWaves, _, _) => {
                Behaviour::Combine(CombineState::new(config.combine_enabled))
            }
            (_, Some(sim), Some(kernel)) => Behaviour::Persistent(PersistentState::new(*sim, kernel)),
            _ => Behaviour::Plain,
        };
        Self {
            kind,
            settings: *config.settings(kind),
            lifecycle: GridLifecycle::Disabled,
            resolution: config.resolution,
            cascade_count: config.cascade_count,
            format: None,
            buffers: None,
            sampling: SamplingTable::new(),
            views: Vec::new(),
            chain: None,
            registry: InputRegistry::new(),
            behaviour,
            clear_pending: false,
            error: None,
            skipped_flips: 0,
            ticks: 0,
        }
    }

    pub fn kind(&self) -> LodDataKind {
        self.kind
    }

    pub fn lifecycle(&self) -> GridLifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == GridLifecycle::Active
    }

    /// The fatal error that disabled this grid, if any.
    pub fn error(&self) -> Option<&LodError> {
        self.error.as_ref()
    }

    pub fn format(&self) -> Option<TextureFormat> {
        self.format
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn current_texture(&self) -> Option<TextureId> {
        self.active_buffers().map(|buffers| *buffers.current())
    }

    pub fn previous_texture(&self) -> Option<TextureId> {
        self.active_buffers().map(|buffers| *buffers.previous(buffers.len() - 1))
    }

    pub fn sampling(&self) -> &SamplingTable {
        &self.sampling
    }

    /// Cascades as of the last tick.
    pub fn chain(&self) -> Option<&CascadeChain> {
        self.chain.as_ref()
    }

    pub fn registry(&self) -> &InputRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut InputRegistry {
        &mut self.registry
    }

    pub fn register_input(&mut self, input: Rc<dyn LodInput>, queue: i32, tiebreak: i32) -> InputId {
        self.registry.register(input, queue, tiebreak)
    }

    /// Flips skipped because a tick had zero elapsed time.
    pub fn skipped_flips(&self) -> u64 {
        self.skipped_flips
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Substeps the last tick ran, for persistent grids.
    pub fn last_substeps(&self) -> Option<u32> {
        match &self.behaviour {
            Behaviour::Persistent(state) => Some(state.last_substeps),
            _ => None,
        }
    }

    /// Whether the last tick ran with the prewarm hint.
    pub fn last_prewarmed(&self) -> bool {
        match &self.behaviour {
            Behaviour::Persistent(state) => state.last_prewarmed,
            _ => false,
        }
    }

    pub fn substep_ledger(&self) -> Option<&SubstepLedger> {
        match &self.behaviour {
            Behaviour::Persistent(state) => Some(&state.ledger),
            _ => None,
        }
    }

    pub fn set_combine_enabled(&mut self, enabled: bool) {
        if let Behaviour::Combine(state) = &mut self.behaviour {
            state.combine_enabled = enabled;
        }
    }

    /// Brings the grid up. Returns whether it is active afterwards. A grid
    /// that failed fatally stays down.
    pub fn enable(&mut self, backend: &mut dyn RenderBackend) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.lifecycle == GridLifecycle::Disabled {
            self.lifecycle = GridLifecycle::Initializing;
            if let Err(err) = self.initialize(backend) {
                self.fail(backend, err);
            }
        }
        self.is_active()
    }

    /// Releases textures and binds neutral data. The grid can be enabled
    /// again later.
    pub fn disable(&mut self, backend: &mut dyn RenderBackend) {
        if self.lifecycle == GridLifecycle::Disabled {
            return;
        }
        self.release(backend);
        self.lifecycle = GridLifecycle::Disabled;
        self.bind_globals(backend);
        info!("{} grid disabled", self.kind);
    }

    /// Rebuilds every array at `resolution`, discarding history.
    pub fn reallocate(&mut self, backend: &mut dyn RenderBackend, resolution: u32) {
        self.resolution = resolution;
        if !self.is_active() {
            return;
        }
        self.lifecycle = GridLifecycle::Reallocating;
        self.release(backend);
        if let Err(err) = self.initialize(backend) {
            self.fail(backend, err);
        }
    }

    /// Switches the logical format request, rebuilding the arrays when the
    /// grid is active.
    pub fn set_format(&mut self, backend: &mut dyn RenderBackend, request: FormatRequest) {
        self.settings.format = request;
        let resolution = self.resolution;
        self.reallocate(backend, resolution);
    }

    fn initialize(&mut self, backend: &mut dyn RenderBackend) -> Result<(), LodError> {
        let format = self
            .settings
            .format
            .resolve(self.kind, |format| backend.supports_format(format))
            .ok_or(LodError::NoCompatibleFormat {
                kind: self.kind,
                request: self.settings.format,
            })?;

        let required_kernel = match &self.behaviour {
            Behaviour::Plain => None,
            Behaviour::Persistent(state) => Some(state.kernel),
            Behaviour::Combine(_) => Some(KernelKind::Combine),
        };
        if let Some(kernel) = required_kernel {
            if !backend.supports_kernel(kernel) {
                return Err(LodError::MissingKernel {
                    kind: self.kind,
                    kernel,
                });
            }
        }

        let desc = |label: String, format: TextureFormat| TextureArrayDesc {
            label,
            resolution: self.resolution,
            slices: self.cascade_count as u32,
            format,
        };

        let mut slot = 0;
        let buffers = BufferedData::try_new(self.kind.buffer_count(), || {
            slot += 1;
            backend.create_texture_array(&desc(format!("{}_{}", self.kind.binding_name(), slot), format))
        });
        let buffers = match buffers {
            Ok(buffers) => buffers,
            Err((err, partial)) => {
                for texture in partial {
                    backend.release_texture_array(texture);
                }
                return Err(err.into());
            }
        };
        self.format = Some(format);
        self.buffers = Some(buffers);

        let scratch_label = format!("{}_scratch", self.kind.binding_name());
        match &mut self.behaviour {
            Behaviour::Plain => {}
            Behaviour::Persistent(state) => {
                state.scratch = Some(backend.create_texture_array(&desc(scratch_label, format))?);
                state.ledger.reset();
                state.prewarm = true;
            }
            Behaviour::Combine(state) => {
                state.scratch = Some(backend.create_texture_array(&desc(scratch_label, format))?);
                let dynamic_label = format!("{}_dynamic_scratch", self.kind.binding_name());
                state.dynamic_scratch = Some(backend.create_texture_array(&desc(dynamic_label, format))?);
            }
        }

        self.clear_pending = true;
        self.lifecycle = GridLifecycle::Active;
        debug!(
            "{} grid active: {}x{}x{} {:?}",
            self.kind, self.resolution, self.resolution, self.cascade_count, format
        );
        Ok(())
    }

    /// Fatal path: log once, drop every resource, publish neutral data.
    fn fail(&mut self, backend: &mut dyn RenderBackend, err: LodError) {
        error!("{} grid disabled: {}", self.kind, err);
        self.release(backend);
        self.lifecycle = GridLifecycle::Disabled;
        self.error = Some(err);
        self.bind_globals(backend);
    }

    fn release(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(buffers) = self.buffers.take() {
            for texture in buffers.into_slots() {
                backend.release_texture_array(texture);
            }
        }
        let scratch: Vec<TextureId> = match &mut self.behaviour {
            Behaviour::Plain => Vec::new(),
            Behaviour::Persistent(state) => state.scratch.take().into_iter().collect(),
            Behaviour::Combine(state) => {
                let textures = state.textures().collect();
                state.scratch = None;
                state.dynamic_scratch = None;
                textures
            }
        };
        for texture in scratch {
            backend.release_texture_array(texture);
        }
        self.format = None;
    }

    fn active_buffers(&self) -> Option<&BufferedData<TextureId>> {
        if self.is_active() {
            self.buffers.as_ref()
        } else {
            None
        }
    }

    pub fn tick(
        &mut self,
        backend: &mut dyn RenderBackend,
        frame: &FrameContext<'_>,
        layers: ExternalLayers,
    ) {
        let chain = frame.transform.chain();
        if !self.is_active() {
            self.chain = Some(chain.clone());
            self.bind_globals(backend);
            return;
        }
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        self.ticks += 1;

        // Flip once, before anything reads "current". A zero-length frame
        // keeps the slots so no resolved frame is thrown away.
        let flipped = frame.delta_time > 0.0;
        let history_sampling: Vec<CascadeSampling> = if flipped {
            buffers.flip();
            self.sampling.flip();
            self.sampling.previous().to_vec()
        } else {
            self.skipped_flips += 1;
            self.sampling.current().to_vec()
        };
        self.sampling.write(chain);
        if self.clear_pending {
            // No valid history yet.
            self.sampling.sync_previous();
        }
        self.views.clear();
        self.views.extend_from_slice(frame.transform.views());
        self.chain = Some(chain.clone());

        let current = *buffers.current();
        let history = if flipped && buffers.len() > 1 {
            *buffers.previous(1)
        } else {
            current
        };
        let slices = 0..self.cascade_count as u32;
        let neutral = self.kind.neutral_value();

        if self.clear_pending || self.kind.clears_each_frame() {
            if self.clear_pending {
                // Fresh arrays: clear every slot so history is neutral too.
                for texture in buffers.iter() {
                    backend.clear(*texture, slices.clone(), neutral);
                }
            } else {
                backend.clear(current, slices.clone(), neutral);
            }
            self.clear_pending = false;
        } else if !self.kind.is_persistent() && history != current {
            // Temporal kinds start from last frame's result.
            backend.copy_texture_array(history, current);
        }

        let state = GridState {
            kind: self.kind,
            chain,
            views: &self.views,
            sampling: self.sampling.current(),
            time: frame.time,
            delta_time: frame.delta_time,
            altitude_alpha: frame.transform.altitude_alpha(),
        };

        match &mut self.behaviour {
            Behaviour::Plain => submit_inputs(&self.registry, backend, &state, current, |_| true),
            Behaviour::Persistent(persistent) => persistent.run(
                backend,
                &self.registry,
                PersistentFrame {
                    primary: current,
                    history,
                    history_sampling: &history_sampling,
                    state,
                    teleported: frame.teleported,
                },
            ),
            Behaviour::Combine(combine) => {
                combine.run(backend, &self.registry, &state, current, layers)
            }
        }

        if self.settings.clear_border {
            backend.clear_border(current, neutral);
        }

        self.bind_globals(backend);
    }

    /// Publishes the current array and sampling vectors, or a flat neutral
    /// texture when the grid is not active.
    pub fn bind_globals(&self, backend: &mut dyn RenderBackend) {
        let name = self.kind.binding_name();
        let source_name = format!("{name}{}", crate::constants::SOURCE_SUFFIX);
        match self.active_buffers() {
            Some(buffers) => {
                backend.bind_global_texture(&name, GlobalTexture::Array(*buffers.current()));
                let previous = *buffers.previous(buffers.len() - 1);
                backend.bind_global_texture(&source_name, GlobalTexture::Array(previous));
                self.sampling.bind(backend, &name);
            }
            None => {
                let neutral = GlobalTexture::Neutral(self.kind.neutral_value());
                backend.bind_global_texture(&name, neutral);
                backend.bind_global_texture(&source_name, neutral);
                SamplingTable::bind_neutral(backend, &name, self.cascade_count);
            }
        }
    }
}
