//! Drawable contributors to a grid and the context they draw through.

mod registry;
mod shapes;

use std::ops::Range;

use bevy::math::Rect;

use crate::backend::{BlendMode, Dispatch, RasterCommand, RenderBackend, TexelShader, TextureId};
use crate::cascade::{is_unbounded, CascadeChain, CascadeSampling, CascadeView};
use crate::grid::LodDataKind;

pub use registry::{InputId, InputRegistry, SortKey};
pub use shapes::{ConstantInput, DynamicWaveImpulse, FlatSeaFloor, FoamSplash};

/// Something that writes into a grid every frame.
///
/// Inputs are shared (`Rc<dyn LodInput>`) between the registry and their
/// owner, so anything that changes at runtime lives behind a `Cell`.
pub trait LodInput {
    fn enabled(&self) -> bool {
        true
    }

    /// Compute inputs get one dispatch over every overlapping slice; raster
    /// inputs get one draw per slice.
    fn is_compute(&self) -> bool {
        false
    }

    /// Wavelength the input represents, 0 for no preference. Only the
    /// displacement grid looks at this.
    fn wavelength(&self) -> f32 {
        0.0
    }

    /// World (x, z) bound. A zero-sized rect means unbounded.
    fn rect(&self) -> Rect {
        Rect::default()
    }

    fn draw(&self, ctx: &mut DrawContext<'_>, weight: f32);
}

/// Read-only grid state for one tick (or one substep).
#[derive(Clone, Copy)]
pub struct GridState<'a> {
    pub kind: LodDataKind,
    pub chain: &'a CascadeChain,
    pub views: &'a [CascadeView],
    pub sampling: &'a [CascadeSampling],
    pub time: f32,
    /// Frame delta for plain grids, substep delta for persistent ones.
    pub delta_time: f32,
    pub altitude_alpha: f32,
}

pub struct DrawContext<'a> {
    backend: &'a mut dyn RenderBackend,
    state: &'a GridState<'a>,
    target: TextureId,
    slices: Range<u32>,
    clip: Option<Rect>,
    compute: bool,
}

impl<'a> DrawContext<'a> {
    pub fn raster(
        backend: &'a mut dyn RenderBackend,
        state: &'a GridState<'a>,
        target: TextureId,
        slice: u32,
        clip: Option<Rect>,
    ) -> Self {
        Self {
            backend,
            state,
            target,
            slices: slice..slice + 1,
            clip,
            compute: false,
        }
    }

    pub fn compute(
        backend: &'a mut dyn RenderBackend,
        state: &'a GridState<'a>,
        target: TextureId,
        slices: Range<u32>,
        clip: Option<Rect>,
    ) -> Self {
        Self {
            backend,
            state,
            target,
            slices,
            clip,
            compute: true,
        }
    }

    pub fn state(&self) -> &GridState<'a> {
        self.state
    }

    /// First slice this draw covers. For raster draws the only one.
    pub fn cascade_index(&self) -> usize {
        self.slices.start as usize
    }

    pub fn slices(&self) -> Range<u32> {
        self.slices.clone()
    }

    pub fn time(&self) -> f32 {
        self.state.time
    }

    pub fn delta_time(&self) -> f32 {
        self.state.delta_time
    }

    /// Runs `shader` over the covered slices.
    pub fn fill(&mut self, shader: &dyn TexelShader, blend: BlendMode, weight: f32) {
        if self.compute {
            self.backend.dispatch(Dispatch::Shader {
                target: self.target,
                slices: self.slices.clone(),
                sampling: self.state.sampling,
                clip: self.clip,
                blend,
                weight,
                shader,
            });
            return;
        }
        for slice in self.slices.clone() {
            let Some(view) = self.state.views.get(slice as usize) else {
                continue;
            };
            self.backend.draw(RasterCommand {
                target: self.target,
                slice,
                view_projection: view.view_projection,
                clip: self.clip,
                blend,
                weight,
                shader,
            });
        }
    }
}

/// Draws every enabled input accepted by `filter` into `target`, in
/// registry order, at full weight.
pub(crate) fn submit_inputs(
    registry: &InputRegistry,
    backend: &mut dyn RenderBackend,
    state: &GridState<'_>,
    target: TextureId,
    filter: impl Fn(&dyn LodInput) -> bool,
) {
    for (_, input) in registry.iter() {
        if !input.enabled() || !filter(input.as_ref()) {
            continue;
        }
        let bound = input.rect();
        let range = state.chain.overlapping_slices(bound);
        if range.is_empty() {
            continue;
        }
        let clip = (!is_unbounded(bound)).then_some(bound);
        if input.is_compute() {
            let slices = range.start as u32..range.end as u32;
            let mut ctx = DrawContext::compute(&mut *backend, state, target, slices, clip);
            input.draw(&mut ctx, 1.0);
        } else {
            for slice in range.rev() {
                let mut ctx = DrawContext::raster(&mut *backend, state, target, slice as u32, clip);
                input.draw(&mut ctx, 1.0);
            }
        }
    }
}
