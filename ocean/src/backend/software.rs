//! CPU implementation of [`RenderBackend`].
//!
//! Texture arrays are plain `Vec<Vec4>` slices. Raster draws map every texel
//! back through the inverse view-projection, so a wrong cascade camera shows
//! up as misplaced data rather than silently passing. Readbacks snapshot the
//! texture when issued and resolve `readback_latency` frames later.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use bevy::math::{Rect, Vec2, Vec3, Vec4};
use bevy_log::{debug, warn};
use wgpu_types::TextureFormat;

use super::{
    pending, BlendMode, CombineLayout, Dispatch, GlobalTexture, KernelKind, Pending,
    RasterCommand, ReadbackError, RenderBackend, Resolver, SampleLookup, SimulationParams,
    TexelShader, TextureArrayDesc, TextureId,
};
use crate::cascade::CascadeSampling;
use crate::constants::GRAVITY;
use crate::error::BackendError;

const DEFAULT_FORMATS: [TextureFormat; 8] = [
    TextureFormat::R16Float,
    TextureFormat::R32Float,
    TextureFormat::Rg8Unorm,
    TextureFormat::Rg16Float,
    TextureFormat::Rg32Float,
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba32Float,
];

/// Counters for tests and the headless driver's summary log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub frames: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub clears: u64,
    pub copies: u64,
    pub readbacks_issued: u64,
    pub readbacks_completed: u64,
    pub readbacks_cancelled: u64,
}

struct TextureArray {
    desc: TextureArrayDesc,
    mask: Vec4,
    slices: Vec<Vec<Vec4>>,
}

impl TextureArray {
    fn new(desc: TextureArrayDesc, texels: usize) -> Self {
        let mask = match desc.format.components() {
            1 => Vec4::new(1.0, 0.0, 0.0, 0.0),
            2 => Vec4::new(1.0, 1.0, 0.0, 0.0),
            3 => Vec4::new(1.0, 1.0, 1.0, 0.0),
            _ => Vec4::ONE,
        };
        let slices = vec![vec![Vec4::ZERO; texels]; desc.slices as usize];
        Self { desc, mask, slices }
    }

    fn resolution(&self) -> u32 {
        self.desc.resolution
    }

    fn texel_count(&self) -> usize {
        self.slices.len() * self.slices.first().map_or(0, Vec::len)
    }
}

struct QueuedReadback {
    due_frame: u64,
    values: Vec<Vec4>,
    resolver: Resolver<Vec<Vec4>>,
}

pub struct SoftwareBackend {
    textures: HashMap<TextureId, TextureArray>,
    next_id: u32,
    formats: HashSet<TextureFormat>,
    kernels: HashSet<KernelKind>,
    texel_budget: Option<usize>,
    readback_latency: u64,
    readbacks: Vec<QueuedReadback>,
    global_textures: HashMap<String, GlobalTexture>,
    global_vectors: HashMap<String, Vec<Vec4>>,
    frame: u64,
    stats: BackendStats,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_id: 1,
            formats: DEFAULT_FORMATS.into_iter().collect(),
            kernels: [KernelKind::Combine, KernelKind::Foam, KernelKind::DynamicWaves]
                .into_iter()
                .collect(),
            texel_budget: None,
            readback_latency: 1,
            readbacks: Vec::new(),
            global_textures: HashMap::new(),
            global_vectors: HashMap::new(),
            frame: 0,
            stats: BackendStats::default(),
        }
    }

    /// Replaces the set of renderable formats.
    pub fn with_formats(mut self, formats: impl IntoIterator<Item = TextureFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    pub fn without_kernel(mut self, kernel: KernelKind) -> Self {
        self.kernels.remove(&kernel);
        self
    }

    /// Allocation fails once live arrays would exceed this many texels.
    pub fn with_texel_budget(mut self, texels: usize) -> Self {
        self.texel_budget = Some(texels);
        self
    }

    /// Frames between issuing a readback and its result landing. Results are
    /// only ever delivered from [`RenderBackend::end_frame`].
    pub fn with_readback_latency(mut self, frames: u64) -> Self {
        self.readback_latency = frames;
        self
    }

    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn pending_readbacks(&self) -> usize {
        self.readbacks.len()
    }

    pub fn texture_desc(&self, texture: TextureId) -> Option<&TextureArrayDesc> {
        self.textures.get(&texture).map(|array| &array.desc)
    }

    pub fn texel(&self, texture: TextureId, slice: u32, x: u32, y: u32) -> Option<Vec4> {
        let array = self.textures.get(&texture)?;
        let res = array.resolution();
        if x >= res || y >= res {
            return None;
        }
        array
            .slices
            .get(slice as usize)
            .map(|data| data[(y * res + x) as usize])
    }

    pub fn slice_data(&self, texture: TextureId, slice: u32) -> Option<&[Vec4]> {
        self.textures
            .get(&texture)?
            .slices
            .get(slice as usize)
            .map(Vec::as_slice)
    }

    /// Bilinear, clamp-to-edge lookup.
    pub fn sample(&self, texture: TextureId, slice: u32, uv: Vec2) -> Option<Vec4> {
        let array = self.textures.get(&texture)?;
        let data = array.slices.get(slice as usize)?;
        Some(bilinear(data, array.resolution(), uv))
    }

    pub fn global_texture(&self, name: &str) -> Option<GlobalTexture> {
        self.global_textures.get(name).copied()
    }

    pub fn global_vectors(&self, name: &str) -> Option<&[Vec4]> {
        self.global_vectors.get(name).map(Vec::as_slice)
    }

    pub fn live_texels(&self) -> usize {
        self.textures.values().map(TextureArray::texel_count).sum()
    }

    fn array_mut(&mut self, texture: TextureId) -> Option<&mut TextureArray> {
        let array = self.textures.get_mut(&texture);
        if array.is_none() {
            warn!("software backend: write to unknown texture {}", texture);
        }
        array
    }

    fn slice_copy(&self, texture: TextureId, slice: u32) -> Option<Vec<Vec4>> {
        self.textures
            .get(&texture)?
            .slices
            .get(slice as usize)
            .cloned()
    }

    /// Runs `shader` over every texel of one slice, locating texels with
    /// `world_of`.
    fn shade_slice(
        &mut self,
        target: TextureId,
        slice: u32,
        clip: Option<Rect>,
        blend: BlendMode,
        weight: f32,
        shader: &dyn TexelShader,
        world_of: impl Fn(u32, u32) -> Vec2,
    ) {
        let Some(array) = self.array_mut(target) else {
            return;
        };
        let res = array.resolution();
        let mask = array.mask;
        let Some(data) = array.slices.get_mut(slice as usize) else {
            return;
        };
        for y in 0..res {
            for x in 0..res {
                let world = world_of(x, y);
                if clip.is_some_and(|rect| !rect.contains(world)) {
                    continue;
                }
                let texel = &mut data[(y * res + x) as usize];
                *texel = apply_blend(*texel, shader.shade(world), blend, weight) * mask;
            }
        }
    }

    fn combine(
        &mut self,
        target: TextureId,
        source: TextureId,
        slice: u32,
        layout: CombineLayout,
        include_coarser: bool,
        sampling: &[CascadeSampling],
        level: Option<TextureId>,
    ) {
        let Some(source_data) = self.slice_copy(source, slice) else {
            warn!("software backend: combine source {} missing", source);
            return;
        };
        let Some(here) = sampling.get(slice as usize).copied() else {
            return;
        };
        let coarser = if include_coarser {
            sampling
                .get(slice as usize + 1)
                .and_then(|s| Some((*s, self.slice_copy(target, slice + 1)?)))
        } else {
            None
        };
        let level_data = level.and_then(|id| self.slice_copy(id, slice));

        let Some(array) = self.array_mut(target) else {
            return;
        };
        let res = array.resolution();
        let mask = array.mask;
        let Some(out) = array.slices.get_mut(slice as usize) else {
            return;
        };
        for y in 0..res {
            for x in 0..res {
                let i = (y * res + x) as usize;
                let mut value = match layout {
                    CombineLayout::Displacement => source_data[i],
                    CombineLayout::HeightToDisplacement => {
                        Vec4::new(0.0, source_data[i].x, 0.0, 0.0)
                    }
                };
                if let Some((coarse_sampling, coarse)) = &coarser {
                    let uv = coarse_sampling.world_to_uv(here.texel_center(x, y));
                    let c = bilinear(coarse, coarse_sampling.resolution(), uv);
                    value += c.truncate().extend(0.0);
                }
                if let Some(level) = &level_data {
                    value.w = level[i].y;
                }
                out[i] = value * mask;
            }
        }
    }

    fn accumulate(&mut self, target: TextureId, source: TextureId, slice: u32) {
        let Some(source_data) = self.slice_copy(source, slice) else {
            return;
        };
        let Some(array) = self.array_mut(target) else {
            return;
        };
        let mask = array.mask;
        if let Some(out) = array.slices.get_mut(slice as usize) {
            for (texel, add) in out.iter_mut().zip(source_data) {
                *texel += add.truncate().extend(0.0) * mask;
            }
        }
    }

    fn simulate(
        &mut self,
        kernel: KernelKind,
        target: TextureId,
        source: TextureId,
        slices: Range<u32>,
        sampling: &[CascadeSampling],
        source_sampling: &[CascadeSampling],
        params: SimulationParams,
    ) {
        for slice in slices {
            let (Some(here), Some(there)) = (
                sampling.get(slice as usize).copied(),
                source_sampling.get(slice as usize).copied(),
            ) else {
                continue;
            };
            let history = if params.prewarm {
                None
            } else {
                self.slice_copy(source, slice)
            };
            let Some(array) = self.array_mut(target) else {
                return;
            };
            let res = array.resolution();
            let mask = array.mask;
            let Some(out) = array.slices.get_mut(slice as usize) else {
                continue;
            };
            let previous = |world: Vec2| -> Vec4 {
                let Some(history) = &history else {
                    return Vec4::ZERO;
                };
                let uv = there.world_to_uv(world);
                if uv.cmplt(Vec2::ZERO).any() || uv.cmpgt(Vec2::ONE).any() {
                    return Vec4::ZERO;
                }
                bilinear(history, there.resolution(), uv)
            };

            for y in 0..res {
                for x in 0..res {
                    let world = here.texel_center(x, y);
                    let value = match kernel {
                        KernelKind::Foam => foam_step(previous(world), params),
                        KernelKind::DynamicWaves => {
                            let dx = here.texel_size();
                            let neighbours = [
                                previous(world - Vec2::X * dx).x,
                                previous(world + Vec2::X * dx).x,
                                previous(world - Vec2::Y * dx).x,
                                previous(world + Vec2::Y * dx).x,
                            ];
                            let edge = x.min(y).min(res - 1 - x).min(res - 1 - y);
                            dynamic_waves_step(previous(world), neighbours, dx, edge, params)
                        }
                        KernelKind::Combine => {
                            debug!("combine is not a simulation kernel");
                            return;
                        }
                    };
                    out[(y * res + x) as usize] = value * mask;
                }
            }
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn supports_format(&self, format: TextureFormat) -> bool {
        self.formats.contains(&format)
    }

    fn supports_kernel(&self, kernel: KernelKind) -> bool {
        self.kernels.contains(&kernel)
    }

    fn create_texture_array(&mut self, desc: &TextureArrayDesc) -> Result<TextureId, BackendError> {
        if !self.supports_format(desc.format) {
            return Err(BackendError::UnsupportedFormat(desc.format));
        }
        let failed = || BackendError::AllocationFailed {
            label: desc.label.clone(),
            resolution: desc.resolution,
            slices: desc.slices,
        };
        let slice_texels = (desc.resolution as usize)
            .checked_mul(desc.resolution as usize)
            .ok_or_else(failed)?;
        let requested = slice_texels
            .checked_mul(desc.slices as usize)
            .ok_or_else(failed)?;
        if let Some(budget) = self.texel_budget {
            if self.live_texels().saturating_add(requested) > budget {
                return Err(failed());
            }
        }
        let id = TextureId(self.next_id);
        self.next_id += 1;
        debug!(
            "allocated {} `{}` {}x{}x{} {:?}",
            id, desc.label, desc.resolution, desc.resolution, desc.slices, desc.format
        );
        self.textures.insert(id, TextureArray::new(desc.clone(), slice_texels));
        Ok(id)
    }

    fn release_texture_array(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            debug!("released {}", texture);
        }
    }

    fn clear(&mut self, texture: TextureId, slices: Range<u32>, value: Vec4) {
        self.stats.clears += 1;
        let Some(array) = self.array_mut(texture) else {
            return;
        };
        let value = value * array.mask;
        for slice in slices {
            if let Some(data) = array.slices.get_mut(slice as usize) {
                data.fill(value);
            }
        }
    }

    fn clear_border(&mut self, texture: TextureId, value: Vec4) {
        self.stats.clears += 1;
        let Some(array) = self.array_mut(texture) else {
            return;
        };
        let res = array.resolution();
        let value = value * array.mask;
        for data in &mut array.slices {
            for i in 0..res {
                data[i as usize] = value;
                data[((res - 1) * res + i) as usize] = value;
                data[(i * res) as usize] = value;
                data[(i * res + res - 1) as usize] = value;
            }
        }
    }

    fn copy_texture_array(&mut self, source: TextureId, destination: TextureId) {
        self.stats.copies += 1;
        let Some(slices) = self.textures.get(&source).map(|array| array.slices.clone()) else {
            warn!("software backend: copy from unknown texture {}", source);
            return;
        };
        if let Some(array) = self.array_mut(destination) {
            let mask = array.mask;
            for (dst, src) in array.slices.iter_mut().zip(slices) {
                for (d, s) in dst.iter_mut().zip(src) {
                    *d = s * mask;
                }
            }
        }
    }

    fn draw(&mut self, command: RasterCommand<'_>) {
        self.stats.draws += 1;
        let Some(res) = self.textures.get(&command.target).map(TextureArray::resolution) else {
            warn!("software backend: draw into unknown texture {}", command.target);
            return;
        };
        let inverse = command.view_projection.inverse();
        let texel = 2.0 / res as f32;
        self.shade_slice(
            command.target,
            command.slice,
            command.clip,
            command.blend,
            command.weight,
            command.shader,
            |x, y| {
                let ndc = Vec3::new(
                    (x as f32 + 0.5) * texel - 1.0,
                    1.0 - (y as f32 + 0.5) * texel,
                    0.5,
                );
                let world = inverse.project_point3(ndc);
                Vec2::new(world.x, world.z)
            },
        );
    }

    fn dispatch(&mut self, dispatch: Dispatch<'_>) {
        if let Some(kernel) = dispatch.kernel() {
            if !self.supports_kernel(kernel) {
                warn!("software backend: kernel {:?} is unavailable", kernel);
                return;
            }
        }
        self.stats.dispatches += 1;
        match dispatch {
            Dispatch::Shader {
                target,
                slices,
                sampling,
                clip,
                blend,
                weight,
                shader,
            } => {
                for slice in slices {
                    let Some(cascade) = sampling.get(slice as usize).copied() else {
                        continue;
                    };
                    self.shade_slice(target, slice, clip, blend, weight, shader, |x, y| {
                        cascade.texel_center(x, y)
                    });
                }
            }
            Dispatch::Combine {
                target,
                source,
                slice,
                layout,
                include_coarser,
                sampling,
                level,
            } => self.combine(target, source, slice, layout, include_coarser, sampling, level),
            Dispatch::Accumulate {
                target,
                source,
                slice,
            } => self.accumulate(target, source, slice),
            Dispatch::Simulate {
                kernel,
                target,
                source,
                slices,
                sampling,
                source_sampling,
                params,
            } => self.simulate(kernel, target, source, slices, sampling, source_sampling, params),
        }
    }

    fn read_samples(&mut self, texture: TextureId, lookups: Vec<SampleLookup>) -> Pending<Vec<Vec4>> {
        let (resolver, result) = pending();
        let Some(array) = self.textures.get(&texture) else {
            resolver.fail(ReadbackError::Lost);
            return result;
        };
        let res = array.resolution();
        let values = lookups
            .iter()
            .map(|lookup| {
                array
                    .slices
                    .get(lookup.slice as usize)
                    .map_or(Vec4::ZERO, |data| bilinear(data, res, lookup.uv))
            })
            .collect();
        self.stats.readbacks_issued += 1;
        self.readbacks.push(QueuedReadback {
            due_frame: self.frame + self.readback_latency,
            values,
            resolver,
        });
        result
    }

    fn bind_global_texture(&mut self, name: &str, texture: GlobalTexture) {
        self.global_textures.insert(name.to_owned(), texture);
    }

    fn bind_global_vectors(&mut self, name: &str, values: Vec<Vec4>) {
        self.global_vectors.insert(name.to_owned(), values);
    }

    fn end_frame(&mut self) {
        self.frame += 1;
        self.stats.frames += 1;
        let frame = self.frame;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.readbacks)
            .into_iter()
            .partition(|readback| readback.due_frame <= frame);
        self.readbacks = waiting;
        for readback in due {
            if readback.resolver.is_cancelled() {
                self.stats.readbacks_cancelled += 1;
            } else {
                self.stats.readbacks_completed += 1;
                readback.resolver.resolve(readback.values);
            }
        }
    }
}

fn apply_blend(dst: Vec4, src: Vec4, blend: BlendMode, weight: f32) -> Vec4 {
    match blend {
        BlendMode::Replace => src * weight,
        BlendMode::Additive => dst + src * weight,
    }
}

fn bilinear(data: &[Vec4], resolution: u32, uv: Vec2) -> Vec4 {
    let res = resolution as i32;
    let p = uv * resolution as f32 - Vec2::splat(0.5);
    let base = p.floor();
    let f = p - base;
    let fetch = |dx: i32, dy: i32| {
        let x = (base.x as i32 + dx).clamp(0, res - 1);
        let y = (base.y as i32 + dy).clamp(0, res - 1);
        data[(y * res + x) as usize]
    };
    let top = fetch(0, 0).lerp(fetch(1, 0), f.x);
    let bottom = fetch(0, 1).lerp(fetch(1, 1), f.x);
    top.lerp(bottom, f.y)
}

fn foam_step(previous: Vec4, params: SimulationParams) -> Vec4 {
    previous * (1.0 - params.damping * params.dt).max(0.0)
}

/// Damped wave equation on (height, velocity) in `.xy`.
fn dynamic_waves_step(
    previous: Vec4,
    neighbours: [f32; 4],
    texel_size: f32,
    edge_distance: u32,
    params: SimulationParams,
) -> Vec4 {
    if params.dt <= 0.0 {
        return previous;
    }
    // Deep-water phase speed of the shortest resolvable wave, kept under
    // the Courant limit for a 2D explicit scheme.
    let wavelength = 4.0 * texel_size;
    let speed = (GRAVITY * wavelength / std::f32::consts::TAU).sqrt() * params.wave_speed_scale;
    let speed = speed.min(0.5 * texel_size / params.dt);

    let (height, velocity) = (previous.x, previous.y);
    let laplacian = (neighbours.iter().sum::<f32>() - 4.0 * height) / (texel_size * texel_size);
    let velocity =
        velocity * (1.0 - params.damping * params.dt).max(0.0) + speed * speed * laplacian * params.dt;
    let height = height + velocity * params.dt;

    let attenuation = (edge_distance as f32 / 4.0).min(1.0);
    Vec4::new(height * attenuation, velocity * attenuation, 0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{Cascade, CascadeChain, LodTransform};
    use crate::config::LodConfig;
    use crate::backend::poll_now;

    fn desc(format: TextureFormat, resolution: u32, slices: u32) -> TextureArrayDesc {
        TextureArrayDesc {
            label: "test".into(),
            resolution,
            slices,
            format,
        }
    }

    #[test]
    fn test_channel_mask_follows_format() {
        let mut backend = SoftwareBackend::new();
        let foam = backend
            .create_texture_array(&desc(TextureFormat::R16Float, 4, 1))
            .unwrap();
        backend.clear(foam, 0..1, Vec4::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(backend.texel(foam, 0, 0, 0), Some(Vec4::new(1.0, 0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_unsupported_format_and_budget() {
        let mut backend = SoftwareBackend::new()
            .with_formats([TextureFormat::Rgba32Float])
            .with_texel_budget(100);
        assert!(matches!(
            backend.create_texture_array(&desc(TextureFormat::R16Float, 4, 1)),
            Err(BackendError::UnsupportedFormat(_))
        ));
        assert!(backend
            .create_texture_array(&desc(TextureFormat::Rgba32Float, 8, 1))
            .is_ok());
        assert!(matches!(
            backend.create_texture_array(&desc(TextureFormat::Rgba32Float, 8, 1)),
            Err(BackendError::AllocationFailed { .. })
        ));
    }

    #[test]
    fn test_texel_count_overflow_fails_allocation() {
        let mut backend = SoftwareBackend::new();
        assert!(matches!(
            backend.create_texture_array(&desc(TextureFormat::Rgba32Float, u32::MAX - 7, 2)),
            Err(BackendError::AllocationFailed { .. })
        ));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_raster_draw_lands_on_world_position() {
        let mut transform = LodTransform::new(&LodConfig {
            cascade_count: 1,
            resolution: 16,
            ..Default::default()
        });
        transform.update(Vec3::new(0.0, 1.0, 0.0));
        let cascade = transform.chain()[0];
        let sampling = CascadeSampling::from_cascade(&cascade);

        let mut backend = SoftwareBackend::new();
        let target = backend
            .create_texture_array(&desc(TextureFormat::Rgba32Float, 16, 1))
            .unwrap();
        let shader = |world: Vec2| world.extend(0.0).extend(1.0);
        backend.draw(RasterCommand {
            target,
            slice: 0,
            view_projection: transform.views()[0].view_projection,
            clip: None,
            blend: BlendMode::Replace,
            weight: 1.0,
            shader: &shader,
        });
        for (x, y) in [(0, 0), (3, 11), (15, 15)] {
            let expected = sampling.texel_center(x, y);
            let written = backend.texel(target, 0, x, y).unwrap();
            assert!((written.truncate().truncate() - expected).length() < 1e-2);
        }
    }

    #[test]
    fn test_combine_adds_resampled_coarser_slice() {
        let chain = CascadeChain::new(Vec2::ZERO, 1.0, 8, 2, 1.0);
        let sampling: Vec<_> = chain.iter().map(CascadeSampling::from_cascade).collect();
        let mut backend = SoftwareBackend::new();
        let scratch = backend
            .create_texture_array(&desc(TextureFormat::Rgba32Float, 8, 2))
            .unwrap();
        let out = backend
            .create_texture_array(&desc(TextureFormat::Rgba32Float, 8, 2))
            .unwrap();
        backend.clear(scratch, 0..1, Vec4::new(0.0, 1.0, 0.0, 0.0));
        backend.clear(scratch, 1..2, Vec4::new(0.0, 2.0, 0.0, 0.0));
        for slice in [1, 0] {
            backend.dispatch(Dispatch::Combine {
                target: out,
                source: scratch,
                slice,
                layout: CombineLayout::Displacement,
                include_coarser: true,
                sampling: &sampling,
                level: None,
            });
        }
        assert_eq!(backend.texel(out, 1, 4, 4).unwrap().y, 2.0);
        assert_eq!(backend.texel(out, 0, 4, 4).unwrap().y, 3.0);
    }

    #[test]
    fn test_foam_decays_and_prewarm_zeroes() {
        let cascade = Cascade::new(Vec2::ZERO, 1.0, 4);
        let sampling = [CascadeSampling::from_cascade(&cascade)];
        let mut backend = SoftwareBackend::new();
        let source = backend
            .create_texture_array(&desc(TextureFormat::R32Float, 4, 1))
            .unwrap();
        let target = backend
            .create_texture_array(&desc(TextureFormat::R32Float, 4, 1))
            .unwrap();
        backend.clear(source, 0..1, Vec4::X);
        let params = SimulationParams {
            dt: 0.5,
            prewarm: false,
            damping: 1.0,
            wave_speed_scale: 1.0,
        };
        backend.dispatch(Dispatch::Simulate {
            kernel: KernelKind::Foam,
            target,
            source,
            slices: 0..1,
            sampling: &sampling,
            source_sampling: &sampling,
            params,
        });
        assert_eq!(backend.texel(target, 0, 1, 2).unwrap().x, 0.5);

        backend.dispatch(Dispatch::Simulate {
            kernel: KernelKind::Foam,
            target,
            source,
            slices: 0..1,
            sampling: &sampling,
            source_sampling: &sampling,
            params: SimulationParams {
                prewarm: true,
                ..params
            },
        });
        assert_eq!(backend.texel(target, 0, 1, 2).unwrap().x, 0.0);
    }

    #[test]
    fn test_dynamic_waves_spread_an_impulse() {
        let cascade = Cascade::new(Vec2::ZERO, 1.0, 16);
        let sampling = [CascadeSampling::from_cascade(&cascade)];
        let mut backend = SoftwareBackend::new();
        let source = backend
            .create_texture_array(&desc(TextureFormat::Rg32Float, 16, 1))
            .unwrap();
        let target = backend
            .create_texture_array(&desc(TextureFormat::Rg32Float, 16, 1))
            .unwrap();
        let impulse = |world: Vec2| {
            if world.length() < 1.0 {
                Vec4::X
            } else {
                Vec4::ZERO
            }
        };
        backend.dispatch(Dispatch::Shader {
            target: source,
            slices: 0..1,
            sampling: &sampling,
            clip: None,
            blend: BlendMode::Replace,
            weight: 1.0,
            shader: &impulse,
        });
        backend.dispatch(Dispatch::Simulate {
            kernel: KernelKind::DynamicWaves,
            target,
            source,
            slices: 0..1,
            sampling: &sampling,
            source_sampling: &sampling,
            params: SimulationParams {
                dt: 1.0 / 60.0,
                prewarm: false,
                damping: 0.0,
                wave_speed_scale: 1.0,
            },
        });
        // The peak falls and its neighbours start rising.
        let centre = backend.texel(target, 0, 8, 8).unwrap();
        let beside = backend.texel(target, 0, 9, 8).unwrap();
        assert!(centre.x < 1.0 && centre.y < 0.0);
        assert!(beside.y > 0.0);
    }

    #[test]
    fn test_readback_resolves_after_end_frame() {
        let mut backend = SoftwareBackend::new().with_readback_latency(1);
        let texture = backend
            .create_texture_array(&desc(TextureFormat::Rgba32Float, 4, 1))
            .unwrap();
        backend.clear(texture, 0..1, Vec4::splat(2.0));
        let mut result = backend.read_samples(
            texture,
            vec![SampleLookup {
                slice: 0,
                uv: Vec2::splat(0.5),
            }],
        );
        // Later writes do not affect the snapshot.
        backend.clear(texture, 0..1, Vec4::ZERO);
        assert!(poll_now(&mut result).is_none());
        backend.end_frame();
        assert_eq!(poll_now(&mut result), Some(Ok(vec![Vec4::splat(2.0)])));
        assert_eq!(backend.stats().readbacks_completed, 1);
    }

    #[test]
    fn test_cancelled_readback_is_skipped() {
        let mut backend = SoftwareBackend::new();
        let texture = backend
            .create_texture_array(&desc(TextureFormat::Rgba32Float, 4, 1))
            .unwrap();
        let result = backend.read_samples(texture, Vec::new());
        result.cancel();
        backend.end_frame();
        assert_eq!(backend.stats().readbacks_cancelled, 1);
        assert_eq!(backend.pending_readbacks(), 0);
    }

    #[test]
    fn test_clear_border_only_touches_edges() {
        let mut backend = SoftwareBackend::new();
        let texture = backend
            .create_texture_array(&desc(TextureFormat::Rgba32Float, 4, 2))
            .unwrap();
        backend.clear(texture, 0..2, Vec4::ONE);
        backend.clear_border(texture, Vec4::ZERO);
        assert_eq!(backend.texel(texture, 1, 0, 2), Some(Vec4::ZERO));
        assert_eq!(backend.texel(texture, 1, 3, 3), Some(Vec4::ZERO));
        assert_eq!(backend.texel(texture, 1, 1, 2), Some(Vec4::ONE));
    }
}
