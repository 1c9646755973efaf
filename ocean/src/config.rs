//! Statically typed configuration for one water instance.
//!
//! Every struct is `#[serde(default)]` so partial RON files only need to name
//! what they change.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;
use crate::grid::{FormatRequest, LodDataKind};

/// How the finest cascade's texel size is chosen each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Constant base texel size in world units.
    Fixed { base_texel_size: f32 },
    /// Scale follows the viewer's height above the sea, snapped to powers of
    /// two and clamped to `[min_scale, 1.99 * max_scale]`.
    Altitude { min_scale: f32, max_scale: f32 },
}

impl Default for ScaleMode {
    fn default() -> Self {
        ScaleMode::Fixed {
            base_texel_size: DEFAULT_BASE_TEXEL_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub enabled: bool,
    pub format: FormatRequest,
    /// Zero a one-texel border after inputs draw.
    pub clear_border: bool,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            format: FormatRequest::Automatic,
            clear_border: false,
        }
    }
}

/// Fixed-timestep settings for a persistent grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Substeps per second.
    pub frequency: f32,
    /// Substeps beyond this in one frame are dropped with a warning.
    pub max_substeps_per_frame: u32,
    /// Per-second decay applied by the kernel.
    pub damping: f32,
    /// Multiplier on the kernel's propagation speed.
    pub wave_speed_scale: f32,
}

impl SimSettings {
    pub fn foam() -> Self {
        Self {
            damping: 0.8,
            ..Default::default()
        }
    }

    pub fn dynamic_waves() -> Self {
        Self {
            damping: 0.05,
            ..Default::default()
        }
    }
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_SIMULATION_FREQUENCY,
            max_substeps_per_frame: DEFAULT_MAX_SUBSTEPS_PER_FRAME,
            damping: 0.0,
            wave_speed_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridTable {
    pub animated_waves: GridSettings,
    pub dynamic_waves: GridSettings,
    pub foam: GridSettings,
    pub sea_floor_depth: GridSettings,
    pub shadow: GridSettings,
    pub albedo: GridSettings,
    pub flow: GridSettings,
}

impl Default for GridTable {
    fn default() -> Self {
        Self {
            animated_waves: GridSettings::default(),
            dynamic_waves: GridSettings {
                clear_border: true,
                ..Default::default()
            },
            foam: GridSettings::default(),
            sea_floor_depth: GridSettings::default(),
            shadow: GridSettings::default(),
            albedo: GridSettings::default(),
            flow: GridSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub cascade_count: usize,
    pub resolution: u32,
    pub scale: ScaleMode,
    /// Texels a wave must span to be represented in a cascade.
    pub min_texels_per_wave: f32,
    /// Finest-cascade jump (world units) treated as a teleport.
    pub teleport_distance: f32,
    pub sea_level: f32,
    /// When false the combine skips the coarser term (raw per-octave view).
    pub combine_enabled: bool,
    pub grids: GridTable,
    pub foam_simulation: SimSettings,
    pub dynamic_waves_simulation: SimSettings,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            cascade_count: DEFAULT_CASCADE_COUNT,
            resolution: DEFAULT_RESOLUTION,
            scale: ScaleMode::default(),
            min_texels_per_wave: DEFAULT_MIN_TEXELS_PER_WAVE,
            teleport_distance: DEFAULT_TELEPORT_DISTANCE,
            sea_level: 0.0,
            combine_enabled: true,
            grids: GridTable::default(),
            foam_simulation: SimSettings::foam(),
            dynamic_waves_simulation: SimSettings::dynamic_waves(),
        }
    }
}

impl LodConfig {
    pub fn settings(&self, kind: LodDataKind) -> &GridSettings {
        match kind {
            LodDataKind::AnimatedWaves => &self.grids.animated_waves,
            LodDataKind::DynamicWaves => &self.grids.dynamic_waves,
            LodDataKind::Foam => &self.grids.foam,
            LodDataKind::SeaFloorDepth => &self.grids.sea_floor_depth,
            LodDataKind::Shadow => &self.grids.shadow,
            LodDataKind::Albedo => &self.grids.albedo,
            LodDataKind::Flow => &self.grids.flow,
        }
    }

    pub fn settings_mut(&mut self, kind: LodDataKind) -> &mut GridSettings {
        match kind {
            LodDataKind::AnimatedWaves => &mut self.grids.animated_waves,
            LodDataKind::DynamicWaves => &mut self.grids.dynamic_waves,
            LodDataKind::Foam => &mut self.grids.foam,
            LodDataKind::SeaFloorDepth => &mut self.grids.sea_floor_depth,
            LodDataKind::Shadow => &mut self.grids.shadow,
            LodDataKind::Albedo => &mut self.grids.albedo,
            LodDataKind::Flow => &mut self.grids.flow,
        }
    }

    pub fn simulation(&self, kind: LodDataKind) -> Option<&SimSettings> {
        match kind {
            LodDataKind::Foam => Some(&self.foam_simulation),
            LodDataKind::DynamicWaves => Some(&self.dynamic_waves_simulation),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CASCADES).contains(&self.cascade_count) {
            return Err(ConfigError::CascadeCount(self.cascade_count));
        }
        validate_resolution(self.resolution)?;
        positive("min_texels_per_wave", self.min_texels_per_wave)?;
        positive("teleport_distance", self.teleport_distance)?;

        match self.scale {
            ScaleMode::Fixed { base_texel_size } => positive("base_texel_size", base_texel_size)?,
            ScaleMode::Altitude {
                min_scale,
                max_scale,
            } => {
                positive("min_scale", min_scale)?;
                if max_scale < min_scale {
                    return Err(ConfigError::ScaleOrder {
                        min: min_scale,
                        max: max_scale,
                    });
                }
            }
        }

        for kind in [LodDataKind::Foam, LodDataKind::DynamicWaves] {
            if let Some(sim) = self.simulation(kind) {
                positive("simulation frequency", sim.frequency)?;
                if sim.max_substeps_per_frame == 0 {
                    return Err(ConfigError::SubstepCap(kind));
                }
            }
        }
        Ok(())
    }
}

/// Cascade resolution: aligned to the kernel group size and small enough that
/// texel counts stay addressable.
pub fn validate_resolution(resolution: u32) -> Result<(), ConfigError> {
    if resolution == 0 || resolution % RESOLUTION_ALIGNMENT != 0 || resolution > MAX_RESOLUTION {
        return Err(ConfigError::Resolution(resolution));
    }
    Ok(())
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    // NaN fails this comparison too.
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}
