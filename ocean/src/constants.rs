pub const MAX_CASCADES: usize = 15;
pub const DEFAULT_CASCADE_COUNT: usize = 7;
pub const DEFAULT_RESOLUTION: u32 = 256;
/// Resolutions must be a multiple of this (compute thread group size).
pub const RESOLUTION_ALIGNMENT: u32 = 8;
pub const MAX_RESOLUTION: u32 = 4096;
pub const DEFAULT_BASE_TEXEL_SIZE: f32 = 0.25;
pub const DEFAULT_MIN_TEXELS_PER_WAVE: f32 = 3.0;
pub const DEFAULT_MIN_SCALE: f32 = 8.0;
pub const DEFAULT_MAX_SCALE: f32 = 256.0;

pub const DEFAULT_SIMULATION_FREQUENCY: f32 = 60.0;
pub const DEFAULT_MAX_SUBSTEPS_PER_FRAME: u32 = 8;
pub const DEFAULT_TELEPORT_DISTANCE: f32 = 100.0;

/// Multiplier applied to an input's queue before adding its sibling tiebreak.
pub const SORT_KEY_QUEUE_STRIDE: i64 = 1000;

/// Height of the orthographic cascade cameras above the sea.
pub const CASCADE_CAMERA_HEIGHT: f32 = 10_000.0;
pub const CASCADE_CAMERA_FAR: f32 = 20_000.0;

pub const GRAVITY: f32 = 9.81;
/// Depth reported where no sea floor input has been drawn.
pub const DEEP_WATER_DEPTH: f32 = 1000.0;

pub const GLOBAL_BINDING_PREFIX: &str = "lod_";
pub const POS_SCALE_SUFFIX: &str = "_pos_scale";
pub const PARAMS_SUFFIX: &str = "_params";
pub const SOURCE_SUFFIX: &str = "_source";
