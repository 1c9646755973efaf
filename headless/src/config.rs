use bevy_log::info;
use ocean::waves::WavePreset;
use ocean::LodConfig;
use ron::de::from_str;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Everything the headless run reads from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    pub lod: LodConfig,
    pub waves: WavePreset,
    /// Foam splashes dropped around the origin.
    pub splashes: u32,
    /// Depth of the flat sea floor under the whole chain.
    pub sea_floor_depth: f32,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            lod: LodConfig::default(),
            waves: WavePreset::Ocean,
            splashes: 3,
            sea_floor_depth: 40.0,
        }
    }
}

pub fn load_config(path: &Path) -> Result<HeadlessConfig, Box<dyn std::error::Error>> {
    if !path.exists() {
        info!(
            "Config file not found: {}. Using default settings.",
            path.display()
        );
        return Ok(HeadlessConfig::default());
    }

    let contents: String = fs::read_to_string(path)?;
    let config: HeadlessConfig = from_str(&contents)?;
    config.lod.validate()?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn write_config(config: &HeadlessConfig, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let pretty_config = PrettyConfig::new()
        .with_depth_limit(4)
        .with_separate_tuple_members(true)
        .with_enumerate_arrays(true);

    let serialized = ron::ser::to_string_pretty(config, pretty_config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(serialized.as_bytes())?;
    info!("Wrote config to {}", path.display());
    Ok(())
}
