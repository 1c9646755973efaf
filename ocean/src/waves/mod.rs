mod config;
mod gerstner;
mod sampler;

pub use config::{WaveConfig, WaveParams, WavePreset, MAX_WAVES};
pub use gerstner::{GerstnerWave, GerstnerWaveInput};
pub use sampler::WaveSampler;
