//! Camera-relative, multi-resolution water data.
//!
//! A chain of nested square cascades follows the viewer, each covering twice
//! the area of the previous one at half the detail. Every kind of water data
//! (displacement, foam, dynamic waves, sea floor depth, ...) lives in its own
//! [`grid::LodGrid`] over that chain; [`LodSystem`] ticks them in order and
//! answers surface queries.

pub mod backend;
pub mod buffer;
pub mod cascade;
pub mod config;
pub mod constants;
pub mod error;
pub mod grid;
pub mod input;
pub mod plugin;
pub mod query;
pub mod system;
pub mod waves;

pub use config::{GridSettings, GridTable, LodConfig, ScaleMode, SimSettings};
pub use error::{BackendError, ConfigError, LodError};
pub use grid::{LodDataKind, LodGrid};
pub use plugin::{OceanLodPlugin, OceanLodSet, Viewer};
pub use system::{LodSystem, ViewerState};
