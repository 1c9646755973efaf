use std::fmt;

use bevy::math::Vec4;
use serde::{Deserialize, Serialize};
use wgpu_types::TextureFormat;

use crate::backend::KernelKind;
use crate::constants::{DEEP_WATER_DEPTH, GLOBAL_BINDING_PREFIX};

/// Physical quantity a grid stores. One grid exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LodDataKind {
    AnimatedWaves,
    DynamicWaves,
    Foam,
    SeaFloorDepth,
    Shadow,
    Albedo,
    Flow,
}

impl LodDataKind {
    pub const ALL: [LodDataKind; 7] = [
        LodDataKind::AnimatedWaves,
        LodDataKind::DynamicWaves,
        LodDataKind::Foam,
        LodDataKind::SeaFloorDepth,
        LodDataKind::Shadow,
        LodDataKind::Albedo,
        LodDataKind::Flow,
    ];

    /// Order grids run in each frame. Depth and dynamic waves feed the
    /// displacement combine, so they go first; foam reads last frame's
    /// displacement so its position does not matter.
    pub const TICK_ORDER: [LodDataKind; 7] = [
        LodDataKind::SeaFloorDepth,
        LodDataKind::Flow,
        LodDataKind::Albedo,
        LodDataKind::Shadow,
        LodDataKind::DynamicWaves,
        LodDataKind::Foam,
        LodDataKind::AnimatedWaves,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LodDataKind::AnimatedWaves => "animated_waves",
            LodDataKind::DynamicWaves => "dynamic_waves",
            LodDataKind::Foam => "foam",
            LodDataKind::SeaFloorDepth => "sea_floor_depth",
            LodDataKind::Shadow => "shadow",
            LodDataKind::Albedo => "albedo",
            LodDataKind::Flow => "flow",
        }
    }

    /// Name of the global texture binding, e.g. `lod_foam`.
    pub fn binding_name(self) -> String {
        format!("{}{}", GLOBAL_BINDING_PREFIX, self.name())
    }

    /// Slots of history kept in the double-buffered array.
    pub fn buffer_count(self) -> usize {
        match self {
            LodDataKind::DynamicWaves | LodDataKind::Foam | LodDataKind::Shadow => 2,
            _ => 1,
        }
    }

    /// Kernel advancing a persistent kind, `None` for kinds whose inputs
    /// fully define them each frame.
    pub fn simulation_kernel(self) -> Option<KernelKind> {
        match self {
            LodDataKind::DynamicWaves => Some(KernelKind::DynamicWaves),
            LodDataKind::Foam => Some(KernelKind::Foam),
            _ => None,
        }
    }

    pub fn is_persistent(self) -> bool {
        self.simulation_kernel().is_some()
    }

    /// Value bound when the grid is invalid, and the clear value otherwise.
    pub fn neutral_value(self) -> Vec4 {
        match self {
            LodDataKind::SeaFloorDepth => Vec4::new(DEEP_WATER_DEPTH, 0.0, 0.0, 0.0),
            _ => Vec4::ZERO,
        }
    }

    /// Whether the destination is cleared before inputs draw every frame.
    pub fn clears_each_frame(self) -> bool {
        !self.is_persistent() && self != LodDataKind::Shadow
    }

    pub fn performance_format(self) -> TextureFormat {
        match self {
            LodDataKind::AnimatedWaves => TextureFormat::Rgba16Float,
            LodDataKind::DynamicWaves
            | LodDataKind::SeaFloorDepth
            | LodDataKind::Flow => TextureFormat::Rg16Float,
            LodDataKind::Foam => TextureFormat::R16Float,
            LodDataKind::Shadow => TextureFormat::Rg8Unorm,
            LodDataKind::Albedo => TextureFormat::Rgba8Unorm,
        }
    }

    pub fn precision_format(self) -> TextureFormat {
        match self {
            LodDataKind::AnimatedWaves => TextureFormat::Rgba32Float,
            LodDataKind::DynamicWaves
            | LodDataKind::SeaFloorDepth
            | LodDataKind::Flow => TextureFormat::Rg32Float,
            LodDataKind::Foam => TextureFormat::R32Float,
            LodDataKind::Shadow => TextureFormat::Rg16Float,
            LodDataKind::Albedo => TextureFormat::Rgba16Float,
        }
    }
}

impl fmt::Display for LodDataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_order_covers_every_kind_once() {
        let mut order = LodDataKind::TICK_ORDER.to_vec();
        order.sort();
        let mut all = LodDataKind::ALL.to_vec();
        all.sort();
        assert_eq!(order, all);
    }

    #[test]
    fn test_persistent_kinds_are_double_buffered() {
        for kind in LodDataKind::ALL {
            if kind.is_persistent() {
                assert_eq!(kind.buffer_count(), 2, "{kind}");
                assert!(!kind.clears_each_frame());
            }
        }
        assert!(!LodDataKind::Shadow.clears_each_frame());
        assert!(LodDataKind::Flow.clears_each_frame());
    }

    #[test]
    fn test_depth_neutral_is_deep_water() {
        assert_eq!(LodDataKind::SeaFloorDepth.neutral_value().x, DEEP_WATER_DEPTH);
        assert_eq!(LodDataKind::Foam.binding_name(), "lod_foam");
    }
}
