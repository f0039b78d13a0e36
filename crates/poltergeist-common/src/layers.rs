//! Physics layers and layer masks used by every probe.

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Named physics layer a collider lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// The player's default body
    Player,
    /// Hostile agents
    Enemy,
    /// Objects reacting to ability hits
    Interactible,
    /// Walkable surfaces
    Ground,
    /// Solid level geometry that blocks standing up
    Obstacle,
}

impl Layer {
    /// Single-layer mask for this layer.
    #[must_use]
    pub const fn mask(self) -> LayerMask {
        LayerMask(1 << self as u32)
    }

    /// All layers, in declaration order.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Player,
            Self::Enemy,
            Self::Interactible,
            Self::Ground,
            Self::Obstacle,
        ]
    }
}

/// Bit set of [`Layer`]s a probe is allowed to hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Mask matching nothing.
    pub const NONE: Self = Self(0);

    /// Surfaces the avatar can stand on.
    pub const GROUND: Self = Self(1 << Layer::Ground as u32 | 1 << Layer::Obstacle as u32);

    /// Targets of a primary ability sweep.
    pub const ABILITY_TARGETS: Self = Self(
        1 << Layer::Player as u32 | 1 << Layer::Enemy as u32 | 1 << Layer::Interactible as u32,
    );

    /// Builds a mask from a list of layers.
    #[must_use]
    pub fn from_layers(layers: &[Layer]) -> Self {
        layers.iter().fold(Self::NONE, |mask, layer| mask | layer.mask())
    }

    /// Checks whether `layer` is part of this mask.
    #[must_use]
    pub const fn contains(self, layer: Layer) -> bool {
        self.0 & (1 << layer as u32) != 0
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Checks if no layer is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOr<Layer> for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Layer) -> Self::Output {
        self | rhs.mask()
    }
}

impl BitOrAssign for LayerMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<Layer> for LayerMask {
    fn from(layer: Layer) -> Self {
        layer.mask()
    }
}
