//! Things agents can hit with an ability sweep.
//!
//! Interactibles live on the `Interactible` physics layer. When an ability
//! sweep touches one, the scene calls [`Interactible::on_interact`] with the
//! agent that swung and applies the returned [`InteractOutcome`].

use glam::{Quat, Vec3};
use poltergeist_common::{ConfigError, EntityId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A piece of debris thrown out by an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Debris {
    /// Spawn position
    pub position: Vec3,
    /// Launch velocity
    pub velocity: Vec3,
}

/// Result of an interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractOutcome {
    /// Debris to spawn
    pub debris: Vec<Debris>,
    /// The interactible is used up and should be removed
    pub consumed: bool,
}

/// Contract of anything an ability can interact with.
pub trait Interactible: Send {
    /// Entity registered with the physics world.
    fn id(&self) -> EntityId;

    /// World position.
    fn position(&self) -> Vec3;

    /// Radius of the physics body.
    fn radius(&self) -> f32 {
        0.5
    }

    /// Reacts to a hit from `invoker`.
    fn on_interact(&mut self, invoker: EntityId, rng: &mut fastrand::Rng) -> InteractOutcome;
}

/// Tuning of a [`Breakable`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakableConfig {
    /// Fewest pieces spawned
    pub min_pieces: u32,
    /// Most pieces spawned
    pub max_pieces: u32,
    /// Launch speed of each piece
    pub speed: f32,
    /// Tilt of each piece away from straight up, degrees
    pub tilt: f32,
    /// Horizontal distance pieces spawn from the center
    pub spawn_offset: f32,
}

impl Default for BreakableConfig {
    fn default() -> Self {
        Self {
            min_pieces: 3,
            max_pieces: 6,
            speed: 5.0,
            tilt: 20.0,
            spawn_offset: 0.1,
        }
    }
}

impl BreakableConfig {
    /// Rejects an inverted piece range or a negative speed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::ensure_range("pieces", self.min_pieces as f32, self.max_pieces as f32)?;
        ConfigError::ensure_positive("speed", self.speed)
    }
}

/// Lump that bursts into pieces when hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakable {
    id: EntityId,
    position: Vec3,
    config: BreakableConfig,
    broken: bool,
}

impl Breakable {
    /// Creates a lump at `position`.
    #[must_use]
    pub fn new(position: Vec3, config: BreakableConfig) -> Self {
        Self {
            id: EntityId::new(),
            position,
            config,
            broken: false,
        }
    }

    /// Whether it has already burst.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Launch velocity of piece `index` out of `count`.
    ///
    /// Pieces tilt away from up by the configured angle and spread around
    /// the up axis in whole-degree steps.
    #[must_use]
    pub fn piece_velocity(&self, index: u32, count: u32) -> Vec3 {
        let spread = (360 * (1 + index) / count.max(1)) as f32;
        let tilted = Quat::from_rotation_x(self.config.tilt.to_radians()) * (Vec3::Y * self.config.speed);
        Quat::from_rotation_y(spread.to_radians()) * tilted
    }
}

impl Interactible for Breakable {
    fn id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn on_interact(&mut self, invoker: EntityId, rng: &mut fastrand::Rng) -> InteractOutcome {
        if self.broken {
            return InteractOutcome::default();
        }

        let count = rng.u32(self.config.min_pieces..=self.config.max_pieces.max(self.config.min_pieces));
        let debris = (0..count)
            .map(|i| {
                let velocity = self.piece_velocity(i, count);
                let offset = Vec3::new(velocity.x, 0.0, velocity.z).normalize_or_zero()
                    * self.config.spawn_offset;
                Debris {
                    position: self.position + offset,
                    velocity,
                }
            })
            .collect();

        self.broken = true;
        debug!(id = %self.id, %invoker, count, "Breakable burst");
        InteractOutcome {
            debris,
            consumed: true,
        }
    }
}

/// Latch that presses once and stays pressed until reset.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    id: EntityId,
    position: Vec3,
    pressed_by: Option<EntityId>,
}

impl Switch {
    /// Creates an unpressed switch.
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self {
            id: EntityId::new(),
            position,
            pressed_by: None,
        }
    }

    /// Whether it has been pressed.
    #[must_use]
    pub fn is_pressed(&self) -> bool {
        self.pressed_by.is_some()
    }

    /// Who pressed it.
    #[must_use]
    pub fn pressed_by(&self) -> Option<EntityId> {
        self.pressed_by
    }

    /// Releases the latch.
    pub fn reset(&mut self) {
        self.pressed_by = None;
    }
}

impl Interactible for Switch {
    fn id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn on_interact(&mut self, invoker: EntityId, _rng: &mut fastrand::Rng) -> InteractOutcome {
        if self.pressed_by.is_none() {
            self.pressed_by = Some(invoker);
            debug!(id = %self.id, %invoker, "Switch pressed");
        }
        InteractOutcome::default()
    }
}
