//! Orbit targets and camera rig priorities.
//!
//! Every controllable entity owns a [`CameraOrbit`] (the yaw / pitch its
//! follow camera should use) and has a rig registered with the
//! [`CameraDirector`]. Exactly one rig holds the player priority: the one
//! of whatever is currently controlled.

use glam::Vec2;
use poltergeist_common::math::clamp_angle;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::input::InputState;
use crate::possession::Controlled;

/// Priority of the rig following the controlled entity.
pub const PLAYER_PRIORITY: i32 = 15;

/// Priority of every other rig.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Yaw / pitch target driven by look input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraOrbit {
    yaw: f32,
    pitch: f32,
    /// Highest pitch in degrees
    pub top_clamp: f32,
    /// Lowest pitch in degrees
    pub bottom_clamp: f32,
    /// Ignores look input while set
    pub locked: bool,
}

impl Default for CameraOrbit {
    fn default() -> Self {
        Self::new(70.0, -30.0)
    }
}

impl CameraOrbit {
    /// Creates an orbit with the given pitch limits.
    #[must_use]
    pub fn new(top_clamp: f32, bottom_clamp: f32) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            top_clamp,
            bottom_clamp,
            locked: false,
        }
    }

    /// Yaw in degrees.
    #[must_use]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Pitch in degrees.
    #[must_use]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Accumulates look input (degrees per second) and re-clamps.
    pub fn apply_look(&mut self, look: Vec2, dt: f32) {
        if look.length_squared() >= InputState::LOOK_THRESHOLD && !self.locked {
            self.yaw += look.x * dt;
            self.pitch += look.y * dt;
        }
        self.yaw = clamp_angle(self.yaw, f32::MIN, f32::MAX);
        self.pitch = clamp_angle(self.pitch, self.bottom_clamp, self.top_clamp);
    }

    /// Overrides both angles.
    pub fn set(&mut self, yaw: f32, pitch: f32) {
        self.yaw = clamp_angle(yaw, f32::MIN, f32::MAX);
        self.pitch = clamp_angle(pitch, self.bottom_clamp, self.top_clamp);
    }
}

/// Follow camera owned by the presentation layer.
pub trait CameraRig: Send {
    /// Points the rig.
    fn set_yaw_pitch(&mut self, yaw: f32, pitch: f32);

    /// Raises the rig to the player priority or drops it to the default.
    fn set_active_priority(&mut self, active: bool);
}

/// Rig that only remembers what it was told.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingRig {
    /// Last yaw
    pub yaw: f32,
    /// Last pitch
    pub pitch: f32,
    /// Current priority
    pub priority: i32,
}

impl Default for RecordingRig {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            priority: DEFAULT_PRIORITY,
        }
    }
}

impl CameraRig for RecordingRig {
    fn set_yaw_pitch(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch;
    }

    fn set_active_priority(&mut self, active: bool) {
        self.priority = if active {
            PLAYER_PRIORITY
        } else {
            DEFAULT_PRIORITY
        };
    }
}

struct RigEntry {
    owner: Controlled,
    rig: Box<dyn CameraRig>,
    priority: i32,
    yaw_pitch: (f32, f32),
}

/// Registry of rigs keyed by the entity they follow.
#[derive(Default)]
pub struct CameraDirector {
    rigs: Vec<RigEntry>,
    active: Option<Controlled>,
}

impl std::fmt::Debug for CameraDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraDirector")
            .field("rigs", &self.rigs.len())
            .field("active", &self.active)
            .finish()
    }
}

impl CameraDirector {
    /// Creates an empty director.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the rig following `owner` at default priority.
    pub fn register(&mut self, owner: Controlled, mut rig: Box<dyn CameraRig>) {
        let active = self.active == Some(owner);
        rig.set_active_priority(active);
        let entry = RigEntry {
            owner,
            rig,
            priority: if active {
                PLAYER_PRIORITY
            } else {
                DEFAULT_PRIORITY
            },
            yaw_pitch: (0.0, 0.0),
        };
        match self.rigs.iter_mut().find(|e| e.owner == owner) {
            Some(existing) => *existing = entry,
            None => self.rigs.push(entry),
        }
    }

    /// Drops the rig following `owner`.
    pub fn unregister(&mut self, owner: Controlled) {
        self.rigs.retain(|e| e.owner != owner);
        if self.active == Some(owner) {
            self.active = None;
        }
    }

    /// Gives `owner` the player priority and lowers every other rig.
    pub fn activate(&mut self, owner: Controlled) {
        for entry in &mut self.rigs {
            let active = entry.owner == owner;
            entry.rig.set_active_priority(active);
            entry.priority = if active {
                PLAYER_PRIORITY
            } else {
                DEFAULT_PRIORITY
            };
        }
        debug!(?owner, "Camera priority switched");
        self.active = Some(owner);
    }

    /// Entity whose rig holds the player priority.
    #[must_use]
    pub fn active(&self) -> Option<Controlled> {
        self.active
    }

    /// Priority currently assigned to the rig of `owner`.
    #[must_use]
    pub fn priority(&self, owner: Controlled) -> Option<i32> {
        self.rigs
            .iter()
            .find(|e| e.owner == owner)
            .map(|e| e.priority)
    }

    /// Last yaw / pitch pushed to the rig of `owner`.
    #[must_use]
    pub fn yaw_pitch(&self, owner: Controlled) -> Option<(f32, f32)> {
        self.rigs
            .iter()
            .find(|e| e.owner == owner)
            .map(|e| e.yaw_pitch)
    }

    /// Points the rig of `owner`. Returns `false` if no rig is registered.
    pub fn point(&mut self, owner: Controlled, yaw: f32, pitch: f32) -> bool {
        match self.rigs.iter_mut().find(|e| e.owner == owner) {
            Some(entry) => {
                entry.rig.set_yaw_pitch(yaw, pitch);
                entry.yaw_pitch = (yaw, pitch);
                true
            }
            None => false,
        }
    }
}
