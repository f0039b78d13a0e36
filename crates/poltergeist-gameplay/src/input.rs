//! Normalized input state shared by whoever currently controls the avatar.
//!
//! Raw device capture lives outside this crate. A producer writes the latest
//! values into [`InputState`] once per frame; the single owner granted by the
//! possession coordinator reads it and clears the edge-triggered buttons it
//! consumes.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Input state for the controlled entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    /// Movement stick (-1 to 1 on each axis, `y` is forward)
    pub move_axis: Vec2,
    /// Look delta in degrees per second (`x` yaw, `y` pitch)
    pub look: Vec2,
    /// Jump button
    pub jump: bool,
    /// Roll toggle button (edge-triggered)
    pub roll: bool,
    /// Primary ability button (edge-triggered)
    pub ability1: bool,
    /// Secondary ability button (edge-triggered)
    pub ability2: bool,
    /// Whether the stick magnitude scales speed
    pub analog_movement: bool,
    /// Whether ability buttons are accepted (only while possessing)
    pub can_use_abilities: bool,
}

impl InputState {
    /// Dead zone below which look input is ignored.
    pub const LOOK_THRESHOLD: f32 = 0.01;

    /// Create an empty input state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if any movement input is active.
    #[must_use]
    pub fn has_movement(&self) -> bool {
        self.move_axis != Vec2::ZERO
    }

    /// Check if the look input passes the dead zone.
    #[must_use]
    pub fn has_look(&self) -> bool {
        self.look.length_squared() >= Self::LOOK_THRESHOLD
    }

    /// Stick magnitude, or 1 for digital movement.
    #[must_use]
    pub fn input_magnitude(&self) -> f32 {
        if self.analog_movement {
            self.move_axis.length().min(1.0)
        } else {
            1.0
        }
    }

    /// Set the ability buttons, dropping presses while abilities are locked.
    pub fn press_abilities(&mut self, ability1: bool, ability2: bool) {
        if self.can_use_abilities {
            self.ability1 = ability1;
            self.ability2 = ability2;
        }
    }

    /// Consume the roll edge.
    pub fn take_roll(&mut self) -> bool {
        std::mem::take(&mut self.roll)
    }

    /// Consume the primary ability edge.
    pub fn take_ability1(&mut self) -> bool {
        std::mem::take(&mut self.ability1)
    }

    /// Consume the secondary ability edge.
    pub fn take_ability2(&mut self) -> bool {
        std::mem::take(&mut self.ability2)
    }

    /// Clear every button and axis.
    pub fn clear(&mut self) {
        let can_use_abilities = self.can_use_abilities;
        *self = Self {
            can_use_abilities,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults() {
        let input = InputState::new();
        assert!(!input.has_movement());
        assert!(!input.has_look());
        assert!(!input.can_use_abilities);
    }

    #[test]
    fn test_abilities_locked_until_enabled() {
        let mut input = InputState::new();
        input.press_abilities(true, true);
        assert!(!input.ability1);

        input.can_use_abilities = true;
        input.press_abilities(true, false);
        assert!(input.ability1);
        assert!(!input.ability2);
    }

    #[test]
    fn test_take_clears_edge() {
        let mut input = InputState::new();
        input.roll = true;
        assert!(input.take_roll());
        assert!(!input.take_roll());
    }

    #[test]
    fn test_input_magnitude() {
        let mut input = InputState::new();
        input.move_axis = Vec2::new(0.5, 0.0);
        assert_eq!(input.input_magnitude(), 1.0);
        input.analog_movement = true;
        assert!((input.input_magnitude() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_clear_keeps_ability_gate() {
        let mut input = InputState::new();
        input.can_use_abilities = true;
        input.jump = true;
        input.clear();
        assert!(!input.jump);
        assert!(input.can_use_abilities);
    }
}
