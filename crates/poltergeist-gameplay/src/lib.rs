//! # Poltergeist Gameplay
//!
//! Gameplay systems for Poltergeist.
//!
//! This crate provides the simulation layer of the game:
//! - Avatar locomotion with walking, rolling and standing back up
//! - Hostile agents with pluggable movement and ability strategies
//! - Possession handoff of input and camera priority
//! - Interactibles hit by ability sweeps
//! - Scene orchestration and the event bus
//!
//! Physics, animation, pathfinding and camera rigs are reached through
//! traits so the presentation layer can plug in its own backends.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod animation;
pub mod body;
pub mod camera;
pub mod events;
pub mod ground;
pub mod hostile;
pub mod input;
pub mod interaction;
pub mod locomotion;
pub mod pathfinding;
pub mod physics;
pub mod possession;
pub mod scene;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::animation::{AnimationEvent, AnimationSignaler, SharedAnimator, TimedAnimator};
    pub use crate::camera::*;
    pub use crate::events::*;
    pub use crate::hostile::{
        broom, haunted_tree, AgentCommand, AgentError, HostileAgent, HostileAgentBuilder,
        HostileConfig, HostileState,
    };
    pub use crate::input::*;
    pub use crate::interaction::*;
    pub use crate::locomotion::{
        Incapacitation, LocomotionConfig, LocomotionController, LocomotionError, LocomotionState,
    };
    pub use crate::pathfinding::*;
    pub use crate::physics::*;
    pub use crate::possession::*;
    pub use crate::scene::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_prelude_builds_a_scene() {
        let mut scene = Scene::new(
            StaticWorld::flat(0.0),
            LocomotionController::new(Vec3::ZERO),
            SceneConfig::default(),
        );
        let id = scene.spawn_agent(broom(Vec3::new(40.0, 0.0, 0.0), Box::new(TimedAnimator::new())));
        scene.update(0.1);
        assert!(scene.agent(id).is_some());
        assert_eq!(scene.coordinator().owner(), Controlled::Player);
    }
}
