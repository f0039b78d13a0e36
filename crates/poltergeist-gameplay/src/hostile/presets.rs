//! Ready-made agents.

use glam::Vec3;

use super::{
    BroomAbilities, GrabThrowAbilities, HostileAgent, HostileAgentBuilder, HostileConfig,
    MobileMovement, MobileTuning, StationaryMovement, StationaryTuning,
};
use crate::animation::{params, AnimationEvent, AnimationSignaler, ClipTiming, TimedAnimator};
use crate::locomotion::Incapacitation;
use crate::pathfinding::StraightLineAgent;

/// Clip timings of the broom.
#[must_use]
pub fn broom_animator() -> TimedAnimator {
    TimedAnimator::new()
        .with_clip(
            "Ability1",
            ClipTiming::with_event(0.8, AnimationEvent::UseAbility1, 0.5),
        )
        .with_clip(
            "Ability2",
            ClipTiming::with_event(0.8, AnimationEvent::UseAbility2, 0.5),
        )
}

/// Clip timings of the haunted tree.
#[must_use]
pub fn haunted_tree_animator() -> TimedAnimator {
    TimedAnimator::new()
        .with_clip(
            "Ability1",
            ClipTiming::with_event(1.0, AnimationEvent::UseAbility1, 0.6),
        )
        .with_clip(
            "Ability2",
            ClipTiming::with_event(1.0, AnimationEvent::UseAbility2, 0.4),
        )
        .with_clip(
            params::THROW,
            ClipTiming::with_event(0.8, AnimationEvent::Throw, 0.5),
        )
}

/// Mobile sweeper that knocks the player into a roll.
#[must_use]
pub fn broom(position: Vec3, animator: Box<dyn AnimationSignaler>) -> HostileAgent {
    HostileAgentBuilder::new("broom", position)
        .config(HostileConfig {
            incapacitation: Incapacitation::ForcedRoll,
            ..HostileConfig::default()
        })
        .movement(Box::new(MobileMovement::new(
            MobileTuning::default(),
            Box::new(StraightLineAgent::new(position)),
        )))
        .abilities(Box::new(BroomAbilities::default()))
        .animator(animator)
        .build()
}

/// Rooted tree that grabs and throws the player. Never destroyed.
#[must_use]
pub fn haunted_tree(position: Vec3, yaw: f32, animator: Box<dyn AnimationSignaler>) -> HostileAgent {
    HostileAgentBuilder::new("haunted tree", position)
        .config(HostileConfig {
            environmental: true,
            incapacitation: Incapacitation::Freeze,
            body_radius: 1.0,
            ..HostileConfig::default()
        })
        .facing(yaw)
        .movement(Box::new(StationaryMovement::new(StationaryTuning::default())))
        .abilities(Box::new(GrabThrowAbilities::default()))
        .animator(animator)
        .build()
}
