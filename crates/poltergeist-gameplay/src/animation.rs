//! Animation signaling.
//!
//! Gameplay code never blends animations. It writes named parameters and
//! triggers through [`AnimationSignaler`], polls the hit-frame events the
//! animation emits, and asks whether a clip has returned to idle with its
//! trigger flag consumed. That last query is how ability completion is
//! detected.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Parameter names shared with the animation controllers.
pub mod params {
    /// Smoothed horizontal speed
    pub const SPEED: &str = "Speed";
    /// Stick magnitude
    pub const MOTION_SPEED: &str = "MotionSpeed";
    /// Ground contact
    pub const GROUNDED: &str = "Grounded";
    /// Jump started
    pub const JUMP: &str = "Jump";
    /// Falling past the fall timeout
    pub const FREE_FALL: &str = "FreeFall";
    /// Agent movement speed relative to wander speed
    pub const MOVE_SPEED: &str = "MoveSpeed";
    /// Trigger chaining a grab into a throw
    pub const THROW: &str = "Throw";
}

/// Hit-frame events raised by ability clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationEvent {
    /// Primary ability connects
    UseAbility1,
    /// Secondary ability connects
    UseAbility2,
    /// Thrown object is released
    Throw,
}

/// Receives animation parameters and answers completion queries.
pub trait AnimationSignaler: Send {
    /// Fires a one-shot trigger. Its flag stays set until the clip consumes it.
    fn set_trigger(&mut self, name: &str);

    /// Sets a boolean parameter.
    fn set_bool(&mut self, name: &str, value: bool);

    /// Sets a float parameter.
    fn set_float(&mut self, name: &str, value: f32);

    /// Checks whether the current clip is tagged idle and `flag` is no longer set.
    fn is_idle_with_flag_cleared(&self, flag: &str) -> bool;

    /// Takes the next pending hit-frame event.
    fn poll_event(&mut self) -> Option<AnimationEvent>;

    /// Advances clip playback. External animators driven elsewhere ignore this.
    fn advance(&mut self, _dt: f32) {}
}

/// Timing of one triggered clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipTiming {
    /// Clip length in seconds
    pub duration: f32,
    /// Event raised once playback passes `event_at` (fraction of the duration)
    pub event: Option<AnimationEvent>,
    /// Fraction of the duration at which the event fires
    pub event_at: f32,
}

impl ClipTiming {
    /// Clip without an event.
    #[must_use]
    pub const fn plain(duration: f32) -> Self {
        Self {
            duration,
            event: None,
            event_at: 0.0,
        }
    }

    /// Clip raising `event` at `event_at` of its duration.
    #[must_use]
    pub const fn with_event(duration: f32, event: AnimationEvent, event_at: f32) -> Self {
        Self {
            duration,
            event: Some(event),
            event_at,
        }
    }
}

#[derive(Debug, Clone)]
struct PlayingClip {
    trigger: String,
    elapsed: f32,
    timing: ClipTiming,
    event_sent: bool,
}

/// Headless animator playing fixed-length clips per trigger.
///
/// A trigger is consumed on the next [`AnimationSignaler::advance`], which
/// starts its clip and replaces whatever was playing. The animator is idle
/// whenever no clip is playing.
#[derive(Debug, Clone, Default)]
pub struct TimedAnimator {
    clips: HashMap<String, ClipTiming>,
    pending: Vec<String>,
    playing: Option<PlayingClip>,
    events: Vec<AnimationEvent>,
    bools: HashMap<String, bool>,
    floats: HashMap<String, f32>,
    triggers_fired: usize,
}

impl TimedAnimator {
    /// Creates an animator without clips. Unknown triggers play a zero-length clip.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the clip started by `trigger`.
    #[must_use]
    pub fn with_clip(mut self, trigger: &str, timing: ClipTiming) -> Self {
        self.clips.insert(trigger.to_string(), timing);
        self
    }

    /// Last value written to a boolean parameter.
    #[must_use]
    pub fn bool_param(&self, name: &str) -> Option<bool> {
        self.bools.get(name).copied()
    }

    /// Last value written to a float parameter.
    #[must_use]
    pub fn float_param(&self, name: &str) -> Option<f32> {
        self.floats.get(name).copied()
    }

    /// Trigger of the clip currently playing.
    #[must_use]
    pub fn playing(&self) -> Option<&str> {
        self.playing.as_ref().map(|clip| clip.trigger.as_str())
    }

    /// Total triggers fired so far.
    #[must_use]
    pub fn triggers_fired(&self) -> usize {
        self.triggers_fired
    }
}

impl AnimationSignaler for TimedAnimator {
    fn set_trigger(&mut self, name: &str) {
        self.triggers_fired += 1;
        self.pending.push(name.to_string());
    }

    fn set_bool(&mut self, name: &str, value: bool) {
        self.bools.insert(name.to_string(), value);
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.floats.insert(name.to_string(), value);
    }

    fn is_idle_with_flag_cleared(&self, flag: &str) -> bool {
        self.playing.is_none() && !self.pending.iter().any(|p| p == flag)
    }

    fn poll_event(&mut self) -> Option<AnimationEvent> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    fn advance(&mut self, dt: f32) {
        if let Some(trigger) = self.pending.pop() {
            self.pending.clear();
            let timing = self
                .clips
                .get(&trigger)
                .copied()
                .unwrap_or(ClipTiming::plain(0.0));
            self.playing = Some(PlayingClip {
                trigger,
                elapsed: 0.0,
                timing,
                event_sent: false,
            });
            return;
        }

        let Some(clip) = &mut self.playing else {
            return;
        };
        clip.elapsed += dt;
        if !clip.event_sent && clip.elapsed >= clip.timing.duration * clip.timing.event_at {
            clip.event_sent = true;
            if let Some(event) = clip.timing.event {
                self.events.push(event);
            }
        }
        if clip.elapsed >= clip.timing.duration {
            self.playing = None;
        }
    }
}

/// Cloneable handle to one [`TimedAnimator`], so an observer can inspect
/// what the owning controller signaled.
#[derive(Debug, Clone, Default)]
pub struct SharedAnimator(Arc<Mutex<TimedAnimator>>);

impl SharedAnimator {
    /// Wraps an animator.
    #[must_use]
    pub fn new(animator: TimedAnimator) -> Self {
        Self(Arc::new(Mutex::new(animator)))
    }

    /// Runs `f` against the wrapped animator.
    pub fn with<R>(&self, f: impl FnOnce(&TimedAnimator) -> R) -> R {
        f(&self.0.lock())
    }
}

impl AnimationSignaler for SharedAnimator {
    fn set_trigger(&mut self, name: &str) {
        self.0.lock().set_trigger(name);
    }

    fn set_bool(&mut self, name: &str, value: bool) {
        self.0.lock().set_bool(name, value);
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.0.lock().set_float(name, value);
    }

    fn is_idle_with_flag_cleared(&self, flag: &str) -> bool {
        self.0.lock().is_idle_with_flag_cleared(flag)
    }

    fn poll_event(&mut self) -> Option<AnimationEvent> {
        self.0.lock().poll_event()
    }

    fn advance(&mut self, dt: f32) {
        self.0.lock().advance(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animator() -> TimedAnimator {
        TimedAnimator::new().with_clip(
            "Ability1",
            ClipTiming::with_event(0.5, AnimationEvent::UseAbility1, 0.5),
        )
    }

    #[test]
    fn test_trigger_flag_blocks_idle_until_consumed() {
        let mut anim = animator();
        assert!(anim.is_idle_with_flag_cleared("Ability1"));

        anim.set_trigger("Ability1");
        assert!(!anim.is_idle_with_flag_cleared("Ability1"));

        anim.advance(0.1);
        assert_eq!(anim.playing(), Some("Ability1"));
        assert!(!anim.is_idle_with_flag_cleared("Ability1"));
    }

    #[test]
    fn test_clip_emits_event_and_returns_to_idle() {
        let mut anim = animator();
        anim.set_trigger("Ability1");
        anim.advance(0.1);

        anim.advance(0.2);
        assert_eq!(anim.poll_event(), None);
        anim.advance(0.1);
        assert_eq!(anim.poll_event(), Some(AnimationEvent::UseAbility1));
        assert_eq!(anim.poll_event(), None);

        anim.advance(0.3);
        assert!(anim.is_idle_with_flag_cleared("Ability1"));
    }

    #[test]
    fn test_new_trigger_preempts_clip() {
        let mut anim = animator().with_clip("Throw", ClipTiming::plain(1.0));
        anim.set_trigger("Ability1");
        anim.advance(0.1);
        anim.set_trigger("Throw");
        anim.advance(0.1);
        assert_eq!(anim.playing(), Some("Throw"));
    }

    #[test]
    fn test_parameters_recorded() {
        let mut anim = TimedAnimator::new();
        anim.set_bool(params::GROUNDED, true);
        anim.set_float(params::SPEED, 2.0);
        assert_eq!(anim.bool_param(params::GROUNDED), Some(true));
        assert_eq!(anim.float_param(params::SPEED), Some(2.0));
        assert_eq!(anim.bool_param(params::JUMP), None);
    }

    #[test]
    fn test_shared_animator_observes_owner() {
        let shared = SharedAnimator::new(animator());
        let mut owner: Box<dyn AnimationSignaler> = Box::new(shared.clone());
        owner.set_trigger("Ability1");
        owner.advance(0.1);
        assert_eq!(shared.with(|a| a.playing().map(str::to_string)), Some("Ability1".to_string()));
        assert_eq!(shared.with(TimedAnimator::triggers_fired), 1);
    }
}
