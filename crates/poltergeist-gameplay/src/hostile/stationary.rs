//! Agents rooted in place that only turn.

use glam::Vec3;
use poltergeist_common::math;
use serde::{Deserialize, Serialize};

use super::{AgentPose, HostileState, MovementContext, MovementStrategy};

/// Tuning of a stationary agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationaryTuning {
    /// Turn rate in degrees per second.
    ///
    /// While aggroed the agent turns towards its target by at most this
    /// much per second, with no acceleration. Only the possessed turn ramps
    /// up through `rotation_accel`.
    pub rotation_speed: f32,
    /// Angular acceleration of possessed turning, degrees per second squared
    pub rotation_accel: f32,
    /// Widest angle off forward at which an attack starts
    pub max_attack_angle: f32,
    /// Attacks start only inside this distance
    pub max_attack_range: f32,
}

impl Default for StationaryTuning {
    fn default() -> Self {
        Self {
            rotation_speed: 180.0,
            rotation_accel: 720.0,
            max_attack_angle: 20.0,
            max_attack_range: 3.0,
        }
    }
}

/// Movement of agents that turn in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationaryMovement {
    tuning: StationaryTuning,
    turn_speed: f32,
}

impl StationaryMovement {
    /// Creates the movement.
    #[must_use]
    pub fn new(tuning: StationaryTuning) -> Self {
        Self {
            tuning,
            turn_speed: 0.0,
        }
    }

    /// Current possessed turn rate.
    #[must_use]
    pub fn turn_speed(&self) -> f32 {
        self.turn_speed
    }
}

impl MovementStrategy for StationaryMovement {
    fn default_state(&self) -> HostileState {
        HostileState::Idle
    }

    fn initialize(&mut self, _pose: &mut AgentPose) -> HostileState {
        HostileState::Idle
    }

    fn update(
        &mut self,
        pose: &mut AgentPose,
        ctx: &mut MovementContext<'_>,
    ) -> Option<HostileState> {
        match ctx.state {
            HostileState::Aggro => {
                // Rotate-towards step, capped at rotation_speed per second
                let towards = math::horizontal(ctx.target - pose.position);
                if towards.length_squared() > f32::EPSILON {
                    let delta = math::delta_angle(pose.yaw, math::yaw_of(towards));
                    let step = self.tuning.rotation_speed * ctx.dt;
                    pose.yaw += delta.clamp(-step, step);
                }
                None
            }
            HostileState::Possessed | HostileState::PossessedAttacking => {
                let lateral = ctx.input.map_or(0.0, |input| input.move_axis.x);
                let target = lateral * self.tuning.rotation_speed;
                self.turn_speed = math::move_towards_scalar(
                    self.turn_speed,
                    target,
                    self.tuning.rotation_accel * ctx.dt,
                );
                pose.yaw = math::clamp_angle(pose.yaw + self.turn_speed * ctx.dt, f32::MIN, f32::MAX);
                None
            }
            // Rooted agents have nowhere to walk back to
            HostileState::Leash => Some(HostileState::Idle),
            HostileState::Idle | HostileState::Wander | HostileState::Attacking => None,
        }
    }

    fn can_attack(&self, pose: &AgentPose, target: Vec3) -> bool {
        let towards = target - pose.position;
        towards.length() < self.tuning.max_attack_range
            && math::angle_between(pose.forward(), math::horizontal(towards))
                < self.tuning.max_attack_angle
    }

    fn on_possessed(&mut self, _pose: &AgentPose) {
        self.turn_speed = 0.0;
    }

    fn on_unpossessed(&mut self, _pose: &AgentPose) {
        self.turn_speed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputState;
    use crate::physics::StaticWorld;
    use glam::Vec2;

    fn step(
        movement: &mut StationaryMovement,
        pose: &mut AgentPose,
        state: HostileState,
        target: Vec3,
        input: Option<&InputState>,
    ) -> Option<HostileState> {
        let world = StaticWorld::new();
        let mut rng = fastrand::Rng::with_seed(0);
        let mut ctx = MovementContext {
            state,
            target,
            physics: &world,
            input,
            camera_yaw: 0.0,
            rng: &mut rng,
            dt: 0.1,
        };
        movement.update(pose, &mut ctx)
    }

    #[test]
    fn test_aggro_turn_is_rate_limited() {
        let mut movement = StationaryMovement::new(StationaryTuning::default());
        let mut pose = AgentPose::new(Vec3::ZERO, 0.0);
        let behind = Vec3::new(0.0, 0.0, -5.0);

        step(&mut movement, &mut pose, HostileState::Aggro, behind, None);
        assert!((pose.yaw.abs() - 18.0).abs() < 1e-3);

        for _ in 0..20 {
            step(&mut movement, &mut pose, HostileState::Aggro, behind, None);
        }
        assert!((math::delta_angle(pose.yaw, 180.0)).abs() < 1e-3);
    }

    #[test]
    fn test_attack_needs_range_and_cone() {
        let movement = StationaryMovement::new(StationaryTuning::default());
        let pose = AgentPose::new(Vec3::ZERO, 0.0);
        assert!(movement.can_attack(&pose, Vec3::new(0.0, 0.0, 2.0)));
        assert!(!movement.can_attack(&pose, Vec3::new(0.0, 0.0, 4.0)));
        assert!(!movement.can_attack(&pose, Vec3::new(2.0, 0.0, 1.0)));
    }

    #[test]
    fn test_leash_settles_to_idle() {
        let mut movement = StationaryMovement::new(StationaryTuning::default());
        let mut pose = AgentPose::new(Vec3::ZERO, 0.0);
        let next = step(&mut movement, &mut pose, HostileState::Leash, Vec3::ZERO, None);
        assert_eq!(next, Some(HostileState::Idle));
    }

    #[test]
    fn test_possessed_turn_accelerates() {
        let mut movement = StationaryMovement::new(StationaryTuning::default());
        let mut pose = AgentPose::new(Vec3::ZERO, 0.0);
        let input = InputState {
            move_axis: Vec2::new(1.0, 0.0),
            ..InputState::default()
        };

        step(&mut movement, &mut pose, HostileState::Possessed, Vec3::ZERO, Some(&input));
        assert!((movement.turn_speed() - 72.0).abs() < 1e-3);
        for _ in 0..5 {
            step(&mut movement, &mut pose, HostileState::Possessed, Vec3::ZERO, Some(&input));
        }
        assert!((movement.turn_speed() - 180.0).abs() < 1e-3);
        assert!(pose.yaw > 0.0);
    }
}
