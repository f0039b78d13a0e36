//! Pathfinding-driven movement with a direct-input mode while possessed.

use glam::{Vec2, Vec3};
use poltergeist_common::{math, LayerMask};
use serde::{Deserialize, Serialize};

use super::{AgentPose, HostileState, MovementContext, MovementStrategy};
use crate::body::{sweep_capsule, CapsuleDims};
use crate::locomotion::{VerticalMotion, VerticalTuning};
use crate::pathfinding::PathfindingAgent;

/// Tuning of a mobile agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileTuning {
    /// Chase speed
    pub aggro_speed: f32,
    /// Return-to-spawn speed
    pub leash_speed: f32,
    /// Roaming speed, also the reference for the animator speed
    pub wander_speed: f32,
    /// Attacks start only inside this distance
    pub max_attack_range: f32,
    /// Distance kept from the target while chasing
    pub ideal_attack_range: f32,
    /// Leash ends inside this distance from spawn
    pub wander_radius: f32,
    /// Shortest pause between wander destinations
    pub min_wander_interval: f32,
    /// Longest pause between wander destinations
    pub max_wander_interval: f32,
    /// Closest wander destination from spawn
    pub min_wander_distance: f32,
    /// Farthest wander destination from spawn
    pub max_wander_distance: f32,
    /// Possessed walking speed
    pub move_speed: f32,
    /// Possessed acceleration
    pub speed_change_rate: f32,
    /// Possessed grounded sphere offset below the root (negative lifts it)
    pub grounded_offset: f32,
    /// Possessed grounded sphere radius
    pub grounded_radius: f32,
    /// Possessed gravity; jumping is disabled
    pub vertical: VerticalTuning,
    /// Body capsule
    pub capsule: CapsuleDims,
    /// Layers the possessed body stands on and slides along
    pub ground_layers: LayerMask,
}

impl Default for MobileTuning {
    fn default() -> Self {
        Self {
            aggro_speed: 10.0,
            leash_speed: 10.0,
            wander_speed: 4.0,
            max_attack_range: 3.0,
            ideal_attack_range: 1.5,
            wander_radius: 2.0,
            min_wander_interval: 2.0,
            max_wander_interval: 4.0,
            min_wander_distance: 2.0,
            max_wander_distance: 4.0,
            move_speed: 2.0,
            speed_change_rate: 10.0,
            grounded_offset: -0.125,
            grounded_radius: 0.25,
            vertical: VerticalTuning {
                jump_height: 0.0,
                gravity: -30.0,
                fall_timeout: 0.05,
                ..VerticalTuning::default()
            },
            capsule: CapsuleDims {
                height: 1.0,
                radius: 0.25,
                center_y: 0.5,
            },
            ground_layers: LayerMask::GROUND,
        }
    }
}

/// Movement of agents that walk around.
pub struct MobileMovement {
    tuning: MobileTuning,
    nav: Box<dyn PathfindingAgent>,
    horizontal: Vec3,
    vertical: VerticalMotion,
    grounded: bool,
    target_yaw: f32,
    wander_timer: f32,
}

impl std::fmt::Debug for MobileMovement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MobileMovement")
            .field("horizontal", &self.horizontal)
            .field("grounded", &self.grounded)
            .field("nav_enabled", &self.nav.is_enabled())
            .finish_non_exhaustive()
    }
}

impl MobileMovement {
    /// Creates the movement around a navigation agent.
    #[must_use]
    pub fn new(tuning: MobileTuning, nav: Box<dyn PathfindingAgent>) -> Self {
        Self {
            vertical: VerticalMotion::new(&tuning.vertical),
            tuning,
            nav,
            horizontal: Vec3::ZERO,
            grounded: true,
            target_yaw: 0.0,
            wander_timer: 0.0,
        }
    }

    /// Tuning.
    #[must_use]
    pub fn tuning(&self) -> &MobileTuning {
        &self.tuning
    }

    /// Navigation agent.
    #[must_use]
    pub fn nav(&self) -> &dyn PathfindingAgent {
        self.nav.as_ref()
    }

    fn possessed_move(&mut self, pose: &mut AgentPose, ctx: &MovementContext<'_>) {
        let center = pose.position - Vec3::Y * self.tuning.grounded_offset;
        self.grounded = ctx.physics.check_sphere(
            center,
            self.tuning.grounded_radius,
            self.tuning.ground_layers,
        );
        let mut no_jump = false;
        self.vertical
            .integrate(&self.tuning.vertical, self.grounded, &mut no_jump, ctx.dt);

        let move_axis = ctx.input.map_or(Vec2::ZERO, |input| input.move_axis);
        let target_speed =
            if move_axis == Vec2::ZERO || ctx.state == HostileState::PossessedAttacking {
                0.0
            } else {
                self.tuning.move_speed
            };

        if move_axis != Vec2::ZERO {
            let direction = Vec3::new(move_axis.x, 0.0, move_axis.y).normalize_or_zero();
            self.target_yaw = math::yaw_of(direction) + ctx.camera_yaw;
        }
        let target_direction = math::yaw_forward(self.target_yaw);
        self.horizontal = math::move_towards(
            self.horizontal,
            target_direction * target_speed,
            self.tuning.speed_change_rate * ctx.dt,
        );

        let displacement = (self.horizontal + Vec3::Y * self.vertical.velocity) * ctx.dt;
        pose.position = sweep_capsule(
            ctx.physics,
            pose.position,
            displacement,
            &self.tuning.capsule,
            self.tuning.ground_layers,
        );
        pose.face(self.horizontal);
    }

    fn pick_wander_point(&mut self, pose: &AgentPose, rng: &mut fastrand::Rng) {
        let t = &self.tuning;
        let heading = rng.f32() * 360.0;
        let distance =
            t.min_wander_distance + (t.max_wander_distance - t.min_wander_distance) * rng.f32();
        self.nav
            .set_destination(pose.spawn + math::yaw_forward(heading) * distance);
        self.wander_timer =
            t.min_wander_interval + (t.max_wander_interval - t.min_wander_interval) * rng.f32();
    }
}

impl MovementStrategy for MobileMovement {
    fn default_state(&self) -> HostileState {
        HostileState::Wander
    }

    fn initialize(&mut self, pose: &mut AgentPose) -> HostileState {
        self.nav.warp(pose.position);
        HostileState::Leash
    }

    fn update(
        &mut self,
        pose: &mut AgentPose,
        ctx: &mut MovementContext<'_>,
    ) -> Option<HostileState> {
        let mut next = None;
        match ctx.state {
            HostileState::Possessed | HostileState::PossessedAttacking => {
                self.possessed_move(pose, ctx);
                return None;
            }
            HostileState::Aggro => {
                let towards = ctx.target - pose.position;
                self.nav.set_speed(self.tuning.aggro_speed);
                self.nav.set_destination(
                    ctx.target - towards.normalize_or_zero() * self.tuning.ideal_attack_range,
                );
                pose.face(towards);
            }
            HostileState::Attacking => {
                self.nav.set_destination(pose.position);
            }
            HostileState::Leash => {
                self.nav.set_destination(pose.spawn);
                self.nav.set_speed(self.tuning.leash_speed);
                if pose.position.distance(pose.spawn) < self.tuning.wander_radius {
                    self.wander_timer = 0.0;
                    next = Some(HostileState::Wander);
                }
                pose.face(pose.spawn - pose.position);
            }
            HostileState::Wander => {
                self.nav.set_speed(self.tuning.wander_speed);
                self.wander_timer -= ctx.dt;
                if self.wander_timer <= 0.0 {
                    self.pick_wander_point(pose, ctx.rng);
                }
                pose.face(self.nav.destination() - pose.position);
            }
            HostileState::Idle => {}
        }

        pose.position = self.nav.advance(ctx.dt);
        next
    }

    fn can_attack(&self, pose: &AgentPose, target: Vec3) -> bool {
        target.distance(pose.position) < self.tuning.max_attack_range
    }

    fn should_leash(&self, pose: &AgentPose, target: Vec3, leash_radius: f32) -> bool {
        target.distance(pose.position) > leash_radius
            || target.distance(pose.spawn) > leash_radius
            || pose.position.distance(pose.spawn) > leash_radius
    }

    fn on_possessed(&mut self, pose: &AgentPose) {
        self.nav.set_enabled(false);
        self.horizontal = Vec3::ZERO;
        self.vertical = VerticalMotion::new(&self.tuning.vertical);
        self.target_yaw = pose.yaw;
    }

    fn on_unpossessed(&mut self, pose: &AgentPose) {
        self.nav.warp(pose.position);
        self.nav.set_destination(pose.position);
        self.nav.set_enabled(true);
        self.horizontal = Vec3::ZERO;
    }

    fn move_speed_ratio(&self, possessed: bool) -> Option<f32> {
        let speed = if possessed {
            self.horizontal.length()
        } else {
            self.nav.velocity().length()
        };
        Some(speed / self.tuning.wander_speed.max(f32::EPSILON))
    }

    fn push_velocity(
        &self,
        pose: &AgentPose,
        target: Vec3,
        target_radius: f32,
        fixed_dt: f32,
    ) -> Option<Vec3> {
        if self.horizontal.length_squared() <= f32::EPSILON || fixed_dt <= 0.0 {
            return None;
        }
        let step = self.horizontal * fixed_dt;
        let [bottom, _, top] = self.tuning.capsule.sample_centers(pose.position + step);
        let reach = self.tuning.capsule.radius + target_radius;
        let closest = target.clamp(bottom.min(top), bottom.max(top));
        if closest.distance(target) > reach {
            return None;
        }
        Some(self.horizontal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputState;
    use crate::pathfinding::StraightLineAgent;
    use crate::physics::StaticWorld;

    fn movement(at: Vec3) -> MobileMovement {
        MobileMovement::new(MobileTuning::default(), Box::new(StraightLineAgent::new(at)))
    }

    fn run(
        movement: &mut MobileMovement,
        pose: &mut AgentPose,
        state: HostileState,
        target: Vec3,
        input: Option<&InputState>,
        world: &StaticWorld,
        rng: &mut fastrand::Rng,
    ) -> Option<HostileState> {
        let mut ctx = MovementContext {
            state,
            target,
            physics: world,
            input,
            camera_yaw: 0.0,
            rng,
            dt: 0.1,
        };
        movement.update(pose, &mut ctx)
    }

    #[test]
    fn test_aggro_approaches_to_ideal_range() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(0);
        let mut pose = AgentPose::new(Vec3::ZERO, 0.0);
        let mut mobile = movement(Vec3::ZERO);
        let target = Vec3::new(6.0, 0.0, 0.0);

        for _ in 0..20 {
            run(&mut mobile, &mut pose, HostileState::Aggro, target, None, &world, &mut rng);
        }
        assert!((pose.position.x - 4.5).abs() < 0.05, "x = {}", pose.position.x);
        assert!((pose.yaw - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_leash_returns_and_switches_to_wander() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(0);
        let mut pose = AgentPose::new(Vec3::new(10.0, 0.0, 0.0), 0.0);
        pose.spawn = Vec3::ZERO;
        let mut mobile = movement(pose.position);

        let mut switched = None;
        for _ in 0..20 {
            switched = run(&mut mobile, &mut pose, HostileState::Leash, Vec3::ZERO, None, &world, &mut rng);
            if switched.is_some() {
                break;
            }
        }
        assert_eq!(switched, Some(HostileState::Wander));
        assert!(pose.position.distance(Vec3::ZERO) < 2.0 + 1.0);
    }

    #[test]
    fn test_wander_destination_within_band() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(9);
        let mut pose = AgentPose::new(Vec3::ZERO, 0.0);
        let mut mobile = movement(Vec3::ZERO);

        run(&mut mobile, &mut pose, HostileState::Wander, Vec3::splat(100.0), None, &world, &mut rng);
        let distance = mobile.nav().destination().distance(Vec3::ZERO);
        assert!((2.0..=4.0).contains(&distance), "distance = {distance}");
    }

    #[test]
    fn test_leash_conditions() {
        let mobile = movement(Vec3::ZERO);
        let mut pose = AgentPose::new(Vec3::ZERO, 0.0);
        assert!(!mobile.should_leash(&pose, Vec3::new(5.0, 0.0, 0.0), 20.0));
        assert!(mobile.should_leash(&pose, Vec3::new(25.0, 0.0, 0.0), 20.0));

        // Agent dragged far from home while the target stays close to it
        pose.position = Vec3::new(30.0, 0.0, 0.0);
        assert!(mobile.should_leash(&pose, Vec3::new(31.0, 0.0, 0.0), 20.0));
    }

    #[test]
    fn test_possessed_moves_with_input_and_stops_nav() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(0);
        let mut pose = AgentPose::new(Vec3::ZERO, 0.0);
        let mut mobile = movement(Vec3::ZERO);
        mobile.on_possessed(&pose);
        assert!(!mobile.nav().is_enabled());

        let input = InputState {
            move_axis: Vec2::new(0.0, 1.0),
            ..InputState::default()
        };
        for _ in 0..20 {
            run(&mut mobile, &mut pose, HostileState::Possessed, Vec3::ZERO, Some(&input), &world, &mut rng);
        }
        assert!(pose.position.z > 1.0);
        assert!(pose.position.y.abs() < 0.1);
        let ratio = mobile.move_speed_ratio(true).expect("ratio");
        assert!((ratio - 0.5).abs() < 1e-3);

        // Attacking under possession brakes to a stop
        for _ in 0..10 {
            run(&mut mobile, &mut pose, HostileState::PossessedAttacking, Vec3::ZERO, Some(&input), &world, &mut rng);
        }
        assert_eq!(mobile.move_speed_ratio(true), Some(0.0));
    }

    #[test]
    fn test_push_only_when_touching() {
        let pose = AgentPose::new(Vec3::ZERO, 0.0);
        let mut mobile = movement(Vec3::ZERO);
        mobile.horizontal = Vec3::new(0.0, 0.0, 2.0);

        let push = mobile.push_velocity(&pose, Vec3::new(0.0, 0.5, 0.4), 0.25, 0.02);
        assert_eq!(push, Some(Vec3::new(0.0, 0.0, 2.0)));
        assert_eq!(mobile.push_velocity(&pose, Vec3::new(0.0, 0.5, 3.0), 0.25, 0.02), None);
    }
}
