//! Walking / rolling locomotion for the avatar.
//!
//! The avatar walks as a kinematic capsule and rolls as a dynamic sphere
//! around its head. Leaving a roll always passes through
//! [`LocomotionState::ExitingRoll`], during which input is ignored while the
//! collider grows back into a capsule and the body turns upright.
//!
//! One frame tick runs, in order: roll toggle, vertical integration, ground
//! sampling, collision reconciliation (rolling only), horizontal
//! integration, movement, orientation. The dynamic body itself is integrated
//! by [`LocomotionController::fixed_tick`].

use glam::{Quat, Vec2, Vec3};
use poltergeist_common::{math, ConfigError, EntityId, LayerMask};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::animation::{params, AnimationSignaler};
use crate::body::{AvatarBody, CapsuleDims, ColliderShape};
use crate::camera::CameraOrbit;
use crate::ground::{GroundContact, GroundProbe, GroundSampler, SlopeTuning};
use crate::input::InputState;
use crate::physics::PhysicsQuery;

/// Errors raised when building a locomotion controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocomotionError {
    /// Tuning values were rejected
    #[error("invalid locomotion config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Result type for locomotion operations.
pub type LocomotionResult<T> = Result<T, LocomotionError>;

/// Locomotion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LocomotionState {
    /// Kinematic capsule active
    #[default]
    Walking,
    /// Dynamic sphere active
    Rolling,
    /// Standing back up; input ignored
    ExitingRoll,
}

/// How a body is disabled while something else is controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Incapacitation {
    /// Velocity zeroed and no integration at all
    Freeze,
    /// Knocked into a roll that keeps simulating without input
    ForcedRoll,
}

/// Notifications raised by the controller, drained by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocomotionEvent {
    /// Walking -> Rolling
    RollEntered,
    /// Rolling -> ExitingRoll
    RollExitStarted,
    /// Roll exit refused because the standing capsule would not fit
    RollExitBlocked,
    /// ExitingRoll -> Walking
    RollExited,
}

/// Gravity and jump tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalTuning {
    /// Jump apex height (zero disables jumping)
    pub jump_height: f32,
    /// Gravity acceleration (negative is down)
    pub gravity: f32,
    /// Maximum falling speed
    pub terminal_velocity: f32,
    /// Vertical velocity held while grounded
    pub grounded_vertical_velocity: f32,
    /// Delay before another jump is accepted
    pub jump_timeout: f32,
    /// Delay before the fall state is signaled
    pub fall_timeout: f32,
}

impl Default for VerticalTuning {
    fn default() -> Self {
        Self {
            jump_height: 1.2,
            gravity: -15.0,
            terminal_velocity: 53.0,
            grounded_vertical_velocity: -2.0,
            jump_timeout: 0.5,
            fall_timeout: 0.15,
        }
    }
}

impl VerticalTuning {
    /// Initial velocity reaching `jump_height`.
    #[must_use]
    pub fn jump_velocity(&self) -> f32 {
        (self.jump_height * -2.0 * self.gravity).max(0.0).sqrt()
    }
}

/// Signals produced by one vertical step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerticalSignals {
    /// Ground contact the step was based on
    pub grounded: bool,
    /// A jump started this step
    pub jumped: bool,
    /// The fall timeout ran out
    pub free_fall: bool,
}

/// Vertical velocity with its jump and fall timers.
///
/// Shared by the avatar and by possessed mobile agents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerticalMotion {
    /// Current vertical velocity
    pub velocity: f32,
    jump_timer: f32,
    fall_timer: f32,
}

impl VerticalMotion {
    /// Creates a resting motion with full timers.
    #[must_use]
    pub fn new(tuning: &VerticalTuning) -> Self {
        Self {
            velocity: 0.0,
            jump_timer: tuning.jump_timeout,
            fall_timer: tuning.fall_timeout,
        }
    }

    /// Integrates one step. `jump` is consumed while airborne.
    pub fn integrate(
        &mut self,
        tuning: &VerticalTuning,
        grounded: bool,
        jump: &mut bool,
        dt: f32,
    ) -> VerticalSignals {
        let mut signals = VerticalSignals {
            grounded,
            ..VerticalSignals::default()
        };

        if grounded {
            self.fall_timer = tuning.fall_timeout;

            if self.velocity < 0.0 {
                self.velocity = tuning.grounded_vertical_velocity;
            }

            if *jump && self.jump_timer <= 0.0 && tuning.jump_height > 0.0 {
                self.velocity = tuning.jump_velocity();
                signals.jumped = true;
            }

            if self.jump_timer >= 0.0 {
                self.jump_timer -= dt;
            }
        } else {
            self.jump_timer = tuning.jump_timeout;

            if self.fall_timer >= 0.0 {
                self.fall_timer -= dt;
            } else {
                signals.free_fall = true;
            }

            *jump = false;
        }

        self.velocity = (self.velocity + tuning.gravity * dt).max(-tuning.terminal_velocity);
        signals
    }
}

/// Snapshot of the avatar's velocity components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityState {
    /// Intentional horizontal velocity
    pub horizontal: Vec3,
    /// Vertical velocity
    pub vertical: f32,
    /// Slope-accrued horizontal bonus
    pub bonus: Vec3,
}

/// Locomotion tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    /// Walking speed
    pub move_speed: f32,
    /// Walking acceleration
    pub speed_change_rate: f32,
    /// Rolling speed
    pub roll_speed: f32,
    /// Rolling acceleration
    pub rolling_speed_change_rate: f32,
    /// Acceleration while airborne
    pub aerial_speed_change_rate: f32,
    /// Gravity and jumping
    pub vertical: VerticalTuning,
    /// Delay between roll toggles
    pub roll_timeout: f32,
    /// Duration of the stand-up interpolation
    pub roll_exit_time: f32,
    /// Difference between applied and simulated rolling velocity that counts as a collision
    pub collision_discrepancy: f32,
    /// Ground probes
    pub probe: GroundProbe,
    /// Slope bonus
    pub slope: SlopeTuning,
    /// Standing capsule
    pub capsule: CapsuleDims,
    /// Radius of the rolling head sphere
    pub head_radius: f32,
    /// Height of the head point above the root when upright
    pub head_height: f32,
    /// Gap left above the ground when standing back up
    pub stand_clearance: f32,
    /// Layers that block standing up
    pub obstacle_layers: LayerMask,
    /// Highest camera pitch
    pub top_clamp: f32,
    /// Lowest camera pitch
    pub bottom_clamp: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            move_speed: 2.0,
            speed_change_rate: 10.0,
            roll_speed: 2.0,
            rolling_speed_change_rate: 6.0,
            aerial_speed_change_rate: 3.0,
            vertical: VerticalTuning::default(),
            roll_timeout: 0.5,
            roll_exit_time: 0.25,
            collision_discrepancy: 1.0,
            probe: GroundProbe::default(),
            slope: SlopeTuning::default(),
            capsule: CapsuleDims::default(),
            head_radius: 0.25,
            head_height: 1.55,
            stand_clearance: 0.05,
            obstacle_layers: LayerMask::GROUND,
            top_clamp: 70.0,
            bottom_clamp: -30.0,
        }
    }
}

impl LocomotionConfig {
    /// Rejects tuning the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::ensure_positive("move_speed", self.move_speed)?;
        ConfigError::ensure_positive("speed_change_rate", self.speed_change_rate)?;
        ConfigError::ensure_positive("roll_speed", self.roll_speed)?;
        ConfigError::ensure_positive("rolling_speed_change_rate", self.rolling_speed_change_rate)?;
        ConfigError::ensure_positive("aerial_speed_change_rate", self.aerial_speed_change_rate)?;
        ConfigError::ensure_positive("terminal_velocity", self.vertical.terminal_velocity)?;
        ConfigError::ensure_positive("gravity (downward)", -self.vertical.gravity)?;
        ConfigError::ensure_positive("roll_exit_time", self.roll_exit_time)?;
        ConfigError::ensure_positive("collision_discrepancy", self.collision_discrepancy)?;
        ConfigError::ensure_positive("head_radius", self.head_radius)?;
        ConfigError::ensure_positive("capsule.radius", self.capsule.radius)?;
        ConfigError::ensure_positive("capsule.height", self.capsule.height)?;
        ConfigError::ensure_positive("grounded_radius", self.probe.grounded_radius)?;
        ConfigError::ensure_positive("rolling_grounded_radius", self.probe.rolling_grounded_radius)?;
        ConfigError::ensure_positive("max_bonus_speed", self.slope.max_bonus_speed)?;
        ConfigError::ensure_range("camera pitch", self.bottom_clamp, self.top_clamp)?;
        Ok(())
    }

    fn rolling_collider(&self) -> ColliderShape {
        ColliderShape::sphere(self.head_radius, self.head_height)
    }

    fn standing_collider(&self) -> ColliderShape {
        ColliderShape {
            radius: self.capsule.radius,
            height: self.capsule.height,
            center_y: self.capsule.center_y,
        }
    }
}

/// Outcome of the stand-up probe.
enum StandUp {
    /// Capsule fits; root goes to the ground point when one was found
    Clear(Option<Vec3>),
    /// An obstacle occupies the standing volume
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RollExit {
    progress: f32,
    from: Quat,
    to: Quat,
    stand_point: Option<Vec3>,
}

/// State machine driving the avatar body.
pub struct LocomotionController {
    id: EntityId,
    config: LocomotionConfig,
    body: AvatarBody,
    state: LocomotionState,
    sampler: GroundSampler,
    ground: GroundContact,
    horizontal: Vec3,
    vertical: VerticalMotion,
    bonus: Vec3,
    applied_velocity: Vec3,
    target_yaw: f32,
    animation_blend: f32,
    roll_timer: f32,
    exit: Option<RollExit>,
    orbit: CameraOrbit,
    accepts_input: bool,
    incapacitation: Option<Incapacitation>,
    held: bool,
    animator: Option<Box<dyn AnimationSignaler>>,
    events: Vec<LocomotionEvent>,
}

impl std::fmt::Debug for LocomotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocomotionController")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("position", &self.body.position())
            .field("ground", &self.ground)
            .field("accepts_input", &self.accepts_input)
            .field("incapacitation", &self.incapacitation)
            .finish_non_exhaustive()
    }
}

impl LocomotionController {
    /// Creates a walking avatar at `position` with default tuning.
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self::build(position, LocomotionConfig::default())
    }

    /// Creates a walking avatar with custom tuning.
    pub fn with_config(position: Vec3, config: LocomotionConfig) -> LocomotionResult<Self> {
        config.validate()?;
        Ok(Self::build(position, config))
    }

    fn build(position: Vec3, config: LocomotionConfig) -> Self {
        Self {
            id: EntityId::new(),
            body: AvatarBody::new(position, config.head_height),
            state: LocomotionState::Walking,
            sampler: GroundSampler::new(config.probe),
            ground: GroundContact::default(),
            horizontal: Vec3::ZERO,
            vertical: VerticalMotion::new(&config.vertical),
            bonus: Vec3::ZERO,
            applied_velocity: Vec3::ZERO,
            target_yaw: 0.0,
            animation_blend: 0.0,
            roll_timer: config.roll_timeout,
            exit: None,
            orbit: CameraOrbit::new(config.top_clamp, config.bottom_clamp),
            accepts_input: true,
            incapacitation: None,
            held: false,
            animator: None,
            events: Vec::new(),
            config,
        }
    }

    /// Attaches an animator; signals are only emitted when one is present.
    #[must_use]
    pub fn with_animator(mut self, animator: Box<dyn AnimationSignaler>) -> Self {
        self.animator = Some(animator);
        self
    }

    /// Entity ID of the avatar.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Tuning.
    #[must_use]
    pub fn config(&self) -> &LocomotionConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LocomotionState {
        self.state
    }

    /// Checks whether the dynamic sphere is driving the body.
    #[must_use]
    pub fn is_rolling(&self) -> bool {
        self.state != LocomotionState::Walking
    }

    /// The avatar body.
    #[must_use]
    pub fn body(&self) -> &AvatarBody {
        &self.body
    }

    /// Root position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.body.position()
    }

    /// Teleports the root.
    pub fn set_position(&mut self, position: Vec3) {
        self.body.set_position(position);
    }

    /// Head point.
    #[must_use]
    pub fn head_point(&self) -> Vec3 {
        self.body.head_point()
    }

    /// Latest ground sample.
    #[must_use]
    pub fn ground(&self) -> &GroundContact {
        &self.ground
    }

    /// Velocity components.
    #[must_use]
    pub fn velocity(&self) -> VelocityState {
        VelocityState {
            horizontal: self.horizontal,
            vertical: self.vertical.velocity,
            bonus: self.bonus,
        }
    }

    /// Remaining roll cooldown in seconds.
    #[must_use]
    pub fn roll_cooldown(&self) -> f32 {
        self.roll_timer
    }

    /// Progress of the stand-up interpolation, if exiting a roll.
    #[must_use]
    pub fn exit_progress(&self) -> Option<f32> {
        self.exit.map(|exit| exit.progress)
    }

    /// Whether input is accepted.
    #[must_use]
    pub fn accepts_input(&self) -> bool {
        self.accepts_input
    }

    /// Active incapacitation.
    #[must_use]
    pub fn incapacitation(&self) -> Option<Incapacitation> {
        self.incapacitation
    }

    /// Whether the body is being held by a grab.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Orbit camera target.
    #[must_use]
    pub fn orbit(&self) -> &CameraOrbit {
        &self.orbit
    }

    /// Mutable orbit camera target.
    pub fn orbit_mut(&mut self) -> &mut CameraOrbit {
        &mut self.orbit
    }

    /// Takes the notifications raised since the last call.
    pub fn drain_events(&mut self) -> Vec<LocomotionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Enables or disables input. Re-enabling also lifts any incapacitation.
    pub fn toggle_player_control(&mut self, enabled: bool) {
        self.accepts_input = enabled;
        if enabled {
            self.incapacitation = None;
        }
        debug!(id = %self.id, enabled, "Player control toggled");
    }

    /// Disables input and applies `mode`.
    pub fn incapacitate(&mut self, mode: Incapacitation) {
        self.toggle_player_control(false);
        self.incapacitation = Some(mode);
        match mode {
            Incapacitation::Freeze => self.set_velocity(Vec3::ZERO),
            Incapacitation::ForcedRoll => self.force_roll(),
        }
    }

    /// Forces the avatar into a roll and restarts the roll cooldown.
    ///
    /// Enter-roll side effects only happen from Walking; while already
    /// rolling or standing up only the cooldown is reset.
    pub fn force_roll(&mut self) {
        if self.state == LocomotionState::Walking {
            self.enter_roll();
        }
        self.roll_timer = self.config.roll_timeout;
    }

    /// Adds to the current velocity.
    pub fn add_velocity(&mut self, velocity: Vec3) {
        self.horizontal += math::horizontal(velocity);
        self.vertical.velocity += velocity.y;
        if let Some(body) = self.body.dynamic_mut() {
            body.velocity += velocity;
            self.applied_velocity = body.velocity;
        }
    }

    /// Replaces the current velocity, dropping any slope bonus.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.horizontal = math::horizontal(velocity);
        self.vertical.velocity = velocity.y;
        self.bonus = Vec3::ZERO;
        if let Some(body) = self.body.dynamic_mut() {
            body.velocity = velocity;
            self.applied_velocity = velocity;
        }
    }

    /// Grabs the avatar: forces a roll, stops it and pins its head at `hand`.
    pub fn grab(&mut self, hand: Vec3) {
        self.force_roll();
        self.set_velocity(Vec3::ZERO);
        self.held = true;
        self.hold_at(hand);
        self.ground = GroundContact::airborne();
    }

    /// Moves a held avatar so its head sits at `hand`.
    pub fn hold_at(&mut self, hand: Vec3) {
        if self.held {
            let offset = self.body.head_point() - self.body.position();
            self.body.set_position(hand - offset);
        }
    }

    /// Releases a grab.
    pub fn release(&mut self) {
        self.held = false;
    }

    /// Accumulates look input into the orbit target.
    pub fn update_camera(&mut self, look: Vec2, dt: f32) {
        self.orbit.apply_look(look, dt);
    }

    /// Frame tick. `input` is `Some` only for the current input owner.
    pub fn tick(&mut self, input: Option<&mut InputState>, world: &dyn PhysicsQuery, dt: f32) {
        if self.held || self.incapacitation == Some(Incapacitation::Freeze) {
            return;
        }

        if self.state == LocomotionState::ExitingRoll {
            self.advance_roll_exit(dt);
            return;
        }

        let mut idle = InputState::default();
        let input = match input {
            Some(input) if self.accepts_input => input,
            _ => &mut idle,
        };

        self.roll_check(input, world, dt);
        if self.state == LocomotionState::ExitingRoll {
            return;
        }

        self.integrate_vertical(input, dt);
        self.sample_ground(world, dt);
        if self.state == LocomotionState::Rolling {
            self.reconcile_collision();
        }
        self.integrate_horizontal(input, dt);
        self.apply_movement(world, dt);
        self.update_orientation();
    }

    /// Fixed tick: integrates the dynamic body while rolling or standing up.
    pub fn fixed_tick(&mut self, world: &dyn PhysicsQuery, dt: f32) {
        if self.held
            || self.incapacitation == Some(Incapacitation::Freeze)
            || self.state == LocomotionState::Walking
        {
            return;
        }
        self.body
            .integrate_dynamic(world, dt, self.config.probe.ground_layers);
    }

    fn roll_check(&mut self, input: &mut InputState, world: &dyn PhysicsQuery, dt: f32) {
        if input.roll && self.roll_timer <= 0.0 {
            match self.state {
                LocomotionState::Rolling => match self.stand_up_check(world) {
                    StandUp::Clear(stand_point) => self.begin_roll_exit(stand_point),
                    StandUp::Blocked => {
                        input.roll = false;
                        debug!(id = %self.id, "Roll exit blocked, standing capsule does not fit");
                        self.events.push(LocomotionEvent::RollExitBlocked);
                        return;
                    }
                },
                LocomotionState::Walking => self.enter_roll(),
                LocomotionState::ExitingRoll => return,
            }
            self.roll_timer = self.config.roll_timeout;
        }

        if self.roll_timer >= 0.0 {
            input.roll = false;
            self.roll_timer -= dt;
        }
    }

    /// Probes the standing capsule above the ground point under the head.
    fn stand_up_check(&self, world: &dyn PhysicsQuery) -> StandUp {
        let capsule = &self.config.capsule;
        let head = self.body.head_point();
        let Some(hit) = world.raycast(head, Vec3::NEG_Y, capsule.height, self.config.obstacle_layers)
        else {
            return StandUp::Clear(None);
        };

        let bottom = hit.point + Vec3::Y * self.config.stand_clearance;
        let blocked = world.overlap_capsule(
            bottom + Vec3::Y * capsule.radius,
            bottom + Vec3::Y * (capsule.height - capsule.radius),
            capsule.radius,
            self.config.obstacle_layers,
        );
        if blocked {
            StandUp::Blocked
        } else {
            StandUp::Clear(Some(bottom))
        }
    }

    fn enter_roll(&mut self) {
        self.state = LocomotionState::Rolling;
        self.body.make_dynamic(self.config.rolling_collider());
        self.applied_velocity = self.body.velocity();
        info!(id = %self.id, "Entered roll");
        self.events.push(LocomotionEvent::RollEntered);
    }

    fn begin_roll_exit(&mut self, stand_point: Option<Vec3>) {
        self.state = LocomotionState::ExitingRoll;
        self.exit = Some(RollExit {
            progress: 0.0,
            from: self.body.rotation(),
            to: math::yaw_rotation(self.target_yaw),
            stand_point,
        });
        debug!(id = %self.id, "Standing up from roll");
        self.events.push(LocomotionEvent::RollExitStarted);
    }

    fn advance_roll_exit(&mut self, dt: f32) {
        let Some(mut exit) = self.exit else {
            self.finish_roll_exit(None);
            return;
        };

        if let Some(body) = self.body.dynamic_mut() {
            body.velocity = Vec3::ZERO;
            body.angular_velocity = Vec3::ZERO;
        }

        exit.progress = (exit.progress + dt / self.config.roll_exit_time).min(1.0);

        let collider = self
            .config
            .rolling_collider()
            .lerp(&self.config.standing_collider(), exit.progress);
        if let Some(body) = self.body.dynamic_mut() {
            body.collider = collider;
        }

        let target = exit.from.slerp(exit.to, exit.progress);
        let delta = target * self.body.rotation().inverse();
        self.body.rotate_around_head(delta);

        if exit.progress >= 1.0 {
            self.finish_roll_exit(exit.stand_point);
        } else {
            self.exit = Some(exit);
        }
    }

    fn finish_roll_exit(&mut self, stand_point: Option<Vec3>) {
        self.body.make_kinematic();
        if let Some(exit) = self.exit {
            self.body.set_rotation(exit.to);
        }
        if let Some(point) = stand_point {
            self.body.set_position(point);
        }
        self.exit = None;
        self.bonus = Vec3::ZERO;
        self.state = LocomotionState::Walking;
        info!(id = %self.id, "Exited roll");
        self.events.push(LocomotionEvent::RollExited);
    }

    fn integrate_vertical(&mut self, input: &mut InputState, dt: f32) {
        let signals =
            self.vertical
                .integrate(&self.config.vertical, self.ground.grounded, &mut input.jump, dt);

        if let Some(animator) = self.animator.as_mut() {
            if signals.grounded {
                animator.set_bool(params::JUMP, signals.jumped);
                animator.set_bool(params::FREE_FALL, false);
            } else if signals.free_fall {
                animator.set_bool(params::FREE_FALL, true);
            }
        }
    }

    fn sample_ground(&mut self, world: &dyn PhysicsQuery, dt: f32) {
        self.ground = match self.state {
            LocomotionState::Rolling => {
                let contact =
                    self.sampler
                        .sample_rolling(world, self.body.head_point(), self.config.head_radius);
                let pull = SlopeTuning::vertical_pull(
                    self.config.vertical.gravity,
                    self.vertical.velocity,
                );
                self.bonus =
                    self.config
                        .slope
                        .update_bonus(self.bonus, &contact, pull, self.horizontal, dt);
                contact
            }
            _ => self.sampler.sample_walking(world, self.body.position()),
        };

        if let Some(animator) = self.animator.as_mut() {
            animator.set_bool(params::GROUNDED, self.ground.grounded);
        }
    }

    /// Adopts the simulated velocity when a collision bent it away from what
    /// was applied last tick.
    fn reconcile_collision(&mut self) {
        let actual = self.body.velocity();
        let actual_h = math::horizontal(actual);
        let discrepancy = actual_h.distance(math::horizontal(self.applied_velocity));
        if discrepancy <= self.config.collision_discrepancy {
            return;
        }

        // Keep only the part of the bonus still pointing along the new heading
        self.bonus = match actual_h.try_normalize() {
            Some(dir) => dir * self.bonus.dot(dir).clamp(0.0, actual_h.length()),
            None => Vec3::ZERO,
        };
        self.horizontal = actual_h - self.bonus;
        self.vertical.velocity = actual.y;
        debug!(id = %self.id, discrepancy, "Rolling collision reconciled");
    }

    fn integrate_horizontal(&mut self, input: &InputState, dt: f32) {
        let rolling = self.state == LocomotionState::Rolling;
        let mut target_speed = if rolling {
            self.config.roll_speed
        } else {
            self.config.move_speed
        };
        if !input.has_movement() {
            target_speed = 0.0;
        }

        let rate = match (self.ground.grounded, rolling) {
            (true, true) => self.config.rolling_speed_change_rate,
            (true, false) => self.config.speed_change_rate,
            (false, _) => self.config.aerial_speed_change_rate,
        };

        if input.has_movement() {
            let direction = Vec3::new(input.move_axis.x, 0.0, input.move_axis.y);
            self.target_yaw = math::yaw_of(direction) + self.orbit.yaw();
        }

        let target = math::yaw_forward(self.target_yaw) * target_speed;
        self.horizontal = math::move_towards(self.horizontal, target, dt * rate);

        let blend = (dt * rate).min(1.0);
        self.animation_blend += (target_speed - self.animation_blend) * blend;

        if let Some(animator) = self.animator.as_mut() {
            animator.set_float(params::SPEED, self.animation_blend);
            animator.set_float(params::MOTION_SPEED, input.input_magnitude());
        }
    }

    fn apply_movement(&mut self, world: &dyn PhysicsQuery, dt: f32) {
        let vertical = Vec3::Y * self.vertical.velocity;
        match self.state {
            LocomotionState::Rolling => {
                let velocity = self.horizontal + self.bonus + vertical;
                if let Some(body) = self.body.dynamic_mut() {
                    body.velocity = velocity;
                }
                self.applied_velocity = velocity;
            }
            LocomotionState::Walking => {
                self.body.move_kinematic(
                    world,
                    (self.horizontal + vertical) * dt,
                    &self.config.capsule,
                    self.config.probe.ground_layers,
                    dt,
                );
            }
            LocomotionState::ExitingRoll => {}
        }
    }

    fn update_orientation(&mut self) {
        if self.state != LocomotionState::Walking {
            return;
        }
        if let Some(rotation) = math::look_rotation(self.horizontal) {
            self.body.set_rotation(rotation);
        }
    }
}
