//! Hostile agents.
//!
//! Every hostile actor is one [`HostileAgent`] composed from a
//! [`MovementStrategy`] (mobile or stationary) and an [`AbilityStrategy`]
//! (what its two abilities do on their hit frames). The agent runs the
//! shared state machine:
//!
//! ```text
//! Idle/Wander --target near--> Aggro --too far--> Leash
//!                                |  ^
//!                   can attack   v  | clip finished
//!                              Attacking
//! any autonomous state --possession--> Possessed <-> PossessedAttacking
//! ```
//!
//! Abilities are not coroutines: starting one fires its animator trigger and
//! enters [`AbilityPhase::AwaitingAbilityCompletion`], polled on later ticks
//! until the animator reports idle with the trigger flag cleared.
//!
//! The agent never reaches into the player or other agents. Everything its
//! abilities do to the outside world comes back from [`HostileAgent::tick`]
//! as [`AgentCommand`]s that the scene applies.

mod abilities;
mod mobile;
mod presets;
mod stationary;

pub use abilities::{
    BroomAbilities, GrabThrowAbilities, Hitbox, Impulse, ImpulseTable, ThrowForces,
};
pub use mobile::{MobileMovement, MobileTuning};
pub use presets::{broom, broom_animator, haunted_tree, haunted_tree_animator};
pub use stationary::{StationaryMovement, StationaryTuning};

use glam::{Quat, Vec2, Vec3};
use poltergeist_common::{math, AbilitySlot, ConfigError, EntityId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::animation::{params, AnimationEvent, AnimationSignaler};
use crate::camera::CameraOrbit;
use crate::input::InputState;
use crate::locomotion::Incapacitation;
use crate::physics::PhysicsQuery;

/// Errors raised when assembling an agent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    /// A required collaborator was not supplied
    #[error("agent is missing its {0}")]
    MissingCollaborator(&'static str),

    /// Tuning values were rejected
    #[error("invalid agent config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Result type for agent construction.
pub type AgentResult<T> = Result<T, AgentError>;

/// State of a hostile agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostileState {
    /// Standing still
    Idle,
    /// Roaming around the spawn point
    Wander,
    /// Chasing or facing the target
    Aggro,
    /// Returning to the spawn point
    Leash,
    /// Playing an ability
    Attacking,
    /// Driven by player input
    Possessed,
    /// Playing an ability under player input
    PossessedAttacking,
}

impl HostileState {
    /// Checks whether the player controls the agent.
    #[must_use]
    pub const fn is_possessed(self) -> bool {
        matches!(self, Self::Possessed | Self::PossessedAttacking)
    }

    /// Checks whether an ability is playing.
    #[must_use]
    pub const fn is_attacking(self) -> bool {
        matches!(self, Self::Attacking | Self::PossessedAttacking)
    }
}

/// Behavior tuning shared by every agent kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostileConfig {
    /// Distance at which the target is noticed
    pub aggro_radius: f32,
    /// Distance at which the agent gives up
    pub leash_radius: f32,
    /// Shortest pause between attacks
    pub min_attack_delay: f32,
    /// Longest pause between attacks
    pub max_attack_delay: f32,
    /// Chance of picking the primary ability
    pub ability_ratio: f32,
    /// Possess the player on contact instead of only through ability hits
    pub possess_on_touch: bool,
    /// Contact distance for touch possession
    pub touch_radius: f32,
    /// Radius of the agent's body proxy
    pub body_radius: f32,
    /// What happens to the player's body while this agent is possessed
    pub incapacitation: Incapacitation,
    /// Environmental agents are never destroyed, only released
    pub environmental: bool,
}

impl Default for HostileConfig {
    fn default() -> Self {
        Self {
            aggro_radius: 10.0,
            leash_radius: 20.0,
            min_attack_delay: 1.0,
            max_attack_delay: 2.0,
            ability_ratio: 0.5,
            possess_on_touch: false,
            touch_radius: 1.0,
            body_radius: 0.5,
            incapacitation: Incapacitation::ForcedRoll,
            environmental: false,
        }
    }
}

impl HostileConfig {
    /// Rejects impossible tuning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::ensure_positive("aggro_radius", self.aggro_radius)?;
        ConfigError::ensure_positive("leash_radius", self.leash_radius)?;
        ConfigError::ensure_range("attack_delay", self.min_attack_delay, self.max_attack_delay)?;
        ConfigError::ensure_ratio("ability_ratio", self.ability_ratio)?;
        ConfigError::ensure_positive("touch_radius", self.touch_radius)?;
        ConfigError::ensure_positive("body_radius", self.body_radius)?;
        Ok(())
    }

    /// Random pause before the next attack.
    pub fn roll_attack_delay(&self, rng: &mut fastrand::Rng) -> f32 {
        self.min_attack_delay + (self.max_attack_delay - self.min_attack_delay) * rng.f32()
    }
}

/// Picks the next ability.
///
/// A roll landing on the ability used last time is rerolled once; the second
/// roll is final, so repeats stay possible.
pub fn choose_ability(
    ratio: f32,
    last: Option<AbilitySlot>,
    rng: &mut fastrand::Rng,
) -> AbilitySlot {
    let pick = |value: f32| {
        if value < ratio {
            AbilitySlot::Primary
        } else {
            AbilitySlot::Secondary
        }
    };

    let first = pick(rng.f32());
    if Some(first) == last {
        pick(rng.f32())
    } else {
        first
    }
}

/// Position and facing of an agent. Agents always stand upright.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentPose {
    /// Root position
    pub position: Vec3,
    /// Facing in degrees
    pub yaw: f32,
    /// Point the agent returns to when leashed
    pub spawn: Vec3,
}

impl AgentPose {
    /// Pose standing at `position`, which also becomes the spawn point.
    #[must_use]
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            yaw,
            spawn: position,
        }
    }

    /// Upright rotation.
    #[must_use]
    pub fn rotation(&self) -> Quat {
        math::yaw_rotation(self.yaw)
    }

    /// Forward unit vector.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        math::yaw_forward(self.yaw)
    }

    /// Turns to face `direction`. Vertical or zero directions are ignored.
    pub fn face(&mut self, direction: Vec3) {
        if math::horizontal(direction).length_squared() > f32::EPSILON {
            self.yaw = math::yaw_of(direction);
        }
    }

    /// Point at `local` offset in the agent's frame.
    #[must_use]
    pub fn local_to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation() * local
    }
}

/// Per-tick inputs handed to a movement strategy.
pub struct MovementContext<'a> {
    /// Agent state at the time of the update
    pub state: HostileState,
    /// Position of whatever the player controls
    pub target: Vec3,
    /// World probes
    pub physics: &'a dyn PhysicsQuery,
    /// Player input, present only while possessed
    pub input: Option<&'a InputState>,
    /// Yaw of the agent's orbit camera
    pub camera_yaw: f32,
    /// Scene random source
    pub rng: &'a mut fastrand::Rng,
    /// Frame delta
    pub dt: f32,
}

/// How an agent moves.
pub trait MovementStrategy: Send {
    /// State a freshly built agent starts in.
    fn default_state(&self) -> HostileState;

    /// State entered when a spawner places the agent.
    fn initialize(&mut self, pose: &mut AgentPose) -> HostileState;

    /// Moves the agent for one frame. Returns a state to switch to, if any.
    fn update(&mut self, pose: &mut AgentPose, ctx: &mut MovementContext<'_>)
        -> Option<HostileState>;

    /// Extra attack condition on top of the cooldown.
    fn can_attack(&self, pose: &AgentPose, target: Vec3) -> bool;

    /// Whether the agent should give up the chase.
    fn should_leash(&self, pose: &AgentPose, target: Vec3, leash_radius: f32) -> bool {
        target.distance(pose.position) > leash_radius
    }

    /// Switches from autonomous driving to player input.
    fn on_possessed(&mut self, pose: &AgentPose);

    /// Switches back to autonomous driving.
    fn on_unpossessed(&mut self, pose: &AgentPose);

    /// Animator movement speed, if the strategy reports one.
    fn move_speed_ratio(&self, _possessed: bool) -> Option<f32> {
        None
    }

    /// Velocity to push a rolling target with during the fixed tick.
    fn push_velocity(
        &self,
        _pose: &AgentPose,
        _target: Vec3,
        _target_radius: f32,
        _fixed_dt: f32,
    ) -> Option<Vec3> {
        None
    }
}

/// Everything an ability's hit frame can see.
pub struct AbilityContext<'a> {
    /// Agent using the ability
    pub agent: EntityId,
    /// Its pose
    pub pose: &'a AgentPose,
    /// Whether it is possessed
    pub possessed: bool,
    /// Body the player currently controls
    pub controlled: EntityId,
    /// World probes
    pub physics: &'a dyn PhysicsQuery,
    /// Direction the agent's camera looks
    pub camera_forward: Vec3,
}

/// Result of an ability hit frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbilityOutcome {
    /// Effects on other entities
    pub commands: Vec<AgentCommand>,
    /// The ability grabbed the player and wants to chain into a throw
    pub grabbed: bool,
}

/// What an agent's abilities do.
pub trait AbilityStrategy: Send {
    /// Primary ability hit frame.
    fn trigger_ability1(&mut self, ctx: &AbilityContext<'_>) -> AbilityOutcome;

    /// Secondary ability hit frame.
    fn trigger_ability2(&mut self, ctx: &AbilityContext<'_>) -> AbilityOutcome;

    /// Release frame of a throw. Only grabbing strategies have one.
    fn throw(&mut self, _ctx: &AbilityContext<'_>) -> Vec<AgentCommand> {
        Vec::new()
    }

    /// Where a grabbed body is held, if one is.
    fn hold_point(&self, _pose: &AgentPose) -> Option<Vec3> {
        None
    }
}

/// How an impulse combines with the existing velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VelocityMode {
    /// Added to the current velocity
    Add,
    /// Replaces the current velocity
    Set,
}

/// Effect of an agent on the rest of the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentCommand {
    /// Possess `agent` with the player
    Possess {
        /// Agent taking control
        agent: EntityId,
    },
    /// Kill an agent (possibly the issuer)
    Kill {
        /// Agent to kill
        target: EntityId,
    },
    /// Interact with an interactible
    Interact {
        /// Interactible hit
        target: EntityId,
        /// Agent that hit it
        invoker: EntityId,
    },
    /// Knock the player body away
    Knockback {
        /// Impulse
        velocity: Vec3,
        /// Add or replace
        mode: VelocityMode,
        /// Force a roll first
        force_roll: bool,
    },
    /// Grab the player body
    Grab {
        /// Where the head is held
        hand: Vec3,
    },
    /// Keep a grabbed player body at the hand
    Hold {
        /// Where the head is held
        hand: Vec3,
    },
    /// Release and throw a grabbed player body
    Throw {
        /// Agent throwing
        thrower: EntityId,
        /// Launch velocity
        velocity: Vec3,
        /// Release possession of the thrower first
        unpossess: bool,
    },
}

/// Clip an agent is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityClip {
    /// One of the two abilities
    Slot(AbilitySlot),
    /// Throw chained from a grab
    Throw,
}

impl AbilityClip {
    /// Animator trigger / flag of the clip.
    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::Slot(slot) => slot.animator_flag(),
            Self::Throw => params::THROW,
        }
    }
}

/// Ability progress of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityPhase {
    /// No ability running
    Ready,
    /// Waiting for the clip to finish
    AwaitingAbilityCompletion {
        /// Clip playing
        ability: AbilityClip,
        /// Flag that must be cleared
        flag: &'static str,
        /// Tick the clip started on; never polled on that tick
        started_at_tick: u64,
    },
    /// Holding a grabbed body until the possessing player throws it
    Aiming,
}

/// Frame inputs for [`HostileAgent::tick`].
pub struct AgentFrame<'a> {
    /// Frame counter
    pub tick: u64,
    /// Frame delta
    pub dt: f32,
    /// Position of whatever the player controls
    pub target: Vec3,
    /// Entity the player controls
    pub controlled: EntityId,
    /// World probes
    pub physics: &'a dyn PhysicsQuery,
    /// Scene random source
    pub rng: &'a mut fastrand::Rng,
    /// Shared input, present only when this agent owns it
    pub input: Option<&'a mut InputState>,
}

/// A hostile actor.
pub struct HostileAgent {
    id: EntityId,
    name: String,
    config: HostileConfig,
    pose: AgentPose,
    state: HostileState,
    attack_timer: f32,
    last_ability: Option<AbilitySlot>,
    phase: AbilityPhase,
    movement: Option<Box<dyn MovementStrategy>>,
    abilities: Option<Box<dyn AbilityStrategy>>,
    animator: Option<Box<dyn AnimationSignaler>>,
    orbit: CameraOrbit,
    destroyed: bool,
    transitions: Vec<(HostileState, HostileState)>,
}

impl std::fmt::Debug for HostileAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostileAgent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("pose", &self.pose)
            .field("phase", &self.phase)
            .field("inert", &self.is_inert())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`HostileAgent`].
pub struct HostileAgentBuilder {
    name: String,
    config: HostileConfig,
    pose: AgentPose,
    movement: Option<Box<dyn MovementStrategy>>,
    abilities: Option<Box<dyn AbilityStrategy>>,
    animator: Option<Box<dyn AnimationSignaler>>,
}

impl HostileAgentBuilder {
    /// Starts a builder for an agent standing at `position`.
    #[must_use]
    pub fn new(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            config: HostileConfig::default(),
            pose: AgentPose::new(position, 0.0),
            movement: None,
            abilities: None,
            animator: None,
        }
    }

    /// Sets the tuning.
    #[must_use]
    pub fn config(mut self, config: HostileConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the initial facing.
    #[must_use]
    pub fn facing(mut self, yaw: f32) -> Self {
        self.pose.yaw = yaw;
        self
    }

    /// Sets the movement strategy.
    #[must_use]
    pub fn movement(mut self, movement: Box<dyn MovementStrategy>) -> Self {
        self.movement = Some(movement);
        self
    }

    /// Sets the ability strategy.
    #[must_use]
    pub fn abilities(mut self, abilities: Box<dyn AbilityStrategy>) -> Self {
        self.abilities = Some(abilities);
        self
    }

    /// Sets the animator.
    #[must_use]
    pub fn animator(mut self, animator: Box<dyn AnimationSignaler>) -> Self {
        self.animator = Some(animator);
        self
    }

    /// Builds the agent, failing on a missing collaborator or bad tuning.
    pub fn try_build(self) -> AgentResult<HostileAgent> {
        self.config.validate()?;
        if self.movement.is_none() {
            return Err(AgentError::MissingCollaborator("movement strategy"));
        }
        if self.abilities.is_none() {
            return Err(AgentError::MissingCollaborator("ability strategy"));
        }
        if self.animator.is_none() {
            return Err(AgentError::MissingCollaborator("animator"));
        }
        Ok(self.assemble())
    }

    /// Builds the agent. A missing collaborator is logged and leaves the
    /// agent inert; rejected tuning falls back to the defaults.
    #[must_use]
    pub fn build(mut self) -> HostileAgent {
        if let Err(err) = self.config.validate() {
            warn!(name = %self.name, %err, "Rejected agent config, using defaults");
            self.config = HostileConfig::default();
        }
        for (missing, what) in [
            (self.movement.is_none(), "movement strategy"),
            (self.abilities.is_none(), "ability strategy"),
            (self.animator.is_none(), "animator"),
        ] {
            if missing {
                error!(name = %self.name, "Agent is missing its {what}; it will stay inert");
            }
        }
        self.assemble()
    }

    fn assemble(self) -> HostileAgent {
        let state = self
            .movement
            .as_ref()
            .map_or(HostileState::Idle, |m| m.default_state());
        let mut orbit = CameraOrbit::default();
        orbit.set(self.pose.yaw, 0.0);
        HostileAgent {
            id: EntityId::new(),
            name: self.name,
            config: self.config,
            pose: self.pose,
            state,
            attack_timer: 0.0,
            last_ability: None,
            phase: AbilityPhase::Ready,
            movement: self.movement,
            abilities: self.abilities,
            animator: self.animator,
            orbit,
            destroyed: false,
            transitions: Vec::new(),
        }
    }
}

impl HostileAgent {
    /// Entity ID.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tuning.
    #[must_use]
    pub fn config(&self) -> &HostileConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HostileState {
        self.state
    }

    /// Pose.
    #[must_use]
    pub fn pose(&self) -> &AgentPose {
        &self.pose
    }

    /// Root position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    /// Teleports the agent.
    pub fn set_position(&mut self, position: Vec3) {
        self.pose.position = position;
    }

    /// Remaining attack cooldown.
    #[must_use]
    pub fn attack_cooldown(&self) -> f32 {
        self.attack_timer
    }

    /// Last ability started.
    #[must_use]
    pub fn last_ability(&self) -> Option<AbilitySlot> {
        self.last_ability
    }

    /// Ability progress.
    #[must_use]
    pub fn phase(&self) -> AbilityPhase {
        self.phase
    }

    /// Orbit camera target.
    #[must_use]
    pub fn orbit(&self) -> &CameraOrbit {
        &self.orbit
    }

    /// Checks whether the player controls this agent.
    #[must_use]
    pub fn is_possessed(&self) -> bool {
        self.state.is_possessed()
    }

    /// Checks whether a collaborator was missing at build time.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.movement.is_none() || self.abilities.is_none() || self.animator.is_none()
    }

    /// Checks whether the agent was killed and awaits removal.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Takes the state changes since the last call.
    pub fn drain_transitions(&mut self) -> Vec<(HostileState, HostileState)> {
        std::mem::take(&mut self.transitions)
    }

    /// Places a spawned agent: `spawn` becomes its home and it walks there.
    pub fn initialize(&mut self, spawn: Vec3) {
        self.pose.spawn = spawn;
        if let Some(movement) = self.movement.as_mut() {
            let next = movement.initialize(&mut self.pose);
            self.transition(next);
        }
    }

    /// Camera direction of the agent's orbit. Positive pitch looks down.
    #[must_use]
    pub fn camera_forward(&self) -> Vec3 {
        let rotation = Quat::from_euler(
            glam::EulerRot::YXZ,
            self.orbit.yaw().to_radians(),
            self.orbit.pitch().to_radians(),
            0.0,
        );
        rotation * Vec3::Z
    }

    fn transition(&mut self, next: HostileState) {
        if next == self.state {
            return;
        }
        debug!(id = %self.id, from = ?self.state, to = ?next, "Agent state changed");
        self.transitions.push((self.state, next));
        self.state = next;
    }

    /// Frame tick. Returns the effects to apply to the rest of the scene.
    pub fn tick(&mut self, frame: AgentFrame<'_>) -> Vec<AgentCommand> {
        let mut commands = Vec::new();
        if self.destroyed || self.is_inert() {
            return commands;
        }
        let AgentFrame {
            tick,
            dt,
            target,
            controlled,
            physics,
            rng,
            mut input,
        } = frame;

        if let Some(animator) = self.animator.as_mut() {
            animator.advance(dt);
        }

        if self.attack_timer > 0.0 {
            self.attack_timer = (self.attack_timer - dt).max(0.0);
        }

        if matches!(self.state, HostileState::Idle | HostileState::Wander)
            && target.distance(self.pose.position) < self.config.aggro_radius
        {
            self.transition(HostileState::Aggro);
        }

        if self.state == HostileState::Aggro {
            let should_leash = self.movement.as_ref().is_some_and(|m| {
                m.should_leash(&self.pose, target, self.config.leash_radius)
            });
            let can_attack = self.attack_timer <= 0.0
                && self
                    .movement
                    .as_ref()
                    .is_some_and(|m| m.can_attack(&self.pose, target));
            if should_leash {
                self.transition(HostileState::Leash);
            } else if can_attack {
                let slot = choose_ability(self.config.ability_ratio, self.last_ability, rng);
                if self.start_ability(AbilityClip::Slot(slot), tick) {
                    self.transition(HostileState::Attacking);
                    self.last_ability = Some(slot);
                }
            }
        }

        if self.state == HostileState::Possessed {
            if let Some(input) = input.as_deref_mut() {
                if input.ability1 {
                    input.ability1 = false;
                    if self.start_ability(AbilityClip::Slot(AbilitySlot::Primary), tick) {
                        self.transition(HostileState::PossessedAttacking);
                    }
                } else if input.ability2 {
                    input.ability2 = false;
                    if self.start_ability(AbilityClip::Slot(AbilitySlot::Secondary), tick) {
                        self.transition(HostileState::PossessedAttacking);
                    }
                } else if input.take_roll() {
                    info!(id = %self.id, "Possessed agent released by roll");
                    commands.push(AgentCommand::Kill { target: self.id });
                }
            }
        }

        if let Some(movement) = self.movement.as_mut() {
            let mut ctx = MovementContext {
                state: self.state,
                target,
                physics,
                input: input.as_deref(),
                camera_yaw: self.orbit.yaw(),
                rng: &mut *rng,
                dt,
            };
            if let Some(next) = movement.update(&mut self.pose, &mut ctx) {
                self.transition(next);
            }
        }

        self.handle_animation_events(controlled, physics, tick, &mut commands);

        if self.phase == AbilityPhase::Aiming {
            if let Some(input) = input.as_deref_mut() {
                let primary = input.take_ability1();
                let secondary = input.take_ability2();
                if primary || secondary {
                    self.start_ability(AbilityClip::Throw, tick);
                }
            }
        }

        self.poll_ability(tick, rng);

        if let Some(hand) = self.abilities.as_ref().and_then(|a| a.hold_point(&self.pose)) {
            commands.push(AgentCommand::Hold { hand });
        }

        let ratio = self
            .movement
            .as_ref()
            .and_then(|m| m.move_speed_ratio(self.is_possessed()));
        if let (Some(ratio), Some(animator)) = (ratio, self.animator.as_mut()) {
            animator.set_float(params::MOVE_SPEED, ratio);
        }

        commands
    }

    /// Fixed tick: velocity with which a possessed agent shoves the rolling
    /// player body at `target`.
    #[must_use]
    pub fn push_velocity(&self, target: Vec3, target_radius: f32, fixed_dt: f32) -> Option<Vec3> {
        if !self.is_possessed() || self.is_inert() || self.destroyed {
            return None;
        }
        self.movement
            .as_ref()
            .and_then(|m| m.push_velocity(&self.pose, target, target_radius, fixed_dt))
    }

    /// Camera stage: a possessed agent's orbit follows look input, otherwise
    /// it tracks the agent's facing.
    pub fn update_camera(&mut self, look: Option<Vec2>, dt: f32) {
        match look {
            Some(look) if self.is_possessed() => self.orbit.apply_look(look, dt),
            _ if self.is_possessed() => {}
            _ => self.orbit.set(self.pose.yaw, 0.0),
        }
    }

    /// Hands the agent to the player. Called by the possession coordinator.
    pub(crate) fn on_possessed(&mut self) {
        let next = if self.state == HostileState::Attacking {
            HostileState::PossessedAttacking
        } else {
            HostileState::Possessed
        };
        self.transition(next);
        if let Some(movement) = self.movement.as_mut() {
            movement.on_possessed(&self.pose);
        }
    }

    /// Returns the agent to autonomous control in Idle.
    pub(crate) fn on_unpossessed(&mut self) {
        self.transition(HostileState::Idle);
        if let Some(movement) = self.movement.as_mut() {
            movement.on_unpossessed(&self.pose);
        }
    }

    /// Marks the agent for removal. Environmental agents survive.
    ///
    /// Returns `true` if the agent was destroyed. Possession must already
    /// have been released by the caller.
    pub fn kill(&mut self) -> bool {
        if self.config.environmental {
            debug!(id = %self.id, "Environmental agent survives kill");
            return false;
        }
        if !self.destroyed {
            info!(id = %self.id, name = %self.name, "Agent destroyed");
        }
        self.destroyed = true;
        true
    }

    fn start_ability(&mut self, clip: AbilityClip, tick: u64) -> bool {
        let Some(animator) = self.animator.as_mut() else {
            return false;
        };
        animator.set_trigger(clip.flag());
        self.phase = AbilityPhase::AwaitingAbilityCompletion {
            ability: clip,
            flag: clip.flag(),
            started_at_tick: tick,
        };
        debug!(id = %self.id, ?clip, "Ability started");
        true
    }

    fn handle_animation_events(
        &mut self,
        controlled: EntityId,
        physics: &dyn PhysicsQuery,
        tick: u64,
        commands: &mut Vec<AgentCommand>,
    ) {
        let camera_forward = self.camera_forward();
        loop {
            let Some(event) = self.animator.as_mut().and_then(|a| a.poll_event()) else {
                break;
            };
            let Some(abilities) = self.abilities.as_mut() else {
                break;
            };
            let ctx = AbilityContext {
                agent: self.id,
                pose: &self.pose,
                possessed: self.state.is_possessed(),
                controlled,
                physics,
                camera_forward,
            };
            let outcome = match event {
                AnimationEvent::UseAbility1 => abilities.trigger_ability1(&ctx),
                AnimationEvent::UseAbility2 => abilities.trigger_ability2(&ctx),
                AnimationEvent::Throw => AbilityOutcome {
                    commands: abilities.throw(&ctx),
                    grabbed: false,
                },
            };
            commands.extend(outcome.commands);

            if outcome.grabbed {
                if self.state.is_possessed() {
                    debug!(id = %self.id, "Grabbed, aiming");
                    self.phase = AbilityPhase::Aiming;
                } else {
                    self.start_ability(AbilityClip::Throw, tick);
                }
            }
        }
    }

    fn poll_ability(&mut self, tick: u64, rng: &mut fastrand::Rng) {
        let AbilityPhase::AwaitingAbilityCompletion {
            flag,
            started_at_tick,
            ..
        } = self.phase
        else {
            return;
        };
        if tick <= started_at_tick {
            return;
        }
        let finished = self
            .animator
            .as_ref()
            .is_some_and(|a| a.is_idle_with_flag_cleared(flag));
        if finished {
            self.attack_ended(rng);
        }
    }

    fn attack_ended(&mut self, rng: &mut fastrand::Rng) {
        self.phase = AbilityPhase::Ready;
        if self.state.is_possessed() {
            self.transition(HostileState::Possessed);
        } else {
            self.transition(HostileState::Aggro);
            self.attack_timer = self.config.roll_attack_delay(rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{ClipTiming, SharedAnimator, TimedAnimator};
    use crate::pathfinding::StraightLineAgent;
    use crate::physics::StaticWorld;

    fn frame<'a>(
        tick: u64,
        target: Vec3,
        physics: &'a StaticWorld,
        rng: &'a mut fastrand::Rng,
        input: Option<&'a mut InputState>,
    ) -> AgentFrame<'a> {
        AgentFrame {
            tick,
            dt: 0.1,
            target,
            controlled: EntityId::NULL,
            physics,
            rng,
            input,
        }
    }

    fn stationary_agent(animator: SharedAnimator) -> HostileAgent {
        HostileAgentBuilder::new("test", Vec3::ZERO)
            .movement(Box::new(StationaryMovement::new(StationaryTuning::default())))
            .abilities(Box::new(BroomAbilities::default()))
            .animator(Box::new(animator))
            .build()
    }

    fn clips() -> SharedAnimator {
        SharedAnimator::new(
            TimedAnimator::new()
                .with_clip("Ability1", ClipTiming::plain(0.3))
                .with_clip("Ability2", ClipTiming::plain(0.3)),
        )
    }

    #[test]
    fn test_choose_ability_rerolls_once() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut repeats = 0;
        let mut last = None;
        for _ in 0..2000 {
            let slot = choose_ability(0.5, last, &mut rng);
            if Some(slot) == last {
                repeats += 1;
            }
            last = Some(slot);
        }
        // One reroll at an even ratio repeats about a quarter of the time
        assert!(repeats > 300 && repeats < 700, "repeats = {repeats}");
    }

    #[test]
    fn test_choose_ability_extreme_ratios() {
        let mut rng = fastrand::Rng::with_seed(1);
        for _ in 0..50 {
            assert_eq!(
                choose_ability(1.0, Some(AbilitySlot::Primary), &mut rng),
                AbilitySlot::Primary
            );
            assert_eq!(choose_ability(0.0, None, &mut rng), AbilitySlot::Secondary);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(HostileConfig::default().validate().is_ok());
        let bad = HostileConfig {
            min_attack_delay: 3.0,
            ..HostileConfig::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::InvertedRange { .. })));
    }

    #[test]
    fn test_missing_collaborator() {
        let err = HostileAgentBuilder::new("bare", Vec3::ZERO)
            .movement(Box::new(StationaryMovement::new(StationaryTuning::default())))
            .try_build()
            .expect_err("no abilities");
        assert_eq!(err, AgentError::MissingCollaborator("ability strategy"));

        let mut inert = HostileAgentBuilder::new("bare", Vec3::ZERO).build();
        assert!(inert.is_inert());
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(0);
        let commands = inert.tick(frame(1, Vec3::ZERO, &world, &mut rng, None));
        assert!(commands.is_empty());
        assert_eq!(inert.state(), HostileState::Idle);
    }

    #[test]
    fn test_aggro_only_inside_radius() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(0);
        let mut agent = stationary_agent(clips());

        agent.tick(frame(1, Vec3::new(0.0, 0.0, 15.0), &world, &mut rng, None));
        assert_eq!(agent.state(), HostileState::Idle);

        agent.tick(frame(2, Vec3::new(0.0, 0.0, 5.0), &world, &mut rng, None));
        assert_eq!(agent.state(), HostileState::Aggro);
    }

    #[test]
    fn test_attack_cycle_returns_to_aggro_with_cooldown() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(3);
        let animator = clips();
        let mut agent = stationary_agent(animator.clone());
        let target = Vec3::new(0.0, 0.0, 2.0);

        agent.tick(frame(1, target, &world, &mut rng, None));
        assert_eq!(agent.state(), HostileState::Attacking);
        assert!(matches!(
            agent.phase(),
            AbilityPhase::AwaitingAbilityCompletion { started_at_tick: 1, .. }
        ));
        assert!(agent.last_ability().is_some());

        let mut tick = 2;
        while agent.state() == HostileState::Attacking && tick < 20 {
            agent.tick(frame(tick, target, &world, &mut rng, None));
            tick += 1;
        }
        assert_eq!(agent.state(), HostileState::Aggro);
        let cooldown = agent.attack_cooldown();
        assert!((1.0..=2.0).contains(&cooldown), "cooldown = {cooldown}");
        assert_eq!(animator.with(TimedAnimator::triggers_fired), 1);
    }

    /// Animator that always reports idle.
    struct AlwaysIdle;

    impl AnimationSignaler for AlwaysIdle {
        fn set_trigger(&mut self, _name: &str) {}
        fn set_bool(&mut self, _name: &str, _value: bool) {}
        fn set_float(&mut self, _name: &str, _value: f32) {}
        fn is_idle_with_flag_cleared(&self, _flag: &str) -> bool {
            true
        }
        fn poll_event(&mut self) -> Option<AnimationEvent> {
            None
        }
    }

    #[test]
    fn test_ability_not_polled_on_start_tick() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(3);
        let mut agent = HostileAgentBuilder::new("test", Vec3::ZERO)
            .movement(Box::new(StationaryMovement::new(StationaryTuning::default())))
            .abilities(Box::new(BroomAbilities::default()))
            .animator(Box::new(AlwaysIdle))
            .build();
        let target = Vec3::new(0.0, 0.0, 2.0);

        agent.tick(frame(1, target, &world, &mut rng, None));
        assert_eq!(agent.state(), HostileState::Attacking);
        agent.tick(frame(2, target, &world, &mut rng, None));
        assert_eq!(agent.state(), HostileState::Aggro);
    }

    #[test]
    fn test_possessed_roll_requests_kill() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(0);
        let mut agent = stationary_agent(clips());
        agent.on_possessed();
        assert_eq!(agent.state(), HostileState::Possessed);

        let mut input = InputState {
            roll: true,
            ..InputState::default()
        };
        let commands = agent.tick(frame(1, Vec3::ZERO, &world, &mut rng, Some(&mut input)));
        assert!(commands.contains(&AgentCommand::Kill { target: agent.id() }));
        assert!(!input.roll);
    }

    #[test]
    fn test_possessed_ability_cycle() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(0);
        let mut agent = stationary_agent(clips());
        agent.on_possessed();

        let mut input = InputState {
            ability2: true,
            ..InputState::default()
        };
        agent.tick(frame(1, Vec3::ZERO, &world, &mut rng, Some(&mut input)));
        assert_eq!(agent.state(), HostileState::PossessedAttacking);
        assert!(!input.ability2);

        for tick in 2..10 {
            agent.tick(frame(tick, Vec3::ZERO, &world, &mut rng, Some(&mut input)));
        }
        assert_eq!(agent.state(), HostileState::Possessed);
        assert_eq!(agent.attack_cooldown(), 0.0);
    }

    #[test]
    fn test_possession_while_attacking_keeps_attack() {
        let world = StaticWorld::flat(0.0);
        let mut rng = fastrand::Rng::with_seed(3);
        let mut agent = stationary_agent(clips());
        agent.tick(frame(1, Vec3::new(0.0, 0.0, 2.0), &world, &mut rng, None));
        assert_eq!(agent.state(), HostileState::Attacking);

        agent.on_possessed();
        assert_eq!(agent.state(), HostileState::PossessedAttacking);
        agent.on_unpossessed();
        assert_eq!(agent.state(), HostileState::Idle);
    }

    #[test]
    fn test_kill_respects_environmental_flag() {
        let mut agent = stationary_agent(clips());
        assert!(agent.kill());
        assert!(agent.is_destroyed());

        let mut tree = HostileAgentBuilder::new("tree", Vec3::ZERO)
            .config(HostileConfig {
                environmental: true,
                ..HostileConfig::default()
            })
            .movement(Box::new(StationaryMovement::new(StationaryTuning::default())))
            .abilities(Box::new(BroomAbilities::default()))
            .animator(Box::new(clips()))
            .build();
        assert!(!tree.kill());
        assert!(!tree.is_destroyed());
    }

    #[test]
    fn test_mobile_initialize_leashes() {
        let mut agent = HostileAgentBuilder::new("mobile", Vec3::new(5.0, 0.0, 0.0))
            .movement(Box::new(MobileMovement::new(
                MobileTuning::default(),
                Box::new(StraightLineAgent::new(Vec3::new(5.0, 0.0, 0.0))),
            )))
            .abilities(Box::new(BroomAbilities::default()))
            .animator(Box::new(clips()))
            .build();
        assert_eq!(agent.state(), HostileState::Wander);
        agent.initialize(Vec3::ZERO);
        assert_eq!(agent.state(), HostileState::Leash);
        assert_eq!(agent.pose().spawn, Vec3::ZERO);
        assert_eq!(
            agent.drain_transitions(),
            vec![(HostileState::Wander, HostileState::Leash)]
        );
    }

    #[test]
    fn test_camera_tracks_facing_until_possessed() {
        let mut agent = stationary_agent(clips());
        agent.pose.yaw = 45.0;
        agent.update_camera(Some(Vec2::new(90.0, 0.0)), 1.0);
        assert_eq!(agent.orbit().yaw(), 45.0);

        agent.on_possessed();
        agent.update_camera(Some(Vec2::new(90.0, 0.0)), 1.0);
        assert_eq!(agent.orbit().yaw(), 135.0);
    }
}
