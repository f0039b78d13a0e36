//! Scene orchestration.
//!
//! The [`Scene`] owns every simulated piece: the physics world, the player's
//! body, hostile agents, interactibles, the possession coordinator and the
//! event bus. It fixes the per-frame ordering:
//!
//! 1. player locomotion tick
//! 2. agent ticks, with their commands applied immediately
//! 3. touch possession
//! 4. removal of destroyed agents
//! 5. camera stage
//! 6. body proxies synced into the physics world
//!
//! Fixed steps integrate the rolling body and let a possessed agent shove it.

use glam::Vec3;
use poltergeist_common::{EntityId, Layer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::camera::{CameraRig, RecordingRig};
use crate::events::{EventBus, GameEvent};
use crate::hostile::{AgentCommand, AgentFrame, HostileAgent, VelocityMode};
use crate::input::InputState;
use crate::interaction::{Debris, Interactible};
use crate::locomotion::{LocomotionController, LocomotionEvent, LocomotionState};
use crate::physics::PhysicsWorld;
use crate::possession::{Controlled, PossessionCoordinator};

/// Scene tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Seed of the scene random source
    pub seed: u64,
    /// Fixed physics step
    pub fixed_dt: f32,
    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            fixed_dt: 1.0 / 50.0,
            event_capacity: 1024,
        }
    }
}

/// Everything that is simulated together.
pub struct Scene<W: PhysicsWorld> {
    config: SceneConfig,
    world: W,
    player: LocomotionController,
    agents: Vec<HostileAgent>,
    interactibles: Vec<Box<dyn Interactible>>,
    debris: Vec<Debris>,
    touching: Vec<EntityId>,
    coordinator: PossessionCoordinator,
    events: EventBus,
    rng: fastrand::Rng,
    tick: u64,
    accumulator: f32,
    paused: bool,
}

impl<W: PhysicsWorld> Scene<W> {
    /// Creates a scene around `world` with the player's body in control.
    pub fn new(world: W, player: LocomotionController, config: SceneConfig) -> Self {
        Self::with_player_rig(world, player, config, Box::new(RecordingRig::default()))
    }

    /// Creates a scene with a presentation rig following the player's body.
    pub fn with_player_rig(
        world: W,
        player: LocomotionController,
        config: SceneConfig,
        rig: Box<dyn CameraRig>,
    ) -> Self {
        let mut coordinator = PossessionCoordinator::new(player.id());
        coordinator.cameras_mut().register(Controlled::Player, rig);
        let mut scene = Self {
            config,
            world,
            player,
            agents: Vec::new(),
            interactibles: Vec::new(),
            debris: Vec::new(),
            touching: Vec::new(),
            coordinator,
            events: EventBus::new(config.event_capacity),
            rng: fastrand::Rng::with_seed(config.seed),
            tick: 0,
            accumulator: 0.0,
            paused: false,
        };
        scene.sync_bodies();
        scene
    }

    /// Adds an agent, sends it home to where it stands and returns its ID.
    pub fn spawn_agent(&mut self, agent: HostileAgent) -> EntityId {
        self.spawn_agent_with_rig(agent, Box::new(RecordingRig::default()))
    }

    /// Adds an agent with a presentation rig following it.
    pub fn spawn_agent_with_rig(&mut self, mut agent: HostileAgent, rig: Box<dyn CameraRig>) -> EntityId {
        let id = agent.id();
        agent.initialize(agent.position());
        self.publish_transitions(&mut agent);
        self.coordinator
            .cameras_mut()
            .register(Controlled::Agent(id), rig);
        self.world.sync_body(
            id,
            Layer::Enemy,
            agent.position() + Vec3::Y * agent.config().body_radius,
            agent.config().body_radius,
        );
        info!(%id, name = agent.name(), "Agent spawned");
        self.agents.push(agent);
        id
    }

    /// Kills an agent, releasing possession of it first.
    ///
    /// Returns `true` if the agent will be removed. Environmental agents are
    /// only released.
    pub fn kill_agent(&mut self, id: EntityId, killer: Option<EntityId>) -> bool {
        let Some(index) = self.index_of(id) else {
            debug!(%id, "Kill ignored, no such agent");
            return false;
        };
        if self.agents[index].is_destroyed() {
            return false;
        }
        if self.coordinator.controls(id)
            && self
                .coordinator
                .unpossess(&mut self.agents[index], &mut self.player)
        {
            self.events.publish(GameEvent::Unpossessed { agent: id });
        }
        let agent = &mut self.agents[index];
        let killed = agent.kill();
        self.publish_transitions_at(index);
        if killed {
            self.events.publish(GameEvent::AgentKilled { agent: id, killer });
        }
        killed
    }

    /// Adds an interactible and registers its body.
    pub fn add_interactible(&mut self, interactible: Box<dyn Interactible>) -> EntityId {
        let id = interactible.id();
        self.world.sync_body(
            id,
            Layer::Interactible,
            interactible.position(),
            interactible.radius(),
        );
        self.interactibles.push(interactible);
        id
    }

    /// Runs fixed steps for the elapsed time, then one frame.
    pub fn update(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        self.accumulator += dt;
        while self.accumulator >= self.config.fixed_dt {
            self.fixed_frame(self.config.fixed_dt);
            self.accumulator -= self.config.fixed_dt;
        }
        self.frame(dt);
    }

    /// One frame in the fixed order.
    pub fn frame(&mut self, dt: f32) {
        self.tick += 1;

        let input = self.coordinator.input_for(Controlled::Player);
        self.player.tick(input, &self.world, dt);
        self.publish_locomotion_events();

        let mut index = 0;
        while index < self.agents.len() {
            self.tick_agent(index, dt);
            index += 1;
        }

        self.touch_possession();
        self.remove_destroyed();
        self.update_cameras(dt);
        self.sync_bodies();
    }

    /// One fixed step.
    pub fn fixed_frame(&mut self, dt: f32) {
        self.player.fixed_tick(&self.world, dt);

        if self.player.state() != LocomotionState::Rolling {
            return;
        }
        let Some(agent) = self
            .coordinator
            .link()
            .possessed()
            .and_then(|id| self.agents.iter().find(|a| a.id() == id))
        else {
            return;
        };
        let radius = self.player.config().head_radius;
        if let Some(velocity) = agent.push_velocity(self.player.head_point(), radius, dt) {
            self.player.set_velocity(velocity);
        }
    }

    /// Frames run so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Scene tuning.
    #[must_use]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Physics world.
    #[must_use]
    pub fn world(&self) -> &W {
        &self.world
    }

    /// Mutable physics world.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// The player's body.
    #[must_use]
    pub fn player(&self) -> &LocomotionController {
        &self.player
    }

    /// Mutable player body, for knockbacks applied from outside.
    pub fn player_mut(&mut self) -> &mut LocomotionController {
        &mut self.player
    }

    /// Live agents.
    #[must_use]
    pub fn agents(&self) -> &[HostileAgent] {
        &self.agents
    }

    /// Agent by ID.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&HostileAgent> {
        self.agents.iter().find(|a| a.id() == id)
    }

    /// Mutable agent by ID.
    pub fn agent_mut(&mut self, id: EntityId) -> Option<&mut HostileAgent> {
        self.agents.iter_mut().find(|a| a.id() == id)
    }

    /// Number of live interactibles.
    #[must_use]
    pub fn interactible_count(&self) -> usize {
        self.interactibles.len()
    }

    /// Takes the debris spawned since the last call.
    pub fn take_debris(&mut self) -> Vec<Debris> {
        std::mem::take(&mut self.debris)
    }

    /// Possession state and camera registry.
    #[must_use]
    pub fn coordinator(&self) -> &PossessionCoordinator {
        &self.coordinator
    }

    /// Mutable coordinator.
    pub fn coordinator_mut(&mut self) -> &mut PossessionCoordinator {
        &mut self.coordinator
    }

    /// Input written by the device sampler.
    pub fn input_mut(&mut self) -> &mut InputState {
        self.coordinator.input_mut()
    }

    /// Event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Pauses or resumes [`Scene::update`].
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Whether the scene is paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Position of whatever the player currently drives.
    #[must_use]
    pub fn controlled_position(&self) -> Vec3 {
        match self.coordinator.owner() {
            Controlled::Player => self.player.position(),
            Controlled::Agent(id) => self
                .agent(id)
                .map_or_else(|| self.player.position(), HostileAgent::position),
        }
    }

    fn index_of(&self, id: EntityId) -> Option<usize> {
        self.agents.iter().position(|a| a.id() == id)
    }

    fn tick_agent(&mut self, index: usize, dt: f32) {
        if self.agents[index].is_destroyed() {
            return;
        }
        let target = self.controlled_position();
        let controlled = self.coordinator.link().controlled_entity();
        let owner = Controlled::Agent(self.agents[index].id());

        let agent = &mut self.agents[index];
        let issuer = agent.id();
        let frame = AgentFrame {
            tick: self.tick,
            dt,
            target,
            controlled,
            physics: &self.world,
            rng: &mut self.rng,
            input: self.coordinator.input_for(owner),
        };
        let commands = agent.tick(frame);
        self.publish_transitions_at(index);

        for command in commands {
            self.apply(issuer, command);
        }
    }

    fn apply(&mut self, issuer: EntityId, command: AgentCommand) {
        match command {
            AgentCommand::Possess { agent } => {
                let Some(index) = self.index_of(agent) else {
                    return;
                };
                if self
                    .coordinator
                    .possess(&mut self.agents[index], &mut self.player)
                {
                    self.publish_transitions_at(index);
                    self.events.publish(GameEvent::Possessed { agent });
                }
            }
            AgentCommand::Kill { target } => {
                self.kill_agent(target, Some(issuer));
            }
            AgentCommand::Interact { target, invoker } => self.interact(target, invoker),
            AgentCommand::Knockback {
                velocity,
                mode,
                force_roll,
            } => {
                if force_roll {
                    self.player.force_roll();
                }
                match mode {
                    VelocityMode::Add => self.player.add_velocity(velocity),
                    VelocityMode::Set => self.player.set_velocity(velocity),
                }
            }
            AgentCommand::Grab { hand } => self.player.grab(hand),
            AgentCommand::Hold { hand } => self.player.hold_at(hand),
            AgentCommand::Throw {
                thrower,
                velocity,
                unpossess,
            } => {
                self.player.release();
                if unpossess {
                    if let Some(index) = self.index_of(thrower) {
                        if self
                            .coordinator
                            .unpossess(&mut self.agents[index], &mut self.player)
                        {
                            self.publish_transitions_at(index);
                            self.events.publish(GameEvent::Unpossessed { agent: thrower });
                        }
                    }
                }
                self.player.force_roll();
                self.player.set_velocity(velocity);
            }
        }
        self.publish_locomotion_events();
    }

    fn interact(&mut self, target: EntityId, invoker: EntityId) {
        let Some(index) = self.interactibles.iter().position(|i| i.id() == target) else {
            return;
        };
        let outcome = self.interactibles[index].on_interact(invoker, &mut self.rng);
        self.debris.extend(outcome.debris);
        if outcome.consumed {
            self.interactibles.swap_remove(index);
            self.world.remove_body(target);
        }
        self.events.publish(GameEvent::Interacted {
            target,
            invoker,
            consumed: outcome.consumed,
        });
    }

    /// Possesses the first touch agent whose contact with the player's body
    /// began this frame. Contacts that persist do not possess again.
    fn touch_possession(&mut self) {
        let body = self.player.position();
        let touching: Vec<EntityId> = self
            .agents
            .iter()
            .filter(|a| {
                a.config().possess_on_touch
                    && !a.is_destroyed()
                    && a.position().distance(body) <= a.config().touch_radius
            })
            .map(HostileAgent::id)
            .collect();
        let began = touching
            .iter()
            .copied()
            .find(|id| !self.touching.contains(id));
        self.touching = touching;

        if self.coordinator.owner() != Controlled::Player {
            return;
        }
        let Some(index) = began.and_then(|id| self.index_of(id)) else {
            return;
        };
        let agent = self.agents[index].id();
        if self
            .coordinator
            .possess(&mut self.agents[index], &mut self.player)
        {
            self.publish_transitions_at(index);
            self.publish_locomotion_events();
            self.events.publish(GameEvent::Possessed { agent });
        }
    }

    fn remove_destroyed(&mut self) {
        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.agents)
            .into_iter()
            .partition(HostileAgent::is_destroyed);
        self.agents = kept;
        for agent in gone {
            let id = agent.id();
            self.world.remove_body(id);
            self.coordinator
                .cameras_mut()
                .unregister(Controlled::Agent(id));
            self.events.publish(GameEvent::AgentDestroyed { agent: id });
        }
    }

    fn update_cameras(&mut self, dt: f32) {
        let look = self.coordinator.input().look;

        if self.coordinator.owner() == Controlled::Player {
            self.player.update_camera(look, dt);
        }
        let orbit = *self.player.orbit();
        self.coordinator
            .cameras_mut()
            .point(Controlled::Player, orbit.yaw(), orbit.pitch());

        for agent in &mut self.agents {
            let owner = Controlled::Agent(agent.id());
            let agent_look = (self.coordinator.owner() == owner).then_some(look);
            agent.update_camera(agent_look, dt);
            let orbit = agent.orbit();
            self.coordinator
                .cameras_mut()
                .point(owner, orbit.yaw(), orbit.pitch());
        }
    }

    fn sync_bodies(&mut self) {
        let config = self.player.config();
        let (center, radius) = match self.player.state() {
            LocomotionState::Walking => (
                self.player.position() + Vec3::Y * config.capsule.center_y,
                config.capsule.radius,
            ),
            LocomotionState::Rolling | LocomotionState::ExitingRoll => {
                (self.player.head_point(), config.head_radius)
            }
        };
        self.world
            .sync_body(self.player.id(), Layer::Player, center, radius);

        for agent in &self.agents {
            let radius = agent.config().body_radius;
            self.world.sync_body(
                agent.id(),
                Layer::Enemy,
                agent.position() + Vec3::Y * radius,
                radius,
            );
        }
    }

    fn publish_transitions_at(&mut self, index: usize) {
        let agent = self.agents[index].id();
        for (from, to) in self.agents[index].drain_transitions() {
            self.events
                .publish(GameEvent::StateChanged { agent, from, to });
        }
    }

    fn publish_transitions(&self, agent: &mut HostileAgent) {
        let id = agent.id();
        for (from, to) in agent.drain_transitions() {
            self.events
                .publish(GameEvent::StateChanged { agent: id, from, to });
        }
    }

    fn publish_locomotion_events(&mut self) {
        let entity = self.player.id();
        for event in self.player.drain_events() {
            let event = match event {
                LocomotionEvent::RollEntered => GameEvent::RollEntered { entity },
                LocomotionEvent::RollExited => GameEvent::RollExited { entity },
                LocomotionEvent::RollExitBlocked => GameEvent::RollExitBlocked { entity },
                LocomotionEvent::RollExitStarted => continue,
            };
            self.events.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::TimedAnimator;
    use crate::hostile::{
        broom, broom_animator, haunted_tree, BroomAbilities, HostileAgentBuilder, HostileConfig,
        HostileState, MobileMovement, MobileTuning,
    };
    use crate::pathfinding::StraightLineAgent;
    use crate::interaction::{Breakable, BreakableConfig};
    use crate::physics::StaticWorld;

    fn scene() -> Scene<StaticWorld> {
        Scene::new(
            StaticWorld::flat(0.0),
            LocomotionController::new(Vec3::ZERO),
            SceneConfig::default(),
        )
    }

    #[test]
    fn test_spawn_registers_body_and_rig() {
        let mut scene = scene();
        let id = scene.spawn_agent(broom(Vec3::new(5.0, 0.0, 0.0), Box::new(broom_animator())));
        assert!(scene.world().body_center(id).is_some());
        assert!(scene.world().body_center(scene.player().id()).is_some());
        assert!(scene
            .coordinator()
            .cameras()
            .priority(Controlled::Agent(id))
            .is_some());
        // Spawned agents first walk home
        assert_eq!(scene.agent(id).map(HostileAgent::state), Some(HostileState::Leash));
    }

    #[test]
    fn test_zero_event_capacity_still_reports_roll() {
        let mut scene = Scene::new(
            StaticWorld::flat(0.0),
            LocomotionController::new(Vec3::ZERO),
            SceneConfig {
                event_capacity: 0,
                ..SceneConfig::default()
            },
        );
        scene.input_mut().roll = true;
        scene.update(0.1);

        let player = scene.player().id();
        assert!(scene
            .events()
            .drain()
            .contains(&GameEvent::RollEntered { entity: player }));
    }

    #[test]
    fn test_kill_releases_then_removes() {
        let mut scene = scene();
        let id = scene.spawn_agent(broom(Vec3::new(30.0, 0.0, 0.0), Box::new(broom_animator())));
        {
            let Scene {
                coordinator,
                agents,
                player,
                ..
            } = &mut scene;
            assert!(coordinator.possess(&mut agents[0], player));
        }

        assert!(scene.kill_agent(id, None));
        assert_eq!(scene.coordinator().owner(), Controlled::Player);
        assert!(scene.player().accepts_input());

        scene.frame(0.02);
        assert!(scene.agent(id).is_none());
        assert!(scene.world().body_center(id).is_none());
        let events = scene.events().drain();
        assert!(events.contains(&GameEvent::Unpossessed { agent: id }));
        assert!(events.contains(&GameEvent::AgentDestroyed { agent: id }));
    }

    #[test]
    fn test_environmental_agent_survives_kill() {
        let mut scene = scene();
        let id = scene.spawn_agent(haunted_tree(
            Vec3::new(30.0, 0.0, 0.0),
            0.0,
            Box::new(TimedAnimator::new()),
        ));
        assert!(!scene.kill_agent(id, None));
        scene.frame(0.02);
        assert!(scene.agent(id).is_some());
    }

    #[test]
    fn test_interact_consumes_breakable() {
        let mut scene = scene();
        let lump = scene.add_interactible(Box::new(Breakable::new(
            Vec3::new(0.0, 0.5, 3.0),
            BreakableConfig::default(),
        )));
        let invoker = EntityId::new();
        scene.apply(invoker, AgentCommand::Interact { target: lump, invoker });

        assert_eq!(scene.interactible_count(), 0);
        assert!(scene.world().body_center(lump).is_none());
        assert!(!scene.take_debris().is_empty());
        assert!(scene.take_debris().is_empty());
    }

    #[test]
    fn test_knockback_forces_roll() {
        let mut scene = scene();
        scene.apply(
            EntityId::NULL,
            AgentCommand::Knockback {
                velocity: Vec3::new(0.0, 5.0, 10.0),
                mode: VelocityMode::Add,
                force_roll: true,
            },
        );
        assert_eq!(scene.player().state(), LocomotionState::Rolling);
        assert!(scene
            .events()
            .drain()
            .contains(&GameEvent::RollEntered { entity: scene.player().id() }));
    }

    #[test]
    fn test_touch_possession() {
        let mut scene = scene();
        let position = Vec3::new(0.5, 0.0, 0.0);
        let agent = HostileAgentBuilder::new("toucher", position)
            .config(HostileConfig {
                possess_on_touch: true,
                ..HostileConfig::default()
            })
            .movement(Box::new(MobileMovement::new(
                MobileTuning::default(),
                Box::new(StraightLineAgent::new(position)),
            )))
            .abilities(Box::new(BroomAbilities::default()))
            .animator(Box::new(broom_animator()))
            .build();
        let id = scene.spawn_agent(agent);

        scene.frame(0.02);
        assert_eq!(scene.coordinator().owner(), Controlled::Agent(id));
    }

    #[test]
    fn test_pause_stops_update() {
        let mut scene = scene();
        scene.set_paused(true);
        scene.update(0.1);
        assert_eq!(scene.tick(), 0);
        scene.set_paused(false);
        scene.update(0.1);
        assert_eq!(scene.tick(), 1);
    }
}
