//! Control handoff between the player's body and a possessed agent.
//!
//! The coordinator owns the single [`InputState`] and the camera rig
//! registry. Possessing and unpossessing swap input ownership and camera
//! priority together; no other code changes either.

use poltergeist_common::EntityId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::camera::CameraDirector;
use crate::hostile::HostileAgent;
use crate::input::InputState;
use crate::locomotion::LocomotionController;

/// Pitch the player's orbit takes when control returns to it.
pub const RETURN_PITCH: f32 = 20.0;

/// Whatever the player currently drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Controlled {
    /// The player's own body
    Player,
    /// A possessed agent
    Agent(EntityId),
}

/// Which entity owns input, and which body is the real player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossessionLink {
    /// The player's own body
    pub player: EntityId,
    /// Current input owner
    pub owner: Controlled,
}

impl PossessionLink {
    /// Link with the player in control of its body.
    #[must_use]
    pub fn new(player: EntityId) -> Self {
        Self {
            player,
            owner: Controlled::Player,
        }
    }

    /// Possessed agent, if any.
    #[must_use]
    pub fn possessed(&self) -> Option<EntityId> {
        match self.owner {
            Controlled::Player => None,
            Controlled::Agent(id) => Some(id),
        }
    }

    /// Entity of the controlled body.
    #[must_use]
    pub fn controlled_entity(&self) -> EntityId {
        self.possessed().unwrap_or(self.player)
    }
}

/// Performs possession handoffs.
#[derive(Debug)]
pub struct PossessionCoordinator {
    link: PossessionLink,
    input: InputState,
    cameras: CameraDirector,
}

impl PossessionCoordinator {
    /// Creates a coordinator with the player in control.
    #[must_use]
    pub fn new(player: EntityId) -> Self {
        let mut cameras = CameraDirector::new();
        cameras.activate(Controlled::Player);
        Self {
            link: PossessionLink::new(player),
            input: InputState::new(),
            cameras,
        }
    }

    /// Current link.
    #[must_use]
    pub fn link(&self) -> &PossessionLink {
        &self.link
    }

    /// Current input owner.
    #[must_use]
    pub fn owner(&self) -> Controlled {
        self.link.owner
    }

    /// Checks whether `agent` is the possessed one.
    #[must_use]
    pub fn controls(&self, agent: EntityId) -> bool {
        self.link.possessed() == Some(agent)
    }

    /// Input, but only for its owner.
    pub fn input_for(&mut self, who: Controlled) -> Option<&mut InputState> {
        (who == self.link.owner).then_some(&mut self.input)
    }

    /// Input for the producer that samples devices.
    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// Read-only input.
    #[must_use]
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Camera rig registry.
    #[must_use]
    pub fn cameras(&self) -> &CameraDirector {
        &self.cameras
    }

    /// Mutable camera rig registry.
    pub fn cameras_mut(&mut self) -> &mut CameraDirector {
        &mut self.cameras
    }

    /// Hands control to `agent`.
    ///
    /// Incapacitates the player body, redirects input, enables abilities,
    /// switches the camera and puts the agent under direct input. Returns
    /// `false` without touching anything if an agent is already possessed
    /// or `agent` cannot be possessed.
    pub fn possess(&mut self, agent: &mut HostileAgent, player: &mut LocomotionController) -> bool {
        if let Some(current) = self.link.possessed() {
            debug!(%current, requested = %agent.id(), "Possession rejected, already possessing");
            return false;
        }
        if agent.is_inert() || agent.is_destroyed() {
            debug!(agent = %agent.id(), "Possession rejected, agent unavailable");
            return false;
        }

        agent.on_possessed();
        player.incapacitate(agent.config().incapacitation);

        let owner = Controlled::Agent(agent.id());
        self.link.owner = owner;
        self.input.clear();
        self.input.can_use_abilities = true;
        self.cameras.activate(owner);

        info!(agent = %agent.id(), name = agent.name(), "Player possessed agent");
        true
    }

    /// Returns control to the player body.
    ///
    /// The player's orbit takes the agent's camera yaw at [`RETURN_PITCH`].
    /// Returns `false` if `agent` is not the possessed one.
    pub fn unpossess(&mut self, agent: &mut HostileAgent, player: &mut LocomotionController) -> bool {
        if !self.controls(agent.id()) {
            debug!(agent = %agent.id(), "Unpossess ignored, agent not possessed");
            return false;
        }

        player.orbit_mut().set(agent.orbit().yaw(), RETURN_PITCH);
        player.toggle_player_control(true);

        self.link.owner = Controlled::Player;
        self.input.clear();
        self.input.can_use_abilities = false;
        agent.on_unpossessed();
        self.cameras.activate(Controlled::Player);

        info!(agent = %agent.id(), "Player released agent");
        true
    }
}
