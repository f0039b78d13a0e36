//! Event bus for spawners, UI and other observers of the scene.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::warn;

use poltergeist_common::EntityId;

use crate::hostile::HostileState;

/// Event types that can be sent through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// The player took control of an agent
    Possessed {
        /// Agent now controlled
        agent: EntityId,
    },
    /// Control returned to the player's body
    Unpossessed {
        /// Agent released
        agent: EntityId,
    },
    /// An agent was killed and will be removed
    AgentKilled {
        /// Agent killed
        agent: EntityId,
        /// Entity responsible, if any
        killer: Option<EntityId>,
    },
    /// An agent was removed from the scene
    AgentDestroyed {
        /// Agent removed
        agent: EntityId,
    },
    /// An interactible was hit
    Interacted {
        /// Interactible hit
        target: EntityId,
        /// Agent that hit it
        invoker: EntityId,
        /// Whether the interactible was consumed
        consumed: bool,
    },
    /// The player's body started rolling
    RollEntered {
        /// Player body
        entity: EntityId,
    },
    /// The player's body stood back up
    RollExited {
        /// Player body
        entity: EntityId,
    },
    /// Standing up was refused for lack of room
    RollExitBlocked {
        /// Player body
        entity: EntityId,
    },
    /// An agent changed state
    StateChanged {
        /// Agent
        agent: EntityId,
        /// Previous state
        from: HostileState,
        /// New state
        to: HostileState,
    },
}

impl GameEvent {
    /// Variant name, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Possessed { .. } => "possessed",
            Self::Unpossessed { .. } => "unpossessed",
            Self::AgentKilled { .. } => "agent_killed",
            Self::AgentDestroyed { .. } => "agent_destroyed",
            Self::Interacted { .. } => "interacted",
            Self::RollEntered { .. } => "roll_entered",
            Self::RollExited { .. } => "roll_exited",
            Self::RollExitBlocked { .. } => "roll_exit_blocked",
            Self::StateChanged { .. } => "state_changed",
        }
    }
}

/// Bounded queue of scene events, drained by the host once per frame.
///
/// Events come out in the order the scene published them, so an
/// `Unpossessed` always precedes the `AgentDestroyed` of the same kill.
/// When the queue is full the oldest events are kept and the new one is
/// counted as dropped.
#[derive(Debug)]
pub struct EventBus {
    queue: Sender<GameEvent>,
    pending: Receiver<GameEvent>,
    dropped: AtomicUsize,
}

impl EventBus {
    /// Queue holding up to `capacity` events. A zero capacity holds one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (queue, pending) = bounded(capacity.max(1));
        Self {
            queue,
            pending,
            dropped: AtomicUsize::new(0),
        }
    }

    /// Queues `event`, or drops it with a warning when the queue is full.
    pub fn publish(&self, event: GameEvent) {
        if let Err(err) = self.queue.try_send(event) {
            let event = err.into_inner();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(kind = event.kind(), dropped, "Scene event queue full, event dropped");
        }
    }

    /// Takes every queued event in publish order.
    pub fn drain(&self) -> Vec<GameEvent> {
        self.pending.try_iter().collect()
    }

    /// Events rejected so far because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
