//! Headless scripted session.
//!
//! Builds a scene from [`EngineConfig`], feeds the scripted input timeline
//! into whichever body currently holds control and logs every scene event.

use anyhow::{Context, Result};
use poltergeist_gameplay::hostile::{
    broom_animator, haunted_tree_animator, BroomAbilities, MobileMovement, MobileTuning,
};
use poltergeist_gameplay::interaction::{Breakable, BreakableConfig};
use poltergeist_gameplay::pathfinding::StraightLineAgent;
use poltergeist_gameplay::prelude::*;
use tracing::{debug, info};

use crate::config::{EngineConfig, ScriptAction, ScriptEvent, Spawn};
use crate::timing::{Clock, FrameTiming};

/// Totals reported when a session ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    /// Frames simulated
    pub frames: u64,
    /// Simulated seconds
    pub elapsed: f32,
    /// Times control moved to an agent
    pub possessions: u32,
    /// Agents killed
    pub kills: u32,
    /// Interactibles hit
    pub interactions: u32,
    /// Rolls entered by the player body
    pub rolls: u32,
    /// Agents still in the scene
    pub agents_left: usize,
    /// Scene events lost to a full queue
    pub events_dropped: usize,
    /// Who held control at the end
    pub controlled: Option<Controlled>,
}

impl SessionSummary {
    fn record(&mut self, event: &GameEvent) {
        match event {
            GameEvent::Possessed { .. } => self.possessions += 1,
            GameEvent::AgentKilled { .. } => self.kills += 1,
            GameEvent::Interacted { .. } => self.interactions += 1,
            GameEvent::RollEntered { .. } => self.rolls += 1,
            _ => {},
        }
    }
}

/// A configured scene plus its input timeline.
pub struct Session {
    config: EngineConfig,
    scene: Scene<StaticWorld>,
    timing: FrameTiming,
    script: Vec<ScriptEvent>,
    next_event: usize,
    summary: SessionSummary,
}

impl Session {
    /// Builds the scene and spawns everything the config lists.
    pub fn new(mut config: EngineConfig) -> Result<Self> {
        config.validate();

        let player = LocomotionController::with_config(config.player_start, config.locomotion)
            .context("player locomotion rejected")?;
        let mut scene = Scene::new(StaticWorld::flat(0.0), player, config.scene);

        for spawn in &config.spawns {
            spawn_one(&mut scene, &config, *spawn);
        }

        let clock = if config.realtime {
            Clock::Realtime
        } else {
            Clock::Simulated
        };
        let mut timing = FrameTiming::new(config.target_fps, clock);
        timing.set_fixed_dt(config.scene.fixed_dt);

        info!(
            spawns = config.spawns.len(),
            script = config.script.len(),
            seed = config.scene.seed,
            "Session ready"
        );

        Ok(Self {
            script: config.script.clone(),
            config,
            scene,
            timing,
            next_event: 0,
            summary: SessionSummary::default(),
        })
    }

    /// The simulated scene.
    #[must_use]
    pub fn scene(&self) -> &Scene<StaticWorld> {
        &self.scene
    }

    /// Runs one frame: script, fixed steps, frame, events.
    pub fn step(&mut self) {
        let dt = self.timing.delta_time();
        self.apply_script(self.timing.elapsed());

        for _ in 0..self.timing.accumulate(dt) {
            self.scene.fixed_frame(self.timing.fixed_dt());
        }
        self.scene.frame(dt);

        for event in self.scene.events().drain() {
            self.summary.record(&event);
            log_event(&event);
        }

        self.timing.sleep_remainder();
    }

    /// Runs until the configured duration has elapsed.
    pub fn run(mut self) -> SessionSummary {
        info!(duration = self.config.duration, "Running session");
        while self.timing.elapsed() < self.config.duration {
            self.step();
        }
        self.finish()
    }

    fn finish(mut self) -> SessionSummary {
        self.summary.frames = self.scene.tick();
        self.summary.elapsed = self.timing.elapsed();
        self.summary.agents_left = self.scene.agents().len();
        self.summary.events_dropped = self.scene.events().dropped();
        self.summary.controlled = Some(self.scene.coordinator().owner());

        info!(
            frames = self.summary.frames,
            fps = self.timing.current_fps(),
            target_fps = self.timing.target_fps(),
            possessions = self.summary.possessions,
            kills = self.summary.kills,
            "Session finished"
        );
        self.summary
    }

    fn apply_script(&mut self, now: f32) {
        while let Some(event) = self.script.get(self.next_event) {
            if event.at > now {
                break;
            }
            debug!(at = event.at, action = ?event.action, "Script");

            let input = self.scene.input_mut();
            match event.action {
                ScriptAction::Move { axis } => input.move_axis = axis.clamp_length_max(1.0),
                ScriptAction::Look { rate } => input.look = rate,
                ScriptAction::Jump { held } => input.jump = held,
                ScriptAction::Roll => input.roll = true,
                ScriptAction::Ability1 => input.press_abilities(true, false),
                ScriptAction::Ability2 => input.press_abilities(false, true),
            }
            self.next_event += 1;
        }
    }
}

fn spawn_one(scene: &mut Scene<StaticWorld>, config: &EngineConfig, spawn: Spawn) {
    match spawn {
        Spawn::Broom { position } => {
            let agent = match config.broom {
                Some(tuning) => HostileAgentBuilder::new("broom", position)
                    .config(tuning)
                    .movement(Box::new(MobileMovement::new(
                        MobileTuning::default(),
                        Box::new(StraightLineAgent::new(position)),
                    )))
                    .abilities(Box::new(BroomAbilities::default()))
                    .animator(Box::new(broom_animator()))
                    .build(),
                None => broom(position, Box::new(broom_animator())),
            };
            scene.spawn_agent(agent);
        },
        Spawn::HauntedTree { position, yaw } => {
            scene.spawn_agent(haunted_tree(
                position,
                yaw,
                Box::new(haunted_tree_animator()),
            ));
        },
        Spawn::CandyLump { position } => {
            scene.add_interactible(Box::new(Breakable::new(
                position,
                BreakableConfig::default(),
            )));
        },
    }
}

fn log_event(event: &GameEvent) {
    match *event {
        GameEvent::Possessed { agent } => info!(%agent, "Possessed"),
        GameEvent::Unpossessed { agent } => info!(%agent, "Unpossessed"),
        GameEvent::AgentKilled { agent, killer } => info!(%agent, ?killer, "Agent killed"),
        GameEvent::AgentDestroyed { agent } => info!(%agent, "Agent destroyed"),
        GameEvent::Interacted {
            target,
            invoker,
            consumed,
        } => info!(%target, %invoker, consumed, "Interacted"),
        GameEvent::RollEntered { entity } => debug!(%entity, "Roll entered"),
        GameEvent::RollExited { entity } => debug!(%entity, "Roll exited"),
        GameEvent::RollExitBlocked { entity } => debug!(%entity, "Roll exit blocked"),
        GameEvent::StateChanged { agent, from, to } => {
            debug!(%agent, ?from, ?to, "Agent state changed");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            duration: 1.0,
            spawns: Vec::new(),
            script: Vec::new(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_empty_session_runs_for_duration() {
        let summary = Session::new(quiet_config())
            .expect("Failed to build session")
            .run();

        assert!(summary.frames >= 59 && summary.frames <= 61);
        assert_eq!(summary.possessions, 0);
        assert_eq!(summary.events_dropped, 0);
        assert_eq!(summary.controlled, Some(Controlled::Player));
    }

    #[test]
    fn test_scripted_roll_is_counted() {
        let mut config = quiet_config();
        config.script = vec![ScriptEvent {
            at: 0.1,
            action: ScriptAction::Roll,
        }];

        let summary = Session::new(config).expect("Failed to build session").run();

        assert_eq!(summary.rolls, 1);
    }

    #[test]
    fn test_script_moves_player() {
        let mut config = quiet_config();
        config.script = vec![ScriptEvent {
            at: 0.0,
            action: ScriptAction::Move { axis: Vec2::Y },
        }];

        let mut session = Session::new(config).expect("Failed to build session");
        for _ in 0..60 {
            session.step();
        }

        assert!(session.scene().player().position().z > 0.5);
    }

    #[test]
    fn test_spawns_are_placed() {
        let mut config = quiet_config();
        config.spawns = vec![
            Spawn::Broom {
                position: Vec3::new(30.0, 0.0, 0.0),
            },
            Spawn::HauntedTree {
                position: Vec3::new(-30.0, 0.0, 0.0),
                yaw: 0.0,
            },
            Spawn::CandyLump {
                position: Vec3::new(0.0, 0.5, 30.0),
            },
        ];

        let session = Session::new(config).expect("Failed to build session");

        assert_eq!(session.scene().agents().len(), 2);
        assert_eq!(session.scene().interactible_count(), 1);
        let origin = session.scene().player().position();
        assert!(session
            .scene()
            .agents()
            .iter()
            .all(|a| (a.position().distance(origin) - 30.0).abs() < 1e-3));
    }
}
