//! Ability hit frames.

use glam::Vec3;
use poltergeist_common::{Layer, LayerMask};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AbilityContext, AbilityOutcome, AbilityStrategy, AgentCommand, AgentPose, VelocityMode};
use crate::physics::OrientedBox;

/// Box volume in the agent's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hitbox {
    /// Center relative to the agent root
    pub offset: Vec3,
    /// Half size on each axis
    pub half_extents: Vec3,
}

impl Default for Hitbox {
    fn default() -> Self {
        Self {
            offset: Vec3::new(0.0, 0.75, 1.0),
            half_extents: Vec3::splat(0.75),
        }
    }
}

impl Hitbox {
    /// The box placed at `pose`.
    #[must_use]
    pub fn placed(&self, pose: &AgentPose) -> OrientedBox {
        OrientedBox::new(pose.local_to_world(self.offset), self.half_extents, pose.rotation())
    }
}

/// Launch impulse relative to the agent's facing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Impulse {
    /// Along the agent's forward
    pub horizontal: f32,
    /// Straight up
    pub vertical: f32,
}

impl Impulse {
    /// World velocity for an agent facing `forward`.
    #[must_use]
    pub fn velocity(&self, forward: Vec3) -> Vec3 {
        forward * self.horizontal + Vec3::Y * self.vertical
    }
}

/// Impulses for the autonomous and possessed cases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpulseTable {
    /// Used while the agent acts on its own
    pub autonomous: Impulse,
    /// Used while the player drives the agent
    pub possessed: Impulse,
}

impl Default for ImpulseTable {
    /// A driven broom knocks at half the strength of an autonomous one.
    fn default() -> Self {
        Self {
            autonomous: Impulse {
                horizontal: 10.0,
                vertical: 5.0,
            },
            possessed: Impulse {
                horizontal: 5.0,
                vertical: 2.5,
            },
        }
    }
}

impl ImpulseTable {
    /// Impulse for the given possession state.
    #[must_use]
    pub fn pick(&self, possessed: bool) -> &Impulse {
        if possessed {
            &self.possessed
        } else {
            &self.autonomous
        }
    }
}

/// Throw forces of a grabbing agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrowForces {
    /// Autonomous throw
    pub autonomous: Impulse,
    /// Speed along the camera direction when the player throws
    pub possessed: f32,
}

impl Default for ThrowForces {
    fn default() -> Self {
        Self {
            autonomous: Impulse {
                horizontal: 10.0,
                vertical: 10.0,
            },
            possessed: 20.0,
        }
    }
}

/// Overlaps `hitbox` and resolves every hit: the controlled body gets
/// possessed, other agents are killed and interactibles are used.
fn resolve_sweep(hitbox: &Hitbox, ctx: &AbilityContext<'_>) -> AbilityOutcome {
    let area = hitbox.placed(ctx.pose);
    let mut commands = Vec::new();
    for hit in ctx.physics.overlap_box(&area, LayerMask::ABILITY_TARGETS) {
        if hit.entity == ctx.agent {
            continue;
        }
        match hit.layer {
            Layer::Player if hit.entity == ctx.controlled => {
                commands.push(AgentCommand::Possess { agent: ctx.agent });
            }
            Layer::Enemy => commands.push(AgentCommand::Kill { target: hit.entity }),
            Layer::Interactible => commands.push(AgentCommand::Interact {
                target: hit.entity,
                invoker: ctx.agent,
            }),
            _ => {}
        }
    }
    debug!(agent = %ctx.agent, hits = commands.len(), "Sweep resolved");
    AbilityOutcome {
        commands,
        grabbed: false,
    }
}

/// Checks whether a player body is inside `hitbox`.
fn player_in(hitbox: &Hitbox, ctx: &AbilityContext<'_>) -> bool {
    !ctx.physics
        .overlap_box(&hitbox.placed(ctx.pose), Layer::Player.mask())
        .is_empty()
}

/// Sweep plus knockback, used by mobile agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BroomAbilities {
    /// Primary sweep volume
    pub sweep: Hitbox,
    /// Knockback volume
    pub knock: Hitbox,
    /// Knockback impulses
    pub knockback: ImpulseTable,
}

impl AbilityStrategy for BroomAbilities {
    fn trigger_ability1(&mut self, ctx: &AbilityContext<'_>) -> AbilityOutcome {
        resolve_sweep(&self.sweep, ctx)
    }

    fn trigger_ability2(&mut self, ctx: &AbilityContext<'_>) -> AbilityOutcome {
        if !player_in(&self.knock, ctx) {
            return AbilityOutcome::default();
        }
        let velocity = self
            .knockback
            .pick(ctx.possessed)
            .velocity(ctx.pose.forward());
        AbilityOutcome {
            commands: vec![AgentCommand::Knockback {
                velocity,
                mode: VelocityMode::Add,
                force_roll: true,
            }],
            grabbed: false,
        }
    }
}

/// Sweep plus grab-and-throw, used by environmental agents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrabThrowAbilities {
    /// Primary sweep volume
    pub sweep: Hitbox,
    /// Grab volume
    pub grab: Hitbox,
    /// Hand position relative to the agent root
    pub hand_offset: Vec3,
    /// Throw forces
    pub throw: ThrowForces,
    #[serde(skip)]
    holding: bool,
}

impl Default for GrabThrowAbilities {
    fn default() -> Self {
        Self {
            sweep: Hitbox {
                offset: Vec3::new(0.0, 1.0, 1.5),
                half_extents: Vec3::new(1.0, 1.0, 1.5),
            },
            grab: Hitbox {
                offset: Vec3::new(0.0, 1.0, 1.5),
                half_extents: Vec3::new(1.0, 1.0, 1.5),
            },
            hand_offset: Vec3::new(0.0, 2.5, 0.5),
            throw: ThrowForces::default(),
            holding: false,
        }
    }
}

impl GrabThrowAbilities {
    /// Checks whether something is held.
    #[must_use]
    pub fn is_holding(&self) -> bool {
        self.holding
    }
}

impl AbilityStrategy for GrabThrowAbilities {
    fn trigger_ability1(&mut self, ctx: &AbilityContext<'_>) -> AbilityOutcome {
        resolve_sweep(&self.sweep, ctx)
    }

    fn trigger_ability2(&mut self, ctx: &AbilityContext<'_>) -> AbilityOutcome {
        if self.holding || !player_in(&self.grab, ctx) {
            return AbilityOutcome::default();
        }
        self.holding = true;
        debug!(agent = %ctx.agent, "Player grabbed");
        AbilityOutcome {
            commands: vec![AgentCommand::Grab {
                hand: ctx.pose.local_to_world(self.hand_offset),
            }],
            grabbed: true,
        }
    }

    fn throw(&mut self, ctx: &AbilityContext<'_>) -> Vec<AgentCommand> {
        if !self.holding {
            return Vec::new();
        }
        self.holding = false;
        let velocity = if ctx.possessed {
            ctx.camera_forward * self.throw.possessed
        } else {
            self.throw.autonomous.velocity(ctx.pose.forward())
        };
        vec![AgentCommand::Throw {
            thrower: ctx.agent,
            velocity,
            unpossess: ctx.possessed,
        }]
    }

    fn hold_point(&self, pose: &AgentPose) -> Option<Vec3> {
        self.holding.then(|| pose.local_to_world(self.hand_offset))
    }
}
