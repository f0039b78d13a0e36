//! Whole-scene scenarios: agents attacking, possessing and releasing the player.

use glam::Vec3;
use poltergeist_common::EntityId;
use poltergeist_gameplay::hostile::{
    broom_animator, haunted_tree_animator, BroomAbilities, GrabThrowAbilities, HostileAgent,
    HostileAgentBuilder, HostileConfig, HostileState, MobileMovement, MobileTuning,
    StationaryMovement, StationaryTuning, ThrowForces,
};
use poltergeist_gameplay::interaction::{Breakable, BreakableConfig};
use poltergeist_gameplay::locomotion::{Incapacitation, LocomotionController, LocomotionState};
use poltergeist_gameplay::pathfinding::StraightLineAgent;
use poltergeist_gameplay::physics::StaticWorld;
use poltergeist_gameplay::possession::Controlled;
use poltergeist_gameplay::scene::{Scene, SceneConfig};
use poltergeist_gameplay::GameEvent;

const DT: f32 = 0.1;

fn scene() -> Scene<StaticWorld> {
    Scene::new(
        StaticWorld::flat(0.0),
        LocomotionController::new(Vec3::ZERO),
        SceneConfig::default(),
    )
}

/// Broom that always opens with its sweep.
fn sweeping_broom(position: Vec3) -> HostileAgent {
    HostileAgentBuilder::new("sweeper", position)
        .config(HostileConfig {
            ability_ratio: 1.0,
            ..HostileConfig::default()
        })
        .movement(Box::new(MobileMovement::new(
            MobileTuning::default(),
            Box::new(StraightLineAgent::new(position)),
        )))
        .abilities(Box::new(BroomAbilities::default()))
        .animator(Box::new(broom_animator()))
        .build()
}

/// Tree that always grabs.
fn grabbing_tree(position: Vec3, config: HostileConfig) -> HostileAgent {
    HostileAgentBuilder::new("grabber", position)
        .config(HostileConfig {
            ability_ratio: 0.0,
            environmental: true,
            incapacitation: Incapacitation::Freeze,
            ..config
        })
        .movement(Box::new(StationaryMovement::new(StationaryTuning::default())))
        .abilities(Box::new(GrabThrowAbilities::default()))
        .animator(Box::new(haunted_tree_animator()))
        .build()
}

fn run_until(
    scene: &mut Scene<StaticWorld>,
    max_frames: usize,
    mut done: impl FnMut(&Scene<StaticWorld>) -> bool,
) -> bool {
    for _ in 0..max_frames {
        scene.update(DT);
        if done(scene) {
            return true;
        }
    }
    false
}

fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

fn possessed_by_sweep(scene: &mut Scene<StaticWorld>) -> EntityId {
    // Facing +Z with the player 1.5 ahead
    let broom = scene.spawn_agent(sweeping_broom(Vec3::new(0.0, 0.0, -1.5)));
    let possessed = run_until(scene, 30, |s| s.coordinator().owner() == Controlled::Agent(broom));
    assert!(possessed, "sweep never connected");
    broom
}

#[test]
fn test_sweep_possesses_player() {
    let mut scene = scene();
    let broom = possessed_by_sweep(&mut scene);

    let player = scene.player();
    assert!(!player.accepts_input());
    assert_eq!(player.incapacitation(), Some(Incapacitation::ForcedRoll));
    assert_ne!(player.state(), LocomotionState::Walking);
    assert!(scene.coordinator().input().can_use_abilities);

    let agent = scene.agent(broom).map(HostileAgent::state);
    assert!(matches!(
        agent,
        Some(HostileState::Possessed | HostileState::PossessedAttacking)
    ));

    let events = scene.events().drain();
    assert!(events.contains(&GameEvent::Possessed { agent: broom }));
    assert!(events.contains(&GameEvent::RollEntered {
        entity: scene.player().id()
    }));
}

#[test]
fn test_roll_while_possessed_destroys_mobile_agent() {
    let mut scene = scene();
    let broom = possessed_by_sweep(&mut scene);
    let settled = run_until(&mut scene, 30, |s| {
        s.agent(broom).map(HostileAgent::state) == Some(HostileState::Possessed)
    });
    assert!(settled);
    scene.events().drain();

    scene.input_mut().roll = true;
    scene.update(DT);

    assert!(scene.agent(broom).is_none());
    assert_eq!(scene.coordinator().owner(), Controlled::Player);
    assert!(scene.player().accepts_input());
    assert_eq!(scene.player().incapacitation(), None);
    assert!(!scene.coordinator().input().can_use_abilities);

    let events = scene.events().drain();
    let unpossessed = events
        .iter()
        .position(|e| *e == GameEvent::Unpossessed { agent: broom });
    let destroyed = events
        .iter()
        .position(|e| *e == GameEvent::AgentDestroyed { agent: broom });
    assert!(matches!((unpossessed, destroyed), (Some(u), Some(d)) if u < d));
}

#[test]
fn test_possessed_sweep_breaks_lump() {
    let mut scene = scene();
    let broom = possessed_by_sweep(&mut scene);
    let settled = run_until(&mut scene, 30, |s| {
        s.agent(broom).map(HostileAgent::state) == Some(HostileState::Possessed)
    });
    assert!(settled);

    let lump = scene.add_interactible(Box::new(Breakable::new(
        Vec3::new(0.0, 0.75, -0.5),
        BreakableConfig::default(),
    )));
    scene.input_mut().ability1 = true;
    let broken = run_until(&mut scene, 20, |s| s.interactible_count() == 0);
    assert!(broken);

    assert!(!scene.take_debris().is_empty());
    assert!(scene.events().drain().contains(&GameEvent::Interacted {
        target: lump,
        invoker: broom,
        consumed: true,
    }));
    // The possessing player is never the target of its own sweep
    assert_eq!(scene.coordinator().owner(), Controlled::Agent(broom));
}

#[test]
fn test_tree_grabs_and_throws_player() {
    let mut scene = scene();
    scene.spawn_agent(grabbing_tree(Vec3::new(0.0, 0.0, -1.5), HostileConfig::default()));

    let grabbed = run_until(&mut scene, 30, |s| s.player().is_held());
    assert!(grabbed, "tree never grabbed");
    assert_eq!(scene.player().state(), LocomotionState::Rolling);

    let thrown = run_until(&mut scene, 30, |s| !s.player().is_held());
    assert!(thrown, "tree never threw");
    assert_eq!(scene.player().state(), LocomotionState::Rolling);
    let tree = &scene.agents()[0];
    let expected = GrabThrowAbilities::default()
        .throw
        .autonomous
        .velocity(tree.pose().forward());
    assert!(scene.player().body().velocity().distance(expected) < 1e-3);
    // Autonomous throws leave the player in control
    assert!(scene.player().accepts_input());
    assert_eq!(scene.coordinator().owner(), Controlled::Player);
}

#[test]
fn test_touch_possessed_tree_survives_release() {
    let mut scene = scene();
    let tree = scene.spawn_agent(grabbing_tree(
        Vec3::new(0.0, 0.0, 0.5),
        HostileConfig {
            possess_on_touch: true,
            ..HostileConfig::default()
        },
    ));

    scene.update(DT);
    assert_eq!(scene.coordinator().owner(), Controlled::Agent(tree));
    assert_eq!(scene.player().incapacitation(), Some(Incapacitation::Freeze));

    scene.input_mut().roll = true;
    scene.update(DT);

    assert_eq!(scene.coordinator().owner(), Controlled::Player);
    let agent = scene.agent(tree);
    assert!(agent.is_some_and(|a| !a.is_destroyed()));
    assert_eq!(agent.map(HostileAgent::state), Some(HostileState::Idle));
    assert!(!scene
        .events()
        .drain()
        .iter()
        .any(|e| matches!(e, GameEvent::AgentKilled { .. })));

    // Still touching, but contact has to begin again to possess
    scene.update(DT);
    assert_eq!(scene.coordinator().owner(), Controlled::Player);
}

#[test]
fn test_possessed_broom_knockback_uses_possessed_table() {
    let mut scene = scene();
    let broom = possessed_by_sweep(&mut scene);
    let settled = run_until(&mut scene, 60, |s| {
        s.agent(broom).map(HostileAgent::state) == Some(HostileState::Possessed)
            && horizontal(s.player().body().velocity()).length() < 0.05
    });
    assert!(settled, "player body never came to rest");

    // Frames only, so the knockback is the last velocity change of the frame
    scene.input_mut().ability2 = true;
    let mut knocked = None;
    for _ in 0..30 {
        scene.frame(DT);
        let velocity = horizontal(scene.player().body().velocity());
        if velocity.length() > 2.0 {
            knocked = Some(velocity);
            break;
        }
    }
    let knocked = knocked.expect("knockback never landed");

    let forward = scene.agent(broom).map(|a| a.pose().forward()).unwrap_or(Vec3::Z);
    let table = BroomAbilities::default().knockback;
    let possessed = horizontal(table.pick(true).velocity(forward));
    let autonomous = horizontal(table.pick(false).velocity(forward));
    assert!(knocked.distance(possessed) < 0.75, "knocked at {knocked}");
    assert!(knocked.distance(autonomous) > 2.0);
    assert_eq!(scene.player().state(), LocomotionState::Rolling);
}

#[test]
fn test_possessed_tree_throws_along_camera() {
    let mut scene = scene();
    let tree = scene.spawn_agent(grabbing_tree(
        Vec3::new(0.0, 0.0, -0.5),
        HostileConfig {
            possess_on_touch: true,
            ..HostileConfig::default()
        },
    ));
    scene.update(DT);
    assert_eq!(scene.coordinator().owner(), Controlled::Agent(tree));

    let mut was_held = false;
    let mut thrown = false;
    for _ in 0..60 {
        scene.input_mut().ability2 = true;
        scene.update(DT);
        let held = scene.player().is_held();
        if was_held && !held {
            thrown = true;
            break;
        }
        was_held = held;
    }
    assert!(thrown, "possessed tree never threw");

    let agent = scene.agent(tree).expect("environmental agents survive");
    let expected = agent.camera_forward() * ThrowForces::default().possessed;
    let velocity = scene.player().body().velocity();
    assert!(velocity.distance(expected) < 1e-3, "thrown at {velocity}");
    assert!(velocity.y.abs() < 1e-3);
    let autonomous = ThrowForces::default()
        .autonomous
        .velocity(agent.pose().forward());
    assert!(velocity.distance(autonomous) > 1.0);
    assert_eq!(scene.coordinator().owner(), Controlled::Player);
    assert!(scene.events().drain().contains(&GameEvent::Unpossessed { agent: tree }));
}
