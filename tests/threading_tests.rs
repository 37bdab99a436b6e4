use std::time::{Duration, Instant};

use particle_bridge::{
    Journal, NativeCall, ObjectDescription, ReferenceLoader, SceneNode, Vec3, WorldConfig,
    WorldModule,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn wait_for(world: &mut WorldModule, done: impl Fn(&WorldModule) -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !done(world) {
        assert!(Instant::now() < deadline, "worker did not answer in time");
        world.wait(Duration::from_millis(20));
    }
}

fn threaded(loader: ReferenceLoader) -> WorldModule {
    let config = WorldConfig::default().with_gravity(Vec3::new(0.0, -10.0, 0.0));
    let mut world = WorldModule::new(config, loader).unwrap();
    assert!(!world.link().is_inline());
    wait_for(&mut world, WorldModule::is_world_ready);
    world
}

fn step(world: &mut WorldModule) {
    assert!(world.simulate(Some(1.0 / 60.0), None));
    wait_for(world, |world| !world.is_simulating());
}

#[test]
fn world_module_can_move_between_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<WorldModule>();
    assert_send::<particle_bridge::SimulationWorld>();
}

#[test]
fn threaded_worker_steps_the_scene() {
    let mut world = threaded(ReferenceLoader::new());
    let (ball, _) = world
        .spawn_body(
            SceneNode::new("ball")
                .at(Vec3::new(0.0, 10.0, 0.0))
                .with_physics(ObjectDescription::sphere(0.5).with_mass(1.0)),
        )
        .unwrap();
    wait_for(&mut world, |world| {
        world
            .scene()
            .node(ball)
            .and_then(|node| node.physics.as_ref())
            .is_some_and(|physics| physics.ready)
    });

    for _ in 0..30 {
        step(&mut world);
    }
    let node = world.scene().node(ball).unwrap();
    assert!(node.position().y < 10.0);
    assert!(node.linear_velocity().y < 0.0);
    world.shutdown();
}

#[test]
fn removal_reaches_the_worker_before_the_next_report() {
    let journal = Journal::new();
    let mut world = threaded(ReferenceLoader::with_journal(journal.clone()));
    let (ball, _) = world
        .spawn_body(SceneNode::new("ball").with_physics(ObjectDescription::sphere(0.5).with_mass(1.0)))
        .unwrap();
    step(&mut world);
    world.remove(ball).unwrap();
    step(&mut world);

    let calls = journal.calls();
    let added = calls
        .iter()
        .position(|call| matches!(call, NativeCall::AddRigidBody(_)))
        .unwrap();
    let removed = calls
        .iter()
        .position(|call| matches!(call, NativeCall::RemoveRigidBody(_)))
        .unwrap();
    assert!(added < removed);
    world.shutdown();
}
