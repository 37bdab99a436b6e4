// End-to-end runs of the main-thread module against an inline worker.

use approx::assert_relative_eq;
use particle_bridge::{
    ConstraintDescription, ConstraintKind, NodeId, ObjectDescription, ObjectId, ReferenceLoader,
    SceneNode, ShapeParams, Vec3, VehicleTuning, WheelDescription, WorkerCommand, WorldConfig,
    WorldEvent, WorldModule,
};

const STEP: f32 = 1.0 / 60.0;

fn inline_config() -> WorldConfig {
    WorldConfig::default()
        .with_no_worker(true)
        .with_gravity(Vec3::new(0.0, -10.0, 0.0))
}

fn settle(world: &mut WorldModule) {
    while world.poll() > 0 {}
}

fn start(config: WorldConfig) -> WorldModule {
    let mut world = WorldModule::new(config, ReferenceLoader::new()).unwrap();
    settle(&mut world);
    assert!(world.is_world_ready());
    world
}

fn step(world: &mut WorldModule, steps: usize) {
    for _ in 0..steps {
        assert!(world.simulate(Some(STEP), None));
        world.poll();
    }
}

fn ground(world: &mut WorldModule) -> (NodeId, ObjectId) {
    world
        .spawn_body(SceneNode::new("ground").with_physics(ObjectDescription::plane(Vec3::Y)))
        .unwrap()
}

fn position(world: &WorldModule, node: NodeId) -> Vec3 {
    world.scene().node(node).unwrap().position()
}

#[test]
fn dropped_box_falls_and_rests_on_the_ground() {
    let mut world = start(inline_config());
    let (_, ground_id) = ground(&mut world);
    let (crate_node, crate_id) = world
        .spawn_body(
            SceneNode::new("crate")
                .at(Vec3::new(0.0, 10.0, 0.0))
                .with_physics(ObjectDescription::box_shape(1.0, 1.0, 1.0).with_mass(1.0)),
        )
        .unwrap();
    settle(&mut world);

    // free fall down to y = 0.5 takes about 83 steps
    let mut last = position(&world, crate_node).y;
    for _ in 0..75 {
        step(&mut world, 1);
        let y = position(&world, crate_node).y;
        assert!(y < last, "box should keep falling, {y} >= {last}");
        last = y;
    }
    step(&mut world, 45);
    assert_relative_eq!(position(&world, crate_node).y, 0.5, epsilon = 0.1);

    let body = world.scene().node(crate_node).unwrap().physics.as_ref().unwrap();
    assert!(body.ready);
    assert_eq!(body.touches, vec![ground_id]);

    let collisions: Vec<_> = world
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            WorldEvent::Collision(collision) => Some(collision),
            _ => None,
        })
        .collect();
    assert!(!collisions.is_empty());
    let first = &collisions[0];
    let mut pair = [first.object, first.other];
    pair.sort();
    assert_eq!(pair, [ground_id, crate_id]);
    assert_relative_eq!(first.normal.length(), 1.0, epsilon = 1e-3);
    assert_eq!(first.relative_velocity, first.impact_velocity);
}

#[test]
fn scaled_box_rests_at_its_scaled_half_height() {
    let mut world = start(inline_config());
    ground(&mut world);
    let (node, _) = world
        .spawn_body(
            SceneNode::new("big crate")
                .at(Vec3::new(0.0, 5.0, 0.0))
                .scaled(Vec3::splat(4.0))
                .with_physics(ObjectDescription::box_shape(1.0, 1.0, 1.0).with_mass(1.0)),
        )
        .unwrap();
    settle(&mut world);
    step(&mut world, 240);
    assert_relative_eq!(position(&world, node).y, 2.0, epsilon = 0.1);
    let worker = world.link().inline_world().unwrap();
    assert!(worker.cached_shape("box_4_4_4").is_some());
}

#[test]
fn lifecycle_events_arrive_in_order() {
    let mut world = start(inline_config());
    let (node, id) = world
        .spawn_body(SceneNode::new("ball").with_physics(ObjectDescription::sphere(0.5).with_mass(1.0)))
        .unwrap();
    settle(&mut world);
    let events = world.drain_events();
    let added = events
        .iter()
        .position(|event| *event == WorldEvent::Added { node, id })
        .unwrap();
    let ready = events
        .iter()
        .position(|event| *event == WorldEvent::Ready { node, id })
        .unwrap();
    assert!(added < ready);
    assert_eq!(events[0], WorldEvent::EngineLoaded);
}

#[test]
fn objects_added_before_the_engine_loads_are_sent_after() {
    let mut world = WorldModule::new(inline_config(), ReferenceLoader::new()).unwrap();
    let (node, id) = world
        .spawn_body(SceneNode::new("early").with_physics(ObjectDescription::sphere(1.0)))
        .unwrap();
    assert!(!world.is_engine_loaded());
    settle(&mut world);
    assert!(world.is_world_ready());
    assert!(world.drain_events().contains(&WorldEvent::Ready { node, id }));
    let worker = world.link().inline_world().unwrap();
    assert!(worker.registry().unwrap().is_live(id));
}

#[test]
fn moved_nodes_override_the_simulated_pose() {
    let mut world = start(inline_config());
    ground(&mut world);
    let (node, _) = world
        .spawn_body(
            SceneNode::new("crate")
                .at(Vec3::new(0.0, 0.5, 0.0))
                .with_physics(ObjectDescription::box_shape(1.0, 1.0, 1.0).with_mass(1.0)),
        )
        .unwrap();
    settle(&mut world);
    step(&mut world, 30);

    world
        .scene_mut()
        .node_mut(node)
        .unwrap()
        .set_position(Vec3::new(4.0, 5.0, 0.0));
    step(&mut world, 1);

    let moved = position(&world, node);
    assert_relative_eq!(moved.x, 4.0, epsilon = 0.01);
    assert!(moved.y < 5.0 && moved.y > 4.9, "unexpected height {}", moved.y);
    assert!(!world.scene().node(node).unwrap().dirty_position());
}

#[test]
fn only_one_step_is_in_flight() {
    let mut world = start(inline_config());
    assert!(world.simulate(None, None));
    assert!(world.is_simulating());
    assert!(!world.simulate(None, None));
    world.poll();
    assert!(!world.is_simulating());
    assert!(world.simulate(None, None));
}

#[test]
fn removed_bodies_stop_being_reported() {
    let mut world = start(inline_config());
    let (node, id) = world
        .spawn_body(SceneNode::new("ball").with_physics(ObjectDescription::sphere(0.5).with_mass(1.0)))
        .unwrap();
    settle(&mut world);
    step(&mut world, 5);
    let before = position(&world, node);

    assert_eq!(world.remove(node).unwrap(), id);
    step(&mut world, 5);
    assert_eq!(position(&world, node), before);
    assert_eq!(world.object_count(), 0);
    let worker = world.link().inline_world().unwrap();
    assert!(!worker.registry().unwrap().is_live(id));
    assert_eq!(worker.live_resources().bodies, 0);
}

#[test]
fn hanging_body_reports_its_world_anchor() {
    let mut world = start(inline_config());
    let (ball, ball_id) = world
        .spawn_body(
            SceneNode::new("pendulum")
                .at(Vec3::new(0.0, 5.0, 0.0))
                .with_physics(ObjectDescription::sphere(0.25).with_mass(1.0)),
        )
        .unwrap();
    settle(&mut world);
    let constraint = world
        .add_constraint(
            ConstraintDescription::new(ConstraintKind::Point, ball_id, Vec3::new(0.0, 1.0, 0.0)),
            true,
        )
        .unwrap();
    world
        .execute(WorkerCommand::ConstraintSetBreakingImpulseThreshold {
            constraint,
            threshold: 50.0,
        })
        .unwrap();
    settle(&mut world);
    step(&mut world, 60);

    assert_relative_eq!(position(&world, ball).y, 5.0, epsilon = 0.15);
    let mirror = world.constraint(constraint).unwrap();
    assert_relative_eq!(mirror.anchor.y, 6.0, epsilon = 0.15);
    assert_eq!(mirror.applied_impulse, 50.0);
    let marker = world.scene().node(mirror.marker.unwrap()).unwrap();
    assert_eq!(marker.position(), Vec3::new(0.0, 1.0, 0.0));
}

#[test]
fn wheel_nodes_follow_the_vehicle_report() {
    let mut world = start(inline_config());
    ground(&mut world);
    let (chassis, _) = world
        .spawn_body(
            SceneNode::new("chassis")
                .at(Vec3::new(0.0, 2.0, 0.0))
                .with_physics(ObjectDescription::box_shape(2.0, 0.5, 4.0).with_mass(800.0)),
        )
        .unwrap();
    settle(&mut world);
    let vehicle = world.add_vehicle(chassis, VehicleTuning::default()).unwrap();
    let left = world.scene_mut().spawn(SceneNode::new("left wheel"));
    let right = world.scene_mut().spawn(SceneNode::new("right wheel"));
    world
        .add_wheel(
            vehicle,
            WheelDescription::new(Vec3::new(-1.0, 0.0, 1.5), 0.6, 0.4).front(),
            left,
        )
        .unwrap();
    world
        .add_wheel(
            vehicle,
            WheelDescription::new(Vec3::new(1.0, 0.0, 1.5), 0.6, 0.4).front(),
            right,
        )
        .unwrap();
    settle(&mut world);
    step(&mut world, 10);

    let chassis_x = position(&world, chassis).x;
    assert!(position(&world, left).x < chassis_x);
    assert!(position(&world, right).x > chassis_x);
    assert_eq!(world.vehicle(vehicle).unwrap().wheels, vec![left, right]);
}

#[test]
fn removed_vehicle_leaves_nothing_behind() {
    let mut world = start(inline_config());
    let (chassis, chassis_id) = world
        .spawn_body(
            SceneNode::new("chassis")
                .at(Vec3::new(0.0, 2.0, 0.0))
                .with_physics(ObjectDescription::box_shape(2.0, 0.5, 4.0).with_mass(800.0)),
        )
        .unwrap();
    settle(&mut world);
    let vehicle = world.add_vehicle(chassis, VehicleTuning::default()).unwrap();
    let wheel = world.scene_mut().spawn(SceneNode::new("wheel"));
    world
        .add_wheel(
            vehicle,
            WheelDescription::new(Vec3::new(-1.0, 0.0, 1.5), 0.6, 0.4),
            wheel,
        )
        .unwrap();
    settle(&mut world);
    step(&mut world, 2);

    world.remove_vehicle(vehicle).unwrap();
    settle(&mut world);
    assert!(world.scene().node(wheel).is_none());
    assert!(world.scene().node(chassis).is_none());
    assert_eq!(world.object_count(), 0);

    let worker = world.link().inline_world().unwrap();
    let registry = worker.registry().unwrap();
    assert!(!registry.is_live(chassis_id));
    assert!(!registry.is_live(vehicle));
    assert_eq!(worker.live_resources().bodies, 0);
    assert_eq!(worker.live_resources().vehicles, 0);
}

#[test]
fn pinned_rope_sags_between_its_ends() {
    let mut world = start(inline_config().with_softbody(true));
    let (rope, _) = world
        .spawn_body(SceneNode::new("rope").with_physics(
            ObjectDescription::new(ShapeParams::SoftRopeMesh {
                start: Vec3::new(0.0, 5.0, 0.0),
                end: Vec3::new(4.0, 5.0, 0.0),
                segments: 4,
                fixed_ends: 0b11,
            })
            .with_mass(1.0),
        ))
        .unwrap();
    settle(&mut world);
    step(&mut world, 30);

    let body = world.scene().node(rope).unwrap().physics.as_ref().unwrap();
    let mesh = body.soft_mesh.as_ref().unwrap();
    assert_eq!(mesh.positions.len(), 5);
    assert!(mesh.normals.is_empty());
    assert_relative_eq!(mesh.positions[0].y, 5.0, epsilon = 1e-4);
    assert_relative_eq!(mesh.positions[4].x, 4.0, epsilon = 1e-4);
    assert!(mesh.positions[2].y < 5.0);
}
