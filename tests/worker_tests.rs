// Worker-side behaviour driven through the message interface.

use particle_bridge::world::registry::{Registry, RegistryCounts};
use particle_bridge::{
    ChildDescription, ConstraintDescription, ConstraintKind, ControlMessage, FromWorker, Journal, NativeCall, NativeEngine,
    ObjectDescription, ObjectId, Quat, ReferenceLoader, ReportBuffer, ReportKind, ShapeParams,
    SimulationWorld, ToWorker, Vec3, WorkerCommand, WorldConfig,
};

fn running(config: WorldConfig) -> (SimulationWorld, Journal) {
    let journal = Journal::new();
    let mut world = SimulationWorld::new(ReferenceLoader::with_journal(journal.clone()));
    world.handle(WorkerCommand::Init(config.clone()).into());
    world.handle(WorkerCommand::MakeWorld(config).into());
    assert_eq!(
        world.drain_outbox(),
        vec![
            ControlMessage::AmmoLoaded.into(),
            ControlMessage::WorldReady.into()
        ]
    );
    (world, journal)
}

fn add(world: &mut SimulationWorld, id: u32, description: ObjectDescription) -> Vec<FromWorker> {
    world.handle(WorkerCommand::AddObject(description.with_id(ObjectId(id))).into());
    world.drain_outbox()
}

fn simulate(world: &mut SimulationWorld) -> Vec<ReportBuffer> {
    world.handle(
        WorkerCommand::Simulate {
            time_step: None,
            max_sub_steps: None,
        }
        .into(),
    );
    world
        .drain_outbox()
        .into_iter()
        .filter_map(|message| match message {
            FromWorker::Report(buffer) => Some(buffer),
            FromWorker::Control(_) => None,
        })
        .collect()
}

fn world_report(world: &mut SimulationWorld) -> ReportBuffer {
    simulate(world)
        .into_iter()
        .find(|buffer| buffer.kind() == ReportKind::World)
        .unwrap()
}

fn counts(world: &SimulationWorld) -> RegistryCounts {
    world.registry().map(Registry::counts).unwrap()
}

fn body_shape(world: &SimulationWorld, id: u32) -> particle_bridge::native::ShapeHandle {
    let body = world.registry().unwrap().rigid(ObjectId(id)).unwrap();
    world.engine().unwrap().body_shape(body).unwrap()
}

fn is_awake(world: &SimulationWorld, id: u32) -> bool {
    let body = world.registry().unwrap().rigid(ObjectId(id)).unwrap();
    world.engine().unwrap().is_active(body)
}

// bodies that stay slow for two seconds are put to sleep
fn rest(world: &mut SimulationWorld) {
    for _ in 0..150 {
        simulate(world);
    }
}

fn record(world: &mut SimulationWorld, id: u32) -> particle_bridge::protocol::report::WorldRecord {
    world_report(world)
        .world_records()
        .unwrap()
        .into_iter()
        .find(|record| record.id == ObjectId(id))
        .unwrap()
}

#[test]
fn identical_primitives_share_one_shape() {
    let (mut world, _) = running(WorldConfig::default());
    add(&mut world, 1, ObjectDescription::box_shape(1.0, 1.0, 1.0).with_mass(1.0));
    add(&mut world, 2, ObjectDescription::box_shape(1.0, 1.0, 1.0).with_mass(2.0));
    add(&mut world, 3, ObjectDescription::sphere(0.5));
    add(&mut world, 4, ObjectDescription::sphere(0.75));

    assert_eq!(body_shape(&world, 1), body_shape(&world, 2));
    assert_ne!(body_shape(&world, 3), body_shape(&world, 4));
    assert_eq!(world.cached_shape("box_1_1_1"), Some(body_shape(&world, 1)));
    assert_eq!(world.cached_shape("sphere_0.75"), Some(body_shape(&world, 4)));
    assert_eq!(world.live_resources().shapes, 3);
}

#[test]
fn every_add_is_undone_by_its_remove() {
    let (mut world, _) = running(WorldConfig::default());
    let before = counts(&world);

    let convex = ObjectDescription::new(ShapeParams::Convex {
        data: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    })
    .with_mass(1.0);
    let concave = ObjectDescription::new(ShapeParams::Concave {
        data: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
    });
    let heightfield = ObjectDescription::new(ShapeParams::Heightfield {
        xpts: 2,
        ypts: 2,
        xsize: 4.0,
        ysize: 4.0,
        points: vec![0.0, 0.5, 0.5, 1.0],
    });
    let compound = ObjectDescription::box_shape(1.0, 1.0, 1.0)
        .with_mass(1.0)
        .with_child(ChildDescription::new(
            ShapeParams::Sphere { radius: 0.5 },
            Vec3::new(0.0, 1.0, 0.0),
            Quat::IDENTITY,
        ));
    for (id, description) in [(1, convex), (2, concave), (3, heightfield), (4, compound)] {
        assert_eq!(
            add(&mut world, id, description),
            vec![ControlMessage::ObjectReady(ObjectId(id)).into()]
        );
    }
    let added = counts(&world);
    assert_eq!(added.rigid, 4);
    assert_eq!(added.compound_shapes, 1);
    assert_eq!(added.noncached_shapes, 3);

    for id in 1..=4 {
        world.handle(WorkerCommand::RemoveObject { id: ObjectId(id) }.into());
    }
    assert_eq!(counts(&world), before);
    let live = world.live_resources();
    assert_eq!(live.bodies, 0);
    assert_eq!(live.motion_states, 0);
    // only the cached box and sphere survive
    assert_eq!(live.shapes, 2);
}

#[test]
fn noncached_shape_goes_after_its_body() {
    let (mut world, journal) = running(WorldConfig::default());
    add(
        &mut world,
        1,
        ObjectDescription::new(ShapeParams::Convex {
            data: vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0],
        })
        .with_mass(1.0),
    );
    let shape = body_shape(&world, 1);
    journal.clear();

    world.handle(WorkerCommand::RemoveObject { id: ObjectId(1) }.into());
    let remove = journal
        .calls()
        .iter()
        .position(|call| matches!(call, NativeCall::RemoveRigidBody(_)))
        .unwrap();
    let destroy_shape = journal.position(NativeCall::DestroyShape(shape)).unwrap();
    assert!(remove < destroy_shape);
    assert_eq!(destroy_shape, journal.len() - 1);
}

#[test]
fn duplicate_ids_are_refused() {
    let (mut world, _) = running(WorldConfig::default());
    add(&mut world, 1, ObjectDescription::sphere(1.0));
    let replies = add(&mut world, 1, ObjectDescription::box_shape(1.0, 2.0, 3.0));
    assert!(replies.is_empty());
    assert_eq!(counts(&world).objects, 1);
    assert!(world.cached_shape("box_1_2_3").is_none());
}

#[test]
fn commands_for_unknown_ids_are_dropped() {
    let (mut world, _) = running(WorldConfig::default());
    let unknown = ObjectId(42);
    world.handle(
        WorkerCommand::ApplyCentralImpulse {
            id: unknown,
            x: 1.0,
            y: 0.0,
            z: 0.0,
        }
        .into(),
    );
    world.handle(WorkerCommand::RemoveObject { id: unknown }.into());
    world.handle(WorkerCommand::RemoveConstraint { id: unknown }.into());
    world.handle(
        WorkerCommand::SetSteering {
            id: unknown,
            wheel: 0,
            steering: 0.3,
        }
        .into(),
    );
    assert!(world.drain_outbox().is_empty());
    assert_eq!(counts(&world), RegistryCounts::default());
}

#[test]
fn gravity_can_be_changed_between_steps() {
    let (mut world, _) = running(WorldConfig::default());
    add(&mut world, 1, ObjectDescription::sphere(0.5).with_mass(1.0));
    world.handle(
        WorkerCommand::SetGravity {
            x: 0.0,
            y: 10.0,
            z: 0.0,
        }
        .into(),
    );
    let records = world_report(&mut world).world_records().unwrap();
    assert!(records[0].position.y > 0.0);
    assert!(records[0].linear_velocity.y > 0.0);
}

#[test]
fn impulses_change_the_reported_velocity() {
    let (mut world, _) = running(WorldConfig::default().with_gravity(Vec3::ZERO));
    add(&mut world, 1, ObjectDescription::sphere(0.5).with_mass(2.0));
    world.handle(
        WorkerCommand::ApplyCentralImpulse {
            id: ObjectId(1),
            x: 4.0,
            y: 0.0,
            z: 0.0,
        }
        .into(),
    );
    let records = world_report(&mut world).world_records().unwrap();
    approx::assert_relative_eq!(records[0].linear_velocity.x, 2.0, epsilon = 1e-4);
}

#[test]
fn mass_changes_reinsert_the_body() {
    let (mut world, journal) = running(WorldConfig::default());
    add(
        &mut world,
        1,
        ObjectDescription::sphere(0.5).with_position(Vec3::new(0.0, 5.0, 0.0)),
    );
    let body = world.registry().unwrap().rigid(ObjectId(1)).unwrap();
    assert_eq!(record(&mut world, 1).position.y, 5.0);
    journal.clear();

    world.handle(
        WorkerCommand::UpdateMass {
            id: ObjectId(1),
            mass: 1.0,
        }
        .into(),
    );
    let removed = journal.position(NativeCall::RemoveRigidBody(body)).unwrap();
    let added = journal.position(NativeCall::AddRigidBody(body)).unwrap();
    assert!(removed < added);
    assert!(is_awake(&world, 1));

    let moved = record(&mut world, 1);
    assert!(moved.position.y < 5.0);
    assert!(moved.linear_velocity.y < 0.0);
}

#[test]
fn forces_and_impulses_wake_sleeping_bodies() {
    let (mut world, _) = running(WorldConfig::default().with_gravity(Vec3::ZERO));
    add(&mut world, 1, ObjectDescription::sphere(0.5).with_mass(1.0));
    add(
        &mut world,
        2,
        ObjectDescription::sphere(0.5)
            .with_mass(1.0)
            .with_position(Vec3::new(5.0, 0.0, 0.0)),
    );
    rest(&mut world);
    assert!(!is_awake(&world, 1));
    assert!(!is_awake(&world, 2));

    world.handle(
        WorkerCommand::ApplyCentralImpulse {
            id: ObjectId(1),
            x: 0.0,
            y: 3.0,
            z: 0.0,
        }
        .into(),
    );
    world.handle(
        WorkerCommand::ApplyCentralForce {
            id: ObjectId(2),
            x: 0.0,
            y: 60.0,
            z: 0.0,
        }
        .into(),
    );
    assert!(is_awake(&world, 1));
    assert!(is_awake(&world, 2));
    assert!(record(&mut world, 1).linear_velocity.y > 2.0);
    assert!(record(&mut world, 2).linear_velocity.y > 0.0);
}

#[test]
fn motor_commands_wake_both_constrained_bodies() {
    let (mut world, _) = running(WorldConfig::default().with_gravity(Vec3::ZERO));
    add(&mut world, 1, ObjectDescription::sphere(0.5).with_mass(1.0));
    add(
        &mut world,
        2,
        ObjectDescription::sphere(0.5)
            .with_mass(1.0)
            .with_position(Vec3::new(2.0, 0.0, 0.0)),
    );
    let mut hinge =
        ConstraintDescription::new(ConstraintKind::Hinge { axis: Vec3::Y }, ObjectId(1), Vec3::X)
            .between(ObjectId(2), Vec3::NEG_X);
    hinge.id = ObjectId(3);
    world.handle(WorkerCommand::AddConstraint(hinge).into());
    assert_eq!(counts(&world).constraints, 1);
    rest(&mut world);
    assert!(!is_awake(&world, 1));
    assert!(!is_awake(&world, 2));

    // a slider command on a hinge is refused and wakes nothing
    world.handle(
        WorkerCommand::SliderDisableLinearMotor {
            constraint: ObjectId(3),
        }
        .into(),
    );
    assert!(!is_awake(&world, 1));

    world.handle(
        WorkerCommand::HingeEnableAngularMotor {
            constraint: ObjectId(3),
            velocity: 1.0,
            acceleration: 10.0,
        }
        .into(),
    );
    assert!(is_awake(&world, 1));
    assert!(is_awake(&world, 2));
}

#[test]
fn reused_report_buffers_only_grow() {
    let config = WorldConfig::default().with_report_size(4);
    let (mut world, _) = running(config);
    let mut previous = 0;
    for n in 1..=10_u32 {
        add(
            &mut world,
            n,
            ObjectDescription::sphere(0.5).with_position(Vec3::new(n as f32 * 3.0, 0.0, 0.0)),
        );
        let report = world_report(&mut world);
        assert_eq!(report.count(), n as usize);
        assert!(report.len() >= 2 + n as usize * 14);
        assert!(report.len() >= previous);
        previous = report.len();
        world.handle(ToWorker::Reclaim(report));
        assert_eq!(world.report_capacity(ReportKind::World), Some(previous));
    }
    // chunks of four records: 4, 8, 12
    assert_eq!(previous, 2 + 12 * 14);
}

#[test]
fn fresh_buffers_are_sized_exactly() {
    let (mut world, _) = running(WorldConfig::default().with_transferable(false));
    for n in 1..=3_u32 {
        add(&mut world, n, ObjectDescription::sphere(0.5));
    }
    let report = world_report(&mut world);
    assert_eq!(report.len(), 2 + 3 * 14);
    world.handle(ToWorker::Reclaim(report));
    assert_eq!(world.report_capacity(ReportKind::World), None);
}

#[test]
fn soft_report_carries_every_rope_node() {
    let (mut world, _) = running(WorldConfig::default().with_softbody(true));
    add(
        &mut world,
        1,
        ObjectDescription::new(ShapeParams::SoftRopeMesh {
            start: Vec3::ZERO,
            end: Vec3::new(3.0, 0.0, 0.0),
            segments: 3,
            fixed_ends: 0,
        })
        .with_mass(1.0),
    );
    assert_eq!(counts(&world).soft, 1);
    let soft = simulate(&mut world)
        .into_iter()
        .find(|buffer| buffer.kind() == ReportKind::Soft)
        .unwrap();
    // tag, body count, then [id, nodes, xyz per node]
    assert_eq!(soft.as_slice()[1], 1.0);
    assert_eq!(soft.as_slice()[2], 1.0);
    assert_eq!(soft.as_slice()[3], 4.0);
    assert!(soft.len() >= 4 + 4 * 3);
}
