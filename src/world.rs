//! Worker-side simulation context.
//!
//! A [`SimulationWorld`] owns the native engine and everything registered in
//! it. It consumes [`ToWorker`] messages one at a time and queues whatever the
//! worker wants to post back (reports and control acknowledgements).

mod dispatch;
pub mod factory;
pub mod registry;
pub mod reports;
mod session;
pub mod stepper;

use log::{debug, warn};

use crate::config::WorldConfig;
use crate::error::{BridgeError, Result};
use crate::native::{EngineLoader, NativeEngine, ResourceCounts, ShapeHandle};
use crate::protocol::report::ReportKind;
use crate::protocol::{ControlMessage, FromWorker, ToWorker, WorkerCommand};

pub use factory::{BuiltShape, ShapeCache};
pub use registry::{BodyEntry, BodyKind, Registry, RegistryCounts};
pub use reports::ReportSlots;

use session::Session;

enum Stage {
    Unloaded,
    Loaded(Box<dyn NativeEngine>),
    Running(Session),
}

/// The physics world as seen from inside the worker.
pub struct SimulationWorld {
    loader: Box<dyn EngineLoader>,
    stage: Stage,
    outbox: Vec<FromWorker>,
}

impl SimulationWorld {
    pub fn new<L>(loader: L) -> Self
    where
        L: EngineLoader + 'static,
    {
        Self {
            loader: Box::new(loader),
            stage: Stage::Unloaded,
            outbox: Vec::new(),
        }
    }

    /// Handles one inbound message. Command failures are logged, never returned.
    pub fn handle(&mut self, message: ToWorker) {
        match message {
            ToWorker::Command(command) => {
                let name = command.name();
                if let Err(err) = self.dispatch(command) {
                    warn!("{name} ignored: {err}");
                }
            }
            ToWorker::Reclaim(buffer) => match &mut self.stage {
                Stage::Running(session) => session.reports.reclaim(buffer),
                _ => debug!("dropping reclaimed {:?} report, no world", buffer.kind()),
            },
        }
    }

    /// Messages queued for the main thread since the last drain, in order.
    pub fn drain_outbox(&mut self) -> Vec<FromWorker> {
        std::mem::take(&mut self.outbox)
    }

    fn dispatch(&mut self, command: WorkerCommand) -> Result<()> {
        match command {
            WorkerCommand::Init(config) => self.init(&config),
            WorkerCommand::MakeWorld(config) => self.make_world(config),
            command => match &mut self.stage {
                Stage::Running(session) => session.dispatch(command, &mut self.outbox),
                Stage::Loaded(_) => Err(BridgeError::WorldNotCreated),
                Stage::Unloaded => Err(BridgeError::EngineNotLoaded),
            },
        }
    }

    fn init(&mut self, config: &WorldConfig) -> Result<()> {
        if matches!(self.stage, Stage::Unloaded) {
            let engine = self.loader.load(config)?;
            debug!("engine {} loaded", engine.name());
            self.stage = Stage::Loaded(engine);
        } else {
            debug!("init received with the engine already loaded");
        }
        self.outbox.push(ControlMessage::AmmoLoaded.into());
        Ok(())
    }

    /// Creates the world, tearing down a previous one first.
    fn make_world(&mut self, config: WorldConfig) -> Result<()> {
        let engine = match std::mem::replace(&mut self.stage, Stage::Unloaded) {
            Stage::Unloaded => return Err(BridgeError::EngineNotLoaded),
            Stage::Loaded(engine) => engine,
            Stage::Running(session) => session.teardown(),
        };
        self.stage = Stage::Running(Session::new(engine, config));
        self.outbox.push(ControlMessage::WorldReady.into());
        Ok(())
    }

    pub fn is_engine_loaded(&self) -> bool {
        !matches!(self.stage, Stage::Unloaded)
    }

    pub fn is_world_ready(&self) -> bool {
        matches!(self.stage, Stage::Running(_))
    }

    fn session(&self) -> Option<&Session> {
        match &self.stage {
            Stage::Running(session) => Some(session),
            _ => None,
        }
    }

    pub fn registry(&self) -> Option<&Registry> {
        self.session().map(|session| &session.registry)
    }

    pub fn engine(&self) -> Option<&dyn NativeEngine> {
        match &self.stage {
            Stage::Unloaded => None,
            Stage::Loaded(engine) => Some(engine.as_ref()),
            Stage::Running(session) => Some(session.engine.as_ref()),
        }
    }

    pub fn config(&self) -> Option<&WorldConfig> {
        self.session().map(|session| &session.config)
    }

    /// Cached primitive shape, keyed like `box_1_1_1` or `sphere_0.5`.
    pub fn cached_shape(&self, key: &str) -> Option<ShapeHandle> {
        self.session().and_then(|session| session.shapes.get(key))
    }

    /// Length of the report buffer the worker currently holds for `kind`.
    pub fn report_capacity(&self, kind: ReportKind) -> Option<usize> {
        self.session()
            .and_then(|session| session.reports.capacity(kind))
    }

    pub fn live_resources(&self) -> ResourceCounts {
        self.engine()
            .map(NativeEngine::live_resources)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChildDescription, ObjectDescription, ShapeParams};
    use crate::native::{Journal, NativeCall, ReferenceLoader};
    use crate::protocol::report::ReportBuffer;
    use crate::utils::allocator::ObjectId;
    use glam::{Quat, Vec3};

    fn running(config: WorldConfig) -> (SimulationWorld, Journal) {
        let journal = Journal::new();
        let mut world = SimulationWorld::new(ReferenceLoader::with_journal(journal.clone()));
        world.handle(WorkerCommand::Init(config.clone()).into());
        world.handle(WorkerCommand::MakeWorld(config).into());
        world.drain_outbox();
        (world, journal)
    }

    fn reports(outbox: Vec<FromWorker>) -> Vec<ReportBuffer> {
        outbox
            .into_iter()
            .filter_map(|message| match message {
                FromWorker::Report(buffer) => Some(buffer),
                FromWorker::Control(_) => None,
            })
            .collect()
    }

    #[test]
    fn handshake_acknowledges_each_stage() {
        let mut world = SimulationWorld::new(ReferenceLoader::new());
        world.handle(WorkerCommand::AddObject(ObjectDescription::sphere(1.0)).into());
        assert!(world.drain_outbox().is_empty());

        world.handle(WorkerCommand::Init(WorldConfig::default()).into());
        world.handle(WorkerCommand::MakeWorld(WorldConfig::default()).into());
        assert_eq!(
            world.drain_outbox(),
            vec![
                ControlMessage::AmmoLoaded.into(),
                ControlMessage::WorldReady.into()
            ]
        );
        assert!(world.is_world_ready());
    }

    #[test]
    fn add_object_replies_object_ready() {
        let (mut world, _) = running(WorldConfig::default());
        let description = ObjectDescription::box_shape(1.0, 1.0, 1.0).with_id(ObjectId(1));
        world.handle(WorkerCommand::AddObject(description).into());
        assert_eq!(
            world.drain_outbox(),
            vec![ControlMessage::ObjectReady(ObjectId(1)).into()]
        );
        assert_eq!(world.registry().map(Registry::num_rigid), Some(1));
    }

    #[test]
    fn unknown_shapes_leave_no_trace() {
        let (mut world, _) = running(WorldConfig::default());
        let description = ObjectDescription::new(ShapeParams::Unknown).with_id(ObjectId(1));
        world.handle(WorkerCommand::AddObject(description).into());
        assert!(world.drain_outbox().is_empty());
        assert_eq!(world.registry().map(Registry::counts), Some(RegistryCounts::default()));
        assert!(world.live_resources().is_empty());
    }

    #[test]
    fn step_reports_follow_fixed_order() {
        let (mut world, _) = running(WorldConfig::default().with_softbody(true));
        world.handle(
            WorkerCommand::AddObject(ObjectDescription::sphere(0.5).with_id(ObjectId(1)).with_mass(1.0))
                .into(),
        );
        world.drain_outbox();
        world.handle(
            WorkerCommand::Simulate {
                time_step: None,
                max_sub_steps: None,
            }
            .into(),
        );
        let kinds: Vec<_> = reports(world.drain_outbox())
            .iter()
            .map(ReportBuffer::kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ReportKind::Collision, ReportKind::World, ReportKind::Soft]
        );
    }

    #[test]
    fn world_report_walks_ids_in_reverse() {
        let (mut world, _) = running(WorldConfig::default());
        for id in 1..=3 {
            let description = ObjectDescription::sphere(0.5)
                .with_id(ObjectId(id))
                .with_position(Vec3::new(id as f32 * 10.0, 0.0, 0.0));
            world.handle(WorkerCommand::AddObject(description).into());
        }
        world.handle(
            WorkerCommand::Simulate {
                time_step: None,
                max_sub_steps: None,
            }
            .into(),
        );
        let world_report = reports(world.drain_outbox())
            .into_iter()
            .find(|buffer| buffer.kind() == ReportKind::World)
            .unwrap();
        let ids: Vec<_> = world_report
            .world_records()
            .unwrap()
            .iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(ids, vec![ObjectId(3), ObjectId(2), ObjectId(1)]);
    }

    #[test]
    fn compound_removal_destroys_in_reverse_construction_order() {
        let (mut world, journal) = running(WorldConfig::default());
        let description = ObjectDescription::box_shape(1.0, 1.0, 1.0)
            .with_id(ObjectId(1))
            .with_mass(1.0)
            .with_child(ChildDescription::new(
                ShapeParams::Convex {
                    data: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                },
                Vec3::new(0.0, 1.0, 0.0),
                Quat::IDENTITY,
            ));
        world.handle(WorkerCommand::AddObject(description).into());
        let before = world.live_resources();
        journal.clear();

        world.handle(WorkerCommand::RemoveObject { id: ObjectId(1) }.into());
        let calls = journal.calls();
        let position = |matcher: fn(&NativeCall) -> bool| calls.iter().position(matcher).unwrap();
        let removed = position(|call| matches!(call, NativeCall::RemoveRigidBody(_)));
        let motion_state = position(|call| matches!(call, NativeCall::DestroyMotionState(_)));
        let body = position(|call| matches!(call, NativeCall::DestroyBody(_)));
        let shape = position(|call| matches!(call, NativeCall::DestroyShape(_)));
        assert!(removed < motion_state && motion_state < body && body < shape);

        // compound container and the convex child go; the cached box stays
        let after = world.live_resources();
        assert_eq!(after.shapes, before.shapes - 2);
        assert_eq!(after.bodies, 0);
        assert_eq!(after.motion_states, 0);
        assert_eq!(world.registry().map(Registry::counts), Some(RegistryCounts::default()));
    }

    #[test]
    fn remaking_the_world_releases_everything() {
        let (mut world, _) = running(WorldConfig::default());
        world.handle(
            WorkerCommand::AddObject(
                ObjectDescription::new(ShapeParams::Convex {
                    data: vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
                })
                .with_id(ObjectId(1)),
            )
            .into(),
        );
        assert!(!world.live_resources().is_empty());
        world.handle(WorkerCommand::MakeWorld(WorldConfig::default()).into());
        assert!(world.live_resources().is_empty());
    }
}
