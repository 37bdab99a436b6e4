//! Main-thread half of the bridge.
//!
//! [`WorldModule`] owns the scene mirror and the registry of ids handed to
//! the worker. It turns scene lifecycle calls into worker commands, keeps
//! them behind the engine load, and applies the reports coming back.

pub mod events;
pub mod lifecycle;
pub mod loader;
pub mod scene;
pub mod sync;

use glam::Vec3;
use log::{debug, warn};

use crate::config::WorldConfig;
use crate::core::ConstraintDescription;
use crate::error::Result;
use crate::native::EngineLoader;
use crate::protocol::WorkerCommand;
use crate::transport::WorkerLink;
use crate::utils::allocator::{IdCounter, NodeId, ObjectId, SparseTable};

pub use events::{CollisionEvent, ContactSet, WorldEvent};
pub use loader::{Deferred, LoaderGate};
pub use scene::{PhysicsBody, Scene, SceneNode, SoftMesh};

/// Main-thread view of a vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleMirror {
    pub chassis: ObjectId,
    /// Wheel nodes in the order the wheels were added.
    pub wheels: Vec<NodeId>,
}

/// Main-thread view of a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintMirror {
    pub description: ConstraintDescription,
    /// Debug marker node parented to body A.
    pub marker: Option<NodeId>,
    /// World-space pivot from the last constraint report.
    pub anchor: Vec3,
    /// Value reported alongside the pivot (the breaking impulse threshold).
    pub applied_impulse: f32,
}

pub struct WorldModule {
    link: WorkerLink,
    config: WorldConfig,
    ids: IdCounter,
    scene: Scene,
    objects: SparseTable<NodeId>,
    vehicles: SparseTable<VehicleMirror>,
    constraints: SparseTable<ConstraintMirror>,
    gate: LoaderGate,
    is_simulating: bool,
    engine_loaded: bool,
    world_ready: bool,
    events: Vec<WorldEvent>,
}

impl WorldModule {
    /// Starts a worker as `config` asks and sends it `init`.
    pub fn new<L>(config: WorldConfig, loader: L) -> Result<Self>
    where
        L: EngineLoader + 'static,
    {
        let link = WorkerLink::spawn(loader, &config)?;
        Self::with_link(config, link)
    }

    pub fn with_link(config: WorldConfig, link: WorkerLink) -> Result<Self> {
        link.send(WorkerCommand::Init(config.clone()))?;
        debug!(
            "world module started ({} worker)",
            if link.is_inline() { "inline" } else { "remote" }
        );
        Ok(Self {
            link,
            config,
            ids: IdCounter::new(),
            scene: Scene::new(),
            objects: SparseTable::new(),
            vehicles: SparseTable::new(),
            constraints: SparseTable::new(),
            gate: LoaderGate::new(),
            is_simulating: false,
            engine_loaded: false,
            world_ready: false,
            events: Vec::new(),
        })
    }

    /// Sends a command, or queues it until the engine has loaded.
    pub fn execute(&mut self, command: WorkerCommand) -> Result<()> {
        match self.gate.defer(Deferred::Command(command)) {
            Some(work) => self.run(work),
            None => Ok(()),
        }
    }

    fn run(&mut self, work: Deferred) -> Result<()> {
        match work {
            Deferred::Command(command) => self.link.send(command),
            Deferred::AddNode(node) => self.send_add(node),
        }
    }

    pub(crate) fn replay(&mut self, work: Vec<Deferred>) {
        for item in work {
            if let Err(err) = self.run(item) {
                warn!("deferred operation failed: {err}");
            }
        }
    }

    /// Next id from the counter shared by objects, vehicles and constraints.
    pub fn next_object_id(&mut self) -> ObjectId {
        self.ids.next_id()
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn link(&self) -> &WorkerLink {
        &self.link
    }

    pub fn is_simulating(&self) -> bool {
        self.is_simulating
    }

    pub fn is_engine_loaded(&self) -> bool {
        self.engine_loaded
    }

    pub fn is_world_ready(&self) -> bool {
        self.world_ready
    }

    /// Scene node registered under `id`.
    pub fn object_node(&self, id: ObjectId) -> Option<NodeId> {
        self.objects.get(id).copied()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn vehicle(&self, id: ObjectId) -> Option<&VehicleMirror> {
        self.vehicles.get(id)
    }

    pub fn constraint(&self, id: ObjectId) -> Option<&ConstraintMirror> {
        self.constraints.get(id)
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Stops the worker.
    pub fn shutdown(self) {
        self.link.shutdown();
    }
}
