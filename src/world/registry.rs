//! Worker-side tables mapping application ids to native handles.

use std::collections::HashMap;

use glam::Vec3;

use crate::core::ConstraintKind;
use crate::error::{BridgeError, Result};
use crate::native::{BodyHandle, ConstraintHandle, MotionStateHandle, ShapeHandle, VehicleHandle};
use crate::protocol::report::{SoftKind, SOFT_OBJECT_HEADER};
use crate::utils::allocator::{ObjectId, SparseTable};

/// Body kind, numbered as the report tags it (0 soft, 1 rigid).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Soft = 0,
    Rigid = 1,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyEntry {
    pub handle: BodyHandle,
    pub kind: BodyKind,
    pub soft_kind: Option<SoftKind>,
    /// Values this body contributes to the soft report, header included.
    pub report_size: usize,
    /// Explicit group/mask the body was added with.
    pub filter: Option<(i32, i32)>,
}

impl BodyEntry {
    pub fn rigid(handle: BodyHandle) -> Self {
        Self {
            handle,
            kind: BodyKind::Rigid,
            soft_kind: None,
            report_size: 0,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<(i32, i32)>) -> Self {
        self.filter = filter;
        self
    }

    pub fn soft(handle: BodyHandle, kind: SoftKind, elements: usize) -> Self {
        Self {
            handle,
            kind: BodyKind::Soft,
            soft_kind: Some(kind),
            report_size: SOFT_OBJECT_HEADER + elements * kind.stride(),
            filter: None,
        }
    }

    pub fn is_soft(&self) -> bool {
        self.kind == BodyKind::Soft
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleEntry {
    pub handle: VehicleHandle,
    pub chassis: ObjectId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintEntry {
    pub handle: ConstraintHandle,
    pub kind: ConstraintKind,
    pub body_a: ObjectId,
    pub body_b: Option<ObjectId>,
    /// Pivot in body A's local frame, echoed in constraint reports.
    pub pivot_a: Vec3,
}

/// Compound shape plus the unique child shapes only it references.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundEntry {
    pub shape: ShapeHandle,
    pub owned_children: Vec<ShapeHandle>,
}

impl CompoundEntry {
    pub fn new(shape: ShapeHandle) -> Self {
        Self {
            shape,
            owned_children: Vec::new(),
        }
    }
}

/// Snapshot of the registry table sizes, used to check add/remove pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryCounts {
    pub objects: usize,
    pub rigid: usize,
    pub soft: usize,
    pub vehicles: usize,
    pub constraints: usize,
    pub motion_states: usize,
    pub compound_shapes: usize,
    pub noncached_shapes: usize,
    pub pointers: usize,
}

/// Id-indexed native resources owned by one worker world.
#[derive(Debug, Default)]
pub struct Registry {
    pub objects: SparseTable<BodyEntry>,
    pub vehicles: SparseTable<VehicleEntry>,
    pub constraints: SparseTable<ConstraintEntry>,
    pub motion_states: SparseTable<MotionStateHandle>,
    pub compound_shapes: SparseTable<CompoundEntry>,
    pub noncached_shapes: SparseTable<ShapeHandle>,
    pointer_ids: HashMap<BodyHandle, ObjectId>,
    num_objects: usize,
    num_rigid: usize,
    num_soft: usize,
    soft_report_size: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is live in any of the three id-keyed tables.
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.objects.contains(id) || self.vehicles.contains(id) || self.constraints.contains(id)
    }

    pub fn body(&self, id: ObjectId) -> Result<&BodyEntry> {
        self.objects.get(id).ok_or(BridgeError::UnknownObject(id))
    }

    pub fn rigid(&self, id: ObjectId) -> Result<BodyHandle> {
        let entry = self.body(id)?;
        match entry.kind {
            BodyKind::Rigid => Ok(entry.handle),
            BodyKind::Soft => Err(BridgeError::WrongBodyKind(id)),
        }
    }

    pub fn soft(&self, id: ObjectId) -> Result<BodyHandle> {
        let entry = self.body(id)?;
        match entry.kind {
            BodyKind::Soft => Ok(entry.handle),
            BodyKind::Rigid => Err(BridgeError::WrongBodyKind(id)),
        }
    }

    pub fn vehicle(&self, id: ObjectId) -> Result<&VehicleEntry> {
        self.vehicles.get(id).ok_or(BridgeError::UnknownVehicle(id))
    }

    pub fn constraint(&self, id: ObjectId) -> Result<&ConstraintEntry> {
        self.constraints
            .get(id)
            .ok_or(BridgeError::UnknownConstraint(id))
    }

    /// Resolves a native body pointer from a manifold back to its id.
    pub fn id_for(&self, handle: BodyHandle) -> Option<ObjectId> {
        self.pointer_ids.get(&handle).copied()
    }

    pub fn register_body(&mut self, id: ObjectId, entry: BodyEntry) {
        match entry.kind {
            BodyKind::Rigid => self.num_rigid += 1,
            BodyKind::Soft => {
                self.num_soft += 1;
                self.soft_report_size += entry.report_size;
            }
        }
        self.pointer_ids.insert(entry.handle, id);
        self.objects.insert(id, entry);
        self.num_objects += 1;
    }

    /// Clears every table slot that belongs to a body and returns what was there.
    ///
    /// Callers destroy the native resources; this only forgets them.
    pub fn unregister_body(&mut self, id: ObjectId) -> Option<RemovedBody> {
        let entry = self.objects.remove(id)?;
        match entry.kind {
            BodyKind::Rigid => self.num_rigid -= 1,
            BodyKind::Soft => {
                self.num_soft -= 1;
                self.soft_report_size -= entry.report_size;
            }
        }
        self.pointer_ids.remove(&entry.handle);
        let removed = RemovedBody {
            entry,
            motion_state: self.motion_states.remove(id),
            compound: self.compound_shapes.remove(id),
            noncached: self.noncached_shapes.remove(id),
        };
        self.num_objects -= 1;
        Some(removed)
    }

    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    pub fn num_rigid(&self) -> usize {
        self.num_rigid
    }

    pub fn num_soft(&self) -> usize {
        self.num_soft
    }

    /// Running total of soft report values, excluding the report header.
    pub fn soft_report_size(&self) -> usize {
        self.soft_report_size
    }

    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            objects: self.objects.len(),
            rigid: self.num_rigid,
            soft: self.num_soft,
            vehicles: self.vehicles.len(),
            constraints: self.constraints.len(),
            motion_states: self.motion_states.len(),
            compound_shapes: self.compound_shapes.len(),
            noncached_shapes: self.noncached_shapes.len(),
            pointers: self.pointer_ids.len(),
        }
    }
}

/// Table entries released by [`Registry::unregister_body`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedBody {
    pub entry: BodyEntry,
    pub motion_state: Option<MotionStateHandle>,
    pub compound: Option<CompoundEntry>,
    pub noncached: Option<ShapeHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregister_clears_every_table() {
        let mut registry = Registry::new();
        let id = ObjectId(3);
        registry.register_body(id, BodyEntry::rigid(BodyHandle(10)));
        registry.motion_states.insert(id, MotionStateHandle(11));
        registry.compound_shapes.insert(id, CompoundEntry::new(ShapeHandle(12)));

        assert_eq!(registry.id_for(BodyHandle(10)), Some(id));
        let removed = registry.unregister_body(id).unwrap();
        assert_eq!(removed.motion_state, Some(MotionStateHandle(11)));
        assert_eq!(removed.compound.map(|c| c.shape), Some(ShapeHandle(12)));
        assert_eq!(registry.counts(), RegistryCounts::default());
        assert!(registry.unregister_body(id).is_none());
    }

    #[test]
    fn soft_report_size_tracks_adds_and_removes() {
        let mut registry = Registry::new();
        registry.register_body(ObjectId(1), BodyEntry::soft(BodyHandle(1), SoftKind::Rope, 5));
        registry.register_body(ObjectId(2), BodyEntry::soft(BodyHandle(2), SoftKind::Cloth, 4));
        assert_eq!(registry.soft_report_size(), (2 + 15) + (2 + 24));
        registry.unregister_body(ObjectId(1));
        assert_eq!(registry.soft_report_size(), 2 + 24);
        assert_eq!(registry.num_soft(), 1);
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let mut registry = Registry::new();
        registry.register_body(ObjectId(1), BodyEntry::soft(BodyHandle(1), SoftKind::Rope, 2));
        assert_eq!(
            registry.rigid(ObjectId(1)),
            Err(BridgeError::WrongBodyKind(ObjectId(1)))
        );
        assert_eq!(
            registry.rigid(ObjectId(2)),
            Err(BridgeError::UnknownObject(ObjectId(2)))
        );
    }
}
