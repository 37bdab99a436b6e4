//! Report encoders: pack native state into flat buffers after each step.

use log::{trace, warn};

use super::registry::Registry;
use crate::native::NativeEngine;
use crate::protocol::report::{
    required_len, CollisionRecord, ConstraintRecord, ReportBuffer, ReportKind, SoftKind,
    VehicleRecord, WorldRecord, HEADER_LEN,
};
use crate::utils::logging::ScopedTimer;

/// Report buffers the worker currently owns.
///
/// With transferable buffers each slot is empty between sending a report and
/// getting it back; without them buffers are rebuilt at exact size every step.
#[derive(Debug)]
pub struct ReportSlots {
    chunk_size: usize,
    transferable: bool,
    slots: [Option<ReportBuffer>; 5],
}

impl ReportSlots {
    pub fn new(chunk_size: usize, transferable: bool) -> Self {
        let chunk_size = chunk_size.max(1);
        let slots = ReportKind::ALL.map(|kind| {
            let fixed = kind.item_size().is_some();
            (transferable && fixed).then(|| ReportBuffer::with_chunk(kind, chunk_size))
        });
        Self {
            chunk_size,
            transferable,
            slots,
        }
    }

    pub fn transferable(&self) -> bool {
        self.transferable
    }

    /// Length of the buffer parked in the slot, if the worker holds it.
    pub fn capacity(&self, kind: ReportKind) -> Option<usize> {
        self.slots[slot_index(kind)].as_ref().map(ReportBuffer::len)
    }

    /// Takes the buffer back from the main thread.
    pub fn reclaim(&mut self, buffer: ReportBuffer) {
        if !self.transferable {
            return;
        }
        let slot = &mut self.slots[slot_index(buffer.kind())];
        match slot {
            // keep whichever is larger so capacity never shrinks
            Some(current) if current.len() >= buffer.len() => {}
            _ => *slot = Some(buffer),
        }
    }

    /// Buffer sized for `count` fixed-size records.
    fn fixed(&mut self, kind: ReportKind, count: usize) -> ReportBuffer {
        let item = kind.item_size().unwrap_or(1);
        if !self.transferable {
            return ReportBuffer::with_len(kind, required_len(count, item));
        }
        let mut buffer = self.slots[slot_index(kind)].take().unwrap_or_else(|| {
            trace!("{kind:?} report not reclaimed yet; allocating a fresh one");
            ReportBuffer::with_chunk(kind, self.chunk_size)
        });
        if buffer.ensure_capacity(count, self.chunk_size) {
            trace!("{kind:?} report grown to {} values", buffer.len());
        }
        buffer
    }

    /// Buffer of at least `len` values for the variable-size soft report.
    fn sized(&mut self, kind: ReportKind, len: usize) -> ReportBuffer {
        if !self.transferable {
            return ReportBuffer::with_len(kind, len);
        }
        let mut buffer = self.slots[slot_index(kind)]
            .take()
            .unwrap_or_else(|| ReportBuffer::with_len(kind, len));
        buffer.ensure_len(len);
        buffer
    }
}

fn slot_index(kind: ReportKind) -> usize {
    kind.tag() as usize
}

/// One record per rigid body, walking the registry from the highest id down.
pub fn report_world(
    engine: &dyn NativeEngine,
    registry: &Registry,
    slots: &mut ReportSlots,
) -> ReportBuffer {
    let _timer = ScopedTimer::new("report::world");
    let mut buffer = slots.fixed(ReportKind::World, registry.num_rigid());
    let mut written = 0;
    for (id, entry) in registry.objects.iter().rev() {
        if entry.is_soft() {
            continue;
        }
        let transform = engine.world_transform(entry.handle);
        let velocity = engine.velocity(entry.handle);
        let record = WorldRecord {
            id,
            position: transform.position,
            rotation: transform.rotation,
            linear_velocity: velocity.linear,
            angular_velocity: velocity.angular,
        };
        buffer.write_record(written, &record.to_values());
        written += 1;
    }
    buffer.set_count(written);
    buffer
}

/// One record per touching manifold, from its first contact point.
pub fn report_collisions(
    engine: &dyn NativeEngine,
    registry: &Registry,
    slots: &mut ReportSlots,
) -> ReportBuffer {
    let _timer = ScopedTimer::new("report::collisions");
    let manifolds = engine.manifolds();
    let mut buffer = slots.fixed(ReportKind::Collision, manifolds.len());
    let mut written = 0;
    for manifold in manifolds {
        let Some(point) = manifold.points.first() else {
            continue;
        };
        let (Some(body_a), Some(body_b)) = (
            registry.id_for(manifold.body0),
            registry.id_for(manifold.body1),
        ) else {
            warn!(
                "manifold between unregistered bodies {:?} and {:?}",
                manifold.body0, manifold.body1
            );
            continue;
        };
        let record = CollisionRecord {
            body_a,
            body_b,
            normal: point.normal_world_on_b,
        };
        buffer.write_record(written, &record.to_values());
        written += 1;
    }
    buffer.set_count(written);
    buffer
}

/// One record per wheel of every registered vehicle.
pub fn report_vehicles(
    engine: &dyn NativeEngine,
    registry: &Registry,
    slots: &mut ReportSlots,
) -> ReportBuffer {
    let _timer = ScopedTimer::new("report::vehicles");
    let wheels: usize = registry
        .vehicles
        .iter()
        .map(|(_, vehicle)| engine.wheel_count(vehicle.handle))
        .sum();
    let mut buffer = slots.fixed(ReportKind::Vehicle, wheels);
    let mut written = 0;
    for (id, vehicle) in registry.vehicles.iter() {
        for wheel in 0..engine.wheel_count(vehicle.handle) {
            let transform = engine.wheel_transform(vehicle.handle, wheel);
            let record = VehicleRecord {
                vehicle: id,
                wheel,
                position: transform.position,
                rotation: transform.rotation,
            };
            buffer.write_record(written, &record.to_values());
            written += 1;
        }
    }
    buffer.set_count(written);
    buffer
}

/// One record per constraint: its first body, local pivot and breaking threshold.
pub fn report_constraints(
    engine: &dyn NativeEngine,
    registry: &Registry,
    slots: &mut ReportSlots,
) -> ReportBuffer {
    let _timer = ScopedTimer::new("report::constraints");
    let mut buffer = slots.fixed(ReportKind::Constraint, registry.constraints.len());
    let mut written = 0;
    for (id, constraint) in registry.constraints.iter() {
        let record = ConstraintRecord {
            constraint: id,
            body: constraint.body_a,
            anchor: constraint.pivot_a,
            impulse: engine.breaking_impulse_threshold(constraint.handle),
        };
        buffer.write_record(written, &record.to_values());
        written += 1;
    }
    buffer.set_count(written);
    buffer
}

/// Node or face data of every soft body, each prefixed by `[id, element_count]`.
pub fn report_soft_bodies(
    engine: &dyn NativeEngine,
    registry: &Registry,
    slots: &mut ReportSlots,
) -> ReportBuffer {
    let _timer = ScopedTimer::new("report::soft");
    let mut payload = Vec::with_capacity(registry.soft_report_size());
    let mut written = 0;
    for (id, entry) in registry.objects.iter() {
        let Some(kind) = entry.soft_kind else {
            continue;
        };
        let header = payload.len();
        payload.extend_from_slice(&[id.to_f32(), 0.0]);
        let nodes = engine.soft_nodes(entry.handle);
        let elements = match kind {
            SoftKind::Rope => {
                for node in &nodes {
                    payload.extend_from_slice(&node.position.to_array());
                }
                nodes.len()
            }
            SoftKind::Cloth => {
                for node in &nodes {
                    payload.extend_from_slice(&node.position.to_array());
                    payload.extend_from_slice(&(-node.normal).to_array());
                }
                nodes.len()
            }
            SoftKind::Trimesh => {
                let faces = engine.soft_faces(entry.handle);
                for face in &faces {
                    for &index in face {
                        let node = nodes.get(index).copied().unwrap_or_default();
                        payload.extend_from_slice(&node.position.to_array());
                        payload.extend_from_slice(&node.normal.to_array());
                    }
                }
                faces.len()
            }
        };
        payload[header + 1] = elements as f32;
        written += 1;
    }
    if payload.len() > registry.soft_report_size() {
        warn!(
            "soft report needs {} values but {} were reserved",
            payload.len(),
            registry.soft_report_size()
        );
    }
    let mut buffer = slots.sized(ReportKind::Soft, HEADER_LEN + payload.len());
    buffer.write_at(HEADER_LEN, &payload);
    buffer.set_count(written);
    buffer
}
