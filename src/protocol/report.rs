//! Flat numeric report buffers and their fixed record layouts.
//!
//! Every report starts with a two-value header `[tag, record_count]`
//! followed by fixed-size records (variable-size for soft bodies).

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::utils::allocator::ObjectId;

pub const HEADER_LEN: usize = 2;
pub const WORLD_ITEM_SIZE: usize = 14;
pub const COLLISION_ITEM_SIZE: usize = 5;
pub const VEHICLE_ITEM_SIZE: usize = 9;
pub const CONSTRAINT_ITEM_SIZE: usize = 6;
/// Per-object header inside a soft report: id and node/face count.
pub const SOFT_OBJECT_HEADER: usize = 2;

/// Message type tag stored in slot 0 of every report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportKind {
    World = 0,
    Collision = 1,
    Vehicle = 2,
    Constraint = 3,
    Soft = 4,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        ReportKind::World,
        ReportKind::Collision,
        ReportKind::Vehicle,
        ReportKind::Constraint,
        ReportKind::Soft,
    ];

    pub fn tag(self) -> f32 {
        self as u8 as f32
    }

    pub fn from_tag(tag: f32) -> Option<Self> {
        match tag as i32 {
            0 if tag == 0.0 => Some(ReportKind::World),
            1 if tag == 1.0 => Some(ReportKind::Collision),
            2 if tag == 2.0 => Some(ReportKind::Vehicle),
            3 if tag == 3.0 => Some(ReportKind::Constraint),
            4 if tag == 4.0 => Some(ReportKind::Soft),
            _ => None,
        }
    }

    /// Fixed record size; soft reports have variable-size records and return `None`.
    pub fn item_size(self) -> Option<usize> {
        match self {
            ReportKind::World => Some(WORLD_ITEM_SIZE),
            ReportKind::Collision => Some(COLLISION_ITEM_SIZE),
            ReportKind::Vehicle => Some(VEHICLE_ITEM_SIZE),
            ReportKind::Constraint => Some(CONSTRAINT_ITEM_SIZE),
            ReportKind::Soft => None,
        }
    }
}

/// Minimum buffer length that holds `count` records.
pub fn required_len(count: usize, item_size: usize) -> usize {
    HEADER_LEN + count * item_size
}

/// Buffer length after growth: whole chunks of `chunk_size` records.
pub fn chunked_len(count: usize, chunk_size: usize, item_size: usize) -> usize {
    let chunk_size = chunk_size.max(1);
    HEADER_LEN + count.div_ceil(chunk_size) * chunk_size * item_size
}

/// Owned report storage.
///
/// Sending a report moves the buffer into the message, so the producer cannot
/// touch it again until the consumer hands it back.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBuffer {
    kind: ReportKind,
    data: Vec<f32>,
}

impl ReportBuffer {
    /// Zero-filled buffer of exactly `len` values with the tag written.
    pub fn with_len(kind: ReportKind, len: usize) -> Self {
        let mut data = vec![0.0; len.max(HEADER_LEN)];
        data[0] = kind.tag();
        Self { kind, data }
    }

    /// Initial allocation: one chunk of records.
    pub fn with_chunk(kind: ReportKind, chunk_size: usize) -> Self {
        let item = kind.item_size().unwrap_or(0);
        Self::with_len(kind, chunked_len(chunk_size.max(1), chunk_size, item))
    }

    /// Wraps values received from the other side, validating the tag.
    pub fn from_vec(data: Vec<f32>) -> Result<Self> {
        let tag = *data.first().ok_or(BridgeError::MalformedReport {
            kind: ReportKind::World,
            expected: HEADER_LEN,
            actual: 0,
        })?;
        let kind = ReportKind::from_tag(tag).ok_or(BridgeError::UnknownReportTag(tag))?;
        if data.len() < HEADER_LEN {
            return Err(BridgeError::MalformedReport {
                kind,
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(Self { kind, data })
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    /// Record count stored in the header.
    pub fn count(&self) -> usize {
        self.data[1].max(0.0) as usize
    }

    pub(crate) fn set_count(&mut self, count: usize) {
        self.data[1] = count as f32;
    }

    /// Grows to whole chunks when `count` records no longer fit. Never shrinks.
    ///
    /// Returns `true` when the buffer was reallocated.
    pub fn ensure_capacity(&mut self, count: usize, chunk_size: usize) -> bool {
        let item = self.kind.item_size().unwrap_or(1);
        if self.data.len() >= required_len(count, item) {
            return false;
        }
        self.reallocate(chunked_len(count, chunk_size, item));
        true
    }

    /// Grows to exactly `len` values when smaller. Used by variable-size reports.
    pub fn ensure_len(&mut self, len: usize) -> bool {
        if self.data.len() >= len {
            return false;
        }
        self.reallocate(len);
        true
    }

    fn reallocate(&mut self, len: usize) {
        // fresh storage is zero-filled, so the tag has to be rewritten
        self.data = vec![0.0; len.max(HEADER_LEN)];
        self.data[0] = self.kind.tag();
    }

    /// Writes one fixed-size record at `index`.
    pub(crate) fn write_record(&mut self, index: usize, values: &[f32]) {
        let offset = HEADER_LEN + index * values.len();
        self.data[offset..offset + values.len()].copy_from_slice(values);
    }

    /// Writes raw values at an absolute offset.
    pub(crate) fn write_at(&mut self, offset: usize, values: &[f32]) {
        self.data[offset..offset + values.len()].copy_from_slice(values);
    }

    fn records(&self, item_size: usize) -> Result<impl Iterator<Item = &[f32]>> {
        let count = self.count();
        let expected = required_len(count, item_size);
        if self.data.len() < expected {
            return Err(BridgeError::MalformedReport {
                kind: self.kind,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(self.data[HEADER_LEN..expected].chunks_exact(item_size))
    }

    fn expect_kind(&self, kind: ReportKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(BridgeError::UnknownReportTag(self.data[0]))
        }
    }

    pub fn world_records(&self) -> Result<Vec<WorldRecord>> {
        self.expect_kind(ReportKind::World)?;
        Ok(self
            .records(WORLD_ITEM_SIZE)?
            .filter_map(WorldRecord::read)
            .collect())
    }

    pub fn collision_records(&self) -> Result<Vec<CollisionRecord>> {
        self.expect_kind(ReportKind::Collision)?;
        Ok(self
            .records(COLLISION_ITEM_SIZE)?
            .filter_map(CollisionRecord::read)
            .collect())
    }

    pub fn vehicle_records(&self) -> Result<Vec<VehicleRecord>> {
        self.expect_kind(ReportKind::Vehicle)?;
        Ok(self
            .records(VEHICLE_ITEM_SIZE)?
            .filter_map(VehicleRecord::read)
            .collect())
    }

    pub fn constraint_records(&self) -> Result<Vec<ConstraintRecord>> {
        self.expect_kind(ReportKind::Constraint)?;
        Ok(self
            .records(CONSTRAINT_ITEM_SIZE)?
            .filter_map(ConstraintRecord::read)
            .collect())
    }

    /// Walks the variable-size soft-body records.
    ///
    /// The element layout depends on the body subtype, which only the
    /// receiver knows, so `stride_of` maps each id to its values per element.
    pub fn soft_records(
        &self,
        stride_of: impl Fn(ObjectId) -> Option<usize>,
    ) -> Result<Vec<SoftRecord<'_>>> {
        self.expect_kind(ReportKind::Soft)?;
        let mut records = Vec::with_capacity(self.count());
        let mut offset = HEADER_LEN;
        for _ in 0..self.count() {
            let header = self.data.get(offset..offset + SOFT_OBJECT_HEADER).ok_or(
                BridgeError::MalformedReport {
                    kind: ReportKind::Soft,
                    expected: offset + SOFT_OBJECT_HEADER,
                    actual: self.data.len(),
                },
            )?;
            let id = ObjectId::from_f32(header[0]).ok_or(BridgeError::MalformedReport {
                kind: ReportKind::Soft,
                expected: offset + SOFT_OBJECT_HEADER,
                actual: self.data.len(),
            })?;
            let elements = header[1].max(0.0) as usize;
            let stride = stride_of(id).ok_or(BridgeError::UnknownObject(id))?;
            let start = offset + SOFT_OBJECT_HEADER;
            let end = start + elements * stride;
            let data = self
                .data
                .get(start..end)
                .ok_or(BridgeError::MalformedReport {
                    kind: ReportKind::Soft,
                    expected: end,
                    actual: self.data.len(),
                })?;
            records.push(SoftRecord { id, elements, data });
            offset = end;
        }
        Ok(records)
    }
}

fn vec3(values: &[f32]) -> Vec3 {
    Vec3::new(values[0], values[1], values[2])
}

fn quat(values: &[f32]) -> Quat {
    Quat::from_xyzw(values[0], values[1], values[2], values[3])
}

/// World report record: id, position, rotation, linear and angular velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldRecord {
    pub id: ObjectId,
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl WorldRecord {
    pub fn to_values(&self) -> [f32; WORLD_ITEM_SIZE] {
        [
            self.id.to_f32(),
            self.position.x,
            self.position.y,
            self.position.z,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.rotation.w,
            self.linear_velocity.x,
            self.linear_velocity.y,
            self.linear_velocity.z,
            self.angular_velocity.x,
            self.angular_velocity.y,
            self.angular_velocity.z,
        ]
    }

    pub fn read(values: &[f32]) -> Option<Self> {
        Some(Self {
            id: ObjectId::from_f32(values[0])?,
            position: vec3(&values[1..4]),
            rotation: quat(&values[4..8]),
            linear_velocity: vec3(&values[8..11]),
            angular_velocity: vec3(&values[11..14]),
        })
    }
}

/// Collision report record: the two bodies and the contact normal on body B.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionRecord {
    pub body_a: ObjectId,
    pub body_b: ObjectId,
    pub normal: Vec3,
}

impl CollisionRecord {
    pub fn to_values(&self) -> [f32; COLLISION_ITEM_SIZE] {
        [
            self.body_a.to_f32(),
            self.body_b.to_f32(),
            self.normal.x,
            self.normal.y,
            self.normal.z,
        ]
    }

    pub fn read(values: &[f32]) -> Option<Self> {
        Some(Self {
            body_a: ObjectId::from_f32(values[0])?,
            body_b: ObjectId::from_f32(values[1])?,
            normal: vec3(&values[2..5]),
        })
    }
}

/// Vehicle report record: one wheel pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleRecord {
    pub vehicle: ObjectId,
    pub wheel: usize,
    pub position: Vec3,
    pub rotation: Quat,
}

impl VehicleRecord {
    pub fn to_values(&self) -> [f32; VEHICLE_ITEM_SIZE] {
        [
            self.vehicle.to_f32(),
            self.wheel as f32,
            self.position.x,
            self.position.y,
            self.position.z,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.rotation.w,
        ]
    }

    pub fn read(values: &[f32]) -> Option<Self> {
        Some(Self {
            vehicle: ObjectId::from_f32(values[0])?,
            wheel: values[1].max(0.0) as usize,
            position: vec3(&values[2..5]),
            rotation: quat(&values[5..9]),
        })
    }
}

/// Constraint report record.
///
/// `anchor` is the pivot in body A's local frame; `impulse` carries the
/// breaking impulse threshold reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintRecord {
    pub constraint: ObjectId,
    pub body: ObjectId,
    pub anchor: Vec3,
    pub impulse: f32,
}

impl ConstraintRecord {
    pub fn to_values(&self) -> [f32; CONSTRAINT_ITEM_SIZE] {
        [
            self.constraint.to_f32(),
            self.body.to_f32(),
            self.anchor.x,
            self.anchor.y,
            self.anchor.z,
            self.impulse,
        ]
    }

    pub fn read(values: &[f32]) -> Option<Self> {
        Some(Self {
            constraint: ObjectId::from_f32(values[0])?,
            body: ObjectId::from_f32(values[1])?,
            anchor: vec3(&values[2..5]),
            impulse: values[5],
        })
    }
}

/// Soft-body subtype, which fixes the per-element layout of its report data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoftKind {
    /// Position per node.
    Rope,
    /// Position and inverted normal per node.
    Cloth,
    /// Three vertices of position and normal per face.
    Trimesh,
}

impl SoftKind {
    pub fn stride(self) -> usize {
        match self {
            SoftKind::Rope => 3,
            SoftKind::Cloth => 6,
            SoftKind::Trimesh => 18,
        }
    }
}

/// One soft body inside a soft report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftRecord<'a> {
    pub id: ObjectId,
    /// Node count for ropes and cloths, face count for trimeshes.
    pub elements: usize,
    pub data: &'a [f32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_growth_rounds_to_whole_chunks() {
        assert_eq!(chunked_len(0, 50, 14), 2);
        assert_eq!(chunked_len(1, 50, 14), 2 + 50 * 14);
        assert_eq!(chunked_len(50, 50, 14), 2 + 50 * 14);
        assert_eq!(chunked_len(51, 50, 14), 2 + 100 * 14);
    }

    #[test]
    fn reallocation_rewrites_tag() {
        let mut buffer = ReportBuffer::with_chunk(ReportKind::Collision, 2);
        assert_eq!(buffer.len(), 2 + 2 * COLLISION_ITEM_SIZE);
        assert!(buffer.ensure_capacity(3, 2));
        assert_eq!(buffer.len(), 2 + 4 * COLLISION_ITEM_SIZE);
        assert_eq!(buffer.as_slice()[0], ReportKind::Collision.tag());
        assert!(!buffer.ensure_capacity(4, 2));
    }

    #[test]
    fn tags_are_strict() {
        assert_eq!(ReportKind::from_tag(3.0), Some(ReportKind::Constraint));
        assert_eq!(ReportKind::from_tag(3.5), None);
        assert_eq!(ReportKind::from_tag(9.0), None);
        assert!(matches!(
            ReportBuffer::from_vec(vec![7.0, 0.0]),
            Err(BridgeError::UnknownReportTag(_))
        ));
    }

    #[test]
    fn truncated_world_report_is_rejected() {
        let mut buffer = ReportBuffer::with_len(ReportKind::World, HEADER_LEN + WORLD_ITEM_SIZE);
        buffer.set_count(2);
        assert!(matches!(
            buffer.world_records(),
            Err(BridgeError::MalformedReport { .. })
        ));
    }

    #[test]
    fn world_record_layout_is_fixed() {
        let record = WorldRecord {
            id: ObjectId(3),
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::new(0.0, -1.0, 0.0),
            angular_velocity: Vec3::ZERO,
        };
        let values = record.to_values();
        assert_eq!(values[0], 3.0);
        assert_eq!(values[2], 2.0);
        assert_eq!(values[7], 1.0);
        assert_eq!(values[9], -1.0);
    }
}
