use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::utils::allocator::ObjectId;

/// Raycast-vehicle suspension and tyre tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VehicleTuning {
    pub suspension_stiffness: f32,
    pub suspension_compression: f32,
    pub suspension_damping: f32,
    /// Maximum suspension travel in centimetres.
    pub max_suspension_travel: f32,
    pub friction_slip: f32,
    pub max_suspension_force: f32,
}

impl Default for VehicleTuning {
    fn default() -> Self {
        Self {
            suspension_stiffness: 5.88,
            suspension_compression: 0.83,
            suspension_damping: 0.88,
            max_suspension_travel: 500.0,
            friction_slip: 10.5,
            max_suspension_force: 6000.0,
        }
    }
}

/// Sent with `addVehicle`; the chassis must already be registered as an object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleDescription {
    #[serde(default)]
    pub id: ObjectId,
    pub rigid_body: ObjectId,
    #[serde(flatten)]
    pub tuning: VehicleTuning,
}

/// Sent with `addWheel`. Points and directions are in chassis space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelDescription {
    #[serde(default)]
    pub id: ObjectId,
    pub connection_point: Vec3,
    pub wheel_direction: Vec3,
    pub wheel_axle: Vec3,
    pub suspension_rest_length: f32,
    pub wheel_radius: f32,
    pub is_front_wheel: bool,
    #[serde(default)]
    pub tuning: VehicleTuning,
}

impl WheelDescription {
    pub fn new(connection_point: Vec3, suspension_rest_length: f32, wheel_radius: f32) -> Self {
        Self {
            id: ObjectId::default(),
            connection_point,
            wheel_direction: Vec3::NEG_Y,
            wheel_axle: Vec3::NEG_X,
            suspension_rest_length,
            wheel_radius,
            is_front_wheel: false,
            tuning: VehicleTuning::default(),
        }
    }

    pub fn front(mut self) -> Self {
        self.is_front_wheel = true;
        self
    }
}
