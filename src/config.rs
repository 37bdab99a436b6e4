//! Configuration constants and the world configuration shipped with `init`/`makeWorld`.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default fixed integration timestep (in seconds).
pub const DEFAULT_FIXED_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of records a report buffer grows by at once.
pub const DEFAULT_REPORT_CHUNK_SIZE: usize = 50;

/// Collision margin applied to soft bodies that do not specify one.
pub const DEFAULT_SOFT_MARGIN: f32 = 0.1;

/// Collision margin applied to rigid shapes that do not specify one.
pub const DEFAULT_RIGID_MARGIN: f32 = 0.0;

/// Default damping applied to linear velocity when a description omits it.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.0;

/// Default damping applied to angular velocity when a description omits it.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.0;

/// Default collision group/mask: group 1, collide with everything.
pub const DEFAULT_COLLISION_GROUP: i32 = 1;
pub const DEFAULT_COLLISION_MASK: i32 = -1;

/// Broadphase algorithm requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BroadphaseKind {
    #[default]
    Dynamic,
    #[serde(rename = "sweepprune")]
    SweepPrune,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadphaseConfig {
    #[serde(rename = "type")]
    pub kind: BroadphaseKind,
    pub aabbmin: Vec3,
    pub aabbmax: Vec3,
}

impl Default for BroadphaseConfig {
    fn default() -> Self {
        Self {
            kind: BroadphaseKind::Dynamic,
            aabbmin: Vec3::splat(-50.0),
            aabbmax: Vec3::splat(50.0),
        }
    }
}

/// Settings passed once to the worker when the world is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldConfig {
    /// Location of the native engine script. Opaque to the bridge, handed to the loader.
    pub ammo: String,
    /// Pre-fetched engine binary, if the loader supports one.
    pub wasm_buffer: Option<Vec<u8>>,
    /// Create a soft-rigid world and emit soft-body reports.
    pub softbody: bool,
    pub fixed_time_step: f32,
    pub gravity: Vec3,
    /// Report chunk size: buffers grow by this many records at a time.
    pub reportsize: usize,
    pub broadphase: BroadphaseConfig,
    /// Run the worker inline on the calling thread instead of a background thread.
    pub no_worker: bool,
    /// Whether report buffers are handed back and forth instead of re-created each step.
    pub transferable: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            ammo: String::new(),
            wasm_buffer: None,
            softbody: false,
            fixed_time_step: DEFAULT_FIXED_TIME_STEP,
            gravity: Vec3::from_slice(&DEFAULT_GRAVITY),
            reportsize: DEFAULT_REPORT_CHUNK_SIZE,
            broadphase: BroadphaseConfig::default(),
            no_worker: false,
            transferable: true,
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_fixed_time_step(mut self, step: f32) -> Self {
        self.fixed_time_step = step;
        self
    }

    pub fn with_softbody(mut self, enabled: bool) -> Self {
        self.softbody = enabled;
        self
    }

    pub fn with_report_size(mut self, chunk: usize) -> Self {
        self.reportsize = chunk;
        self
    }

    pub fn with_broadphase(mut self, broadphase: BroadphaseConfig) -> Self {
        self.broadphase = broadphase;
        self
    }

    pub fn with_no_worker(mut self, inline: bool) -> Self {
        self.no_worker = inline;
        self
    }

    pub fn with_transferable(mut self, transferable: bool) -> Self {
        self.transferable = transferable;
        self
    }

    /// Fixed step actually used by the stepper; non-positive values fall back to the default.
    pub fn effective_fixed_time_step(&self) -> f32 {
        if self.fixed_time_step <= 0.0 {
            DEFAULT_FIXED_TIME_STEP
        } else {
            self.fixed_time_step
        }
    }

    /// Chunk size used by the report encoders; zero is treated as one record.
    pub fn report_chunk_size(&self) -> usize {
        self.reportsize.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = WorldConfig::default();
        assert_eq!(config.reportsize, DEFAULT_REPORT_CHUNK_SIZE);
        assert_eq!(config.fixed_time_step, DEFAULT_FIXED_TIME_STEP);
        assert!(config.transferable);
        assert!(!config.softbody);
    }

    #[test]
    fn degenerate_values_fall_back() {
        let config = WorldConfig::default()
            .with_fixed_time_step(0.0)
            .with_report_size(0);
        assert_eq!(config.effective_fixed_time_step(), DEFAULT_FIXED_TIME_STEP);
        assert_eq!(config.report_chunk_size(), 1);
    }
}
