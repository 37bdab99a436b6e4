use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::utils::allocator::ObjectId;

/// Constraint geometry, tagged by `type` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConstraintKind {
    Point,
    Hinge { axis: Vec3 },
    Slider { axis: Vec3 },
    Conetwist { axisa: Vec3, axisb: Vec3 },
    Dof { axisa: Vec3, axisb: Vec3 },
}

impl ConstraintKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::Point => "point",
            ConstraintKind::Hinge { .. } => "hinge",
            ConstraintKind::Slider { .. } => "slider",
            ConstraintKind::Conetwist { .. } => "conetwist",
            ConstraintKind::Dof { .. } => "dof",
        }
    }
}

/// Definition forwarded to the worker by `addConstraint`.
///
/// Pivots are expressed in the local frame of their body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDescription {
    #[serde(default)]
    pub id: ObjectId,
    #[serde(flatten)]
    pub kind: ConstraintKind,
    pub objecta: ObjectId,
    #[serde(default)]
    pub objectb: Option<ObjectId>,
    pub positiona: Vec3,
    #[serde(default)]
    pub positionb: Vec3,
    #[serde(default)]
    pub disable_collision: bool,
}

impl ConstraintDescription {
    pub fn new(kind: ConstraintKind, objecta: ObjectId, positiona: Vec3) -> Self {
        Self {
            id: ObjectId::default(),
            kind,
            objecta,
            objectb: None,
            positiona,
            positionb: Vec3::ZERO,
            disable_collision: false,
        }
    }

    pub fn between(mut self, objectb: ObjectId, positionb: Vec3) -> Self {
        self.objectb = Some(objectb);
        self.positionb = positionb;
        self
    }
}

/// Velocity motor target with the impulse it may spend per step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Motor {
    pub velocity: f32,
    pub max_impulse: f32,
}

/// Angular or linear limit pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub lower: f32,
    pub upper: f32,
}

/// Per-type joint adjustments issued by the motor/limit commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointOp {
    HingeLimits {
        limits: Limits,
        bias_factor: f32,
        relaxation_factor: f32,
    },
    HingeMotor(Option<Motor>),
    SliderLimits {
        linear: Limits,
        angular: Limits,
    },
    SliderRestitution {
        linear: f32,
        angular: f32,
    },
    SliderLinearMotor(Option<Motor>),
    SliderAngularMotor(Option<Motor>),
    ConetwistLimit {
        swing1: f32,
        swing2: f32,
        twist: f32,
    },
    ConetwistMotorEnabled(bool),
    ConetwistMaxMotorImpulse(f32),
    ConetwistMotorTarget(Quat),
    DofLinearLowerLimit(Vec3),
    DofLinearUpperLimit(Vec3),
    DofAngularLowerLimit(Vec3),
    DofAngularUpperLimit(Vec3),
    DofAngularMotorEnabled {
        axis: usize,
        enabled: bool,
    },
    DofConfigureAngularMotor {
        axis: usize,
        limits: Limits,
        motor: Motor,
    },
}

impl JointOp {
    /// Whether the operation applies to the given constraint type.
    pub fn applies_to(&self, kind: &ConstraintKind) -> bool {
        match self {
            JointOp::HingeLimits { .. } | JointOp::HingeMotor(_) => {
                matches!(kind, ConstraintKind::Hinge { .. })
            }
            JointOp::SliderLimits { .. }
            | JointOp::SliderRestitution { .. }
            | JointOp::SliderLinearMotor(_)
            | JointOp::SliderAngularMotor(_) => matches!(kind, ConstraintKind::Slider { .. }),
            JointOp::ConetwistLimit { .. }
            | JointOp::ConetwistMotorEnabled(_)
            | JointOp::ConetwistMaxMotorImpulse(_)
            | JointOp::ConetwistMotorTarget(_) => matches!(kind, ConstraintKind::Conetwist { .. }),
            JointOp::DofLinearLowerLimit(_)
            | JointOp::DofLinearUpperLimit(_)
            | JointOp::DofAngularLowerLimit(_)
            | JointOp::DofAngularUpperLimit(_)
            | JointOp::DofAngularMotorEnabled { .. }
            | JointOp::DofConfigureAngularMotor { .. } => matches!(kind, ConstraintKind::Dof { .. }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_are_scoped_to_their_type() {
        let hinge = ConstraintKind::Hinge { axis: Vec3::Y };
        assert!(JointOp::HingeMotor(None).applies_to(&hinge));
        assert!(!JointOp::SliderLinearMotor(None).applies_to(&hinge));
        assert!(JointOp::DofAngularMotorEnabled {
            axis: 0,
            enabled: true
        }
        .applies_to(&ConstraintKind::Dof {
            axisa: Vec3::X,
            axisb: Vec3::X
        }));
    }
}
