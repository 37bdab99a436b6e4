//! Commands sent from the main thread to the worker.
//!
//! On the wire every command is an envelope `{"cmd": <name>, "params": {...}}`.
//! Parameters are plain data: ids refer to registry slots, never native handles.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;
use crate::core::{
    ConstraintDescription, JointOp, Limits, Motor, ObjectDescription, VehicleDescription,
    WheelDescription,
};
use crate::utils::allocator::ObjectId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "camelCase")]
pub enum WorkerCommand {
    // lifecycle
    Init(WorldConfig),
    MakeWorld(WorldConfig),
    SetGravity {
        x: f32,
        y: f32,
        z: f32,
    },
    OnSimulationResume,
    Simulate {
        #[serde(rename = "timeStep", default)]
        time_step: Option<f32>,
        #[serde(rename = "maxSubSteps", default)]
        max_sub_steps: Option<u32>,
    },
    AddObject(ObjectDescription),
    RemoveObject {
        id: ObjectId,
    },
    AddVehicle(VehicleDescription),
    RemoveVehicle {
        id: ObjectId,
    },
    AddWheel(WheelDescription),
    AddConstraint(ConstraintDescription),
    RemoveConstraint {
        id: ObjectId,
    },

    // per-step sync
    UpdateTransform {
        id: ObjectId,
        #[serde(default)]
        pos: Option<Vec3>,
        #[serde(default)]
        quat: Option<Quat>,
    },
    UpdateMass {
        id: ObjectId,
        mass: f32,
    },

    // forces
    ApplyCentralImpulse {
        id: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    ApplyImpulse {
        id: ObjectId,
        impulse_x: f32,
        impulse_y: f32,
        impulse_z: f32,
        x: f32,
        y: f32,
        z: f32,
    },
    ApplyTorque {
        id: ObjectId,
        torque_x: f32,
        torque_y: f32,
        torque_z: f32,
    },
    ApplyCentralForce {
        id: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    ApplyForce {
        id: ObjectId,
        force_x: f32,
        force_y: f32,
        force_z: f32,
        x: f32,
        y: f32,
        z: f32,
    },

    // velocity, damping and factors
    SetAngularVelocity {
        id: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    SetLinearVelocity {
        id: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    SetAngularFactor {
        id: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    SetLinearFactor {
        id: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    SetDamping {
        id: ObjectId,
        linear: f32,
        angular: f32,
    },
    SetCcdMotionThreshold {
        id: ObjectId,
        threshold: f32,
    },
    SetCcdSweptSphereRadius {
        id: ObjectId,
        radius: f32,
    },

    // soft bodies
    AppendAnchor {
        obj: ObjectId,
        node: usize,
        obj2: ObjectId,
        #[serde(rename = "collisionBetweenLinkedBodies", default = "linked_collision")]
        collision_between_linked_bodies: bool,
        #[serde(default = "full_influence")]
        influence: f32,
    },
    AppendLink {
        #[serde(rename = "self")]
        body: ObjectId,
        node1: usize,
        node2: usize,
    },
    LinkNodes {
        #[serde(rename = "self")]
        body: ObjectId,
        other: ObjectId,
        node1: usize,
        node2: usize,
    },

    // vehicles
    SetSteering {
        id: ObjectId,
        wheel: usize,
        steering: f32,
    },
    SetBrake {
        id: ObjectId,
        wheel: usize,
        brake: f32,
    },
    ApplyEngineForce {
        id: ObjectId,
        wheel: usize,
        force: f32,
    },

    // constraint controls
    #[serde(rename = "constraint_setBreakingImpulseThreshold")]
    ConstraintSetBreakingImpulseThreshold { constraint: ObjectId, threshold: f32 },
    #[serde(rename = "hinge_setLimits")]
    HingeSetLimits {
        constraint: ObjectId,
        low: f32,
        high: f32,
        bias_factor: f32,
        relaxation_factor: f32,
    },
    #[serde(rename = "hinge_enableAngularMotor")]
    HingeEnableAngularMotor {
        constraint: ObjectId,
        velocity: f32,
        acceleration: f32,
    },
    #[serde(rename = "hinge_disableMotor")]
    HingeDisableMotor { constraint: ObjectId },
    #[serde(rename = "slider_setLimits")]
    SliderSetLimits {
        constraint: ObjectId,
        lin_lower: f32,
        lin_upper: f32,
        ang_lower: f32,
        ang_upper: f32,
    },
    #[serde(rename = "slider_setRestitution")]
    SliderSetRestitution {
        constraint: ObjectId,
        linear: f32,
        angular: f32,
    },
    #[serde(rename = "slider_enableLinearMotor")]
    SliderEnableLinearMotor {
        constraint: ObjectId,
        velocity: f32,
        acceleration: f32,
    },
    #[serde(rename = "slider_disableLinearMotor")]
    SliderDisableLinearMotor { constraint: ObjectId },
    #[serde(rename = "slider_enableAngularMotor")]
    SliderEnableAngularMotor {
        constraint: ObjectId,
        velocity: f32,
        acceleration: f32,
    },
    #[serde(rename = "slider_disableAngularMotor")]
    SliderDisableAngularMotor { constraint: ObjectId },
    /// `x` is the twist span, `y` and `z` the two swing spans.
    #[serde(rename = "conetwist_setLimit")]
    ConetwistSetLimit {
        constraint: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    #[serde(rename = "conetwist_enableMotor")]
    ConetwistEnableMotor { constraint: ObjectId },
    #[serde(rename = "conetwist_setMaxMotorImpulse")]
    ConetwistSetMaxMotorImpulse {
        constraint: ObjectId,
        max_impulse: f32,
    },
    #[serde(rename = "conetwist_setMotorTarget")]
    ConetwistSetMotorTarget {
        constraint: ObjectId,
        x: f32,
        y: f32,
        z: f32,
        w: f32,
    },
    #[serde(rename = "conetwist_disableMotor")]
    ConetwistDisableMotor { constraint: ObjectId },
    #[serde(rename = "dof_setLinearLowerLimit")]
    DofSetLinearLowerLimit {
        constraint: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    #[serde(rename = "dof_setLinearUpperLimit")]
    DofSetLinearUpperLimit {
        constraint: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    #[serde(rename = "dof_setAngularLowerLimit")]
    DofSetAngularLowerLimit {
        constraint: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    #[serde(rename = "dof_setAngularUpperLimit")]
    DofSetAngularUpperLimit {
        constraint: ObjectId,
        x: f32,
        y: f32,
        z: f32,
    },
    #[serde(rename = "dof_enableAngularMotor")]
    DofEnableAngularMotor { constraint: ObjectId, which: usize },
    #[serde(rename = "dof_configureAngularMotor")]
    DofConfigureAngularMotor {
        constraint: ObjectId,
        which: usize,
        low_angle: f32,
        high_angle: f32,
        velocity: f32,
        max_force: f32,
    },
    #[serde(rename = "dof_disableAngularMotor")]
    DofDisableAngularMotor { constraint: ObjectId, which: usize },
}

fn full_influence() -> f32 {
    1.0
}

fn linked_collision() -> bool {
    true
}

impl WorkerCommand {
    /// Wire name, used for logging.
    pub fn name(&self) -> &'static str {
        use WorkerCommand::*;
        match self {
            Init(_) => "init",
            MakeWorld(_) => "makeWorld",
            SetGravity { .. } => "setGravity",
            OnSimulationResume => "onSimulationResume",
            Simulate { .. } => "simulate",
            AddObject(_) => "addObject",
            RemoveObject { .. } => "removeObject",
            AddVehicle(_) => "addVehicle",
            RemoveVehicle { .. } => "removeVehicle",
            AddWheel(_) => "addWheel",
            AddConstraint(_) => "addConstraint",
            RemoveConstraint { .. } => "removeConstraint",
            UpdateTransform { .. } => "updateTransform",
            UpdateMass { .. } => "updateMass",
            ApplyCentralImpulse { .. } => "applyCentralImpulse",
            ApplyImpulse { .. } => "applyImpulse",
            ApplyTorque { .. } => "applyTorque",
            ApplyCentralForce { .. } => "applyCentralForce",
            ApplyForce { .. } => "applyForce",
            SetAngularVelocity { .. } => "setAngularVelocity",
            SetLinearVelocity { .. } => "setLinearVelocity",
            SetAngularFactor { .. } => "setAngularFactor",
            SetLinearFactor { .. } => "setLinearFactor",
            SetDamping { .. } => "setDamping",
            SetCcdMotionThreshold { .. } => "setCcdMotionThreshold",
            SetCcdSweptSphereRadius { .. } => "setCcdSweptSphereRadius",
            AppendAnchor { .. } => "appendAnchor",
            AppendLink { .. } => "appendLink",
            LinkNodes { .. } => "linkNodes",
            SetSteering { .. } => "setSteering",
            SetBrake { .. } => "setBrake",
            ApplyEngineForce { .. } => "applyEngineForce",
            ConstraintSetBreakingImpulseThreshold { .. } => {
                "constraint_setBreakingImpulseThreshold"
            }
            HingeSetLimits { .. } => "hinge_setLimits",
            HingeEnableAngularMotor { .. } => "hinge_enableAngularMotor",
            HingeDisableMotor { .. } => "hinge_disableMotor",
            SliderSetLimits { .. } => "slider_setLimits",
            SliderSetRestitution { .. } => "slider_setRestitution",
            SliderEnableLinearMotor { .. } => "slider_enableLinearMotor",
            SliderDisableLinearMotor { .. } => "slider_disableLinearMotor",
            SliderEnableAngularMotor { .. } => "slider_enableAngularMotor",
            SliderDisableAngularMotor { .. } => "slider_disableAngularMotor",
            ConetwistSetLimit { .. } => "conetwist_setLimit",
            ConetwistEnableMotor { .. } => "conetwist_enableMotor",
            ConetwistSetMaxMotorImpulse { .. } => "conetwist_setMaxMotorImpulse",
            ConetwistSetMotorTarget { .. } => "conetwist_setMotorTarget",
            ConetwistDisableMotor { .. } => "conetwist_disableMotor",
            DofSetLinearLowerLimit { .. } => "dof_setLinearLowerLimit",
            DofSetLinearUpperLimit { .. } => "dof_setLinearUpperLimit",
            DofSetAngularLowerLimit { .. } => "dof_setAngularLowerLimit",
            DofSetAngularUpperLimit { .. } => "dof_setAngularUpperLimit",
            DofEnableAngularMotor { .. } => "dof_enableAngularMotor",
            DofConfigureAngularMotor { .. } => "dof_configureAngularMotor",
            DofDisableAngularMotor { .. } => "dof_disableAngularMotor",
        }
    }

    /// Splits a constraint control command into its target and joint operation.
    pub fn joint_op(&self) -> Option<(ObjectId, JointOp)> {
        use WorkerCommand::*;
        let op = match *self {
            HingeSetLimits {
                constraint,
                low,
                high,
                bias_factor,
                relaxation_factor,
            } => (
                constraint,
                JointOp::HingeLimits {
                    limits: Limits {
                        lower: low,
                        upper: high,
                    },
                    bias_factor,
                    relaxation_factor,
                },
            ),
            HingeEnableAngularMotor {
                constraint,
                velocity,
                acceleration,
            } => (
                constraint,
                JointOp::HingeMotor(Some(Motor {
                    velocity,
                    max_impulse: acceleration,
                })),
            ),
            HingeDisableMotor { constraint } => (constraint, JointOp::HingeMotor(None)),
            SliderSetLimits {
                constraint,
                lin_lower,
                lin_upper,
                ang_lower,
                ang_upper,
            } => (
                constraint,
                JointOp::SliderLimits {
                    linear: Limits {
                        lower: lin_lower,
                        upper: lin_upper,
                    },
                    angular: Limits {
                        lower: ang_lower,
                        upper: ang_upper,
                    },
                },
            ),
            SliderSetRestitution {
                constraint,
                linear,
                angular,
            } => (constraint, JointOp::SliderRestitution { linear, angular }),
            SliderEnableLinearMotor {
                constraint,
                velocity,
                acceleration,
            } => (
                constraint,
                JointOp::SliderLinearMotor(Some(Motor {
                    velocity,
                    max_impulse: acceleration,
                })),
            ),
            SliderDisableLinearMotor { constraint } => {
                (constraint, JointOp::SliderLinearMotor(None))
            }
            SliderEnableAngularMotor {
                constraint,
                velocity,
                acceleration,
            } => (
                constraint,
                JointOp::SliderAngularMotor(Some(Motor {
                    velocity,
                    max_impulse: acceleration,
                })),
            ),
            SliderDisableAngularMotor { constraint } => {
                (constraint, JointOp::SliderAngularMotor(None))
            }
            ConetwistSetLimit { constraint, x, y, z } => (
                constraint,
                JointOp::ConetwistLimit {
                    swing1: z,
                    swing2: y,
                    twist: x,
                },
            ),
            ConetwistEnableMotor { constraint } => {
                (constraint, JointOp::ConetwistMotorEnabled(true))
            }
            ConetwistSetMaxMotorImpulse {
                constraint,
                max_impulse,
            } => (constraint, JointOp::ConetwistMaxMotorImpulse(max_impulse)),
            ConetwistSetMotorTarget {
                constraint,
                x,
                y,
                z,
                w,
            } => (
                constraint,
                JointOp::ConetwistMotorTarget(Quat::from_xyzw(x, y, z, w).normalize()),
            ),
            ConetwistDisableMotor { constraint } => {
                (constraint, JointOp::ConetwistMotorEnabled(false))
            }
            DofSetLinearLowerLimit { constraint, x, y, z } => {
                (constraint, JointOp::DofLinearLowerLimit(Vec3::new(x, y, z)))
            }
            DofSetLinearUpperLimit { constraint, x, y, z } => {
                (constraint, JointOp::DofLinearUpperLimit(Vec3::new(x, y, z)))
            }
            DofSetAngularLowerLimit { constraint, x, y, z } => {
                (constraint, JointOp::DofAngularLowerLimit(Vec3::new(x, y, z)))
            }
            DofSetAngularUpperLimit { constraint, x, y, z } => {
                (constraint, JointOp::DofAngularUpperLimit(Vec3::new(x, y, z)))
            }
            DofEnableAngularMotor { constraint, which } => (
                constraint,
                JointOp::DofAngularMotorEnabled {
                    axis: which,
                    enabled: true,
                },
            ),
            DofConfigureAngularMotor {
                constraint,
                which,
                low_angle,
                high_angle,
                velocity,
                max_force,
            } => (
                constraint,
                JointOp::DofConfigureAngularMotor {
                    axis: which,
                    limits: Limits {
                        lower: low_angle,
                        upper: high_angle,
                    },
                    motor: Motor {
                        velocity,
                        max_impulse: max_force,
                    },
                },
            ),
            DofDisableAngularMotor { constraint, which } => (
                constraint,
                JointOp::DofAngularMotorEnabled {
                    axis: which,
                    enabled: false,
                },
            ),
            _ => return None,
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_commands_map_to_joint_ops() {
        let cmd = WorkerCommand::HingeEnableAngularMotor {
            constraint: ObjectId(4),
            velocity: 2.0,
            acceleration: 10.0,
        };
        let (id, op) = cmd.joint_op().unwrap();
        assert_eq!(id, ObjectId(4));
        assert_eq!(
            op,
            JointOp::HingeMotor(Some(Motor {
                velocity: 2.0,
                max_impulse: 10.0
            }))
        );
        assert!(WorkerCommand::RemoveObject { id: ObjectId(1) }
            .joint_op()
            .is_none());
    }

    #[test]
    fn conetwist_limit_swaps_axes() {
        let cmd = WorkerCommand::ConetwistSetLimit {
            constraint: ObjectId(1),
            x: 0.1,
            y: 0.2,
            z: 0.3,
        };
        let (_, op) = cmd.joint_op().unwrap();
        assert_eq!(
            op,
            JointOp::ConetwistLimit {
                swing1: 0.3,
                swing2: 0.2,
                twist: 0.1
            }
        );
    }

    #[test]
    fn names_match_wire_tags() {
        assert_eq!(WorkerCommand::OnSimulationResume.name(), "onSimulationResume");
        assert_eq!(
            WorkerCommand::DofDisableAngularMotor {
                constraint: ObjectId(1),
                which: 2
            }
            .name(),
            "dof_disableAngularMotor"
        );
    }
}
