//! Reference dynamics: rigid bodies, contacts, joints, soft bodies and raycast vehicles.

pub mod integrator;
pub mod joint;
pub mod rigid;
pub mod soft;
pub mod solver;
pub mod vehicle;

pub use integrator::Integrator;
pub use joint::{Joint, JointSettings};
pub use rigid::{
    pair_mut, RigidState, COLLISION_FLAG_KINEMATIC, COLLISION_FLAG_NO_CONTACT_RESPONSE,
    COLLISION_FLAG_STATIC,
};
pub use soft::{Anchor, CrossLink, SoftBody};
pub use solver::{Contact, ContactSolver};
pub use vehicle::{RaycastVehicle, Wheel};
