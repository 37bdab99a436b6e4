//! Collision detection for the reference engine: proxies, broad phase, narrow phase, ray queries.

pub mod broadphase;
pub mod narrowphase;
pub mod queries;
pub mod shapes;

pub use broadphase::{filters_match, BroadPhaseEntry, SweepAndPrune};
pub use narrowphase::{NarrowPhase, ProxyContact};
pub use queries::{Raycast, RaycastHit, RaycastQuery};
pub use shapes::{Primitive, Proxy, ShapeRecord, ShapeStore};
