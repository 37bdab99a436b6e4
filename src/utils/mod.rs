//! Utility helpers including id allocation, math extensions and logging.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, GenerationalId, IdCounter, NodeId, ObjectId, SparseTable};
pub use math::*;
