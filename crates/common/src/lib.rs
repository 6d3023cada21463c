//! Shared identifiers and pose types used by every orrery crate.

mod types;

pub use types::{IdError, ObjectId, Pose, UniverseId, euler_to_quat};

pub fn crate_info() -> &'static str {
    "orrery-common v0.1.0"
}
