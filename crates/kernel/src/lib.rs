//! Simulation kernel: rigid-body world, body registry, shape factory and the
//! stepping scheduler.
//!
//! # Invariants
//! - Every live object id maps to exactly one body; removal is idempotent.
//! - Static bodies never move, whatever the gravity.
//! - Stepping only happens while Running and never exceeds the sub-step budget.
//! - Operations against an uninitialized simulation are no-ops.

mod body;
mod config;
mod contact;
mod params;
mod registry;
mod shape;
mod simulation;
mod world;

pub use body::{BodyError, LiveBody, Material, ObjectDescriptor, ObjectUpdate};
pub use config::{ConfigError, WorldConfig};
pub use params::{Gravity, ParameterError, PhysicsParameters};
pub use registry::{BodyHandle, BodyRegistry};
pub use shape::{CYLINDER_SEGMENTS, CollisionShape, ShapeError, ShapeKind, make_shape};
pub use simulation::{MAX_SUB_STEPS, Simulation, SimulationState, SimulationSummary};
pub use world::{PhysicsWorld, WorldEvent};

pub fn crate_info() -> &'static str {
    "orrery-kernel v0.1.0"
}
