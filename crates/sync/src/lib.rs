//! Parameter sync: per-universe channel carrying full-replacement parameter
//! bundles between a simulation and a shared-state transport.
//!
//! # Invariants
//! - Only events for the bound universe are ever applied.
//! - Malformed or out-of-range bundles are dropped before reaching the world.
//! - Inbound updates apply at the frame boundary, never mid-step.

mod channel;
mod event;

pub use channel::{Applied, ParameterTarget, SyncChannel, SyncStats, TransportEndpoint};
pub use event::{ParameterCategory, ParameterUpdateEvent, SyncError};

pub fn crate_info() -> &'static str {
    "orrery-sync v0.1.0"
}
