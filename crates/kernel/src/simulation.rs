//! Caller-owned simulation context: the world handle plus the stepping state machine.
//!
//! # States
//! ```text
//! Uninitialized --initialize--> Idle --start--> Running --pause--> Paused
//!                                 ^                 ^                 |
//!                                 |                 +------start------+
//!         dispose (from any state) returns to Uninitialized
//! ```
//!
//! # Invariants
//! - Every body operation before `initialize` (or after `dispose`) is a no-op.
//! - `step` only advances the world while Running, by at most
//!   [`MAX_SUB_STEPS`] fixed sub-steps per call. Time the budget cannot
//!   consume is dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use glam::Vec3;
use orrery_common::{ObjectId, Pose};
use serde::Serialize;

use crate::body::{BodyError, ObjectDescriptor, ObjectUpdate};
use crate::config::{ConfigError, WorldConfig};
use crate::params::{ParameterError, PhysicsParameters};
use crate::world::{PhysicsWorld, WorldEvent};

/// Upper bound on fixed sub-steps per `step` call.
pub const MAX_SUB_STEPS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SimulationState {
    Uninitialized,
    Idle,
    Running,
    Paused,
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// One simulation per universe. Owns its world outright; there is no global.
#[derive(Debug)]
pub struct Simulation {
    world: Option<PhysicsWorld>,
    state: SimulationState,
    last_step: Option<Instant>,
    /// Scaled seconds not yet consumed by a fixed sub-step.
    accumulator: f64,
    time_scale: f32,
    /// Count of worlds created by `initialize`, for diagnostics.
    instances: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            world: None,
            state: SimulationState::Uninitialized,
            last_step: None,
            accumulator: 0.0,
            time_scale: 1.0,
            instances: 0,
        }
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.world.is_some()
    }

    pub fn world(&self) -> Option<&PhysicsWorld> {
        self.world.as_ref()
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Create a fresh world, releasing any previous one first.
    ///
    /// A malformed config is fatal: the previous world is kept and the error
    /// returned.
    pub fn initialize(&mut self, config: WorldConfig) -> Result<(), ConfigError> {
        let world = PhysicsWorld::new(config)?;
        if self.world.is_some() {
            self.dispose();
        }
        self.world = Some(world);
        self.state = SimulationState::Idle;
        self.time_scale = 1.0;
        self.instances += 1;
        tracing::info!(
            instance = self.instances,
            gravity = %config.gravity,
            iterations = config.iterations,
            time_step = config.time_step,
            "simulation initialized"
        );
        Ok(())
    }

    /// Tear down the world and every body. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(mut world) = self.world.take() {
            let released = world.clear();
            tracing::info!(released, "simulation disposed");
        }
        self.state = SimulationState::Uninitialized;
        self.last_step = None;
        self.accumulator = 0.0;
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Enter Running from Idle or Paused with `now` as the time reference.
    pub fn start_at(&mut self, now: Instant) {
        match self.state {
            SimulationState::Idle | SimulationState::Paused => {
                self.state = SimulationState::Running;
                self.last_step = Some(now);
                self.accumulator = 0.0;
                tracing::debug!("simulation running");
            }
            state => tracing::debug!(%state, "start ignored"),
        }
    }

    pub fn pause(&mut self) {
        if self.state == SimulationState::Running {
            self.state = SimulationState::Paused;
            tracing::debug!("simulation paused");
        }
    }

    /// Advance by the wall-clock time since the previous step.
    pub fn step(&mut self) -> u32 {
        self.step_at(Instant::now())
    }

    /// Advance by the time between the previous step and `now`.
    ///
    /// Returns the number of fixed sub-steps taken. Anything but Running is a
    /// no-op returning 0.
    pub fn step_at(&mut self, now: Instant) -> u32 {
        if self.state != SimulationState::Running {
            return 0;
        }
        let Some(world) = self.world.as_mut() else {
            return 0;
        };
        let _span = tracing::trace_span!("step", step = world.steps()).entered();

        let last = self.last_step.replace(now).unwrap_or(now);
        let elapsed = now.saturating_duration_since(last).as_secs_f64();
        self.accumulator += elapsed * f64::from(self.time_scale);

        let dt = f64::from(world.time_step());
        let mut taken = 0;
        while self.accumulator >= dt && taken < MAX_SUB_STEPS {
            world.step(dt as f32);
            self.accumulator -= dt;
            taken += 1;
        }
        if self.accumulator >= dt {
            let dropped = self.accumulator - self.accumulator % dt;
            self.accumulator %= dt;
            tracing::debug!(dropped_secs = dropped, "sub-step budget exhausted");
        }
        taken
    }

    /// Return every body to rest without removing any. Keeps the current state.
    pub fn reset(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        world.reset();
        self.accumulator = 0.0;
    }

    /// Insert an object. Construction errors are returned and nothing is
    /// registered; before `initialize` this is a no-op.
    pub fn add_object(&mut self, desc: &ObjectDescriptor) -> Result<(), BodyError> {
        match self.world.as_mut() {
            Some(world) => world.add_object(desc).map(|_| ()),
            None => {
                tracing::debug!(id = %desc.id, "add ignored: world not initialized");
                Ok(())
            }
        }
    }

    pub fn remove_object(&mut self, id: &ObjectId) {
        if let Some(world) = self.world.as_mut() {
            world.remove_object(id);
        }
    }

    pub fn update_object(&mut self, id: &ObjectId, update: &ObjectUpdate) -> Result<(), BodyError> {
        match self.world.as_mut() {
            Some(world) => world.update_object(id, update).map(|_| ()),
            None => Ok(()),
        }
    }

    pub fn object_transform(&self, id: &ObjectId) -> Option<Pose> {
        self.world.as_ref()?.transform(id)
    }

    pub fn object_positions(&self) -> BTreeMap<ObjectId, Vec3> {
        self.world
            .as_ref()
            .map(PhysicsWorld::positions)
            .unwrap_or_default()
    }

    /// Replace the physics parameter bundle. The time scale is kept here; the
    /// rest goes to the world. An invalid bundle is refused whole.
    pub fn apply_physics_parameters(&mut self, params: &PhysicsParameters) -> Result<(), ParameterError> {
        let Some(world) = self.world.as_mut() else {
            tracing::debug!("physics parameters ignored: world not initialized");
            return Ok(());
        };
        world.apply_parameters(params)?;
        self.time_scale = params.time_scale;
        Ok(())
    }

    /// Current settings as a bundle, for publishing local edits.
    pub fn physics_parameters(&self) -> Option<PhysicsParameters> {
        Some(self.world.as_ref()?.parameters(self.time_scale))
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        self.world
            .as_mut()
            .map(PhysicsWorld::drain_events)
            .unwrap_or_default()
    }

    pub fn summary(&self) -> SimulationSummary {
        SimulationSummary {
            state: self.state,
            bodies: self.world.as_ref().map_or(0, PhysicsWorld::body_count),
            steps: self.world.as_ref().map_or(0, PhysicsWorld::steps),
            simulated_time: self.world.as_ref().map_or(0.0, PhysicsWorld::simulated_time),
        }
    }
}

/// Point-in-time overview of a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub state: SimulationState,
    pub bodies: usize,
    pub steps: u64,
    pub simulated_time: f64,
}

impl fmt::Display for SimulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Simulation: state={} bodies={} steps={} simulated={:.3}s",
            self.state, self.bodies, self.steps, self.simulated_time
        )
    }
}
