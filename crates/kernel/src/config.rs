use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::body::Material;

/// Reasons a world configuration is refused at initialization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("gravity must be finite, got {0}")]
    NonFiniteGravity(Vec3),
    #[error("solver iteration count must be positive")]
    ZeroIterations,
    #[error("time step must be a positive number of seconds, got {0}")]
    InvalidTimeStep(f32),
    #[error("default contact {field} must lie in [0, 1], got {value}")]
    MaterialOutOfRange { field: &'static str, value: f32 },
}

/// World settings fixed at initialization.
///
/// Wire shape: `{ gravity: [gx, gy, gz], iterations, timeStep }` with optional
/// `friction` / `restitution` for the default contact material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldConfig {
    pub gravity: Vec3,
    pub iterations: u32,
    /// Fixed sub-step length in seconds.
    pub time_step: f32,
    #[serde(default = "default_friction")]
    pub friction: f32,
    #[serde(default = "default_restitution")]
    pub restitution: f32,
}

fn default_friction() -> f32 {
    0.3
}

fn default_restitution() -> f32 {
    0.3
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            iterations: 10,
            time_step: 1.0 / 60.0,
            friction: default_friction(),
            restitution: default_restitution(),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gravity.is_finite() {
            return Err(ConfigError::NonFiniteGravity(self.gravity));
        }
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(ConfigError::InvalidTimeStep(self.time_step));
        }
        for (field, value) in [("friction", self.friction), ("restitution", self.restitution)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::MaterialOutOfRange { field, value });
            }
        }
        Ok(())
    }

    /// Material used for contacts where a body carries no material of its own.
    pub fn default_material(&self) -> Material {
        Material::new(self.friction, self.restitution)
    }
}
