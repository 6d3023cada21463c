//! The "physics" parameter bundle edited by users and shared between clients.
//!
//! A bundle is always applied wholesale: every field replaces the world's
//! current value, missing wire fields take their defaults.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("parameter {name} out of range: {value}")]
    OutOfRange { name: &'static str, value: f32 },
    #[error("gravity must be finite")]
    NonFiniteGravity,
}

/// Gravity as either a downward magnitude or a full vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Gravity {
    /// Magnitude pointing along -Y.
    Magnitude(f32),
    Vector(Vec3),
}

impl Gravity {
    pub fn to_vector(self) -> Vec3 {
        match self {
            Self::Magnitude(g) => Vec3::new(0.0, -g, 0.0),
            Self::Vector(v) => v,
        }
    }
}

impl Default for Gravity {
    fn default() -> Self {
        Self::Vector(Vec3::new(0.0, -9.81, 0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicsParameters {
    pub gravity: Gravity,
    /// Default contact friction, [0, 1].
    pub friction: f32,
    /// Default contact restitution, [0, 1].
    pub elasticity: f32,
    /// Linear and angular damping coefficient per second.
    pub air_resistance: f32,
    /// Scale applied to every dynamic body's own mass.
    pub mass: f32,
    /// Multiplier on wall-clock time fed to the stepper.
    pub time_scale: f32,
}

impl Default for PhysicsParameters {
    fn default() -> Self {
        Self {
            gravity: Gravity::default(),
            friction: 0.3,
            elasticity: 0.3,
            air_resistance: 0.0,
            mass: 1.0,
            time_scale: 1.0,
        }
    }
}

impl PhysicsParameters {
    /// Parameters that reproduce a freshly initialized world.
    pub fn from_config(config: &WorldConfig) -> Self {
        Self {
            gravity: Gravity::Vector(config.gravity),
            friction: config.friction,
            elasticity: config.restitution,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.gravity.to_vector().is_finite() {
            return Err(ParameterError::NonFiniteGravity);
        }
        let unit = |v: f32| (0.0..=1.0).contains(&v);
        let non_negative = |v: f32| v.is_finite() && v >= 0.0;
        let checks = [
            ("friction", self.friction, unit(self.friction)),
            ("elasticity", self.elasticity, unit(self.elasticity)),
            ("airResistance", self.air_resistance, non_negative(self.air_resistance)),
            ("mass", self.mass, non_negative(self.mass) && self.mass > 0.0),
            ("timeScale", self.time_scale, non_negative(self.time_scale)),
        ];
        match checks.into_iter().find(|(_, _, ok)| !ok) {
            Some((name, value, _)) => Err(ParameterError::OutOfRange { name, value }),
            None => Ok(()),
        }
    }
}
