use std::fmt;
use std::str::FromStr;

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors from parsing identifiers at the wire boundary.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("invalid universe id {0:?}")]
    InvalidUniverse(String),
}

/// Wire form shared by every opaque id: a JSON integer or a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Int(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// Caller-supplied identifier of a simulated object.
///
/// Opaque to the core. Accepts either a JSON string or an integer on the wire
/// and always serializes as a string, so it can key a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct ObjectId(String);

impl From<RawId> for ObjectId {
    fn from(raw: RawId) -> Self {
        Self(raw.into())
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for ObjectId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a universe: the session container that scopes parameter sync.
///
/// Opaque like [`ObjectId`]: hosts key universes however they like (database
/// integers, UUIDs), and `42` on the wire equals `"42"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct UniverseId(String);

impl UniverseId {
    /// A fresh random id, for universes created locally.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UniverseId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<RawId> for UniverseId {
    fn from(raw: RawId) -> Self {
        Self(raw.into())
    }
}

impl From<UniverseId> for String {
    fn from(id: UniverseId) -> Self {
        id.0
    }
}

impl From<u64> for UniverseId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl FromStr for UniverseId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::InvalidUniverse(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }
}

impl fmt::Display for UniverseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position and orientation of a body. Orientation is always a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Pose {
    /// Build a pose from a position and an XYZ Euler triple in radians.
    pub fn from_euler(position: Vec3, euler: Vec3) -> Self {
        Self {
            position,
            rotation: euler_to_quat(euler),
        }
    }

    /// Map a point from this pose's local frame to world space.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    /// Map a world-space point into this pose's local frame.
    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }
}

/// Convert an XYZ Euler triple (radians) to a normalized quaternion.
///
/// Euler angles only exist at the descriptor boundary; everything past it
/// works in quaternions.
pub fn euler_to_quat(euler: Vec3) -> Quat {
    Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z).normalize()
}
