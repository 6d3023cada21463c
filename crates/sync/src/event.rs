use orrery_common::UniverseId;
use orrery_kernel::{ParameterError, PhysicsParameters};
use serde::{Deserialize, Serialize};

/// Errors at the sync wire boundary. None of these ever reach the world.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("malformed event: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("expected a {expected} event, got {got}")]
    WrongCategory {
        expected: ParameterCategory,
        got: ParameterCategory,
    },
    #[error("invalid physics parameters: {0}")]
    InvalidParameters(#[from] ParameterError),
}

/// Which component owns a parameter bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterCategory {
    /// Owned by the physics world.
    Physics,
    /// Owned by the external audio subsystem; passed through untouched.
    Music,
}

impl std::fmt::Display for ParameterCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Physics => "physics",
            Self::Music => "music",
        })
    }
}

/// Wire event: `{ universe_id, type, parameters }`.
///
/// Carries a full replacement bundle for one category. There is no origin tag
/// and no sequence number; the last event applied wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdateEvent {
    pub universe_id: UniverseId,
    #[serde(rename = "type")]
    pub category: ParameterCategory,
    pub parameters: serde_json::Value,
}

impl ParameterUpdateEvent {
    pub fn physics(universe_id: UniverseId, params: &PhysicsParameters) -> Result<Self, SyncError> {
        Ok(Self {
            universe_id,
            category: ParameterCategory::Physics,
            parameters: serde_json::to_value(params)?,
        })
    }

    pub fn decode(raw: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate the bundle of a physics event.
    pub fn physics_parameters(&self) -> Result<PhysicsParameters, SyncError> {
        if self.category != ParameterCategory::Physics {
            return Err(SyncError::WrongCategory {
                expected: ParameterCategory::Physics,
                got: self.category,
            });
        }
        let params = PhysicsParameters::deserialize(&self.parameters)?;
        params.validate()?;
        Ok(params)
    }
}
