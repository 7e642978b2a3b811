use thiserror::Error;

use crate::core::types::EntityId;
use crate::entity::capabilities::Capability;
use crate::triggers::{CompileError, EvalError};

#[derive(Error, Debug)]
pub enum MurmurError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Entity already exists: {0}")]
    DuplicateEntity(EntityId),

    #[error("Material not registered: {0}")]
    MaterialNotFound(String),

    #[error("Invalid material '{name}': {reason}")]
    InvalidMaterial { name: String, reason: String },

    #[error("Material parse error: {0}")]
    MaterialParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Entity {entity} lacks capability {capability:?}")]
    CapabilityMissing {
        entity: EntityId,
        capability: Capability,
    },

    #[error("Cascade budget exceeded at depth {depth} ({emitted} emissions this tick)")]
    CascadeBudgetExceeded { depth: u32, emitted: u32 },

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Unknown notification kind: {0}")]
    UnknownNotification(String),

    #[error("Snapshot version {found} is not supported (expected {expected})")]
    IncompatibleSnapshot { found: u32, expected: u32 },

    #[error("Non-finite value rejected at {0}")]
    NumericDrift(&'static str),

    #[error("Trigger compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Expression error: {0}")]
    Evaluation(#[from] EvalError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MurmurError>;
