use thiserror::Error;

use crate::document::DocumentStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Duplicate registry id: {0}")]
    DuplicateRegistryId(String),

    #[error("Invalid registry entry: {0}")]
    InvalidRegistryEntry(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Manual override requires a non-empty registry id")]
    EmptyOverrideId,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
