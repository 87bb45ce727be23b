use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Repository {0} is not initialized")]
    NotInitialized(String),

    #[error("Repository {0} has been disposed")]
    Disposed(String),

    #[error("Cache artifact {artifact} is corrupt: {message}")]
    Corrupt { artifact: String, message: String },

    #[error("Cache artifact {artifact} has version {found}, expected {expected}")]
    VersionMismatch {
        artifact: String,
        expected: u32,
        found: u32,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl LibraryError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether a stored artifact could not be used and an empty start is the
    /// appropriate recovery.
    pub fn is_unreadable_artifact(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::VersionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
