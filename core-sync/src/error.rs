use bridge_traits::error::BridgeError;
use core_library::error::LibraryError;
use core_metadata::error::MetadataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Manager {instance_id} is already initialized")]
    AlreadyInitialized { instance_id: String },

    #[error("Manager {0} has been disposed")]
    Disposed(String),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Invalid scan id: {0}")]
    InvalidScanId(String),

    #[error("Invalid manager state: {0}")]
    InvalidState(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Storage error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),
}

impl SyncError {
    /// Whether this error only reports that work was abandoned.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            SyncError::Cancelled
                | SyncError::Library(LibraryError::Cancelled)
                | SyncError::Metadata(MetadataError::Cancelled)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
