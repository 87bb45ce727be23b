//! # Host Bridge Traits
//!
//! Storage and logging abstractions that a host platform implements for the
//! metadata scanning engine.
//!
//! ## Traits
//!
//! ### Storage
//! - [`StorageFolder`](storage::StorageFolder) - Enumerate a folder tree to scan
//! - [`StorageFile`](storage::StorageFile) - Stable identifier, path, byte stream and
//!   optional backend-supplied [`MusicProperties`](storage::MusicProperties)
//! - [`ModifiableFolder`](storage::ModifiableFolder) - Named binary artifacts for the cache
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let storage = builder.metadata_storage
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "ModifiableFolder".to_string(),
//!         message: "No metadata storage folder provided.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert backend errors into it and keep the failing path in the message.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`, since folders and files are shared
//! across scan tasks behind `Arc`.

pub mod error;
pub mod logging;
pub mod storage;

pub use error::BridgeError;

pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use storage::{ModifiableFolder, MusicProperties, ReadStream, StorageFile, StorageFolder};
