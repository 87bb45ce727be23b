//! Workspace facade crate.
//!
//! Host applications can depend on `metadata-cache-workspace` with the default
//! `desktop-shims` feature and reach the scanning engine, its configuration and
//! the local storage adapters without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{LocalFolder, MemoryFolder};
#[cfg(feature = "desktop-shims")]
pub use core_runtime::config::{CoreConfig, ScanSettings, ScanTypes};
#[cfg(feature = "desktop-shims")]
pub use core_service::ManagerRegistry;
#[cfg(feature = "desktop-shims")]
pub use core_sync::{MetadataManager, ScanStatus, ScanSummary};
