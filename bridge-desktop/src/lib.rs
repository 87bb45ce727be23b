//! # Desktop Bridge Implementations
//!
//! Storage adapters for desktop platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - [`LocalFolder`] / [`LocalFile`]: a directory tree on the local disk via
//!   `tokio::fs`. `LocalFolder` also serves as the metadata storage location.
//! - [`MemoryFolder`] / [`MemoryFile`]: an in-process tree, used for ephemeral
//!   caches and for hosts that synthesize their own folder structure.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::LocalFolder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let music = LocalFolder::open("/home/me/Music").await?;
//!     let cache = LocalFolder::create("/home/me/.cache/music-metadata").await?;
//!     // Hand both to CoreConfig::builder()
//! }
//! ```

mod filesystem;
mod memory;

pub use filesystem::{LocalFile, LocalFolder};
pub use memory::{MemoryFile, MemoryFolder};
