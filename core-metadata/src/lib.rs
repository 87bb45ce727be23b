//! # Metadata Scanning Module
//!
//! Discovers candidate files and extracts metadata from them.
//!
//! ## Overview
//!
//! This module handles:
//! - Lazy depth-first traversal with a shared known-files set
//! - Audio tag extraction from backend properties or a deep `lofty` parse
//! - Embedded picture ids, dimensions and a small byte cache
//! - M3U and PLS playlist parsing and resolution

pub mod artwork;
pub mod audio_scanner;
pub mod error;
pub mod folder_scanner;
pub mod formats;
pub mod playlist_scanner;

pub use audio_scanner::AudioMetadataScanner;
pub use error::{MetadataError, Result};
pub use folder_scanner::{FolderScanner, KnownFiles};
pub use formats::FileKind;
pub use playlist_scanner::PlaylistMetadataScanner;
