//! # Library Cache Module
//!
//! Owns the cached metadata entities and the repositories that persist them.
//!
//! ## Overview
//!
//! This module manages:
//! - Entity models for tracks, albums, artists, playlists and images
//! - Stable ids for albums and artists derived from their tags
//! - Versioned binary cache artifacts, one per repository
//! - Write-through in-memory repositories with pagination

pub mod codec;
pub mod error;
pub mod ids;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use ids::ArtistRole;
pub use models::{
    AlbumMetadata, ArtistMetadata, CacheEntity, FileMetadata, ImageMetadata, PlaylistMetadata,
    TrackMetadata,
};
pub use repositories::{CachedRepository, MetadataRepository, Page, PageRequest};
