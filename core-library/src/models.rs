//! Domain models for the metadata cache
//!
//! Entities reference each other by string identifier only. Reference sets
//! are ordered so a cached artifact written twice from the same state is
//! identical byte for byte.

use crate::error::{LibraryError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// Entity Contract
// =============================================================================

/// An entity that can be held by a cached repository.
pub trait CacheEntity:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Human readable entity kind used in errors and logs.
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Check the entity before it is stored.
    fn validate(&self) -> Result<()> {
        require_id(Self::KIND, self.id())
    }
}

fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(LibraryError::invalid_input(
            format!("{kind}.id"),
            "identifier cannot be empty",
        ));
    }
    Ok(())
}

// =============================================================================
// Domain Models
// =============================================================================

/// A single audio file's track metadata.
///
/// The track id is the id of the file it was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: String,
    /// Every track belongs to an album, possibly the unknown album.
    pub album_id: String,
    pub artist_ids: BTreeSet<String>,
    pub image_ids: BTreeSet<String>,

    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub genres: Vec<String>,
    pub year: Option<u32>,

    // Audio properties
    pub duration_ms: Option<u64>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,

    /// Path of the source file at scan time
    pub path: String,
}

impl CacheEntity for TrackMetadata {
    const KIND: &'static str = "track";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        require_id(Self::KIND, &self.id)?;
        if self.album_id.trim().is_empty() {
            return Err(LibraryError::invalid_input(
                "track.album_id",
                format!("track {} has no album", self.id),
            ));
        }
        Ok(())
    }
}

/// An album aggregated from the tracks that reference it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumMetadata {
    pub id: String,
    /// `None` only for the unknown album.
    pub title: Option<String>,
    /// Album artist ids
    pub artist_ids: BTreeSet<String>,
    pub track_ids: BTreeSet<String>,
    pub image_ids: BTreeSet<String>,
    pub genres: BTreeSet<String>,
    pub year: Option<u32>,
}

impl AlbumMetadata {
    pub fn is_unknown(&self) -> bool {
        self.title.is_none()
    }
}

impl CacheEntity for AlbumMetadata {
    const KIND: &'static str = "album";

    fn id(&self) -> &str {
        &self.id
    }
}

/// An artist in either the album-artist or the track-artist namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistMetadata {
    pub id: String,
    pub name: String,
    pub album_ids: BTreeSet<String>,
    pub track_ids: BTreeSet<String>,
}

impl CacheEntity for ArtistMetadata {
    const KIND: &'static str = "artist";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A playlist file resolved against the scanned audio files.
///
/// Track order follows the order of entries in the playlist file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    pub id: String,
    pub title: Option<String>,
    pub track_ids: Vec<String>,
    pub path: String,
}

impl CacheEntity for PlaylistMetadata {
    const KIND: &'static str = "playlist";

    fn id(&self) -> &str {
        &self.id
    }
}

/// An image embedded in an audio file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub id: String,
    /// The audio file the image bytes live in
    pub file_id: String,
    pub mime_type: Option<String>,
    pub picture_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_bytes: u64,
}

impl CacheEntity for ImageMetadata {
    const KIND: &'static str = "image";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        require_id(Self::KIND, &self.id)?;
        require_id("image.file", &self.file_id)
    }
}

/// Everything a scanner produced for a single file.
///
/// An audio file yields a track and optionally an album, artists and images.
/// A playlist file yields only `playlist`. A file with no readable metadata
/// yields an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_id: String,
    pub track: Option<TrackMetadata>,
    pub album: Option<AlbumMetadata>,
    pub album_artists: Vec<ArtistMetadata>,
    pub track_artists: Vec<ArtistMetadata>,
    pub images: Vec<ImageMetadata>,
    pub playlist: Option<PlaylistMetadata>,
}

impl FileMetadata {
    pub fn empty(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.track.is_none() && self.playlist.is_none()
    }

    /// Validate every entity carried by this result.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::InvalidInput` when a track lacks an id or an
    /// album id, or when any carried entity lacks an id.
    pub fn validate(&self) -> Result<()> {
        if let Some(track) = &self.track {
            track.validate()?;
        }
        if let Some(album) = &self.album {
            album.validate()?;
        }
        for artist in self.album_artists.iter().chain(&self.track_artists) {
            artist.validate()?;
        }
        for image in &self.images {
            image.validate()?;
        }
        if let Some(playlist) = &self.playlist {
            playlist.validate()?;
        }
        Ok(())
    }
}

/// Normalize a name for matching: trimmed, whitespace collapsed, lowercased.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
