//! # Repository Pattern Implementation
//!
//! One cached repository per entity kind. Each keeps its entities in memory,
//! loads them from its own artifact on initialization and rewrites that
//! artifact after every mutation.
//!
//! ## Available Repositories
//!
//! - `TrackRepository` - `TrackData.bin`
//! - `AlbumRepository` - `AlbumData.bin`
//! - `ArtistRepository` - `AlbumArtistData.bin` and `TrackArtistData.bin`
//! - `PlaylistRepository` - `PlaylistData.bin`
//! - `ImageRepository` - `ImageData.bin`

pub mod album;
pub mod artist;
pub mod image;
pub mod pagination;
pub mod playlist;
pub mod repository;
pub mod track;

pub use album::{AlbumRepository, ALBUM_ARTIFACT};
pub use artist::{ArtistRepository, ALBUM_ARTIST_ARTIFACT, TRACK_ARTIST_ARTIFACT};
pub use image::{ImageRepository, IMAGE_ARTIFACT};
pub use pagination::{Page, PageRequest};
pub use playlist::{PlaylistRepository, PLAYLIST_ARTIFACT};
pub use repository::{CachedRepository, MetadataRepository};
pub use track::{TrackRepository, TRACK_ARTIFACT};
