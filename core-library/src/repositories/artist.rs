//! Artist repositories
//!
//! Album artists and track artists live in separate repositories, each with
//! its own artifact. The same name in both roles yields two entities.

use crate::error::Result;
use crate::ids::ArtistRole;
use crate::models::{normalize, ArtistMetadata};
use crate::repositories::CachedRepository;

pub const ALBUM_ARTIST_ARTIFACT: &str = "AlbumArtistData.bin";
pub const TRACK_ARTIST_ARTIFACT: &str = "TrackArtistData.bin";

pub type ArtistRepository = CachedRepository<ArtistMetadata>;

impl CachedRepository<ArtistMetadata> {
    /// Repository for the artist namespace `role`.
    pub fn artists(role: ArtistRole) -> Self {
        match role {
            ArtistRole::AlbumArtist => Self::new(ALBUM_ARTIST_ARTIFACT),
            ArtistRole::TrackArtist => Self::new(TRACK_ARTIST_ARTIFACT),
        }
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Vec<ArtistMetadata>> {
        let wanted = normalize(name);
        self.find(|artist| normalize(&artist.name) == wanted).await
    }

    pub async fn find_by_album(&self, album_id: &str) -> Result<Vec<ArtistMetadata>> {
        self.find(|artist| artist.album_ids.contains(album_id)).await
    }

    pub async fn find_by_track(&self, track_id: &str) -> Result<Vec<ArtistMetadata>> {
        self.find(|artist| artist.track_ids.contains(track_id)).await
    }
}
