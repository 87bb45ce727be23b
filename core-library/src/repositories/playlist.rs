//! Playlist repository

use crate::error::Result;
use crate::models::PlaylistMetadata;
use crate::repositories::CachedRepository;

pub const PLAYLIST_ARTIFACT: &str = "PlaylistData.bin";

pub type PlaylistRepository = CachedRepository<PlaylistMetadata>;

impl CachedRepository<PlaylistMetadata> {
    pub fn playlists() -> Self {
        Self::new(PLAYLIST_ARTIFACT)
    }

    pub async fn find_containing_track(&self, track_id: &str) -> Result<Vec<PlaylistMetadata>> {
        self.find(|playlist| playlist.track_ids.iter().any(|id| id == track_id))
            .await
    }
}
