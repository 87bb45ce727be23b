//! Track repository

use crate::error::Result;
use crate::models::TrackMetadata;
use crate::repositories::CachedRepository;

pub const TRACK_ARTIFACT: &str = "TrackData.bin";

pub type TrackRepository = CachedRepository<TrackMetadata>;

impl CachedRepository<TrackMetadata> {
    pub fn tracks() -> Self {
        Self::new(TRACK_ARTIFACT)
    }

    /// Tracks on `album_id`, ordered by disc then track number.
    pub async fn find_by_album(&self, album_id: &str) -> Result<Vec<TrackMetadata>> {
        let mut tracks = self.find(|track| track.album_id == album_id).await?;
        tracks.sort_by(|a, b| {
            (a.disc_number, a.track_number, &a.id).cmp(&(b.disc_number, b.track_number, &b.id))
        });
        Ok(tracks)
    }

    pub async fn find_by_artist(&self, artist_id: &str) -> Result<Vec<TrackMetadata>> {
        self.find(|track| track.artist_ids.contains(artist_id)).await
    }

    pub async fn find_by_genre(&self, genre: &str) -> Result<Vec<TrackMetadata>> {
        self.find(|track| track.genres.iter().any(|g| g.eq_ignore_ascii_case(genre)))
            .await
    }
}
