//! Album repository

use crate::error::Result;
use crate::models::{normalize, AlbumMetadata};
use crate::repositories::CachedRepository;

pub const ALBUM_ARTIFACT: &str = "AlbumData.bin";

pub type AlbumRepository = CachedRepository<AlbumMetadata>;

impl CachedRepository<AlbumMetadata> {
    pub fn albums() -> Self {
        Self::new(ALBUM_ARTIFACT)
    }

    /// Albums whose title matches `title` ignoring case and spacing.
    pub async fn find_by_title(&self, title: &str) -> Result<Vec<AlbumMetadata>> {
        let wanted = normalize(title);
        self.find(|album| album.title.as_deref().map(normalize).as_deref() == Some(wanted.as_str()))
            .await
    }

    /// Albums credited to the album artist `artist_id`.
    pub async fn find_by_artist(&self, artist_id: &str) -> Result<Vec<AlbumMetadata>> {
        self.find(|album| album.artist_ids.contains(artist_id)).await
    }

    /// The album containing `track_id`, if any.
    pub async fn find_by_track(&self, track_id: &str) -> Result<Option<AlbumMetadata>> {
        Ok(self
            .find(|album| album.track_ids.contains(track_id))
            .await?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MetadataRepository;
    use bridge_desktop::MemoryFolder;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_album_queries() {
        let repo = AlbumRepository::albums();
        repo.initialize_empty(MemoryFolder::new("/cache"))
            .await
            .unwrap();
        repo.add_or_update(vec![
            AlbumMetadata {
                id: "1".to_string(),
                title: Some("Album X".to_string()),
                artist_ids: BTreeSet::from(["band".to_string()]),
                track_ids: BTreeSet::from(["/m/song1.mp3".to_string()]),
                ..Default::default()
            },
            AlbumMetadata {
                id: "2".to_string(),
                title: None,
                ..Default::default()
            },
        ])
        .await
        .unwrap();

        assert_eq!(repo.artifact_name(), "AlbumData.bin");
        assert_eq!(repo.find_by_title("album x").await.unwrap().len(), 1);
        assert!(repo.find_by_title("Album Y").await.unwrap().is_empty());
        assert_eq!(repo.find_by_artist("band").await.unwrap()[0].id, "1");
        assert_eq!(
            repo.find_by_track("/m/song1.mp3").await.unwrap().unwrap().id,
            "1"
        );
        assert!(repo.find_by_track("/m/other.mp3").await.unwrap().is_none());
    }
}
