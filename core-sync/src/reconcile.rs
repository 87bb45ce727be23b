//! Post-discovery reconciliation
//!
//! After a complete discovery pass the batch describes exactly the files that
//! still exist. Anything a repository holds beyond the batch belonged to a
//! file that is gone, or to an album or artist only such files referenced.

use crate::batch::MetadataBatch;
use crate::catalog::Catalog;
use crate::state::ReconcileStats;
use crate::Result;
use core_library::models::CacheEntity;
use core_library::{CachedRepository, MetadataRepository};
use core_metadata::artwork::parse_image_id;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Outcome of [`reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub stats: ReconcileStats,
    /// Ids of the files whose tracks or pictures were removed
    pub removed_files: BTreeSet<String>,
}

/// Remove the entities of `repository` missing from `live` and return
/// their ids.
async fn remove_missing<T: CacheEntity>(
    repository: &CachedRepository<T>,
    live: &BTreeMap<String, T>,
) -> Result<Vec<String>> {
    let stale: Vec<String> = repository
        .ids()
        .await?
        .into_iter()
        .filter(|id| !live.contains_key(id))
        .collect();
    if stale.is_empty() {
        return Ok(stale);
    }
    debug!(
        artifact = repository.artifact_name(),
        count = stale.len(),
        "Removing stale entities"
    );
    repository.remove_many(&stale).await?;
    Ok(stale)
}

/// Remove every repository entity the batch does not hold.
///
/// Tracks go first, then the albums and artists they were the last
/// reference to.
pub async fn reconcile(catalog: &Catalog, batch: &MetadataBatch) -> Result<Reconciliation> {
    let tracks = remove_missing(&catalog.tracks, batch.tracks()).await?;
    let albums = remove_missing(&catalog.albums, batch.albums()).await?;
    let artists = remove_missing(&catalog.album_artists, batch.album_artists()).await?.len()
        + remove_missing(&catalog.track_artists, batch.track_artists()).await?.len();
    let images = remove_missing(&catalog.images, batch.images()).await?;
    let playlists = remove_missing(&catalog.playlists, batch.playlists()).await?;

    let stats = ReconcileStats {
        tracks_removed: tracks.len() as u64,
        albums_removed: albums.len() as u64,
        artists_removed: artists as u64,
        images_removed: images.len() as u64,
        playlists_removed: playlists.len() as u64,
    };
    let removed_files = images
        .iter()
        .filter_map(|id| parse_image_id(id).ok().map(|(file_id, _)| file_id.to_string()))
        .chain(tracks)
        .collect();
    if stats.total() > 0 {
        info!(
            tracks = stats.tracks_removed,
            albums = stats.albums_removed,
            artists = stats.artists_removed,
            images = stats.images_removed,
            playlists = stats.playlists_removed,
            "Reconciled cache with storage"
        );
    }
    Ok(Reconciliation {
        stats,
        removed_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::audio;
    use bridge_desktop::MemoryFolder;
    use core_async::sync::CancellationToken;
    use core_runtime::events::EventBus;

    #[tokio::test]
    async fn test_removes_entities_missing_from_batch() {
        let catalog = Catalog::new(&EventBus::default());
        catalog
            .initialize(MemoryFolder::new("/cache"), true, &CancellationToken::new())
            .await
            .unwrap();

        let mut previous = MetadataBatch::new();
        previous.merge(audio("/m/1.mp3", "x", "band"));
        previous.merge(audio("/m/2.mp3", "y", "solo"));
        catalog.commit(previous.take_delta()).await.unwrap();

        let mut current = MetadataBatch::new();
        current.merge(audio("/m/1.mp3", "x", "band"));
        let Reconciliation {
            stats,
            removed_files,
        } = reconcile(&catalog, &current).await.unwrap();

        assert_eq!(removed_files.into_iter().collect::<Vec<_>>(), vec!["/m/2.mp3"]);
        assert_eq!(stats.tracks_removed, 1);
        assert_eq!(stats.albums_removed, 1);
        assert_eq!(stats.artists_removed, 2);
        assert_eq!(catalog.tracks.ids().await.unwrap(), vec!["/m/1.mp3"]);
        assert_eq!(catalog.albums.ids().await.unwrap(), vec!["album:x"]);
        assert_eq!(
            reconcile(&catalog, &current).await.unwrap(),
            Reconciliation::default()
        );
    }
}
