//! Repositories persisting to a real directory.

use bridge_desktop::LocalFolder;
use core_async::sync::CancellationToken;
use core_library::repositories::{AlbumRepository, TrackRepository};
use core_library::{AlbumMetadata, MetadataRepository, TrackMetadata};
use std::collections::BTreeSet;
use std::sync::Arc;

fn track(id: &str) -> TrackMetadata {
    TrackMetadata {
        id: id.to_string(),
        album_id: "album:x".to_string(),
        title: Some(id.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_artifacts_survive_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalFolder::create(dir.path()).await.unwrap());
    let cancel = CancellationToken::new();

    let tracks = TrackRepository::tracks();
    let albums = AlbumRepository::albums();
    tracks.initialize(storage.clone(), &cancel).await.unwrap();
    albums.initialize(storage.clone(), &cancel).await.unwrap();
    tracks
        .add_or_update(vec![track("/m/1.mp3"), track("/m/2.mp3")])
        .await
        .unwrap();
    albums
        .add_or_update(vec![AlbumMetadata {
            id: "album:x".to_string(),
            title: Some("X".to_string()),
            track_ids: BTreeSet::from(["/m/1.mp3".to_string(), "/m/2.mp3".to_string()]),
            ..Default::default()
        }])
        .await
        .unwrap();
    tracks.dispose().await.unwrap();
    albums.dispose().await.unwrap();

    assert!(dir.path().join("TrackData.bin").exists());
    assert!(dir.path().join("AlbumData.bin").exists());

    let storage = Arc::new(LocalFolder::open(dir.path()).await.unwrap());
    let tracks = TrackRepository::tracks();
    tracks.initialize(storage, &cancel).await.unwrap();
    assert_eq!(tracks.ids().await.unwrap(), vec!["/m/1.mp3", "/m/2.mp3"]);
}

#[tokio::test]
async fn test_corrupt_artifact_does_not_affect_others() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalFolder::create(dir.path()).await.unwrap());
    let cancel = CancellationToken::new();

    let tracks = TrackRepository::tracks();
    tracks.initialize(storage.clone(), &cancel).await.unwrap();
    tracks.add_or_update(vec![track("/m/1.mp3")]).await.unwrap();
    std::fs::write(dir.path().join("AlbumData.bin"), b"\xff\xff\xff").unwrap();

    let albums = AlbumRepository::albums();
    albums.initialize(storage.clone(), &cancel).await.unwrap();
    assert_eq!(albums.count().await.unwrap(), 0);

    let reloaded = TrackRepository::tracks();
    reloaded.initialize(storage, &cancel).await.unwrap();
    assert_eq!(reloaded.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_identical_state_writes_identical_bytes() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    for dir in [&first, &second] {
        let storage = Arc::new(LocalFolder::create(dir.path()).await.unwrap());
        let tracks = TrackRepository::tracks();
        tracks.initialize(storage, &cancel).await.unwrap();
        tracks
            .add_or_update(vec![track("/m/2.mp3"), track("/m/1.mp3")])
            .await
            .unwrap();
    }

    let a = std::fs::read(first.path().join("TrackData.bin")).unwrap();
    let b = std::fs::read(second.path().join("TrackData.bin")).unwrap();
    assert_eq!(a, b);
}
