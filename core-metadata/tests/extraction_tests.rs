//! Integration tests for metadata extraction
//!
//! Audio fixtures are generated in the test: a minimal PCM WAVE file whose
//! `LIST/INFO` chunk carries the tags.

use bridge_desktop::{LocalFolder, MemoryFolder};
use bridge_traits::storage::StorageFolder;
use core_async::sync::CancellationToken;
use core_metadata::{AudioMetadataScanner, MetadataError};
use core_runtime::config::ScanTypes;
use std::sync::Arc;

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 9);
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn info_item(id: &[u8; 4], text: &str) -> Vec<u8> {
    let mut body = text.as_bytes().to_vec();
    body.push(0);
    chunk(id, &body)
}

/// 100ms of 8kHz mono 16-bit silence tagged with title, album and artist.
fn wav(title: &str, album: &str, artist: &str) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
    fmt.extend_from_slice(&1u16.to_le_bytes()); // channels
    fmt.extend_from_slice(&8000u32.to_le_bytes()); // sample rate
    fmt.extend_from_slice(&16000u32.to_le_bytes()); // byte rate
    fmt.extend_from_slice(&2u16.to_le_bytes()); // block align
    fmt.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    let mut info = b"INFO".to_vec();
    info.extend(info_item(b"INAM", title));
    info.extend(info_item(b"IPRD", album));
    info.extend(info_item(b"IART", artist));

    let mut body = b"WAVE".to_vec();
    body.extend(chunk(b"fmt ", &fmt));
    body.extend(chunk(b"data", &[0u8; 1600]));
    body.extend(chunk(b"LIST", &info));
    chunk(b"RIFF", &body)
}

#[tokio::test]
async fn test_deep_parse_reads_riff_info_tags() {
    let root = MemoryFolder::new("/music");
    let file = root.add_file("song1.wav", wav("A", "X", "Band"));

    let meta = AudioMetadataScanner::new()
        .scan(file.as_ref(), ScanTypes::TAGLIB, &CancellationToken::new())
        .await
        .unwrap()
        .expect("wav should yield metadata");

    let track = meta.track.as_ref().unwrap();
    assert_eq!(track.title.as_deref(), Some("A"));
    assert_eq!(track.sample_rate, Some(8000));
    assert_eq!(track.channels, Some(1));
    assert!(track.duration_ms.is_some());

    let album = meta.album.as_ref().unwrap();
    assert_eq!(album.title.as_deref(), Some("X"));
    assert_eq!(track.album_id, album.id);
    assert_eq!(meta.track_artists[0].name, "Band");
    assert!(meta.images.is_empty());
}

#[tokio::test]
async fn test_tracks_with_same_album_share_album_id() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("song1.wav"), wav("A", "X", "Band")).unwrap();
    std::fs::write(dir.path().join("song2.wav"), wav("B", "x", "band")).unwrap();

    let folder = LocalFolder::open(dir.path()).await.unwrap();
    let files = folder.list_files().await.unwrap();
    let scanner = AudioMetadataScanner::new();
    let cancel = CancellationToken::new();

    let mut album_ids = Vec::new();
    for file in &files {
        let meta = scanner
            .scan(file.as_ref(), ScanTypes::ALL, &cancel)
            .await
            .unwrap()
            .unwrap();
        album_ids.push(meta.track.unwrap().album_id);
    }
    assert_eq!(album_ids.len(), 2);
    assert_eq!(album_ids[0], album_ids[1]);
}

#[tokio::test]
async fn test_picture_index_out_of_range() {
    let root = MemoryFolder::new("/music");
    let file = root.add_file("song1.wav", wav("A", "X", "Band"));
    let picture = AudioMetadataScanner::new()
        .read_picture(file.as_ref(), 0, &CancellationToken::new())
        .await
        .unwrap();
    assert!(picture.is_none());
}

#[tokio::test]
async fn test_missing_local_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.wav");
    std::fs::write(&path, wav("A", "X", "Band")).unwrap();
    let folder = LocalFolder::open(dir.path()).await.unwrap();
    let files = folder.list_files().await.unwrap();
    std::fs::remove_file(&path).unwrap();

    let file: Arc<dyn bridge_traits::storage::StorageFile> = files[0].clone();
    let result = AudioMetadataScanner::new()
        .scan(file.as_ref(), ScanTypes::TAGLIB, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(MetadataError::Bridge(_))));
}
