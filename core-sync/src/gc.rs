//! Reference garbage collection over a metadata batch
//!
//! Every cross-reference in the batch is checked against the entities the
//! batch holds. References to missing entities are removed, and so are
//! links the other side no longer confirms: an album only lists tracks whose
//! `album_id` is that album, a track artist only lists tracks that name it.
//! A track whose album is missing moves to the unknown album, since a track
//! always has one.

use crate::batch::MetadataBatch;
use core_library::ids::unknown_album_id;
use core_library::models::{AlbumMetadata, ArtistMetadata};
use std::collections::BTreeSet;
use tracing::debug;

/// What one collection pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// References removed across all entities
    pub references_pruned: usize,
    /// Tracks moved to the unknown album
    pub albums_repointed: usize,
}

impl GcReport {
    pub fn is_clean(&self) -> bool {
        self.references_pruned == 0 && self.albums_repointed == 0
    }
}

fn prune(set: &mut BTreeSet<String>, keep: impl Fn(&str) -> bool) -> usize {
    let before = set.len();
    set.retain(|id| keep(id));
    before - set.len()
}

/// Prune dangling references from every entity in `batch`.
///
/// Changed entities are marked dirty in the batch.
pub fn collect_garbage(batch: &mut MetadataBatch) -> GcReport {
    let mut report = GcReport::default();
    let MetadataBatch {
        tracks,
        albums,
        album_artists,
        track_artists,
        images,
        playlists,
        dirty,
        ..
    } = batch;

    // Tracks first: a repointed track must be visible to the album pass.
    let unknown = unknown_album_id();
    let mut repointed = Vec::new();
    for track in tracks.values_mut() {
        let mut pruned = prune(&mut track.artist_ids, |id| track_artists.contains_key(id));
        pruned += prune(&mut track.image_ids, |id| images.contains_key(id));
        if !albums.contains_key(&track.album_id) {
            debug!(track_id = %track.id, album_id = %track.album_id, "Repointing track to unknown album");
            track.album_id = unknown.clone();
            repointed.push(track.id.clone());
        }
        if pruned > 0 || repointed.last() == Some(&track.id) {
            dirty.tracks.insert(track.id.clone());
        }
        report.references_pruned += pruned;
    }
    if !repointed.is_empty() {
        let album = albums
            .entry(unknown.clone())
            .or_insert_with(|| AlbumMetadata {
                id: unknown.clone(),
                ..Default::default()
            });
        album.track_ids.extend(repointed.iter().cloned());
        dirty.albums.insert(unknown);
        report.albums_repointed = repointed.len();
    }

    for album in albums.values_mut() {
        let AlbumMetadata {
            id,
            artist_ids,
            track_ids,
            image_ids,
            ..
        } = album;
        let mut pruned = prune(artist_ids, |artist| album_artists.contains_key(artist));
        pruned += prune(track_ids, |track| {
            tracks.get(track).is_some_and(|track| track.album_id == *id)
        });
        pruned += prune(image_ids, |image| images.contains_key(image));
        if pruned > 0 {
            dirty.albums.insert(id.clone());
            report.references_pruned += pruned;
        }
    }

    for artist in album_artists.values_mut() {
        let ArtistMetadata {
            id,
            album_ids,
            track_ids,
            ..
        } = artist;
        let mut pruned = prune(album_ids, |album| {
            albums
                .get(album)
                .is_some_and(|album| album.artist_ids.contains(id.as_str()))
        });
        pruned += prune(track_ids, |track| {
            tracks
                .get(track)
                .is_some_and(|track| album_ids.contains(&track.album_id))
        });
        if pruned > 0 {
            dirty.album_artists.insert(id.clone());
            report.references_pruned += pruned;
        }
    }

    for artist in track_artists.values_mut() {
        let ArtistMetadata {
            id,
            album_ids,
            track_ids,
            ..
        } = artist;
        let mut pruned = prune(track_ids, |track| {
            tracks
                .get(track)
                .is_some_and(|track| track.artist_ids.contains(id.as_str()))
        });
        let linked: BTreeSet<&str> = track_ids
            .iter()
            .filter_map(|track| tracks.get(track))
            .map(|track| track.album_id.as_str())
            .collect();
        pruned += prune(album_ids, |album| {
            albums.contains_key(album) && linked.contains(album)
        });
        if pruned > 0 {
            dirty.track_artists.insert(id.clone());
            report.references_pruned += pruned;
        }
    }

    for playlist in playlists.values_mut() {
        let before = playlist.track_ids.len();
        playlist.track_ids.retain(|id| tracks.contains_key(id));
        let pruned = before - playlist.track_ids.len();
        if pruned > 0 {
            dirty.playlists.insert(playlist.id.clone());
            report.references_pruned += pruned;
        }
    }

    if !report.is_clean() {
        debug!(
            pruned = report.references_pruned,
            repointed = report.albums_repointed,
            "Collected dangling references"
        );
    }
    report
}
