//! In-flight metadata of one scan
//!
//! A [`MetadataBatch`] accumulates every file digested during a scan. Tracks,
//! images and playlists belong to a single file and are replaced whole.
//! Albums and artists are shared between files and merge by id: their
//! reference sets are unions and their descriptive fields come from the
//! contributing file with the lowest id, so the merged result does not depend
//! on the order files were digested in.
//!
//! The batch remembers which entities changed since the last
//! [`take_delta`](MetadataBatch::take_delta), which is what gets written to
//! the repositories.

use core_library::models::{
    AlbumMetadata, ArtistMetadata, CacheEntity, FileMetadata, ImageMetadata, PlaylistMetadata,
    TrackMetadata,
};
use std::collections::{BTreeMap, BTreeSet};

/// What [`MetadataBatch::merge`] did with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First time this file was digested in the batch
    Added,
    /// The file was digested before with different metadata
    Changed,
    /// The file was digested before with identical metadata
    Unchanged,
}

/// Ids changed since the last delta, per entity kind.
#[derive(Debug, Default)]
pub(crate) struct DirtySet {
    pub(crate) tracks: BTreeSet<String>,
    pub(crate) albums: BTreeSet<String>,
    pub(crate) album_artists: BTreeSet<String>,
    pub(crate) track_artists: BTreeSet<String>,
    pub(crate) images: BTreeSet<String>,
    pub(crate) playlists: BTreeSet<String>,
}

/// Entities to write through to the repositories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchDelta {
    pub tracks: Vec<TrackMetadata>,
    pub albums: Vec<AlbumMetadata>,
    pub album_artists: Vec<ArtistMetadata>,
    pub track_artists: Vec<ArtistMetadata>,
    pub images: Vec<ImageMetadata>,
    pub playlists: Vec<PlaylistMetadata>,
}

impl BatchDelta {
    pub fn len(&self) -> usize {
        self.tracks.len()
            + self.albums.len()
            + self.album_artists.len()
            + self.track_artists.len()
            + self.images.len()
            + self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything digested so far in the current scan.
#[derive(Debug, Default)]
pub struct MetadataBatch {
    files: BTreeMap<String, FileMetadata>,
    /// Aggregate id -> file whose descriptive fields it carries
    owners: BTreeMap<String, String>,

    pub(crate) tracks: BTreeMap<String, TrackMetadata>,
    pub(crate) albums: BTreeMap<String, AlbumMetadata>,
    pub(crate) album_artists: BTreeMap<String, ArtistMetadata>,
    pub(crate) track_artists: BTreeMap<String, ArtistMetadata>,
    pub(crate) images: BTreeMap<String, ImageMetadata>,
    pub(crate) playlists: BTreeMap<String, PlaylistMetadata>,

    pub(crate) dirty: DirtySet,
}

impl MetadataBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest one file's metadata into the batch.
    ///
    /// A file digested again with different metadata first has its previous
    /// contribution retracted, so a track that moved to another album no
    /// longer counts towards the old one.
    pub fn merge(&mut self, metadata: FileMetadata) -> MergeOutcome {
        let unchanged = self
            .files
            .get(&metadata.file_id)
            .map(|existing| *existing == metadata);
        match unchanged {
            Some(true) => MergeOutcome::Unchanged,
            Some(false) => {
                self.files.insert(metadata.file_id.clone(), metadata);
                self.rebuild();
                MergeOutcome::Changed
            }
            None => {
                self.absorb(&metadata);
                self.mark_contribution(&metadata);
                self.files.insert(metadata.file_id.clone(), metadata);
                MergeOutcome::Added
            }
        }
    }

    /// Number of files digested.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn contains_file(&self, file_id: &str) -> bool {
        self.files.contains_key(file_id)
    }

    pub fn tracks(&self) -> &BTreeMap<String, TrackMetadata> {
        &self.tracks
    }

    pub fn albums(&self) -> &BTreeMap<String, AlbumMetadata> {
        &self.albums
    }

    pub fn album_artists(&self) -> &BTreeMap<String, ArtistMetadata> {
        &self.album_artists
    }

    pub fn track_artists(&self) -> &BTreeMap<String, ArtistMetadata> {
        &self.track_artists
    }

    pub fn images(&self) -> &BTreeMap<String, ImageMetadata> {
        &self.images
    }

    pub fn playlists(&self) -> &BTreeMap<String, PlaylistMetadata> {
        &self.playlists
    }

    /// Remove albums and artists left without tracks, and images no track or
    /// album shows. Returns how many entities were removed.
    ///
    /// Run the garbage collector afterwards so nothing keeps pointing at
    /// the removed entities.
    pub fn drop_orphans(&mut self) -> usize {
        let before = self.entity_count();

        self.albums.retain(|_, album| !album.track_ids.is_empty());
        self.album_artists
            .retain(|_, artist| !artist.track_ids.is_empty());
        self.track_artists
            .retain(|_, artist| !artist.track_ids.is_empty());

        let shown: BTreeSet<&String> = self
            .tracks
            .values()
            .flat_map(|track| &track.image_ids)
            .chain(self.albums.values().flat_map(|album| &album.image_ids))
            .collect();
        let orphaned: Vec<String> = self
            .images
            .keys()
            .filter(|id| !shown.contains(id))
            .cloned()
            .collect();
        for id in orphaned {
            self.images.remove(&id);
        }

        before - self.entity_count()
    }

    /// Take every changed entity still present in the batch.
    pub fn take_delta(&mut self) -> BatchDelta {
        let dirty = std::mem::take(&mut self.dirty);
        BatchDelta {
            tracks: pick(&self.tracks, dirty.tracks),
            albums: pick(&self.albums, dirty.albums),
            album_artists: pick(&self.album_artists, dirty.album_artists),
            track_artists: pick(&self.track_artists, dirty.track_artists),
            images: pick(&self.images, dirty.images),
            playlists: pick(&self.playlists, dirty.playlists),
        }
    }

    fn entity_count(&self) -> usize {
        self.tracks.len()
            + self.albums.len()
            + self.album_artists.len()
            + self.track_artists.len()
            + self.images.len()
            + self.playlists.len()
    }

    fn mark_contribution(&mut self, metadata: &FileMetadata) {
        let dirty = &mut self.dirty;
        if let Some(track) = &metadata.track {
            dirty.tracks.insert(track.id.clone());
        }
        if let Some(album) = &metadata.album {
            dirty.albums.insert(album.id.clone());
        }
        for artist in &metadata.album_artists {
            dirty.album_artists.insert(artist.id.clone());
        }
        for artist in &metadata.track_artists {
            dirty.track_artists.insert(artist.id.clone());
        }
        for image in &metadata.images {
            dirty.images.insert(image.id.clone());
        }
        if let Some(playlist) = &metadata.playlist {
            dirty.playlists.insert(playlist.id.clone());
        }
    }

    /// Recompute every entity from the stored file contributions and mark
    /// whatever differs from before.
    fn rebuild(&mut self) {
        let tracks = std::mem::take(&mut self.tracks);
        let albums = std::mem::take(&mut self.albums);
        let album_artists = std::mem::take(&mut self.album_artists);
        let track_artists = std::mem::take(&mut self.track_artists);
        let images = std::mem::take(&mut self.images);
        let playlists = std::mem::take(&mut self.playlists);
        self.owners.clear();

        let files = std::mem::take(&mut self.files);
        for metadata in files.values() {
            self.absorb(metadata);
        }
        self.files = files;

        mark_changed(&tracks, &self.tracks, &mut self.dirty.tracks);
        mark_changed(&albums, &self.albums, &mut self.dirty.albums);
        mark_changed(
            &album_artists,
            &self.album_artists,
            &mut self.dirty.album_artists,
        );
        mark_changed(
            &track_artists,
            &self.track_artists,
            &mut self.dirty.track_artists,
        );
        mark_changed(&images, &self.images, &mut self.dirty.images);
        mark_changed(&playlists, &self.playlists, &mut self.dirty.playlists);
    }

    fn absorb(&mut self, metadata: &FileMetadata) {
        let file_id = metadata.file_id.as_str();

        if let Some(track) = &metadata.track {
            self.tracks.insert(track.id.clone(), track.clone());
        }
        if let Some(album) = &metadata.album {
            self.merge_album(file_id, album);
        }
        for artist in &metadata.album_artists {
            let owner = claim(&mut self.owners, &artist.id, file_id);
            merge_artist(&mut self.album_artists, artist, owner);
        }
        for artist in &metadata.track_artists {
            let owner = claim(&mut self.owners, &artist.id, file_id);
            merge_artist(&mut self.track_artists, artist, owner);
        }
        for image in &metadata.images {
            self.images.insert(image.id.clone(), image.clone());
        }
        if let Some(playlist) = &metadata.playlist {
            self.playlists.insert(playlist.id.clone(), playlist.clone());
        }
    }

    fn merge_album(&mut self, file_id: &str, incoming: &AlbumMetadata) {
        let owner = claim(&mut self.owners, &incoming.id, file_id);
        let Some(album) = self.albums.get_mut(&incoming.id) else {
            self.albums.insert(incoming.id.clone(), incoming.clone());
            return;
        };

        album.artist_ids.extend(incoming.artist_ids.iter().cloned());
        album.track_ids.extend(incoming.track_ids.iter().cloned());
        album.image_ids.extend(incoming.image_ids.iter().cloned());
        album.genres.extend(incoming.genres.iter().cloned());
        if owner {
            album.title = incoming.title.clone();
            album.year = incoming.year.or(album.year);
        } else if album.year.is_none() {
            album.year = incoming.year;
        }
    }
}

/// Record `file_id` as the descriptive source of `entity_id` if it sorts
/// before the current one. Returns whether it is the source.
fn claim(owners: &mut BTreeMap<String, String>, entity_id: &str, file_id: &str) -> bool {
    match owners.get(entity_id) {
        Some(owner) if owner.as_str() < file_id => false,
        _ => {
            owners.insert(entity_id.to_string(), file_id.to_string());
            true
        }
    }
}

fn merge_artist(
    artists: &mut BTreeMap<String, ArtistMetadata>,
    incoming: &ArtistMetadata,
    owner: bool,
) {
    let Some(artist) = artists.get_mut(&incoming.id) else {
        artists.insert(incoming.id.clone(), incoming.clone());
        return;
    };
    artist.album_ids.extend(incoming.album_ids.iter().cloned());
    artist.track_ids.extend(incoming.track_ids.iter().cloned());
    if owner {
        artist.name = incoming.name.clone();
    }
}

fn mark_changed<T: PartialEq>(
    before: &BTreeMap<String, T>,
    after: &BTreeMap<String, T>,
    dirty: &mut BTreeSet<String>,
) {
    for (id, value) in after {
        if before.get(id) != Some(value) {
            dirty.insert(id.clone());
        }
    }
}

fn pick<T: CacheEntity>(entities: &BTreeMap<String, T>, ids: BTreeSet<String>) -> Vec<T> {
    ids.iter()
        .filter_map(|id| entities.get(id))
        .cloned()
        .collect()
}
