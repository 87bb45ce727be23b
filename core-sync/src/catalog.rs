//! The six repositories of one manager

use crate::batch::BatchDelta;
use crate::Result;
use bridge_traits::storage::ModifiableFolder;
use core_async::sync::CancellationToken;
use core_library::ids::ArtistRole;
use core_library::models::{AlbumMetadata, ArtistMetadata, FileMetadata};
use core_library::repositories::{
    AlbumRepository, ArtistRepository, ImageRepository, PlaylistRepository, TrackRepository,
};
use core_library::MetadataRepository;
use core_runtime::events::EventBus;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Album, album artist, track artist, track, playlist and image
/// repositories sharing one cache folder.
#[derive(Debug)]
pub struct Catalog {
    pub albums: AlbumRepository,
    pub album_artists: ArtistRepository,
    pub track_artists: ArtistRepository,
    pub tracks: TrackRepository,
    pub playlists: PlaylistRepository,
    pub images: ImageRepository,
}

impl Catalog {
    pub fn new(events: &EventBus) -> Self {
        Self {
            albums: AlbumRepository::albums().with_event_bus(events.clone()),
            album_artists: ArtistRepository::artists(ArtistRole::AlbumArtist)
                .with_event_bus(events.clone()),
            track_artists: ArtistRepository::artists(ArtistRole::TrackArtist)
                .with_event_bus(events.clone()),
            tracks: TrackRepository::tracks().with_event_bus(events.clone()),
            playlists: PlaylistRepository::playlists().with_event_bus(events.clone()),
            images: ImageRepository::images().with_event_bus(events.clone()),
        }
    }

    /// Bind every repository to `storage`, loading stored artifacts unless
    /// `skip_load` is set.
    pub async fn initialize(
        &self,
        storage: Arc<dyn ModifiableFolder>,
        skip_load: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if skip_load {
            self.albums.initialize_empty(storage.clone()).await?;
            self.album_artists.initialize_empty(storage.clone()).await?;
            self.track_artists.initialize_empty(storage.clone()).await?;
            self.tracks.initialize_empty(storage.clone()).await?;
            self.playlists.initialize_empty(storage.clone()).await?;
            self.images.initialize_empty(storage).await?;
        } else {
            self.albums.initialize(storage.clone(), cancel).await?;
            self.album_artists.initialize(storage.clone(), cancel).await?;
            self.track_artists.initialize(storage.clone(), cancel).await?;
            self.tracks.initialize(storage.clone(), cancel).await?;
            self.playlists.initialize(storage.clone(), cancel).await?;
            self.images.initialize(storage, cancel).await?;
        }
        Ok(())
    }

    /// Write `delta` through, referenced entities before the entities that
    /// reference them.
    pub async fn commit(&self, delta: BatchDelta) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }
        debug!(
            tracks = delta.tracks.len(),
            albums = delta.albums.len(),
            artists = delta.album_artists.len() + delta.track_artists.len(),
            images = delta.images.len(),
            playlists = delta.playlists.len(),
            "Committing batch delta"
        );
        self.images.add_or_update(delta.images).await?;
        self.album_artists.add_or_update(delta.album_artists).await?;
        self.track_artists.add_or_update(delta.track_artists).await?;
        self.albums.add_or_update(delta.albums).await?;
        self.tracks.add_or_update(delta.tracks).await?;
        self.playlists.add_or_update(delta.playlists).await?;
        Ok(())
    }

    /// Rebuild what a scan of `file_id` contributed, from the repositories.
    ///
    /// Shared entities are narrowed to this file's part: the album lists only
    /// this track and its genres, artists link only this track and album.
    /// Returns `None` if no track is cached for the file.
    pub async fn cached_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>> {
        let Some(track) = self.tracks.get_by_id(file_id).await? else {
            return Ok(None);
        };
        let only_this_track = || BTreeSet::from([file_id.to_string()]);

        let mut images = Vec::with_capacity(track.image_ids.len());
        for id in &track.image_ids {
            if let Some(image) = self.images.get_by_id(id).await? {
                images.push(image);
            }
        }

        let album = self
            .albums
            .get_by_id(&track.album_id)
            .await?
            .map(|album| AlbumMetadata {
                track_ids: only_this_track(),
                image_ids: album
                    .image_ids
                    .intersection(&track.image_ids)
                    .cloned()
                    .collect(),
                genres: track.genres.iter().cloned().collect(),
                year: track.year,
                ..album
            });

        let narrow = |artist: ArtistMetadata| ArtistMetadata {
            album_ids: BTreeSet::from([track.album_id.clone()]),
            track_ids: only_this_track(),
            ..artist
        };

        let mut album_artists = Vec::new();
        if let Some(album) = &album {
            for id in &album.artist_ids {
                if let Some(artist) = self.album_artists.get_by_id(id).await? {
                    album_artists.push(narrow(artist));
                }
            }
        }
        let mut track_artists = Vec::with_capacity(track.artist_ids.len());
        for id in &track.artist_ids {
            if let Some(artist) = self.track_artists.get_by_id(id).await? {
                track_artists.push(narrow(artist));
            }
        }

        Ok(Some(FileMetadata {
            file_id: file_id.to_string(),
            track: Some(track),
            album,
            album_artists,
            track_artists,
            images,
            playlist: None,
        }))
    }

    pub async fn flush(&self) -> Result<()> {
        self.albums.flush().await?;
        self.album_artists.flush().await?;
        self.track_artists.flush().await?;
        self.tracks.flush().await?;
        self.playlists.flush().await?;
        self.images.flush().await?;
        Ok(())
    }

    /// Flush and release every repository, continuing past failures.
    ///
    /// Returns the first error encountered.
    pub async fn dispose(&self) -> Result<()> {
        let results = [
            self.albums.dispose().await,
            self.album_artists.dispose().await,
            self.track_artists.dispose().await,
            self.tracks.dispose().await,
            self.playlists.dispose().await,
            self.images.dispose().await,
        ];
        for result in results {
            result?;
        }
        Ok(())
    }
}
