//! Audio Metadata Scanning
//!
//! Turns one audio file into a [`FileMetadata`] bundle. Two sources are
//! consulted, selected by [`ScanTypes`]:
//!
//! - `FILE_PROPERTIES`: music properties supplied by the storage backend.
//!   This costs no file read and is preferred whenever it yields anything.
//! - `TAGLIB`: a deep parse of the file's tags and audio properties with the
//!   `lofty` crate. This is the only source of embedded pictures.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::audio_scanner::AudioMetadataScanner;
//! use core_runtime::config::ScanTypes;
//!
//! let scanner = AudioMetadataScanner::new();
//! if let Some(meta) = scanner.scan(file.as_ref(), ScanTypes::ALL, &cancel).await? {
//!     println!("Album: {:?}", meta.album.and_then(|a| a.title));
//! }
//! ```

use crate::artwork::{image_dimensions, image_id, sniff_mime_type};
use crate::error::{MetadataError, Result};
use crate::formats::{classify, FileKind};
use bridge_traits::storage::{MusicProperties, StorageFile};
use bytes::Bytes;
use core_async::sync::CancellationToken;
use core_library::ids::{album_id, artist_id, ArtistRole};
use core_library::models::{
    AlbumMetadata, ArtistMetadata, FileMetadata, ImageMetadata, TrackMetadata,
};
use core_runtime::config::ScanTypes;
use lofty::config::ParseOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::MimeType;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::collections::BTreeSet;
use std::io::Cursor;
use tracing::{debug, instrument};

/// A picture embedded in an audio file
#[derive(Debug, Clone)]
pub struct ExtractedPicture {
    pub data: Bytes,
    pub mime_type: Option<String>,
    /// Picture role such as `CoverFront`
    pub picture_type: String,
}

/// Raw metadata gathered from either source, before entities are built.
#[derive(Debug, Clone, Default)]
pub struct ExtractedTags {
    pub title: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,

    // Audio properties
    pub duration_ms: Option<u64>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,

    pub pictures: Vec<ExtractedPicture>,
}

impl From<MusicProperties> for ExtractedTags {
    fn from(props: MusicProperties) -> Self {
        Self {
            title: props.title.map(|s| normalize_text(&s)).filter(|s| !s.is_empty()),
            album: props.album.map(|s| normalize_text(&s)).filter(|s| !s.is_empty()),
            album_artist: props
                .album_artist
                .map(|s| normalize_text(&s))
                .filter(|s| !s.is_empty()),
            artists: split_names(props.artists.iter().map(String::as_str)),
            genres: split_names(props.genres.iter().map(String::as_str)),
            year: props.year,
            track_number: props.track_number,
            disc_number: props.disc_number,
            duration_ms: props.duration_ms,
            bitrate_kbps: props.bitrate_kbps,
            ..Default::default()
        }
    }
}

/// Normalize text metadata
///
/// - Trims leading/trailing whitespace
/// - Normalizes consecutive whitespace to single space
/// - Removes null bytes and control characters
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Split multi-valued name fields (`;` or NUL separated) and drop duplicates.
fn split_names<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for value in values {
        for part in value.split([';', '\0']) {
            let name = normalize_text(part);
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn mime_type_to_string(mime_type: &MimeType) -> Option<String> {
    match mime_type {
        MimeType::Png => Some("image/png".to_string()),
        MimeType::Jpeg => Some("image/jpeg".to_string()),
        MimeType::Tiff => Some("image/tiff".to_string()),
        MimeType::Bmp => Some("image/bmp".to_string()),
        MimeType::Gif => Some("image/gif".to_string()),
        _ => None,
    }
}

/// Pictures of `tag` in tag order, skipping empty ones.
///
/// Image ids are positions in this list, so minting and re-reading must both
/// go through here.
fn collect_pictures(tag: &Tag) -> Vec<ExtractedPicture> {
    tag.pictures()
        .iter()
        .filter(|pic| !pic.data().is_empty())
        .map(|pic| ExtractedPicture {
            data: Bytes::copy_from_slice(pic.data()),
            mime_type: pic
                .mime_type()
                .and_then(mime_type_to_string)
                .or_else(|| sniff_mime_type(pic.data())),
            picture_type: format!("{:?}", pic.pic_type()),
        })
        .collect()
}

fn file_stem(path: &str) -> Option<String> {
    let name = path.rsplit(['/', '\\']).next()?;
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };
    let stem = normalize_text(stem);
    (!stem.is_empty()).then_some(stem)
}

/// Audio metadata scanner
///
/// Stateless apart from the `lofty` parse options, so one instance can be
/// shared by every concurrent scan.
#[derive(Debug, Clone)]
pub struct AudioMetadataScanner {
    parse_options: ParseOptions,
}

impl AudioMetadataScanner {
    pub fn new() -> Self {
        Self {
            parse_options: ParseOptions::new(),
        }
    }

    /// Create a scanner with custom parse options
    pub fn with_options(parse_options: ParseOptions) -> Self {
        Self { parse_options }
    }

    /// Extract metadata from one file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(meta))` from the first source that produced anything
    /// - `Ok(None)` if `scan_types` is empty, the file is not audio, or no
    ///   enabled source produced data
    ///
    /// # Errors
    ///
    /// - `MetadataError::Cancelled` if `cancel` fired
    /// - `MetadataError::ExtractionFailed` if the deep parse could not read
    ///   the file
    #[instrument(skip(self, file, cancel), fields(file_id = %file.id()))]
    pub async fn scan(
        &self,
        file: &dyn StorageFile,
        scan_types: ScanTypes,
        cancel: &CancellationToken,
    ) -> Result<Option<FileMetadata>> {
        if scan_types.is_empty() || classify(file) != Some(FileKind::Audio) {
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(MetadataError::Cancelled);
        }

        if scan_types.contains(ScanTypes::FILE_PROPERTIES) {
            match file.music_properties().await {
                Ok(Some(props)) if !props.is_empty() => {
                    debug!(source = "file-properties", "Extracted metadata");
                    return Ok(Some(build_file_metadata(
                        file.id(),
                        file.path(),
                        ExtractedTags::from(props),
                    )));
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Backend music properties unavailable"),
            }
        }

        if scan_types.contains(ScanTypes::TAGLIB) {
            let tags = self.read_tags(file, cancel).await?;
            debug!(source = "taglib", pictures = tags.pictures.len(), "Extracted metadata");
            return Ok(Some(build_file_metadata(file.id(), file.path(), tags)));
        }

        Ok(None)
    }

    /// Read the `index`-th embedded picture of `file`.
    ///
    /// Returns `Ok(None)` if the file no longer has that many pictures.
    pub async fn read_picture(
        &self,
        file: &dyn StorageFile,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<ExtractedPicture>> {
        let tags = self.read_tags(file, cancel).await?;
        Ok(tags.pictures.into_iter().nth(index))
    }

    /// Read and parse the whole file with `lofty`.
    async fn read_tags(
        &self,
        file: &dyn StorageFile,
        cancel: &CancellationToken,
    ) -> Result<ExtractedTags> {
        let data = core_async::select! {
            _ = cancel.cancelled() => return Err(MetadataError::Cancelled),
            data = file.read_all() => data?,
        };

        let options = self.parse_options;
        let path = file.path().to_string();
        core_async::task::spawn_blocking(move || Self::parse(&data, options, &path))
            .await
            .map_err(|e| MetadataError::ExtractionFailed(format!("parser task failed: {e}")))?
    }

    fn parse(data: &[u8], options: ParseOptions, path: &str) -> Result<ExtractedTags> {
        let tagged_file = Probe::new(Cursor::new(data))
            .options(options)
            .guess_file_type()
            .map_err(|e| MetadataError::ExtractionFailed(format!("Failed to probe file: {e}")))?
            .read()
            .map_err(|e| MetadataError::ExtractionFailed(format!("Failed to parse file: {e}")))?;

        let properties = tagged_file.properties();
        let duration_ms = properties.duration().as_millis() as u64;
        let mut tags = ExtractedTags {
            duration_ms: (duration_ms > 0).then_some(duration_ms),
            bitrate_kbps: properties.audio_bitrate(),
            sample_rate: properties.sample_rate(),
            channels: properties.channels(),
            ..Default::default()
        };

        // Try the primary tag first, falling back to any tag present
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            debug!(path = %path, "No tags found");
            return Ok(tags);
        };

        tags.title = tag.title().map(|s| normalize_text(&s)).filter(|s| !s.is_empty());
        tags.album = tag.album().map(|s| normalize_text(&s)).filter(|s| !s.is_empty());
        tags.album_artist = tag
            .get_string(&ItemKey::AlbumArtist)
            .map(normalize_text)
            .filter(|s| !s.is_empty());

        let artist = tag.artist();
        tags.artists = split_names(
            artist
                .as_deref()
                .into_iter()
                .chain(tag.get_strings(&ItemKey::TrackArtist)),
        );
        let genre = tag.genre();
        tags.genres = split_names(
            genre
                .as_deref()
                .into_iter()
                .chain(tag.get_strings(&ItemKey::Genre)),
        );
        tags.year = tag.year();
        tags.track_number = tag.track();
        tags.disc_number = tag.disk();
        tags.pictures = collect_pictures(tag);
        Ok(tags)
    }
}

impl Default for AudioMetadataScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the entities for one file from its extracted tags.
///
/// The album artist is the album-artist tag, or the first track artist when
/// that tag is absent. A file without an album tag belongs to the unknown
/// album. The file name stands in for a missing title.
pub fn build_file_metadata(file_id: &str, path: &str, tags: ExtractedTags) -> FileMetadata {
    let album_artist_names = match tags.album_artist.as_deref() {
        Some(name) => split_names([name]),
        None => tags.artists.first().cloned().into_iter().collect(),
    };
    let album_id = album_id(
        tags.album.as_deref().unwrap_or_default(),
        album_artist_names.first().map(String::as_str),
    );

    let images: Vec<ImageMetadata> = tags
        .pictures
        .iter()
        .enumerate()
        .map(|(index, picture)| {
            let dimensions = image_dimensions(&picture.data);
            ImageMetadata {
                id: image_id(file_id, index),
                file_id: file_id.to_string(),
                mime_type: picture.mime_type.clone(),
                picture_type: Some(picture.picture_type.clone()),
                width: dimensions.map(|(w, _)| w),
                height: dimensions.map(|(_, h)| h),
                size_bytes: picture.data.len() as u64,
            }
        })
        .collect();
    let image_ids: BTreeSet<String> = images.iter().map(|i| i.id.clone()).collect();

    let artist = |role: ArtistRole, name: &String| ArtistMetadata {
        id: artist_id(role, name),
        name: name.clone(),
        album_ids: BTreeSet::from([album_id.clone()]),
        track_ids: BTreeSet::from([file_id.to_string()]),
    };
    let album_artists: Vec<ArtistMetadata> = album_artist_names
        .iter()
        .map(|name| artist(ArtistRole::AlbumArtist, name))
        .collect();
    let track_artists: Vec<ArtistMetadata> = tags
        .artists
        .iter()
        .map(|name| artist(ArtistRole::TrackArtist, name))
        .collect();

    let album = AlbumMetadata {
        id: album_id.clone(),
        title: tags.album.clone(),
        artist_ids: album_artists.iter().map(|a| a.id.clone()).collect(),
        track_ids: BTreeSet::from([file_id.to_string()]),
        image_ids: image_ids.clone(),
        genres: tags.genres.iter().cloned().collect(),
        year: tags.year,
    };

    let track = TrackMetadata {
        id: file_id.to_string(),
        album_id,
        artist_ids: track_artists.iter().map(|a| a.id.clone()).collect(),
        image_ids,
        title: tags.title.or_else(|| file_stem(path)),
        track_number: tags.track_number,
        disc_number: tags.disc_number,
        genres: tags.genres,
        year: tags.year,
        duration_ms: tags.duration_ms,
        bitrate_kbps: tags.bitrate_kbps,
        sample_rate: tags.sample_rate,
        channels: tags.channels,
        path: path.to_string(),
    };

    FileMetadata {
        file_id: file_id.to_string(),
        track: Some(track),
        album: Some(album),
        album_artists,
        track_artists,
        images,
        playlist: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::MemoryFolder;
    use core_library::ids::unknown_album_id;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello   World  "), "Hello World");
        assert_eq!(
            normalize_text("Title\nWith\tWhitespace"),
            "Title With Whitespace"
        );
    }

    #[test]
    fn test_split_names() {
        assert_eq!(
            split_names(["A; B", "B", "C\0D", " "]),
            vec!["A", "B", "C", "D"]
        );
    }

    #[test]
    fn test_mime_type_to_string() {
        assert_eq!(mime_type_to_string(&MimeType::Png).as_deref(), Some("image/png"));
        assert_eq!(mime_type_to_string(&MimeType::Jpeg).as_deref(), Some("image/jpeg"));
        assert_eq!(mime_type_to_string(&MimeType::Unknown("x".into())), None);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("/m/01 Intro.mp3").as_deref(), Some("01 Intro"));
        assert_eq!(file_stem("C:\\m\\song.flac").as_deref(), Some("song"));
        assert_eq!(file_stem("/m/").as_deref(), None);
    }

    #[test]
    fn test_build_links_entities() {
        let tags = ExtractedTags {
            title: Some("A".to_string()),
            album: Some("X".to_string()),
            artists: vec!["Singer".to_string(), "Guest".to_string()],
            pictures: vec![ExtractedPicture {
                data: Bytes::from_static(b"\x89PNG"),
                mime_type: Some("image/png".to_string()),
                picture_type: "CoverFront".to_string(),
            }],
            ..Default::default()
        };
        let meta = build_file_metadata("/m/song1.mp3", "/m/song1.mp3", tags);
        meta.validate().unwrap();

        let track = meta.track.as_ref().unwrap();
        let album = meta.album.as_ref().unwrap();
        assert_eq!(track.album_id, album.id);
        assert_eq!(album.track_ids, BTreeSet::from(["/m/song1.mp3".to_string()]));
        assert_eq!(meta.track_artists.len(), 2);
        assert_eq!(track.artist_ids.len(), 2);

        // The first track artist stands in for the album artist.
        assert_eq!(meta.album_artists.len(), 1);
        assert_eq!(meta.album_artists[0].name, "Singer");
        assert_ne!(meta.album_artists[0].id, meta.track_artists[0].id);
        assert_eq!(album.artist_ids.len(), 1);

        assert_eq!(meta.images[0].id, "/m/song1.mp3::image::0");
        assert!(track.image_ids.contains("/m/song1.mp3::image::0"));
        assert!(album.image_ids.contains("/m/song1.mp3::image::0"));
    }

    #[test]
    fn test_build_without_album_uses_unknown_album() {
        let meta = build_file_metadata("/m/raw.wav", "/m/raw.wav", ExtractedTags::default());
        let track = meta.track.unwrap();
        assert_eq!(track.album_id, unknown_album_id());
        assert_eq!(track.title.as_deref(), Some("raw"));
        assert!(meta.album.unwrap().is_unknown());
        assert!(meta.track_artists.is_empty());
    }

    #[tokio::test]
    async fn test_file_properties_win() {
        let root = MemoryFolder::new("/m");
        let file = root.add_audio_file(
            "song.mp3",
            MusicProperties {
                title: Some("From Index".to_string()),
                album: Some("X".to_string()),
                artists: vec!["Band".to_string()],
                ..Default::default()
            },
        );
        let scanner = AudioMetadataScanner::new();
        let meta = scanner
            .scan(file.as_ref(), ScanTypes::ALL, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.track.unwrap().title.as_deref(), Some("From Index"));
        assert_eq!(file.read_count(), 0);
    }

    #[tokio::test]
    async fn test_scan_types_none_skips_everything() {
        let root = MemoryFolder::new("/m");
        let file = root.add_audio_file(
            "song.mp3",
            MusicProperties {
                title: Some("A".to_string()),
                ..Default::default()
            },
        );
        let result = AudioMetadataScanner::new()
            .scan(file.as_ref(), ScanTypes::NONE, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_file_properties_only_without_index_yields_nothing() {
        let root = MemoryFolder::new("/m");
        let file = root.add_file("song.mp3", "garbage");
        let result = AudioMetadataScanner::new()
            .scan(
                file.as_ref(),
                ScanTypes::FILE_PROPERTIES,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(file.read_count(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_file_is_an_extraction_error() {
        let root = MemoryFolder::new("/m");
        let file = root.add_file("song.mp3", "This is not a valid audio file");
        let result = AudioMetadataScanner::new()
            .scan(file.as_ref(), ScanTypes::TAGLIB, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(MetadataError::ExtractionFailed(_))));
    }

    #[tokio::test]
    async fn test_non_audio_file_is_ignored() {
        let root = MemoryFolder::new("/m");
        let file = root.add_file("mix.m3u", "#EXTM3U");
        let result = AudioMetadataScanner::new()
            .scan(file.as_ref(), ScanTypes::ALL, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_scan() {
        let root = MemoryFolder::new("/m");
        let file = root.add_file("song.mp3", "data");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = AudioMetadataScanner::new()
            .scan(file.as_ref(), ScanTypes::TAGLIB, &cancel)
            .await;
        assert!(matches!(result, Err(MetadataError::Cancelled)));
    }
}
