//! Playlist file parsing and resolution
//!
//! Supports extended and plain M3U (`.m3u`, `.m3u8`) and PLS. Entries are
//! resolved against the known files of a finished traversal; entries that do
//! not resolve are dropped.

use crate::error::{MetadataError, Result};
use crate::folder_scanner::{normalize_path, KnownFiles};
use crate::formats::{classify, FileKind};
use bridge_traits::storage::StorageFile;
use core_async::sync::CancellationToken;
use core_library::models::PlaylistMetadata;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// A playlist file as written, before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPlaylist {
    pub title: Option<String>,
    pub entries: Vec<String>,
}

fn decode_text(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    text.trim_start_matches('\u{feff}').to_string()
}

/// Parse M3U text. `#EXTINF` lines are informational and skipped.
pub fn parse_m3u(text: &str) -> ParsedPlaylist {
    let mut playlist = ParsedPlaylist::default();
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(title) = line.strip_prefix("#PLAYLIST:") {
            let title = title.trim();
            if !title.is_empty() {
                playlist.title = Some(title.to_string());
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        playlist.entries.push(line.to_string());
    }
    playlist
}

/// Parse PLS text. Entries are ordered by their `FileN` number.
///
/// Only `X-Playlist-Title` names the playlist; `TitleN` keys describe
/// entries and are ignored.
pub fn parse_pls(text: &str) -> ParsedPlaylist {
    let mut files: BTreeMap<u32, String> = BTreeMap::new();
    let mut title = None;
    for line in text.lines().map(str::trim) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if let Some(n) = key.strip_prefix("file") {
            if let Ok(n) = n.parse() {
                files.insert(n, value.to_string());
            }
        } else if key == "x-playlist-title" {
            title = Some(value.to_string());
        }
    }
    ParsedPlaylist {
        title,
        entries: files.into_values().collect(),
    }
}

/// Turn a playlist entry into a path comparable with known file paths.
///
/// `file://` URLs are percent-decoded. Relative entries are taken relative
/// to the folder holding the playlist. Remote URLs resolve to nothing.
pub fn entry_path(entry: &str, playlist_path: &str) -> Option<String> {
    let entry = entry.trim();
    let entry = if let Some(rest) = entry.strip_prefix("file://") {
        let decoded = urlencoding::decode(rest).ok()?.into_owned();
        // file:///C:/x -> C:/x
        match decoded.strip_prefix('/') {
            Some(rest) if rest.get(1..2) == Some(":") => rest.to_string(),
            _ => decoded,
        }
    } else if entry.contains("://") {
        return None;
    } else {
        entry.to_string()
    };

    let unified = entry.replace('\\', "/");
    let is_absolute = unified.starts_with('/') || unified.get(1..2) == Some(":");
    if is_absolute {
        return Some(normalize_path(&unified));
    }

    let playlist_path = playlist_path.replace('\\', "/");
    let folder = playlist_path
        .rsplit_once('/')
        .map(|(folder, _)| folder)
        .unwrap_or("");
    Some(normalize_path(&format!("{folder}/{unified}")))
}

/// Playlist scanner
#[derive(Debug, Clone, Default)]
pub struct PlaylistMetadataScanner;

impl PlaylistMetadataScanner {
    pub fn new() -> Self {
        Self
    }

    /// Parse `file` and resolve its entries against `known`.
    ///
    /// Call only after discovery has finished, so entries pointing at files
    /// later in traversal order resolve. Entries resolving to non-audio
    /// files are dropped.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if `file` is not a playlist.
    #[instrument(skip(self, file, known, cancel), fields(file_id = %file.id()))]
    pub async fn scan(
        &self,
        file: &dyn StorageFile,
        known: &KnownFiles,
        cancel: &CancellationToken,
    ) -> Result<Option<PlaylistMetadata>> {
        if classify(file) != Some(FileKind::Playlist) {
            return Ok(None);
        }

        let data = core_async::select! {
            _ = cancel.cancelled() => return Err(MetadataError::Cancelled),
            data = file.read_all() => data?,
        };
        let text = decode_text(&data);
        let parsed = match file.extension().as_deref() {
            Some("pls") => parse_pls(&text),
            _ => parse_m3u(&text),
        };

        let mut track_ids = Vec::with_capacity(parsed.entries.len());
        for entry in &parsed.entries {
            let resolved = entry_path(entry, file.path())
                .and_then(|path| known.resolve_path(&path))
                .filter(|target| classify(target.as_ref()) == Some(FileKind::Audio));
            match resolved {
                Some(target) => track_ids.push(target.id().to_string()),
                None => debug!(entry = %entry, "Dropping unresolved playlist entry"),
            }
        }

        let title = parsed.title.or_else(|| {
            let name = file.name();
            let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
            (!stem.is_empty()).then(|| stem.to_string())
        });

        debug!(
            entries = parsed.entries.len(),
            resolved = track_ids.len(),
            "Resolved playlist"
        );
        Ok(Some(PlaylistMetadata {
            id: file.id().to_string(),
            title,
            track_ids,
            path: file.path().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder_scanner::FolderScanner;
    use bridge_desktop::MemoryFolder;
    use futures::StreamExt;
    use std::sync::Arc;

    #[test]
    fn test_parse_m3u() {
        let text = "#EXTM3U\n#PLAYLIST:Road Trip\n#EXTINF:123,Band - A\nsong1.mp3\n\n  ../other/b.flac \n";
        let parsed = parse_m3u(text);
        assert_eq!(parsed.title.as_deref(), Some("Road Trip"));
        assert_eq!(parsed.entries, vec!["song1.mp3", "../other/b.flac"]);
    }

    #[test]
    fn test_parse_pls_orders_by_number() {
        let text = "[playlist]\nFile2=/m/b.mp3\nTitle2=B\nFile1=/m/a.mp3\nNumberOfEntries=2\nVersion=2\n";
        let parsed = parse_pls(text);
        assert_eq!(parsed.entries, vec!["/m/a.mp3", "/m/b.mp3"]);
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_parse_pls_title_comes_from_playlist_key_only() {
        let text = "[playlist]\nTitle=Entry\nTitle1=A\nFile1=a.mp3\nX-Playlist-Title=Road Trip\n";
        assert_eq!(parse_pls(text).title.as_deref(), Some("Road Trip"));

        let untitled = "[playlist]\nTitle=Entry\nFile1=a.mp3\n";
        assert_eq!(parse_pls(untitled).title, None);
    }

    #[test]
    fn test_entry_path() {
        assert_eq!(
            entry_path("song.mp3", "/m/lists/mix.m3u").as_deref(),
            Some("/m/lists/song.mp3")
        );
        assert_eq!(
            entry_path("..\\a\\b.mp3", "/m/lists/mix.m3u").as_deref(),
            Some("/m/a/b.mp3")
        );
        assert_eq!(
            entry_path("file:///m/My%20Song.mp3", "/x/mix.m3u").as_deref(),
            Some("/m/My Song.mp3")
        );
        assert_eq!(
            entry_path("file:///C:/Music/a.mp3", "/x/mix.m3u").as_deref(),
            Some("C:/Music/a.mp3")
        );
        assert_eq!(entry_path("http://radio/stream", "/x/mix.m3u"), None);
    }

    #[tokio::test]
    async fn test_scan_resolves_against_known_files() {
        let root = MemoryFolder::new("/m");
        root.add_file(
            "mix.m3u8",
            "#EXTM3U\nz/later.mp3\nSONG1.MP3\nmissing.mp3\ncover.jpg\n/m/song1.mp3\n",
        );
        root.add_file("song1.mp3", "");
        root.add_file("cover.jpg", "");
        root.add_folder("z").add_file("later.mp3", "");

        let folders = FolderScanner::new();
        let cancel = CancellationToken::new();
        let _: Vec<_> = folders
            .scan(root.clone(), cancel.clone())
            .collect()
            .await;
        let known: &Arc<KnownFiles> = folders.known_files();

        let file = root.file("mix.m3u8").unwrap();
        let playlist = PlaylistMetadataScanner::new()
            .scan(file.as_ref(), known, &cancel)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(playlist.id, "/m/mix.m3u8");
        assert_eq!(playlist.title.as_deref(), Some("mix"));
        assert_eq!(
            playlist.track_ids,
            vec!["/m/z/later.mp3", "/m/song1.mp3", "/m/song1.mp3"]
        );
    }

    #[tokio::test]
    async fn test_audio_file_is_not_a_playlist() {
        let root = MemoryFolder::new("/m");
        let file = root.add_file("song.mp3", "");
        let result = PlaylistMetadataScanner::new()
            .scan(file.as_ref(), &KnownFiles::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
