//! File classification by extension

use bridge_traits::storage::StorageFile;

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "m4a", "mp4", "aac", "ogg", "opus", "wav", "aiff", "aif", "wma", "ape", "wv",
    "mpc",
];

pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8", "pls"];

/// What a candidate file is scanned as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Audio,
    Playlist,
}

/// Classify a file by its (case-insensitive) extension.
///
/// Files that are neither audio nor playlists return `None` and are never
/// scanned.
pub fn classify(file: &dyn StorageFile) -> Option<FileKind> {
    let extension = file.extension()?;
    if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
        Some(FileKind::Audio)
    } else if PLAYLIST_EXTENSIONS.contains(&extension.as_str()) {
        Some(FileKind::Playlist)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::MemoryFolder;

    #[test]
    fn test_classify() {
        let root = MemoryFolder::new("/m");
        let cases = [
            ("a.MP3", Some(FileKind::Audio)),
            ("b.flac", Some(FileKind::Audio)),
            ("c.m3u8", Some(FileKind::Playlist)),
            ("d.PLS", Some(FileKind::Playlist)),
            ("cover.jpg", None),
            ("README", None),
            (".mp3", None),
        ];
        for (name, expected) in cases {
            let file = root.add_file(name, "");
            assert_eq!(classify(file.as_ref()), expected, "{name}");
        }
    }
}
