//! Stable identifiers for aggregate entities
//!
//! Tracks and playlists take the id of the file they came from. Albums and
//! artists have no file of their own, so their ids are derived from the
//! normalized names that group them. The same tags always produce the same
//! id, across scans and across processes.

use crate::models::normalize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const DIGEST_HEX_LEN: usize = 32;

/// Which artist namespace an artist belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtistRole {
    AlbumArtist,
    TrackArtist,
}

impl ArtistRole {
    fn prefix(self) -> &'static str {
        match self {
            ArtistRole::AlbumArtist => "album-artist",
            ArtistRole::TrackArtist => "track-artist",
        }
    }
}

impl fmt::Display for ArtistRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let hex: String = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    hex[..DIGEST_HEX_LEN].to_string()
}

/// Id of the album that holds tracks with no album tag.
pub fn unknown_album_id() -> String {
    format!("album:{}", digest(&["", ""]))
}

/// Id for the album called `title` by `album_artist`.
///
/// A blank title maps to [`unknown_album_id`] whatever the artist.
pub fn album_id(title: &str, album_artist: Option<&str>) -> String {
    let title = normalize(title);
    if title.is_empty() {
        return unknown_album_id();
    }
    let artist = album_artist.map(normalize).unwrap_or_default();
    format!("album:{}", digest(&[&title, &artist]))
}

/// Id for the artist called `name` in `role`'s namespace.
pub fn artist_id(role: ArtistRole, name: &str) -> String {
    format!("{}:{}", role.prefix(), digest(&[&normalize(name)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_id_ignores_case_and_spacing() {
        assert_eq!(
            album_id("Album  X", Some("Band")),
            album_id(" album x ", Some("BAND"))
        );
        assert_ne!(album_id("Album X", Some("Band")), album_id("Album X", None));
        assert_ne!(album_id("Album X", None), album_id("Album Y", None));
    }

    #[test]
    fn test_blank_album_is_unknown() {
        assert_eq!(album_id("   ", Some("Band")), unknown_album_id());
        assert!(unknown_album_id().starts_with("album:"));
    }

    #[test]
    fn test_artist_namespaces_are_separate() {
        let album_artist = artist_id(ArtistRole::AlbumArtist, "Band");
        let track_artist = artist_id(ArtistRole::TrackArtist, "Band");
        assert_ne!(album_artist, track_artist);
        assert_eq!(album_artist, artist_id(ArtistRole::AlbumArtist, "band"));
        assert!(track_artist.starts_with("track-artist:"));
    }

    #[test]
    fn test_title_and_artist_do_not_run_together() {
        assert_ne!(album_id("ab", Some("c")), album_id("a", Some("bc")));
    }
}
