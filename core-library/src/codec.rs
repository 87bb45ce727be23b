//! Versioned binary cache artifacts
//!
//! An artifact is a bincode encoded header followed by the id-ordered entity
//! map. The header is decoded on its own first so a version bump can be
//! detected even when the entity layout changed underneath it.

use crate::error::{LibraryError, Result};
use crate::models::CacheEntity;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Four bytes at the start of every artifact.
pub const ARTIFACT_MAGIC: [u8; 4] = *b"MDCA";

/// Bumped whenever a cached entity changes shape.
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactHeader {
    magic: [u8; 4],
    version: u32,
    kind: String,
}

#[derive(Serialize)]
struct ArtifactRef<'a, T> {
    header: ArtifactHeader,
    entries: &'a BTreeMap<String, T>,
}

#[derive(Deserialize)]
struct ArtifactOwned<T> {
    #[allow(dead_code)]
    header: ArtifactHeader,
    entries: BTreeMap<String, T>,
}

/// Encode a repository's contents into artifact bytes.
pub fn encode<T: CacheEntity>(entries: &BTreeMap<String, T>) -> Result<Bytes> {
    let artifact = ArtifactRef {
        header: ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            version: ARTIFACT_VERSION,
            kind: T::KIND.to_string(),
        },
        entries,
    };
    bincode::serialize(&artifact)
        .map(Bytes::from)
        .map_err(|e| LibraryError::Serialization(e.to_string()))
}

/// Decode artifact bytes written by [`encode`].
///
/// # Errors
///
/// - `LibraryError::Corrupt` if the bytes are not an artifact for `T`
/// - `LibraryError::VersionMismatch` if it was written by another version
pub fn decode<T: CacheEntity>(artifact: &str, data: &[u8]) -> Result<BTreeMap<String, T>> {
    let corrupt = |message: String| LibraryError::Corrupt {
        artifact: artifact.to_string(),
        message,
    };

    let header: ArtifactHeader =
        bincode::deserialize(data).map_err(|e| corrupt(format!("unreadable header: {e}")))?;
    if header.magic != ARTIFACT_MAGIC {
        return Err(corrupt("missing artifact marker".to_string()));
    }
    if header.version != ARTIFACT_VERSION {
        return Err(LibraryError::VersionMismatch {
            artifact: artifact.to_string(),
            expected: ARTIFACT_VERSION,
            found: header.version,
        });
    }
    if header.kind != T::KIND {
        return Err(corrupt(format!(
            "holds {} entities, expected {}",
            header.kind,
            T::KIND
        )));
    }

    let decoded: ArtifactOwned<T> =
        bincode::deserialize(data).map_err(|e| corrupt(e.to_string()))?;

    if let Some((key, _)) = decoded.entries.iter().find(|(key, e)| e.id() != key.as_str()) {
        return Err(corrupt(format!("entry {key} is stored under the wrong id")));
    }
    Ok(decoded.entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlbumMetadata, TrackMetadata};

    fn albums() -> BTreeMap<String, AlbumMetadata> {
        let mut map = BTreeMap::new();
        for id in ["b", "a"] {
            map.insert(
                id.to_string(),
                AlbumMetadata {
                    id: id.to_string(),
                    title: Some(format!("Album {id}")),
                    ..Default::default()
                },
            );
        }
        map
    }

    #[test]
    fn test_decode_restores_entries() {
        let bytes = encode(&albums()).unwrap();
        let decoded: BTreeMap<String, AlbumMetadata> = decode("AlbumData.bin", &bytes).unwrap();
        assert_eq!(decoded, albums());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(encode(&albums()).unwrap(), encode(&albums()).unwrap());
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = decode::<AlbumMetadata>("AlbumData.bin", b"not an artifact").unwrap_err();
        assert!(err.is_unreadable_artifact());

        let bytes = encode(&albums()).unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        let err = decode::<AlbumMetadata>("AlbumData.bin", truncated).unwrap_err();
        assert!(matches!(err, LibraryError::Corrupt { .. }));
    }

    #[test]
    fn test_version_mismatch_detected() {
        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            version: ARTIFACT_VERSION + 1,
            kind: "album".to_string(),
        };
        let bytes = bincode::serialize(&header).unwrap();
        let err = decode::<AlbumMetadata>("AlbumData.bin", &bytes).unwrap_err();
        assert!(matches!(
            err,
            LibraryError::VersionMismatch { found, .. } if found == ARTIFACT_VERSION + 1
        ));
    }

    #[test]
    fn test_wrong_entity_kind_rejected() {
        let bytes = encode(&albums()).unwrap();
        let err = decode::<TrackMetadata>("TrackData.bin", &bytes).unwrap_err();
        assert!(matches!(err, LibraryError::Corrupt { .. }));
    }
}
