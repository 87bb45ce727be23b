//! Storage Abstractions
//!
//! Platform-agnostic traits for the folder trees the scanner walks and for the
//! writable folder that holds cache artifacts.
//!
//! - [`StorageFolder`] enumerates child folders and files.
//! - [`StorageFile`] exposes a stable identifier, a path and a byte stream.
//! - [`ModifiableFolder`] stores named binary artifacts with whole-file replace.

use async_trait::async_trait;
use bytes::Bytes;
use core_async::io::{AsyncRead, AsyncReadExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Boxed byte stream returned by [`StorageFile::open_read`].
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Music properties supplied directly by the storage backend.
///
/// Backends that index audio files (system media indexes, cloud drives with an
/// audio facet) can answer without the file being downloaded or parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicProperties {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artists: Vec<String>,
    pub album_artist: Option<String>,
    pub genres: Vec<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<u32>,
    pub duration_ms: Option<u64>,
    pub bitrate_kbps: Option<u32>,
}

impl MusicProperties {
    /// Properties with no usable field are treated as "not supplied".
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.album.is_none()
            && self.artists.is_empty()
            && self.album_artist.is_none()
            && self.duration_ms.is_none()
    }
}

/// A file reachable through a storage backend.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::StorageFile;
///
/// async fn size_of(file: &dyn StorageFile) -> bridge_traits::error::Result<usize> {
///     Ok(file.read_all().await?.len())
/// }
/// ```
#[async_trait]
pub trait StorageFile: Send + Sync {
    /// Identifier that stays the same for the same file across scans.
    fn id(&self) -> &str;

    /// File name including extension.
    fn name(&self) -> &str;

    /// Full path of the file within its backend.
    fn path(&self) -> &str;

    /// Lower-cased extension of [`name`](Self::name), without the dot.
    fn extension(&self) -> Option<String> {
        let name = self.name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Music properties the backend can supply without parsing the file.
    ///
    /// Backends without such an index return `Ok(None)`.
    async fn music_properties(&self) -> Result<Option<MusicProperties>> {
        Ok(None)
    }

    /// Open the file for streaming reads.
    async fn open_read(&self) -> Result<ReadStream>;

    /// Read the entire file into memory.
    async fn read_all(&self) -> Result<Bytes> {
        let mut stream = self.open_read().await?;
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}

/// A folder that can be enumerated.
#[async_trait]
pub trait StorageFolder: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn path(&self) -> &str;

    /// Immediate child folders, in a stable order.
    async fn list_folders(&self) -> Result<Vec<Arc<dyn StorageFolder>>>;

    /// Immediate child files, in a stable order.
    async fn list_files(&self) -> Result<Vec<Arc<dyn StorageFile>>>;
}

/// A folder able to hold named binary artifacts.
///
/// Writes replace the whole artifact. A reader never observes a partially
/// written artifact: implementations write to a temporary sibling and swap it
/// in place once complete.
#[async_trait]
pub trait ModifiableFolder: Send + Sync {
    /// Location used in diagnostics.
    fn location(&self) -> &str;

    /// Read a named artifact, `Ok(None)` if it does not exist.
    async fn read_file(&self, name: &str) -> Result<Option<Bytes>>;

    /// Create or replace a named artifact.
    async fn write_file(&self, name: &str, data: Bytes) -> Result<()>;

    /// Delete a named artifact. No-op if absent.
    async fn delete_file(&self, name: &str) -> Result<()>;
}
