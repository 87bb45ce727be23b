//! Local disk storage using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{ModifiableFolder, ReadStream, StorageFile, StorageFolder},
};
use bytes::Bytes;
use core_async::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const TEMP_SUFFIX: &str = ".tmp";

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| display_path(path))
}

/// A directory on the local disk.
///
/// The folder path doubles as its identifier. Child entries are listed in
/// name order so repeated traversals are deterministic. Symbolic links are
/// not followed.
#[derive(Debug, Clone)]
pub struct LocalFolder {
    path: PathBuf,
    path_str: String,
    name: String,
}

impl LocalFolder {
    fn from_path(path: PathBuf) -> Self {
        Self {
            path_str: display_path(&path),
            name: file_name(&path),
            path,
        }
    }

    /// Open an existing directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).await.map_err(Self::map_io_error)?;
        if !metadata.is_dir() {
            return Err(BridgeError::OperationFailed(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        Ok(Self::from_path(path))
    }

    /// Open a directory, creating it and its parents if needed.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Ensured directory");
        Ok(Self::from_path(path))
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    async fn sorted_entries(&self) -> Result<Vec<fs::DirEntry>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&self.path)
            .await
            .map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir.next_entry().await.map_err(Self::map_io_error)? {
            entries.push(entry);
        }
        entries.sort_by_key(|entry| entry.file_name());
        Ok(entries)
    }

    fn artifact_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(BridgeError::OperationFailed(format!(
                "invalid artifact name: {name:?}"
            )));
        }
        Ok(self.path.join(name))
    }
}

#[async_trait]
impl StorageFolder for LocalFolder {
    fn id(&self) -> &str {
        &self.path_str
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path_str
    }

    async fn list_folders(&self) -> Result<Vec<Arc<dyn StorageFolder>>> {
        let mut folders: Vec<Arc<dyn StorageFolder>> = Vec::new();
        for entry in self.sorted_entries().await? {
            let file_type = entry.file_type().await.map_err(Self::map_io_error)?;
            if file_type.is_dir() {
                folders.push(Arc::new(LocalFolder::from_path(entry.path())));
            }
        }
        debug!(path = %self.path_str, count = folders.len(), "Listed folders");
        Ok(folders)
    }

    async fn list_files(&self) -> Result<Vec<Arc<dyn StorageFile>>> {
        let mut files: Vec<Arc<dyn StorageFile>> = Vec::new();
        for entry in self.sorted_entries().await? {
            let file_type = entry.file_type().await.map_err(Self::map_io_error)?;
            if file_type.is_file() {
                files.push(Arc::new(LocalFile::from_path(entry.path())));
            }
        }
        debug!(path = %self.path_str, count = files.len(), "Listed files");
        Ok(files)
    }
}

#[async_trait]
impl ModifiableFolder for LocalFolder {
    fn location(&self) -> &str {
        &self.path_str
    }

    async fn read_file(&self, name: &str) -> Result<Option<Bytes>> {
        let path = self.artifact_path(name)?;
        match fs::read(&path).await {
            Ok(data) => {
                debug!(path = ?path, size = data.len(), "Read artifact");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Result<()> {
        let path = self.artifact_path(name)?;
        let temp = self.artifact_path(&format!("{name}{TEMP_SUFFIX}"))?;

        fs::write(&temp, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        fs::rename(&temp, &path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Replaced artifact");
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.artifact_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "Deleted artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }
}

/// A regular file on the local disk, identified by its path.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    path_str: String,
    name: String,
}

impl LocalFile {
    fn from_path(path: PathBuf) -> Self {
        Self {
            path_str: display_path(&path),
            name: file_name(&path),
            path,
        }
    }

    /// Open an existing file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).await.map_err(BridgeError::Io)?;
        if !metadata.is_file() {
            return Err(BridgeError::NotFound(path.display().to_string()));
        }
        Ok(Self::from_path(path))
    }
}

#[async_trait]
impl StorageFile for LocalFile {
    fn id(&self) -> &str {
        &self.path_str
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path_str
    }

    async fn open_read(&self) -> Result<ReadStream> {
        let file = fs::File::open(&self.path).await.map_err(BridgeError::Io)?;
        debug!(path = ?self.path, "Opened file for reading");
        Ok(Box::new(file))
    }

    async fn read_all(&self) -> Result<Bytes> {
        let data = fs::read(&self.path).await.map_err(BridgeError::Io)?;
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = LocalFolder::open(dir.path().join("missing")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lists_sorted_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"b").unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("z-sub")).unwrap();
        std::fs::create_dir(dir.path().join("m-sub")).unwrap();

        let folder = LocalFolder::open(dir.path()).await.unwrap();
        let files = folder.list_files().await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["a.mp3", "b.mp3"]);

        let folders = folder.list_folders().await.unwrap();
        let names: Vec<_> = folders.iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["m-sub", "z-sub"]);
    }

    #[tokio::test]
    async fn test_file_id_is_stable_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song.flac"), b"data").unwrap();

        let folder = LocalFolder::open(dir.path()).await.unwrap();
        let first = folder.list_files().await.unwrap();
        let second = folder.list_files().await.unwrap();
        assert_eq!(first[0].id(), second[0].id());
        assert!(first[0].path().ends_with("song.flac"));
        assert_eq!(first[0].read_all().await.unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn test_artifact_write_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let folder = LocalFolder::create(dir.path().join("cache")).await.unwrap();

        assert!(folder.read_file("TrackData.bin").await.unwrap().is_none());

        folder
            .write_file("TrackData.bin", Bytes::from_static(b"first-version"))
            .await
            .unwrap();
        folder
            .write_file("TrackData.bin", Bytes::from_static(b"v2"))
            .await
            .unwrap();

        let data = folder.read_file("TrackData.bin").await.unwrap().unwrap();
        assert_eq!(data, Bytes::from_static(b"v2"));
        assert!(!dir.path().join("cache").join("TrackData.bin.tmp").exists());
    }

    #[tokio::test]
    async fn test_artifact_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let folder = LocalFolder::create(dir.path()).await.unwrap();

        folder
            .write_file("ImageData.bin", Bytes::from_static(b"x"))
            .await
            .unwrap();
        folder.delete_file("ImageData.bin").await.unwrap();
        folder.delete_file("ImageData.bin").await.unwrap();
        assert!(folder.read_file("ImageData.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_artifact_name_cannot_escape_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = LocalFolder::create(dir.path()).await.unwrap();
        let result = folder
            .write_file("../escape.bin", Bytes::from_static(b"x"))
            .await;
        assert!(result.is_err());
    }
}
