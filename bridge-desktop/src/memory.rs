//! In-memory storage tree

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{ModifiableFolder, MusicProperties, ReadStream, StorageFile, StorageFolder},
};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn last_segment(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

/// A folder whose children and artifacts live in process memory.
///
/// Paths are `/`-separated and double as identifiers. Children are kept in
/// insertion order.
#[derive(Debug)]
pub struct MemoryFolder {
    path: String,
    name: String,
    folders: RwLock<Vec<Arc<MemoryFolder>>>,
    files: RwLock<Vec<Arc<MemoryFile>>>,
    artifacts: RwLock<BTreeMap<String, Bytes>>,
    unreadable: AtomicBool,
}

impl MemoryFolder {
    pub fn new(path: impl Into<String>) -> Arc<Self> {
        let path = path.into();
        Arc::new(Self {
            name: last_segment(&path),
            path,
            folders: RwLock::new(Vec::new()),
            files: RwLock::new(Vec::new()),
            artifacts: RwLock::new(BTreeMap::new()),
            unreadable: AtomicBool::new(false),
        })
    }

    fn child_path(&self, name: &str) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), name)
    }

    /// Add (or return the existing) child folder called `name`.
    pub fn add_folder(&self, name: &str) -> Arc<MemoryFolder> {
        let mut folders = write_lock(&self.folders);
        if let Some(existing) = folders.iter().find(|f| f.name == name) {
            return existing.clone();
        }
        let folder = MemoryFolder::new(self.child_path(name));
        folders.push(folder.clone());
        folder
    }

    /// Add a file, replacing any existing file with the same name.
    pub fn add_file(&self, name: &str, data: impl Into<Bytes>) -> Arc<MemoryFile> {
        self.insert_file(MemoryFile::new(self.child_path(name), data.into(), None))
    }

    /// Add a file whose backend supplies music properties.
    pub fn add_audio_file(&self, name: &str, properties: MusicProperties) -> Arc<MemoryFile> {
        self.insert_file(MemoryFile::new(
            self.child_path(name),
            Bytes::new(),
            Some(properties),
        ))
    }

    fn insert_file(&self, file: MemoryFile) -> Arc<MemoryFile> {
        let file = Arc::new(file);
        let mut files = write_lock(&self.files);
        if let Some(slot) = files.iter_mut().find(|f| f.name == file.name) {
            *slot = file.clone();
        } else {
            files.push(file.clone());
        }
        file
    }

    /// Remove the file called `name`. Returns whether it existed.
    pub fn remove_file(&self, name: &str) -> bool {
        let mut files = write_lock(&self.files);
        let before = files.len();
        files.retain(|f| f.name != name);
        before != files.len()
    }

    pub fn file(&self, name: &str) -> Option<Arc<MemoryFile>> {
        read_lock(&self.files)
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }

    /// Make every listing of this folder fail, as an unreadable directory would.
    pub fn set_unreadable(&self, unreadable: bool) {
        self.unreadable.store(unreadable, Ordering::SeqCst);
    }

    /// Names of the artifacts currently stored in this folder.
    pub fn artifact_names(&self) -> Vec<String> {
        read_lock(&self.artifacts).keys().cloned().collect()
    }

    fn check_readable(&self) -> Result<()> {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed(format!(
                "folder {} is not readable",
                self.path
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageFolder for MemoryFolder {
    fn id(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    async fn list_folders(&self) -> Result<Vec<Arc<dyn StorageFolder>>> {
        self.check_readable()?;
        Ok(read_lock(&self.folders)
            .iter()
            .map(|f| f.clone() as Arc<dyn StorageFolder>)
            .collect())
    }

    async fn list_files(&self) -> Result<Vec<Arc<dyn StorageFile>>> {
        self.check_readable()?;
        Ok(read_lock(&self.files)
            .iter()
            .map(|f| f.clone() as Arc<dyn StorageFile>)
            .collect())
    }
}

#[async_trait]
impl ModifiableFolder for MemoryFolder {
    fn location(&self) -> &str {
        &self.path
    }

    async fn read_file(&self, name: &str) -> Result<Option<Bytes>> {
        Ok(read_lock(&self.artifacts).get(name).cloned())
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Result<()> {
        debug!(folder = %self.path, name, size = data.len(), "Replaced artifact");
        write_lock(&self.artifacts).insert(name.to_string(), data);
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        write_lock(&self.artifacts).remove(name);
        Ok(())
    }
}

/// A file held in memory, optionally carrying backend music properties.
#[derive(Debug)]
pub struct MemoryFile {
    path: String,
    name: String,
    data: RwLock<Bytes>,
    properties: RwLock<Option<MusicProperties>>,
    reads: AtomicUsize,
}

impl MemoryFile {
    fn new(path: String, data: Bytes, properties: Option<MusicProperties>) -> Self {
        Self {
            name: last_segment(&path),
            path,
            data: RwLock::new(data),
            properties: RwLock::new(properties),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn set_data(&self, data: impl Into<Bytes>) {
        *write_lock(&self.data) = data.into();
    }

    pub fn set_properties(&self, properties: Option<MusicProperties>) {
        *write_lock(&self.properties) = properties;
    }

    /// How many times the content has been opened.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageFile for MemoryFile {
    fn id(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    async fn music_properties(&self) -> Result<Option<MusicProperties>> {
        Ok(read_lock(&self.properties).clone())
    }

    async fn open_read(&self) -> Result<ReadStream> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let data = read_lock(&self.data).clone();
        Ok(Box::new(Cursor::new(data)))
    }

    async fn read_all(&self) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(read_lock(&self.data).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tree_listing() {
        let root = MemoryFolder::new("/music");
        root.add_file("a.mp3", "a");
        let sub = root.add_folder("live");
        sub.add_file("b.mp3", "b");

        let files = root.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), "/music/a.mp3");

        let folders = root.list_folders().await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name(), "live");
        let nested = folders[0].list_files().await.unwrap();
        assert_eq!(nested[0].id(), "/music/live/b.mp3");
    }

    #[tokio::test]
    async fn test_add_folder_is_idempotent() {
        let root = MemoryFolder::new("/music");
        let first = root.add_folder("x");
        let second = root.add_folder("x");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_remove_and_replace_file() {
        let root = MemoryFolder::new("/music");
        root.add_file("a.mp3", "1");
        root.add_file("a.mp3", "2");
        assert_eq!(root.list_files().await.unwrap().len(), 1);
        assert_eq!(
            root.file("a.mp3").unwrap().read_all().await.unwrap(),
            Bytes::from_static(b"2")
        );

        assert!(root.remove_file("a.mp3"));
        assert!(!root.remove_file("a.mp3"));
        assert!(root.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_folder_fails_listing() {
        let root = MemoryFolder::new("/music");
        root.set_unreadable(true);
        assert!(root.list_files().await.is_err());
        assert!(root.list_folders().await.is_err());
    }

    #[tokio::test]
    async fn test_artifacts() {
        let cache = MemoryFolder::new("/cache");
        cache
            .write_file("AlbumData.bin", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(cache.artifact_names(), vec!["AlbumData.bin".to_string()]);
        assert!(cache.read_file("TrackData.bin").await.unwrap().is_none());
        cache.delete_file("AlbumData.bin").await.unwrap();
        assert!(cache.artifact_names().is_empty());
    }

    #[tokio::test]
    async fn test_audio_file_properties_and_read_count() {
        let root = MemoryFolder::new("/music");
        let file = root.add_audio_file(
            "song.mp3",
            MusicProperties {
                title: Some("A".to_string()),
                ..Default::default()
            },
        );
        let props = file.music_properties().await.unwrap().unwrap();
        assert_eq!(props.title.as_deref(), Some("A"));
        assert_eq!(file.read_count(), 0);
        file.read_all().await.unwrap();
        assert_eq!(file.read_count(), 1);
    }
}
