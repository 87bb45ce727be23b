//! Depth-first folder traversal
//!
//! [`FolderScanner::scan`] walks a storage tree lazily and yields every audio
//! and playlist file it finds. Each yielded file is first recorded in the
//! shared [`KnownFiles`] set, so other components can look files up while the
//! traversal is still running.

use crate::formats::{classify, FileKind};
use bridge_traits::storage::{StorageFile, StorageFolder};
use core_async::sync::{CancellationToken, Notify};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Normalize a storage path for lookups.
///
/// Backslashes become slashes, repeated separators collapse, and `.` and
/// `..` segments are resolved lexically.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[derive(Default)]
struct KnownInner {
    order: Vec<String>,
    by_id: HashMap<String, (Arc<dyn StorageFile>, FileKind)>,
    by_path: HashMap<String, String>,
    by_folded_path: HashMap<String, String>,
}

/// The files discovered so far in the current (or most recent) traversal.
#[derive(Default)]
pub struct KnownFiles {
    inner: RwLock<KnownInner>,
    discovered: Notify,
}

impl KnownFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered file. Returns `false` if it was already known.
    pub fn insert(&self, file: Arc<dyn StorageFile>, kind: FileKind) -> bool {
        let id = file.id().to_string();
        let path = normalize_path(file.path());
        {
            let mut inner = write_lock(&self.inner);
            if inner.by_id.contains_key(&id) {
                return false;
            }
            inner.order.push(id.clone());
            inner.by_folded_path.entry(path.to_lowercase()).or_insert_with(|| id.clone());
            inner.by_path.insert(path, id.clone());
            inner.by_id.insert(id, (file, kind));
        }
        self.discovered.notify_waiters();
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn StorageFile>> {
        read_lock(&self.inner).by_id.get(id).map(|(file, _)| file.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        read_lock(&self.inner).by_id.contains_key(id)
    }

    /// Find a known file by path, falling back to a case-insensitive match.
    pub fn resolve_path(&self, path: &str) -> Option<Arc<dyn StorageFile>> {
        let normalized = normalize_path(path);
        let inner = read_lock(&self.inner);
        let id = inner
            .by_path
            .get(&normalized)
            .or_else(|| inner.by_folded_path.get(&normalized.to_lowercase()))?;
        inner.by_id.get(id).map(|(file, _)| file.clone())
    }

    /// Known files of `kind`, in discovery order.
    pub fn files_of_kind(&self, kind: FileKind) -> Vec<Arc<dyn StorageFile>> {
        let inner = read_lock(&self.inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id))
            .filter(|(_, k)| *k == kind)
            .map(|(file, _)| file.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.inner).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *write_lock(&self.inner) = KnownInner::default();
    }

    /// Wake every task waiting in [`discovered`](Self::discovered) without a
    /// new file, e.g. because the traversal ended.
    pub fn wake_waiters(&self) {
        self.discovered.notify_waiters();
    }

    /// Notification fired after each newly discovered file.
    pub fn discovered(&self) -> &Notify {
        &self.discovered
    }
}

impl fmt::Debug for KnownFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownFiles").field("len", &self.len()).finish()
    }
}

/// A folder whose contents could not be listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderFailure {
    pub path: String,
    pub message: String,
}

struct Traversal {
    stack: Vec<Arc<dyn StorageFolder>>,
    pending: VecDeque<(Arc<dyn StorageFile>, FileKind)>,
    known: Arc<KnownFiles>,
    failures: Arc<Mutex<Vec<FolderFailure>>>,
    cancel: CancellationToken,
    folders_visited: usize,
}

impl Traversal {
    /// Produce the next candidate file, descending into folders as needed.
    async fn next_file(&mut self) -> Option<Arc<dyn StorageFile>> {
        loop {
            if self.cancel.is_cancelled() {
                debug!(folders = self.folders_visited, "Traversal cancelled");
                return None;
            }
            if let Some((file, kind)) = self.pending.pop_front() {
                if self.known.insert(file.clone(), kind) {
                    return Some(file);
                }
                continue;
            }
            let folder = self.stack.pop()?;
            let cancel = self.cancel.clone();
            core_async::select! {
                _ = cancel.cancelled() => return None,
                _ = self.expand(folder) => {}
            }
        }
    }

    async fn expand(&mut self, folder: Arc<dyn StorageFolder>) {
        self.folders_visited += 1;
        let listing = async {
            let files = folder.list_files().await?;
            let folders = folder.list_folders().await?;
            Ok::<_, bridge_traits::error::BridgeError>((files, folders))
        };

        match listing.await {
            Ok((files, folders)) => {
                debug!(
                    path = %folder.path(),
                    files = files.len(),
                    folders = folders.len(),
                    "Listed folder"
                );
                self.pending.extend(
                    files
                        .into_iter()
                        .filter_map(|file| classify(file.as_ref()).map(|kind| (file, kind))),
                );
                // Reversed so the first child folder is visited first.
                self.stack.extend(folders.into_iter().rev());
            }
            Err(e) => {
                warn!(path = %folder.path(), error = %e, "Skipping unreadable folder");
                lock(&self.failures).push(FolderFailure {
                    path: folder.path().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Lazy, cancellable depth-first traversal of a storage tree.
#[derive(Debug, Default)]
pub struct FolderScanner {
    known: Arc<KnownFiles>,
    failures: Arc<Mutex<Vec<FolderFailure>>>,
}

impl FolderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scanner that records discoveries in `known`.
    pub fn with_known_files(known: Arc<KnownFiles>) -> Self {
        Self {
            known,
            failures: Arc::default(),
        }
    }

    pub fn known_files(&self) -> &Arc<KnownFiles> {
        &self.known
    }

    /// Folders the most recent traversal could not list.
    pub fn failures(&self) -> Vec<FolderFailure> {
        lock(&self.failures).clone()
    }

    /// Start a fresh traversal from `root`.
    ///
    /// Known files and recorded failures are reset. Files are yielded in
    /// pre-order: a folder's own files before the contents of its child
    /// folders. The stream ends early once `cancel` fires; files already
    /// yielded stay known.
    pub fn scan(
        &self,
        root: Arc<dyn StorageFolder>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Arc<dyn StorageFile>> {
        self.known.clear();
        lock(&self.failures).clear();
        info!(root = %root.path(), "Starting folder traversal");

        let traversal = Traversal {
            stack: vec![root],
            pending: VecDeque::new(),
            known: self.known.clone(),
            failures: self.failures.clone(),
            cancel,
            folders_visited: 0,
        };

        stream::unfold(traversal, |mut traversal| async move {
            let file = traversal.next_file().await;
            if file.is_none() {
                debug!(
                    folders = traversal.folders_visited,
                    files = traversal.known.len(),
                    "Folder traversal finished"
                );
                traversal.known.wake_waiters();
            }
            file.map(|file| (file, traversal))
        })
        .boxed()
    }
}

/// Find the file at `path` below `root` without a full traversal.
///
/// Only the folders on the way to `path` are listed.
pub async fn locate_file(
    root: &Arc<dyn StorageFolder>,
    path: &str,
) -> bridge_traits::error::Result<Option<Arc<dyn StorageFile>>> {
    let target = normalize_path(path);
    let mut folder = root.clone();
    loop {
        for file in folder.list_files().await? {
            if normalize_path(file.path()) == target {
                return Ok(Some(file));
            }
        }
        let next = folder.list_folders().await?.into_iter().find(|child| {
            let prefix = normalize_path(child.path());
            target
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
        });
        match next {
            Some(child) => folder = child,
            None => return Ok(None),
        }
    }
}
