//! Generic write-through cached repository
//!
//! Every entity kind is held the same way: an id-ordered map in memory that
//! is loaded from one artifact in the cache folder and rewritten after each
//! mutation.

use crate::codec;
use crate::error::{LibraryError, Result};
use crate::models::CacheEntity;
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use bridge_traits::storage::ModifiableFolder;
use core_async::sync::{watch, CancellationToken, Mutex, RwLock};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Repository interface shared by every entity kind
#[async_trait]
pub trait MetadataRepository<T: CacheEntity>: Send + Sync {
    /// Name of the artifact this repository persists to
    fn artifact_name(&self) -> &str;

    /// Bind to `storage` and load the stored artifact.
    ///
    /// Calling this on an initialized repository does nothing. A missing,
    /// corrupt or outdated artifact results in an empty repository.
    ///
    /// # Errors
    /// - `LibraryError::Cancelled` if `cancel` fired before loading finished
    /// - `LibraryError::Disposed` after [`dispose`](Self::dispose)
    async fn initialize(
        &self,
        storage: Arc<dyn ModifiableFolder>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Bind to `storage` without loading anything.
    async fn initialize_empty(&self, storage: Arc<dyn ModifiableFolder>) -> Result<()>;

    /// Insert or replace entities by id, then persist.
    ///
    /// # Errors
    /// Returns error if:
    /// - Any entity fails validation (nothing is stored)
    /// - The repository is not initialized
    /// - Writing the artifact fails
    async fn add_or_update(&self, items: Vec<T>) -> Result<()>;

    /// Remove an entity.
    ///
    /// # Returns
    /// - `Ok(true)` if the entity was removed
    /// - `Ok(false)` if it was not present
    async fn remove(&self, item: &T) -> Result<bool> {
        self.remove_by_id(item.id()).await
    }

    async fn remove_by_id(&self, id: &str) -> Result<bool>;

    /// Remove every listed id, returning how many were present.
    async fn remove_many(&self, ids: &[String]) -> Result<usize>;

    /// Find an entity by its ID
    ///
    /// # Returns
    /// - `Ok(Some(entity))` if found
    /// - `Ok(None)` if not found
    async fn get_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Up to `limit` entities in id order, starting at `offset`.
    async fn get_items(&self, offset: usize, limit: usize) -> Result<Vec<T>>;

    /// Query entities with pagination
    async fn query(&self, request: PageRequest) -> Result<Page<T>>;

    async fn count(&self) -> Result<usize>;

    /// Flush pending changes and release the storage binding.
    async fn dispose(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Ready,
    Disposed,
}

struct State<T> {
    phase: Phase,
    storage: Option<Arc<dyn ModifiableFolder>>,
    entries: BTreeMap<String, T>,
    dirty: bool,
}

/// In-memory repository persisted to a single cache artifact.
pub struct CachedRepository<T: CacheEntity> {
    artifact: String,
    state: RwLock<State<T>>,
    save_lock: Mutex<()>,
    count_tx: watch::Sender<usize>,
    events: Option<EventBus>,
}

impl<T: CacheEntity> CachedRepository<T> {
    pub fn new(artifact: impl Into<String>) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            artifact: artifact.into(),
            state: RwLock::new(State {
                phase: Phase::Uninitialized,
                storage: None,
                entries: BTreeMap::new(),
                dirty: false,
            }),
            save_lock: Mutex::new(()),
            count_tx,
            events: None,
        }
    }

    /// Publish `LibraryEvent::ItemsCountChanged` on `bus` whenever the
    /// number of stored entities changes.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Receive the entity count each time it changes.
    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.phase == Phase::Ready
    }

    pub async fn contains(&self, id: &str) -> Result<bool> {
        let state = self.read_ready().await?;
        Ok(state.entries.contains_key(id))
    }

    /// All stored ids in order.
    pub async fn ids(&self) -> Result<Vec<String>> {
        let state = self.read_ready().await?;
        Ok(state.entries.keys().cloned().collect())
    }

    /// A copy of every stored entity keyed by id.
    pub async fn snapshot(&self) -> Result<BTreeMap<String, T>> {
        let state = self.read_ready().await?;
        Ok(state.entries.clone())
    }

    /// Entities matching `predicate`, in id order.
    pub async fn find<F>(&self, predicate: F) -> Result<Vec<T>>
    where
        F: Fn(&T) -> bool + Send,
    {
        let state = self.read_ready().await?;
        Ok(state
            .entries
            .values()
            .filter(|item| predicate(item))
            .cloned()
            .collect())
    }

    /// Write the artifact if anything changed since the last write.
    pub async fn flush(&self) -> Result<()> {
        let _save = self.save_lock.lock().await;

        let (storage, data, count) = {
            let mut state = self.state.write().await;
            if !state.dirty {
                return Ok(());
            }
            let storage = state
                .storage
                .clone()
                .ok_or_else(|| LibraryError::NotInitialized(self.artifact.clone()))?;
            let data = codec::encode(&state.entries)?;
            state.dirty = false;
            (storage, data, state.entries.len())
        };

        let size = data.len();
        if let Err(e) = storage.write_file(&self.artifact, data).await {
            self.state.write().await.dirty = true;
            warn!(artifact = %self.artifact, error = %e, "Failed to persist repository");
            return Err(e.into());
        }
        debug!(artifact = %self.artifact, count, size, "Persisted repository");
        Ok(())
    }

    async fn read_ready(&self) -> Result<core_async::sync::RwLockReadGuard<'_, State<T>>> {
        let state = self.state.read().await;
        self.check_phase(state.phase)?;
        Ok(state)
    }

    fn check_phase(&self, phase: Phase) -> Result<()> {
        match phase {
            Phase::Ready => Ok(()),
            Phase::Uninitialized => Err(LibraryError::NotInitialized(self.artifact.clone())),
            Phase::Disposed => Err(LibraryError::Disposed(self.artifact.clone())),
        }
    }

    fn notify_count(&self, previous: usize, current: usize) {
        if previous == current {
            return;
        }
        self.count_tx.send_replace(current);
        if let Some(bus) = &self.events {
            let _ = bus.emit(CoreEvent::Library(LibraryEvent::ItemsCountChanged {
                repository: self.artifact.clone(),
                previous: previous as u64,
                current: current as u64,
            }));
        }
    }

    async fn load(&self, storage: &dyn ModifiableFolder) -> BTreeMap<String, T> {
        let data = match storage.read_file(&self.artifact).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(artifact = %self.artifact, "No stored artifact, starting empty");
                return BTreeMap::new();
            }
            Err(e) => {
                warn!(artifact = %self.artifact, error = %e, "Unreadable artifact, starting empty");
                return BTreeMap::new();
            }
        };

        match codec::decode::<T>(&self.artifact, &data) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(artifact = %self.artifact, error = %e, "Discarding cached artifact");
                BTreeMap::new()
            }
        }
    }

    async fn bind(
        &self,
        storage: Arc<dyn ModifiableFolder>,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        match state.phase {
            Phase::Ready => return Ok(()),
            Phase::Disposed => return Err(LibraryError::Disposed(self.artifact.clone())),
            Phase::Uninitialized => {}
        }

        let entries = match cancel {
            Some(cancel) => {
                let entries = core_async::select! {
                    _ = cancel.cancelled() => return Err(LibraryError::Cancelled),
                    entries = self.load(storage.as_ref()) => entries,
                };
                if cancel.is_cancelled() {
                    return Err(LibraryError::Cancelled);
                }
                entries
            }
            None => BTreeMap::new(),
        };

        let previous = state.entries.len();
        state.entries = entries;
        state.storage = Some(storage);
        state.phase = Phase::Ready;
        state.dirty = false;
        let current = state.entries.len();
        drop(state);

        info!(artifact = %self.artifact, count = current, "Repository initialized");
        self.notify_count(previous, current);
        Ok(())
    }
}

#[async_trait]
impl<T: CacheEntity> MetadataRepository<T> for CachedRepository<T> {
    fn artifact_name(&self) -> &str {
        &self.artifact
    }

    async fn initialize(
        &self,
        storage: Arc<dyn ModifiableFolder>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.bind(storage, Some(cancel)).await
    }

    async fn initialize_empty(&self, storage: Arc<dyn ModifiableFolder>) -> Result<()> {
        self.bind(storage, None).await
    }

    async fn add_or_update(&self, items: Vec<T>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        for item in &items {
            item.validate()?;
        }

        let (previous, current, changed) = {
            let mut state = self.state.write().await;
            self.check_phase(state.phase)?;
            let previous = state.entries.len();
            let mut changed = false;
            for item in items {
                if state.entries.get(item.id()) == Some(&item) {
                    continue;
                }
                state.entries.insert(item.id().to_string(), item);
                changed = true;
            }
            if changed {
                state.dirty = true;
            }
            (previous, state.entries.len(), changed)
        };

        self.notify_count(previous, current);
        if changed {
            self.flush().await?;
        }
        Ok(())
    }

    async fn remove_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.remove_many(&[id.to_string()]).await? == 1)
    }

    async fn remove_many(&self, ids: &[String]) -> Result<usize> {
        let (previous, current) = {
            let mut state = self.state.write().await;
            self.check_phase(state.phase)?;
            let previous = state.entries.len();
            for id in ids {
                state.entries.remove(id);
            }
            if state.entries.len() != previous {
                state.dirty = true;
            }
            (previous, state.entries.len())
        };

        self.notify_count(previous, current);
        if previous != current {
            debug!(artifact = %self.artifact, removed = previous - current, "Removed entities");
            self.flush().await?;
        }
        Ok(previous - current)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        let state = self.read_ready().await?;
        Ok(state.entries.get(id).cloned())
    }

    async fn get_items(&self, offset: usize, limit: usize) -> Result<Vec<T>> {
        let state = self.read_ready().await?;
        Ok(state
            .entries
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query(&self, request: PageRequest) -> Result<Page<T>> {
        let state = self.read_ready().await?;
        let items = state
            .entries
            .values()
            .skip(request.offset)
            .take(request.limit)
            .cloned()
            .collect();
        Ok(Page::new(items, state.entries.len(), request))
    }

    async fn count(&self) -> Result<usize> {
        let state = self.read_ready().await?;
        Ok(state.entries.len())
    }

    async fn dispose(&self) -> Result<()> {
        if self.state.read().await.phase == Phase::Ready {
            self.flush().await?;
        }

        let mut state = self.state.write().await;
        if state.phase == Phase::Disposed {
            return Ok(());
        }
        state.phase = Phase::Disposed;
        state.storage = None;
        state.entries.clear();
        state.dirty = false;
        drop(state);

        debug!(artifact = %self.artifact, "Repository disposed");
        Ok(())
    }
}

impl<T: CacheEntity> fmt::Debug for CachedRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRepository")
            .field("artifact", &self.artifact)
            .field("kind", &T::KIND)
            .field("count", &*self.count_tx.borrow())
            .finish()
    }
}
