//! Core service façade and bootstrap helpers.
//!
//! This crate owns the [`ManagerRegistry`], the explicit map from instance id
//! to [`MetadataManager`] that host applications keep in their top-level
//! context. Desktop apps typically enable the `desktop-shims` feature, which
//! adds [`bootstrap_local`] for caches over local directories.

pub mod error;

pub use error::{CoreError, Result};

use core_async::sync::RwLock;
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_sync::MetadataManager;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(feature = "desktop-shims")]
use bridge_desktop::LocalFolder;

/// Managers of one application, keyed by instance id.
///
/// Managers created through the registry share its event bus, so a host can
/// subscribe once for every instance.
pub struct ManagerRegistry {
    managers: RwLock<BTreeMap<String, Arc<MetadataManager>>>,
    events: EventBus,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::with_event_bus(EventBus::default())
    }

    pub fn with_event_bus(events: EventBus) -> Self {
        Self {
            managers: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Create a manager for `config` on the registry's event bus and
    /// register it.
    ///
    /// # Errors
    ///
    /// `CoreError::DuplicateInstance` if `config.instance_id` is taken.
    pub async fn create(&self, config: CoreConfig) -> Result<Arc<MetadataManager>> {
        let manager = MetadataManager::with_event_bus(config, self.events.clone());
        self.register(manager).await
    }

    /// Register an existing manager under its instance id.
    ///
    /// # Errors
    ///
    /// `CoreError::DuplicateInstance` if the id is taken. The rejected
    /// manager is dropped without being disposed.
    pub async fn register(&self, manager: MetadataManager) -> Result<Arc<MetadataManager>> {
        let instance_id = manager.instance_id().to_string();
        let mut managers = self.managers.write().await;
        if managers.contains_key(&instance_id) {
            return Err(CoreError::DuplicateInstance(instance_id));
        }
        let manager = Arc::new(manager);
        managers.insert(instance_id.clone(), manager.clone());
        info!(instance_id = %instance_id, "Registered metadata manager");
        Ok(manager)
    }

    pub async fn get(&self, instance_id: &str) -> Option<Arc<MetadataManager>> {
        self.managers.read().await.get(instance_id).cloned()
    }

    /// Unregister a manager. The caller decides whether to dispose it.
    pub async fn remove(&self, instance_id: &str) -> Option<Arc<MetadataManager>> {
        self.managers.write().await.remove(instance_id)
    }

    pub async fn instance_ids(&self) -> Vec<String> {
        self.managers.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.managers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Unregister and dispose every manager.
    ///
    /// Continues past failures and returns the first one.
    pub async fn dispose_all(&self) -> Result<()> {
        let managers = std::mem::take(&mut *self.managers.write().await);
        let mut first_error = None;
        for (instance_id, manager) in managers {
            if let Err(e) = manager.dispose().await {
                warn!(instance_id = %instance_id, error = %e, "Failed to dispose manager");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl Default for ManagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}

/// Convenience bootstrapper for a cache of a local music directory.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_service::{bootstrap_local, ManagerRegistry};
///
/// let registry = ManagerRegistry::new();
/// let manager = bootstrap_local(&registry, "library", "/home/me/Music", "/home/me/.cache/library").await?;
/// manager.init_async().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_local(
    registry: &ManagerRegistry,
    instance_id: &str,
    music_dir: impl AsRef<std::path::Path>,
    cache_dir: impl AsRef<std::path::Path>,
) -> Result<Arc<MetadataManager>> {
    let root = LocalFolder::open(music_dir).await?;
    let storage = LocalFolder::create(cache_dir).await?;
    let config = CoreConfig::builder()
        .instance_id(instance_id)
        .root_folder(Arc::new(root))
        .metadata_storage(Arc::new(storage))
        .build()?;
    registry.create(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::MemoryFolder;

    fn config(instance_id: &str) -> CoreConfig {
        CoreConfig::builder()
            .instance_id(instance_id)
            .root_folder(MemoryFolder::new("/music"))
            .metadata_storage(MemoryFolder::new("/cache"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ManagerRegistry::new();
        let created = registry.create(config("a")).await.unwrap();
        registry.create(config("b")).await.unwrap();

        let found = registry.get("a").await.unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(registry.instance_ids().await, vec!["a", "b"]);
        assert!(registry.get("c").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_instance_is_rejected() {
        let registry = ManagerRegistry::new();
        registry.create(config("a")).await.unwrap();

        let result = registry.create(config("a")).await;
        assert!(matches!(result, Err(CoreError::DuplicateInstance(id)) if id == "a"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_leaves_manager_usable() {
        let registry = ManagerRegistry::new();
        registry.create(config("a")).await.unwrap();

        let removed = registry.remove("a").await.unwrap();
        assert!(registry.is_empty().await);
        removed.init_async().await.unwrap();
    }

    #[tokio::test]
    async fn test_dispose_all_disposes_and_clears() {
        let registry = ManagerRegistry::new();
        let a = registry.create(config("a")).await.unwrap();
        let b = registry.create(config("b")).await.unwrap();
        a.init_async().await.unwrap();

        registry.dispose_all().await.unwrap();

        assert!(registry.is_empty().await);
        assert_eq!(a.state(), core_sync::ManagerState::Disposed);
        assert_eq!(b.state(), core_sync::ManagerState::Disposed);
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_bootstrap_local_registers_manager() {
        let music = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let registry = ManagerRegistry::new();

        let manager = bootstrap_local(&registry, "local", music.path(), cache.path().join("db"))
            .await
            .unwrap();
        let summary = manager
            .scan_async(core_async::sync::CancellationToken::new())
            .await
            .unwrap();

        assert!(summary.is_completed());
        assert_eq!(summary.files_found, 0);
        assert!(registry.get("local").await.is_some());
    }
}
