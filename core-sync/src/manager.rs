//! # Metadata Manager
//!
//! Keeps the metadata cache of one storage root consistent with its files.
//!
//! ## Overview
//!
//! A manager owns the six repositories of its cache folder and runs scans
//! over its root folder. At most one scan runs per manager: starting a scan
//! cancels the running one and waits for it to finish before starting.
//!
//! ## Workflow
//!
//! 1. **Supersede**: Cancel any running scan and wait for it to release
//! 2. **Initialize**: Bind and load the repositories if not done yet
//! 3. **Discover**: Stream files from the folder scanner
//! 4. **Digest**: Cache hits are rebuilt from the repositories and refreshed
//!    in the background; misses are extracted with bounded parallelism
//! 5. **Collect**: Prune dangling references after every digest and write
//!    the changed entities through
//! 6. **Playlists**: Resolve playlists against the complete known files
//! 7. **Reconcile**: Remove entities whose files were not found
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::MetadataManager;
//! use core_async::sync::CancellationToken;
//!
//! let manager = MetadataManager::new(config);
//! manager.init_async().await?;
//!
//! let summary = manager.scan_async(CancellationToken::new()).await?;
//! println!("{} files processed", summary.files_processed);
//! ```

use crate::batch::{MergeOutcome, MetadataBatch};
use crate::catalog::Catalog;
use crate::gc::collect_garbage;
use crate::reconcile::reconcile;
use crate::state::{ManagerState, ScanId, ScanStatus, ScanSummary};
use crate::{Result, SyncError};
use bridge_traits::storage::{ReadStream, StorageFile};
use bytes::Bytes;
use core_async::sync::{watch, CancellationToken, Mutex, Semaphore};
use core_async::task::TaskGroup;
use core_async::time::{elapsed_millis, Instant};
use core_library::models::FileMetadata;
use core_library::repositories::{
    AlbumRepository, ArtistRepository, ImageRepository, PlaylistRepository, TrackRepository,
};
use core_library::MetadataRepository;
use core_metadata::artwork::{parse_image_id, ImageCache};
use core_metadata::folder_scanner::locate_file;
use core_metadata::formats::{classify, FileKind};
use core_metadata::{
    AudioMetadataScanner, FolderScanner, KnownFiles, MetadataError, PlaylistMetadataScanner,
};
use core_runtime::config::{CoreConfig, ScanTypes};
use core_runtime::events::{CoreEvent, EventBus, Receiver, ScanEvent};
use core_runtime::logging::strip_path;
use futures::StreamExt;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Tracks the scan that currently owns the manager
struct ActiveScan {
    scan_id: ScanId,
    generation: u64,
    cancellation_token: CancellationToken,
}

#[derive(Debug, Default)]
struct Counters {
    found: AtomicU64,
    processed: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.found.store(0, Ordering::SeqCst);
        self.processed.store(0, Ordering::SeqCst);
    }
}

/// One discovered file after the extraction stage
enum Extraction {
    /// Rebuilt from the repositories
    Cached {
        file: Arc<dyn StorageFile>,
        metadata: FileMetadata,
    },
    /// Extracted from the file itself
    Scanned {
        file: Arc<dyn StorageFile>,
        metadata: Option<FileMetadata>,
    },
    Failed {
        file: Arc<dyn StorageFile>,
        error: SyncError,
    },
    /// Playlist, resolved after discovery
    Deferred,
    /// Scanning is disabled
    Skipped,
    Cancelled,
}

/// State shared by the pipeline and the background refreshes of one scan
struct ScanContext {
    scan_id: ScanId,
    scan_types: ScanTypes,
    catalog: Arc<Catalog>,
    scanner: AudioMetadataScanner,
    image_cache: Arc<ImageCache>,
    batch: Mutex<MetadataBatch>,
}

impl ScanContext {
    async fn extract(&self, file: Arc<dyn StorageFile>, cancel: &CancellationToken) -> Extraction {
        if self.scan_types.is_empty() {
            return Extraction::Skipped;
        }
        if classify(file.as_ref()) == Some(FileKind::Playlist) {
            return Extraction::Deferred;
        }

        match self.catalog.cached_file_metadata(file.id()).await {
            Ok(Some(metadata)) => return Extraction::Cached { file, metadata },
            Ok(None) => {}
            Err(e) => warn!(file_id = %file.id(), error = %e, "Cached metadata unreadable, rescanning"),
        }

        match self.scanner.scan(file.as_ref(), self.scan_types, cancel).await {
            Ok(metadata) => Extraction::Scanned { file, metadata },
            Err(MetadataError::Cancelled) => Extraction::Cancelled,
            Err(e) => Extraction::Failed {
                file,
                error: e.into(),
            },
        }
    }

    /// Merge one file into the batch, collect garbage and write through.
    async fn digest(&self, metadata: FileMetadata) -> Result<()> {
        metadata.validate()?;
        let file_id = metadata.file_id.clone();

        let mut batch = self.batch.lock().await;
        match batch.merge(metadata) {
            MergeOutcome::Unchanged => return Ok(()),
            MergeOutcome::Changed => self.image_cache.invalidate_file(&file_id).await,
            MergeOutcome::Added => {}
        }
        collect_garbage(&mut batch);
        let delta = batch.take_delta();
        debug!(file_id = %file_id, entities = delta.len(), "Digested file");
        self.catalog.commit(delta).await
    }
}

/// Orchestrates scans of one storage root into its metadata cache.
pub struct MetadataManager {
    config: CoreConfig,
    events: EventBus,
    catalog: Arc<Catalog>,
    scanner: AudioMetadataScanner,
    playlist_scanner: PlaylistMetadataScanner,
    folder_scanner: FolderScanner,
    image_cache: Arc<ImageCache>,
    state: watch::Sender<ManagerState>,
    /// Held for the whole of initialization or one scan
    run_lock: Mutex<()>,
    active_scan: Mutex<Option<ActiveScan>>,
    generation: AtomicU64,
    counters: Arc<Counters>,
    /// Cancelled on dispose
    lifetime: CancellationToken,
}

impl MetadataManager {
    /// Create a manager with its own event bus.
    pub fn new(config: CoreConfig) -> Self {
        let events = EventBus::new(config.scan.event_buffer_size);
        Self::with_event_bus(config, events)
    }

    /// Create a manager that publishes on a shared event bus.
    pub fn with_event_bus(config: CoreConfig, events: EventBus) -> Self {
        let (state, _) = watch::channel(ManagerState::Uninitialized);
        Self {
            catalog: Arc::new(Catalog::new(&events)),
            image_cache: Arc::new(ImageCache::new(config.scan.image_cache_capacity)),
            scanner: AudioMetadataScanner::new(),
            playlist_scanner: PlaylistMetadataScanner::new(),
            folder_scanner: FolderScanner::with_known_files(Arc::new(KnownFiles::new())),
            state,
            run_lock: Mutex::new(()),
            active_scan: Mutex::new(None),
            generation: AtomicU64::new(0),
            counters: Arc::new(Counters::default()),
            lifetime: CancellationToken::new(),
            config,
            events,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        *self.state.borrow()
    }

    /// Receive every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ManagerState> {
        self.state.subscribe()
    }

    pub fn is_scanning(&self) -> bool {
        self.state() == ManagerState::Scanning
    }

    /// Subscribe to scan and repository events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Files discovered by the current or most recent scan.
    pub fn files_found(&self) -> u64 {
        self.counters.found.load(Ordering::SeqCst)
    }

    /// Files processed by the current or most recent scan.
    pub fn files_processed(&self) -> u64 {
        self.counters.processed.load(Ordering::SeqCst)
    }

    pub fn known_files(&self) -> &Arc<KnownFiles> {
        self.folder_scanner.known_files()
    }

    pub fn albums(&self) -> &AlbumRepository {
        &self.catalog.albums
    }

    pub fn album_artists(&self) -> &ArtistRepository {
        &self.catalog.album_artists
    }

    pub fn track_artists(&self) -> &ArtistRepository {
        &self.catalog.track_artists
    }

    pub fn tracks(&self) -> &TrackRepository {
        &self.catalog.tracks
    }

    pub fn playlists(&self) -> &PlaylistRepository {
        &self.catalog.playlists
    }

    pub fn images(&self) -> &ImageRepository {
        &self.catalog.images
    }

    /// Bind every repository to the metadata storage and load their
    /// artifacts, unless `skip_repository_init` is configured.
    ///
    /// # Errors
    ///
    /// - `SyncError::AlreadyInitialized` if called a second time, or after a
    ///   scan initialized the manager
    /// - `SyncError::Disposed` after [`dispose`](Self::dispose)
    #[instrument(skip(self), fields(instance_id = %self.config.instance_id))]
    pub async fn init_async(&self) -> Result<()> {
        self.ensure_live()?;
        let _run = self.run_lock.lock().await;
        match self.state() {
            ManagerState::Uninitialized => self.initialize_repositories(&self.lifetime).await,
            ManagerState::Disposed => Err(self.disposed()),
            _ => Err(SyncError::AlreadyInitialized {
                instance_id: self.config.instance_id.clone(),
            }),
        }
    }

    /// Caller holds `run_lock`.
    async fn initialize_repositories(&self, cancel: &CancellationToken) -> Result<()> {
        self.catalog
            .initialize(
                self.config.metadata_storage.clone(),
                self.config.scan.skip_repository_init,
                cancel,
            )
            .await?;
        self.set_state(ManagerState::Initialized)?;
        info!(
            storage = %self.config.metadata_storage.location(),
            skipped_load = self.config.scan.skip_repository_init,
            "Metadata manager initialized"
        );
        Ok(())
    }

    /// Scan the root folder into the cache.
    ///
    /// Any scan already running on this manager is cancelled first and this
    /// call waits for it to finish. Cancelling `cancellation_token` ends the
    /// scan early; everything digested until then stays cached.
    ///
    /// # Returns
    ///
    /// A summary with `ScanStatus::Completed`, or `ScanStatus::Cancelled` if
    /// the scan was cancelled or superseded.
    ///
    /// # Errors
    ///
    /// - `SyncError::Disposed` after [`dispose`](Self::dispose)
    /// - `SyncError::Library` if an entity is invalid or an artifact cannot
    ///   be written; the manager moves to `Faulted`
    #[instrument(skip(self, cancellation_token), fields(instance_id = %self.config.instance_id))]
    pub async fn scan_async(&self, cancellation_token: CancellationToken) -> Result<ScanSummary> {
        self.ensure_live()?;
        let scan_id = ScanId::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = cancellation_token.child_token();

        {
            let mut active = self.active_scan.lock().await;
            let previous = active.replace(ActiveScan {
                scan_id,
                generation,
                cancellation_token: token.clone(),
            });
            if let Some(previous) = previous {
                info!(previous = %previous.scan_id, scan_id = %scan_id, "Superseding running scan");
                previous.cancellation_token.cancel();
            }
        }

        let result = {
            let _run = self.run_lock.lock().await;
            self.run_scan(scan_id, &token).await
        };

        {
            let mut active = self.active_scan.lock().await;
            if active.as_ref().map(|a| a.generation) == Some(generation) {
                *active = None;
            }
        }
        result
    }

    /// Caller holds `run_lock`.
    async fn run_scan(&self, scan_id: ScanId, token: &CancellationToken) -> Result<ScanSummary> {
        self.ensure_live()?;
        if token.is_cancelled() {
            info!(scan_id = %scan_id, "Scan superseded before it started");
            return Ok(ScanSummary::new(scan_id, ScanStatus::Cancelled));
        }

        if self.state() == ManagerState::Uninitialized {
            match self.initialize_repositories(token).await {
                Ok(()) => {}
                Err(e) if e.is_cancellation() => {
                    return Ok(ScanSummary::new(scan_id, ScanStatus::Cancelled));
                }
                Err(e) => return Err(e),
            }
        }

        self.set_state(ManagerState::Scanning)?;
        self.counters.reset();
        self.emit(ScanEvent::ScanningStarted {
            instance_id: self.config.instance_id.clone(),
            scan_id: scan_id.to_string(),
        });
        info!(scan_id = %scan_id, root = %self.config.root_folder.path(), "Scan started");

        let started = Instant::now();
        let context = Arc::new(ScanContext {
            scan_id,
            scan_types: self.config.scan.scan_types,
            catalog: self.catalog.clone(),
            scanner: self.scanner.clone(),
            image_cache: self.image_cache.clone(),
            batch: Mutex::new(MetadataBatch::new()),
        });
        let refreshes = TaskGroup::with_parent(token);

        let result = self.execute_scan(&context, &refreshes, token).await;

        let failed = refreshes.shutdown().await;
        if failed > 0 {
            warn!(scan_id = %scan_id, failed, "Background refreshes did not finish cleanly");
        }

        let duration_ms = elapsed_millis(started);
        match result {
            Ok(mut summary) => {
                summary.duration_ms = duration_ms;
                self.finish(&summary)?;
                Ok(summary)
            }
            Err(e) if e.is_cancellation() => {
                let mut summary = ScanSummary::new(scan_id, ScanStatus::Cancelled);
                summary.files_found = self.files_found();
                summary.files_processed = self.files_processed();
                summary.duration_ms = duration_ms;
                self.finish(&summary)?;
                Ok(summary)
            }
            Err(e) => {
                error!(scan_id = %scan_id, error = %e, "Scan failed");
                self.set_state(ManagerState::Faulted)?;
                self.emit(ScanEvent::ScanningFailed {
                    scan_id: scan_id.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn finish(&self, summary: &ScanSummary) -> Result<()> {
        let scan_id = summary.scan_id.to_string();
        match summary.status {
            ScanStatus::Completed => {
                self.set_state(ManagerState::Complete)?;
                info!(
                    scan_id = %scan_id,
                    files_found = summary.files_found,
                    files_processed = summary.files_processed,
                    duration_ms = summary.duration_ms,
                    "Scan completed"
                );
                self.emit(ScanEvent::ScanningCompleted {
                    scan_id,
                    files_found: summary.files_found,
                    files_processed: summary.files_processed,
                    duration_ms: summary.duration_ms,
                });
            }
            ScanStatus::Cancelled => {
                self.set_state(ManagerState::Cancelled)?;
                info!(scan_id = %scan_id, files_processed = summary.files_processed, "Scan cancelled");
                self.emit(ScanEvent::ScanningCancelled {
                    scan_id,
                    files_processed: summary.files_processed,
                });
            }
        }
        Ok(())
    }

    async fn execute_scan(
        &self,
        context: &Arc<ScanContext>,
        refreshes: &TaskGroup,
        token: &CancellationToken,
    ) -> Result<ScanSummary> {
        let scan_id = context.scan_id;
        let mut summary = ScanSummary::new(scan_id, ScanStatus::Completed);
        let refresh_permit = Arc::new(Semaphore::new(1));

        // Discovery and digest
        {
            let events = self.events.clone();
            let counters = self.counters.clone();
            let extract_context = context.clone();
            let extract_token = token.clone();
            let mut extractions = self
                .folder_scanner
                .scan(self.config.root_folder.clone(), token.clone())
                .map(move |file| {
                    let files_found = counters.found.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = events.emit(CoreEvent::Scan(ScanEvent::FileFound {
                        scan_id: scan_id.to_string(),
                        file_id: file.id().to_string(),
                        path: file.path().to_string(),
                        files_found,
                    }));
                    let context = extract_context.clone();
                    let token = extract_token.clone();
                    async move { context.extract(file, &token).await }
                })
                .buffer_unordered(self.config.scan.degrees_of_parallelism)
                .boxed();

            loop {
                let next = core_async::select! {
                    biased;
                    _ = token.cancelled() => None,
                    next = extractions.next() => Some(next),
                };
                let Some(next) = next else {
                    return Err(SyncError::Cancelled);
                };
                let Some(extraction) = next else {
                    break;
                };

                match extraction {
                    Extraction::Cached { file, metadata } => {
                        context.digest(metadata.clone()).await?;
                        self.record_processed(&mut summary, file.id(), true);
                        if self.config.scan.background_refresh {
                            spawn_refresh(context, refreshes, &refresh_permit, file, metadata);
                        }
                    }
                    Extraction::Scanned { file, metadata } => {
                        let has_metadata = metadata.is_some();
                        if let Some(metadata) = metadata {
                            context.digest(metadata).await?;
                        }
                        self.record_processed(&mut summary, file.id(), has_metadata);
                    }
                    Extraction::Failed { file, error } => {
                        warn!(
                            file = %strip_path(file.path()),
                            error = %error,
                            "Extraction failed, treating file as metadata-less"
                        );
                        self.record_processed(&mut summary, file.id(), false);
                    }
                    Extraction::Deferred | Extraction::Skipped => {}
                    Extraction::Cancelled => return Err(SyncError::Cancelled),
                }
            }
        }

        summary.files_found = self.files_found();
        summary.folders_failed = self.folder_scanner.failures().len() as u64;
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if context.scan_types.is_empty() {
            debug!(scan_id = %scan_id, "Scanning disabled, skipping playlists and reconciliation");
            summary.files_processed = self.files_processed();
            return Ok(summary);
        }

        // Refreshes must land before playlists resolve against the batch.
        let failed = refreshes.join_all().await;
        if failed > 0 {
            warn!(scan_id = %scan_id, failed, "Some background refreshes panicked");
        }

        self.resolve_playlists(context, &mut summary, token).await?;

        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let mut batch = context.batch.lock().await;
        let orphans = batch.drop_orphans();
        collect_garbage(&mut batch);
        self.catalog.commit(batch.take_delta()).await?;
        debug!(scan_id = %scan_id, orphans, "Final batch committed");

        if summary.folders_failed > 0 {
            warn!(
                scan_id = %scan_id,
                folders = summary.folders_failed,
                "Skipping reconciliation, some folders could not be listed"
            );
        } else {
            let reconciled = reconcile(&self.catalog, &batch).await?;
            for file_id in &reconciled.removed_files {
                self.image_cache.invalidate_file(file_id).await;
            }
            let stats = reconciled.stats;
            self.emit(ScanEvent::Reconciled {
                scan_id: scan_id.to_string(),
                tracks_removed: stats.tracks_removed,
                albums_removed: stats.albums_removed,
                artists_removed: stats.artists_removed,
                images_removed: stats.images_removed,
                playlists_removed: stats.playlists_removed,
            });
            summary.reconciled = Some(stats);
        }

        summary.files_processed = self.files_processed();
        Ok(summary)
    }

    async fn resolve_playlists(
        &self,
        context: &ScanContext,
        summary: &mut ScanSummary,
        token: &CancellationToken,
    ) -> Result<()> {
        let known = self.folder_scanner.known_files();
        for file in known.files_of_kind(FileKind::Playlist) {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self
                .playlist_scanner
                .scan(file.as_ref(), known, token)
                .await
            {
                Ok(Some(playlist)) => {
                    context
                        .digest(FileMetadata {
                            file_id: file.id().to_string(),
                            playlist: Some(playlist),
                            ..Default::default()
                        })
                        .await?;
                    summary.playlists += 1;
                    self.record_processed(summary, file.id(), true);
                }
                Ok(None) => self.record_processed(summary, file.id(), false),
                Err(MetadataError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(file = %strip_path(file.path()), error = %e, "Playlist unreadable");
                    self.record_processed(summary, file.id(), false);
                }
            }
        }

        self.emit(ScanEvent::PlaylistsResolved {
            scan_id: context.scan_id.to_string(),
            playlists: summary.playlists,
        });
        Ok(())
    }

    fn record_processed(&self, summary: &mut ScanSummary, file_id: &str, has_metadata: bool) {
        let files_processed = self.counters.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if has_metadata {
            summary.files_with_metadata += 1;
        }
        self.emit(ScanEvent::FileProcessed {
            scan_id: summary.scan_id.to_string(),
            file_id: file_id.to_string(),
            has_metadata,
            files_processed,
            files_found: self.files_found(),
        });
    }

    /// Open the picture minted as `image_id`.
    ///
    /// If the picture's file is not known yet and a scan is running, this
    /// waits until the scan discovers the file or ends. Outside a scan the
    /// file is looked up by the path its track was cached with.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the file or the picture no longer exists.
    ///
    /// # Errors
    ///
    /// - `MetadataError::InvalidImageId` if `image_id` was not minted by the
    ///   audio scanner
    /// - `SyncError::Disposed` after [`dispose`](Self::dispose)
    #[instrument(skip(self))]
    pub async fn get_image_stream_by_id(&self, image_id: &str) -> Result<Option<ReadStream>> {
        Ok(self
            .get_image_bytes(image_id)
            .await?
            .map(|data| Box::new(Cursor::new(data)) as ReadStream))
    }

    /// Like [`get_image_stream_by_id`](Self::get_image_stream_by_id), but
    /// returns the whole picture.
    pub async fn get_image_bytes(&self, image_id: &str) -> Result<Option<Bytes>> {
        self.ensure_live()?;
        let (file_id, index) = parse_image_id(image_id)?;
        if let Some(data) = self.image_cache.get(image_id).await {
            if self.known_files().contains(file_id)
                || self.catalog.tracks.contains(file_id).await?
            {
                return Ok(Some(data));
            }
            debug!(image_id, "Dropping cached pictures of a forgotten file");
            self.image_cache.invalidate_file(file_id).await;
        }

        let Some(file) = self.resolve_file(file_id).await? else {
            debug!(image_id, "Picture source not found");
            return Ok(None);
        };

        let cancel = self.lifetime.child_token();
        match self.scanner.read_picture(file.as_ref(), index, &cancel).await {
            Ok(Some(picture)) => {
                self.image_cache.put(image_id, picture.data.clone()).await;
                Ok(Some(picture.data))
            }
            Ok(None) => Ok(None),
            Err(MetadataError::Bridge(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_file(&self, file_id: &str) -> Result<Option<Arc<dyn StorageFile>>> {
        let known = self.folder_scanner.known_files();
        let mut state = self.state.subscribe();
        loop {
            let discovered = known.discovered().notified();
            let mut discovered = std::pin::pin!(discovered);
            discovered.as_mut().enable();

            if let Some(file) = known.get(file_id) {
                return Ok(Some(file));
            }
            if *state.borrow_and_update() != ManagerState::Scanning {
                break;
            }
            core_async::select! {
                _ = discovered => {}
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.lifetime.cancelled() => return Err(self.disposed()),
            }
        }

        let Some(track) = self.catalog.tracks.get_by_id(file_id).await? else {
            return Ok(None);
        };
        match locate_file(&self.config.root_folder, &track.path).await {
            Ok(file) => Ok(file),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel any scan, join its background work, then flush and release
    /// every repository.
    ///
    /// Later calls on this manager return `SyncError::Disposed`. Disposing
    /// twice is a no-op.
    #[instrument(skip(self), fields(instance_id = %self.config.instance_id))]
    pub async fn dispose(&self) -> Result<()> {
        self.lifetime.cancel();
        if let Some(active) = self.active_scan.lock().await.as_ref() {
            active.cancellation_token.cancel();
        }

        let _run = self.run_lock.lock().await;
        if self.state() == ManagerState::Disposed {
            return Ok(());
        }
        let result = self.catalog.dispose().await;
        self.image_cache.clear().await;
        self.folder_scanner.known_files().clear();
        self.set_state(ManagerState::Disposed)?;
        info!("Metadata manager disposed");
        result
    }

    fn ensure_live(&self) -> Result<()> {
        if self.lifetime.is_cancelled() || self.state() == ManagerState::Disposed {
            return Err(self.disposed());
        }
        Ok(())
    }

    fn disposed(&self) -> SyncError {
        SyncError::Disposed(self.config.instance_id.clone())
    }

    fn set_state(&self, next: ManagerState) -> Result<()> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| match state.transition(next) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result
    }

    fn emit(&self, event: ScanEvent) {
        self.events.emit(CoreEvent::Scan(event)).ok();
    }
}

impl std::fmt::Debug for MetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataManager")
            .field("instance_id", &self.config.instance_id)
            .field("state", &self.state())
            .field("files_found", &self.files_found())
            .field("files_processed", &self.files_processed())
            .finish()
    }
}

/// Re-scan a cache hit at low priority and digest it again if it changed.
fn spawn_refresh(
    context: &Arc<ScanContext>,
    refreshes: &TaskGroup,
    permit: &Arc<Semaphore>,
    file: Arc<dyn StorageFile>,
    cached: FileMetadata,
) {
    let context = context.clone();
    let permit = permit.clone();
    refreshes.spawn(move |token| async move {
        core_async::task::yield_now().await;
        let Ok(_permit) = permit.acquire_owned().await else {
            return;
        };
        if token.is_cancelled() {
            return;
        }

        match context
            .scanner
            .scan(file.as_ref(), context.scan_types, &token)
            .await
        {
            Ok(Some(fresh)) if fresh != cached => {
                if token.is_cancelled() {
                    return;
                }
                match context.digest(fresh).await {
                    Ok(()) => debug!(file_id = %file.id(), "Refreshed cached metadata"),
                    Err(e) => warn!(file_id = %file.id(), error = %e, "Background refresh digest failed"),
                }
            }
            Ok(Some(_)) => debug!(file_id = %file.id(), "Cached metadata is current"),
            Ok(None) => debug!(
                file_id = %file.id(),
                "File no longer yields metadata, keeping cached contribution until reconciliation"
            ),
            Err(MetadataError::Cancelled) => {}
            Err(e) => debug!(file_id = %file.id(), error = %e, "Background refresh failed"),
        }
    });
}
