//! # Event Bus System
//!
//! Scan progress and repository notifications over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`ScanEvent`] for the scan lifecycle and
//!   [`LibraryEvent`] for repository changes, wrapped in [`CoreEvent`]
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: receiver wrapper with an optional filter
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Metadata Manager ├─────────>│ EventBus  ├────────────>│ Subscriber │
//! └──────────────────┘          │ (broadcast│             └────────────┘
//! ┌──────────────────┐   emit   │  channel) │  subscribe  ┌────────────┐
//! │  Repositories    ├─────────>│           ├────────────>│ Subscriber │
//! └──────────────────┘          └───────────┘             └────────────┘
//! ```
//!
//! ## Ordering
//!
//! The manager emits `FileFound` and `FileProcessed` from the single loop that
//! consumes scan results, so a subscriber observes them in the order files
//! were processed.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, ScanEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut stream = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Scan(_)));
//!
//! bus.emit(CoreEvent::Scan(ScanEvent::ScanningStarted {
//!     instance_id: "default".to_string(),
//!     scan_id: "scan-1".to_string(),
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Scanning started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and can
//!   continue with newer ones.
//! - **`RecvError::Closed`**: every sender was dropped, i.e. shutdown.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scan lifecycle and progress
    Scan(ScanEvent),
    /// Repository notifications
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Scan(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Scan(ScanEvent::ScanningFailed { .. }) => EventSeverity::Error,
            CoreEvent::Scan(ScanEvent::ScanningCancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Scan(ScanEvent::ScanningStarted { .. })
            | CoreEvent::Scan(ScanEvent::ScanningCompleted { .. })
            | CoreEvent::Scan(ScanEvent::Reconciled { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Scan Events
// ============================================================================

/// Events emitted over the life of one scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScanEvent {
    ScanningStarted {
        instance_id: String,
        scan_id: String,
    },
    /// The folder scanner discovered a file.
    FileFound {
        scan_id: String,
        file_id: String,
        path: String,
        files_found: u64,
    },
    /// A discovered file was digested (or found to carry no metadata).
    FileProcessed {
        scan_id: String,
        file_id: String,
        has_metadata: bool,
        files_processed: u64,
        files_found: u64,
    },
    /// The post-discovery playlist pass finished.
    PlaylistsResolved {
        scan_id: String,
        playlists: u64,
    },
    /// Entities whose files no longer exist were removed.
    Reconciled {
        scan_id: String,
        tracks_removed: u64,
        albums_removed: u64,
        artists_removed: u64,
        images_removed: u64,
        playlists_removed: u64,
    },
    ScanningCompleted {
        scan_id: String,
        files_found: u64,
        files_processed: u64,
        duration_ms: u64,
    },
    ScanningCancelled {
        scan_id: String,
        files_processed: u64,
    },
    ScanningFailed {
        scan_id: String,
        message: String,
    },
}

impl ScanEvent {
    fn description(&self) -> &str {
        match self {
            ScanEvent::ScanningStarted { .. } => "Scanning started",
            ScanEvent::FileFound { .. } => "File found",
            ScanEvent::FileProcessed { .. } => "File processed",
            ScanEvent::PlaylistsResolved { .. } => "Playlists resolved",
            ScanEvent::Reconciled { .. } => "Removed entities of missing files",
            ScanEvent::ScanningCompleted { .. } => "Scanning completed",
            ScanEvent::ScanningCancelled { .. } => "Scanning cancelled",
            ScanEvent::ScanningFailed { .. } => "Scanning failed",
        }
    }

    /// Identifier of the scan this event belongs to.
    pub fn scan_id(&self) -> &str {
        match self {
            ScanEvent::ScanningStarted { scan_id, .. }
            | ScanEvent::FileFound { scan_id, .. }
            | ScanEvent::FileProcessed { scan_id, .. }
            | ScanEvent::PlaylistsResolved { scan_id, .. }
            | ScanEvent::Reconciled { scan_id, .. }
            | ScanEvent::ScanningCompleted { scan_id, .. }
            | ScanEvent::ScanningCancelled { scan_id, .. }
            | ScanEvent::ScanningFailed { scan_id, .. } => scan_id,
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to repository content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A repository's item count changed.
    ItemsCountChanged {
        repository: String,
        previous: u64,
        current: u64,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::ItemsCountChanged { .. } => "Repository size changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of events buffered per subscriber before it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
