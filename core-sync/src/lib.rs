//! # Metadata Scanning & Caching
//!
//! Keeps a persistent metadata cache consistent with a folder tree.
//!
//! ## Overview
//!
//! This crate drives a scan end to end:
//! - Discovering files below the root folder
//! - Extracting audio and playlist metadata with bounded parallelism
//! - Merging per-file results into shared albums and artists
//! - Pruning references to entities that no longer exist
//! - Removing cached entities whose files are gone
//!
//! ## Components
//!
//! - **Manager** (`manager`): Scan orchestration, supersession and picture retrieval
//! - **State** (`state`): Manager state machine and scan summaries
//! - **Batch** (`batch`): In-memory merge of per-file metadata
//! - **Garbage Collection** (`gc`): Reference pruning over a batch
//! - **Reconciliation** (`reconcile`): Removal of entities not seen by a scan
//! - **Catalog** (`catalog`): The six repositories of one cache folder

pub mod batch;
pub mod catalog;
pub mod error;
pub mod gc;
pub mod manager;
pub mod reconcile;
pub mod state;

pub use batch::{BatchDelta, MergeOutcome, MetadataBatch};
pub use catalog::Catalog;
pub use error::{Result, SyncError};
pub use gc::{collect_garbage, GcReport};
pub use manager::MetadataManager;
pub use reconcile::{reconcile, Reconciliation};
pub use state::{ManagerState, ReconcileStats, ScanId, ScanStatus, ScanSummary};
