//! # Manager State Machine
//!
//! Lifecycle of a metadata manager and the summary of one scan.
//!
//! ## State Machine
//!
//! ```text
//! Uninitialized → Initialized → Scanning → Complete
//!                                   ↓    → Cancelled
//!                                   ↓    → Faulted
//!                                   ↑         │
//!                                   └─────────┘  (rescan)
//!
//! any state except Disposed → Disposed
//! ```
//!
//! A finished scan leaves the manager ready to scan again, so the three
//! terminal scan states accept the same transitions as `Initialized`.
//!
//! ## Usage
//!
//! ```rust
//! use core_sync::state::ManagerState;
//!
//! let state = ManagerState::Uninitialized
//!     .transition(ManagerState::Initialized)?
//!     .transition(ManagerState::Scanning)?
//!     .transition(ManagerState::Complete)?;
//! assert!(state.can_scan());
//! # Ok::<(), core_sync::SyncError>(())
//! ```

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(Uuid);

impl ScanId {
    /// Create a new random scan ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a scan ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidScanId(e.to_string()))?,
        ))
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ScanId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Manager State
// ============================================================================

/// The current state of a metadata manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerState {
    /// Repositories are not bound yet
    Uninitialized,
    /// Repositories are bound and loaded
    Initialized,
    /// A scan is running
    Scanning,
    /// The last scan finished its full pipeline
    Complete,
    /// The last scan was cancelled or superseded
    Cancelled,
    /// The last scan stopped on an error
    Faulted,
    /// The manager released its repositories
    Disposed,
}

impl ManagerState {
    /// Check if this state ends a scan
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ManagerState::Complete | ManagerState::Cancelled | ManagerState::Faulted
        )
    }

    /// Check if a new scan may start from this state
    pub fn can_scan(&self) -> bool {
        matches!(self, ManagerState::Initialized) || self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerState::Uninitialized => "uninitialized",
            ManagerState::Initialized => "initialized",
            ManagerState::Scanning => "scanning",
            ManagerState::Complete => "complete",
            ManagerState::Cancelled => "cancelled",
            ManagerState::Faulted => "faulted",
            ManagerState::Disposed => "disposed",
        }
    }

    /// Validate a transition to `next` without performing it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidStateTransition` if the lifecycle does not
    /// allow moving from `self` to `next`.
    pub fn validate_transition(&self, next: ManagerState) -> Result<()> {
        use ManagerState::*;

        let allowed = match (*self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Uninitialized, Initialized) => true,
            (from, Scanning) => from.can_scan(),
            (Scanning, Complete | Cancelled | Faulted) => true,
            (from, Initialized) => from.is_terminal(),
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(SyncError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
                reason: transition_reason(*self, next).to_string(),
            })
        }
    }

    /// Move to `next` if the lifecycle allows it.
    pub fn transition(self, next: ManagerState) -> Result<ManagerState> {
        self.validate_transition(next)?;
        Ok(next)
    }
}

fn transition_reason(from: ManagerState, to: ManagerState) -> &'static str {
    match (from, to) {
        (ManagerState::Disposed, _) => "manager has been disposed",
        (ManagerState::Uninitialized, ManagerState::Scanning) => {
            "repositories must be initialized before scanning"
        }
        (ManagerState::Scanning, ManagerState::Scanning) => "a scan is already running",
        (_, ManagerState::Initialized) => "manager is already initialized",
        (_, ManagerState::Complete | ManagerState::Cancelled | ManagerState::Faulted) => {
            "no scan is running"
        }
        _ => "transition not allowed",
    }
}

impl FromStr for ManagerState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "uninitialized" => Ok(ManagerState::Uninitialized),
            "initialized" => Ok(ManagerState::Initialized),
            "scanning" => Ok(ManagerState::Scanning),
            "complete" => Ok(ManagerState::Complete),
            "cancelled" => Ok(ManagerState::Cancelled),
            "faulted" => Ok(ManagerState::Faulted),
            "disposed" => Ok(ManagerState::Disposed),
            _ => Err(SyncError::InvalidState(s.to_string())),
        }
    }
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Scan Summary
// ============================================================================

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Discovery, playlists and reconciliation all ran
    Completed,
    /// Cancelled by the caller or superseded by a newer scan
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entities removed because their files were not found again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub tracks_removed: u64,
    pub albums_removed: u64,
    /// Album artists and track artists together
    pub artists_removed: u64,
    pub images_removed: u64,
    pub playlists_removed: u64,
}

impl ReconcileStats {
    pub fn total(&self) -> u64 {
        self.tracks_removed
            + self.albums_removed
            + self.artists_removed
            + self.images_removed
            + self.playlists_removed
    }
}

/// Result of one call to `scan_async`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scan_id: ScanId,
    pub status: ScanStatus,
    pub files_found: u64,
    pub files_processed: u64,
    /// Processed files that produced metadata
    pub files_with_metadata: u64,
    pub playlists: u64,
    /// Folders whose contents could not be listed
    pub folders_failed: u64,
    /// `None` when reconciliation did not run
    pub reconciled: Option<ReconcileStats>,
    pub duration_ms: u64,
}

impl ScanSummary {
    pub(crate) fn new(scan_id: ScanId, status: ScanStatus) -> Self {
        Self {
            scan_id,
            status,
            files_found: 0,
            files_processed: 0,
            files_with_metadata: 0,
            playlists: 0,
            folders_failed: 0,
            reconciled: None,
            duration_ms: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ScanStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let state = ManagerState::Uninitialized
            .transition(ManagerState::Initialized)
            .unwrap()
            .transition(ManagerState::Scanning)
            .unwrap()
            .transition(ManagerState::Cancelled)
            .unwrap();
        assert!(state.is_terminal());

        // A finished manager scans again
        let state = state.transition(ManagerState::Scanning).unwrap();
        assert_eq!(state, ManagerState::Scanning);
        assert!(state.transition(ManagerState::Faulted).unwrap().can_scan());
    }

    #[test]
    fn test_invalid_transitions() {
        let cases = [
            (ManagerState::Uninitialized, ManagerState::Scanning),
            (ManagerState::Initialized, ManagerState::Initialized),
            (ManagerState::Scanning, ManagerState::Scanning),
            (ManagerState::Initialized, ManagerState::Complete),
            (ManagerState::Disposed, ManagerState::Initialized),
            (ManagerState::Disposed, ManagerState::Disposed),
        ];
        for (from, to) in cases {
            let err = from.transition(to).unwrap_err();
            assert!(
                matches!(err, SyncError::InvalidStateTransition { .. }),
                "{from} -> {to}"
            );
        }
    }

    #[test]
    fn test_dispose_from_any_live_state() {
        for state in [
            ManagerState::Uninitialized,
            ManagerState::Initialized,
            ManagerState::Scanning,
            ManagerState::Complete,
            ManagerState::Faulted,
        ] {
            assert!(state.validate_transition(ManagerState::Disposed).is_ok());
        }
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in [
            ManagerState::Uninitialized,
            ManagerState::Scanning,
            ManagerState::Disposed,
        ] {
            assert_eq!(state.as_str().parse::<ManagerState>().unwrap(), state);
        }
        assert!("paused".parse::<ManagerState>().is_err());
    }

    #[test]
    fn test_scan_id_parse() {
        let id = ScanId::new();
        assert_eq!(ScanId::from_string(&id.to_string()).unwrap(), id);
        assert!(ScanId::from_string("not-a-uuid").is_err());
    }
}
