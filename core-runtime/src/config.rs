//! # Core Configuration Module
//!
//! Configuration for a metadata manager instance.
//!
//! ## Overview
//!
//! A builder constructs a [`CoreConfig`] holding the storage capabilities the
//! scanner needs and the [`ScanSettings`] that tune it. `build()` validates
//! fail-fast, so a missing capability is reported before any scan starts.
//!
//! ## Required Dependencies
//!
//! - [`StorageFolder`] - The root folder to scan
//! - [`ModifiableFolder`] - Where the cache artifacts are stored
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, ScanTypes};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .instance_id("local-library")
//!     .root_folder(Arc::new(music_folder))
//!     .metadata_storage(Arc::new(cache_folder))
//!     .scan_types(ScanTypes::TAGLIB)
//!     .degrees_of_parallelism(4)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::storage::{ModifiableFolder, StorageFolder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Which extraction strategies the audio scanner may use.
///
/// An empty set disables scanning: no candidate file yields metadata.
///
/// ```rust
/// use core_runtime::config::ScanTypes;
///
/// let types = ScanTypes::FILE_PROPERTIES | ScanTypes::TAGLIB;
/// assert!(types.contains(ScanTypes::TAGLIB));
/// assert!(ScanTypes::NONE.is_empty());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanTypes(u8);

impl ScanTypes {
    pub const NONE: ScanTypes = ScanTypes(0);
    /// Properties the storage backend supplies without parsing the file.
    pub const FILE_PROPERTIES: ScanTypes = ScanTypes(1);
    /// Deep tag parsing of the file content.
    pub const TAGLIB: ScanTypes = ScanTypes(1 << 1);
    pub const ALL: ScanTypes = ScanTypes(Self::FILE_PROPERTIES.0 | Self::TAGLIB.0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds a set from raw bits, dropping unknown ones.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        ScanTypes(bits & Self::ALL.0)
    }

    pub const fn contains(self, other: ScanTypes) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for ScanTypes {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for ScanTypes {
    type Output = ScanTypes;

    fn bitor(self, rhs: Self) -> Self::Output {
        ScanTypes(self.0 | rhs.0)
    }
}

impl BitOrAssign for ScanTypes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ScanTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("ScanTypes(None)");
        }
        let mut names = Vec::new();
        if self.contains(Self::FILE_PROPERTIES) {
            names.push("FileProperties");
        }
        if self.contains(Self::TAGLIB) {
            names.push("TagLib");
        }
        write!(f, "ScanTypes({})", names.join(" | "))
    }
}

/// Tuning knobs for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub scan_types: ScanTypes,
    /// Maximum number of files extracted concurrently on the slow path.
    pub degrees_of_parallelism: usize,
    /// Start every scan from an empty cache instead of loading artifacts.
    pub skip_repository_init: bool,
    /// Capacity of the progress event channel.
    pub event_buffer_size: usize,
    /// Re-scan cache hits in the background.
    pub background_refresh: bool,
    /// Number of recently opened images kept in memory. Zero disables it.
    pub image_cache_capacity: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scan_types: ScanTypes::default(),
            degrees_of_parallelism: 2,
            skip_repository_init: false,
            event_buffer_size: 256,
            background_refresh: true,
            image_cache_capacity: 64,
        }
    }
}

impl ScanSettings {
    pub fn validate(&self) -> Result<()> {
        if self.degrees_of_parallelism == 0 {
            return Err(Error::Config(
                "Degrees of parallelism must be greater than 0".to_string(),
            ));
        }
        if self.degrees_of_parallelism > 256 {
            return Err(Error::Config(format!(
                "Degrees of parallelism {} exceeds maximum of 256",
                self.degrees_of_parallelism
            )));
        }
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a metadata manager instance needs.
#[derive(Clone)]
pub struct CoreConfig {
    pub instance_id: String,
    pub root_folder: Arc<dyn StorageFolder>,
    pub metadata_storage: Arc<dyn ModifiableFolder>,
    pub scan: ScanSettings,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("instance_id", &self.instance_id)
            .field("root_folder", &self.root_folder.path())
            .field("metadata_storage", &self.metadata_storage.location())
            .field("scan", &self.scan)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.instance_id.trim().is_empty() {
            return Err(Error::Config("Instance id cannot be empty".to_string()));
        }
        self.scan.validate()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    instance_id: Option<String>,
    root_folder: Option<Arc<dyn StorageFolder>>,
    metadata_storage: Option<Arc<dyn ModifiableFolder>>,
    scan: ScanSettings,
}

impl CoreConfigBuilder {
    pub fn instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// Root of the folder tree to scan.
    pub fn root_folder(mut self, folder: Arc<dyn StorageFolder>) -> Self {
        self.root_folder = Some(folder);
        self
    }

    /// Folder that stores one cache artifact per repository.
    pub fn metadata_storage(mut self, folder: Arc<dyn ModifiableFolder>) -> Self {
        self.metadata_storage = Some(folder);
        self
    }

    pub fn scan_types(mut self, scan_types: ScanTypes) -> Self {
        self.scan.scan_types = scan_types;
        self
    }

    pub fn degrees_of_parallelism(mut self, degrees: usize) -> Self {
        self.scan.degrees_of_parallelism = degrees;
        self
    }

    pub fn skip_repository_init(mut self, skip: bool) -> Self {
        self.scan.skip_repository_init = skip;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.scan.event_buffer_size = size;
        self
    }

    pub fn background_refresh(mut self, enabled: bool) -> Self {
        self.scan.background_refresh = enabled;
        self
    }

    pub fn image_cache_capacity(mut self, capacity: usize) -> Self {
        self.scan.image_cache_capacity = capacity;
        self
    }

    pub fn scan_settings(mut self, settings: ScanSettings) -> Self {
        self.scan = settings;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when the root folder or the metadata
    ///   storage folder was not provided
    /// - [`Error::Config`] when a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let root_folder = self.root_folder.ok_or_else(|| Error::CapabilityMissing {
            capability: "StorageFolder".to_string(),
            message: "No root folder provided. Use .root_folder() to choose what to scan."
                .to_string(),
        })?;

        let metadata_storage = self
            .metadata_storage
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "ModifiableFolder".to_string(),
                message: "No metadata storage folder provided. \
                          Use .metadata_storage() to choose where the cache lives."
                    .to_string(),
            })?;

        let config = CoreConfig {
            instance_id: self.instance_id.unwrap_or_else(|| "default".to_string()),
            root_folder,
            metadata_storage,
            scan: self.scan,
        };

        config.validate()?;
        Ok(config)
    }
}
