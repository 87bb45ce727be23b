//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the metadata scanning engine:
//! - Logging and tracing bootstrap
//! - Configuration and scan-mode flags
//! - Event bus for scan progress
//!
//! ## Overview
//!
//! Every other `core-*` crate depends on this one for its configuration
//! types, its logging conventions and the broadcast channel progress is
//! published on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
