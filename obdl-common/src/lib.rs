//! # OBD Logger Common Library
//!
//! Shared code for the OBD logger feed client, including:
//! - Error type and result alias
//! - Event feed data model (keys, statuses, snapshots)
//! - Configuration loading and resolution
//! - Timestamp key decoding and artifact reference helpers

pub mod config;
pub mod error;
pub mod events;
pub mod timestamp;

pub use error::{Error, Result};
pub use events::{EventKey, EventRecord, EventStatus, Snapshot};
