//! obdl-feed library interface
//!
//! Client-side reconciliation of the OBD logger event feed: polls the
//! backend for event statuses and keeps a card view in sync with them,
//! along with user-owned expansion flags and labels.

pub mod client;
pub mod commands;
pub mod engine;
pub mod error;
pub mod label_edit;
pub mod overrides;
pub mod reconcile;
pub mod removal;
pub mod render;
pub mod retry;
pub mod runtime;
pub mod ticker;
pub mod view;

pub use crate::engine::{ApplyOutcome, FeedEngine};
pub use crate::error::{FeedError, FeedResult};
pub use crate::runtime::{FeedRuntime, RuntimeEvent, RuntimeOptions};
