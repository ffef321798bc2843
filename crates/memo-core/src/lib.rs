//! memo-core - Core library for Memo
//!
//! This crate contains the note model, the in-memory note store, the merge
//! engine that reconciles local and remote snapshots, and the sync machinery
//! (debounced scheduling, remote session lifecycle) used by every Memo client.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod import;
pub mod local;
pub mod merge;
pub mod models;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod store;
pub mod util;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use merge::{pull_merge, push_merge, MergeDirection};
pub use models::{Identity, Note, NoteId, RawNote, Snapshot};
pub use store::NoteStore;
