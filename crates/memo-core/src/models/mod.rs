//! Data models for Memo

mod identity;
mod note;
mod snapshot;

pub mod timestamp;

pub use identity::Identity;
pub use note::{Note, NoteId, RawNote, DEFAULT_TITLE};
pub use snapshot::{Sanitized, Snapshot};
