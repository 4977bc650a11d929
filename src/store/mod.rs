//! Node Storage Engine
//!
//! A versioned in-memory map, optionally mirrored to a single JSON snapshot file.
//!
//! ## Core Concepts
//! - **Versioning**: Every entry carries a caller-assigned version. A write never replaces
//!   an entry holding a strictly higher version (last-writer-wins, ties go to the newer call).
//! - **Persistence**: The whole map is loaded from the backing file on open and rewritten
//!   wholesale by a background worker, batched by time and by number of pending changes.
//! - **Locking**: One mutex guards the map and the file handle; the flush takes the same
//!   lock so every snapshot is consistent.

pub mod engine;
pub mod types;

pub use engine::{FLUSH_BATCH_THRESHOLD, StorageEngine};
pub use types::Entry;
