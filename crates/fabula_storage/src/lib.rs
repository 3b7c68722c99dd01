//! Checkpoint stores for the Fabula story pipeline.
//!
//! Two implementations of [`fabula_interface::CheckpointStore`]:
//! - [`MemoryStore`] for tests and embedding
//! - [`FilesystemStore`] persisting one JSON file per `(run_id, phase)` plus
//!   an append-only JSONL event log per run

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod filesystem;
mod memory;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
