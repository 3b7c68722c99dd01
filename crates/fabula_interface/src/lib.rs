//! Trait definitions for the Fabula story pipeline.
//!
//! The pipeline core depends only on these seams; concrete providers,
//! stores, and validators live in other crates (or in the caller).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod schema;
mod store;
mod traits;

pub use schema::{SchemaReport, SchemaValidator};
pub use store::{CheckpointStore, LogEvent};
pub use traits::{ImageGenerator, TextGenerator, VisionValidator};
