//! Error types for the Fabula story pipeline.
//!
//! This crate provides the foundation error types used throughout the Fabula
//! workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use fabula_error::{FabulaResult, ProviderError, ProviderErrorKind};
//!
//! fn call_provider() -> FabulaResult<String> {
//!     Err(ProviderError::new(ProviderErrorKind::RequestFailed(
//!         "connection refused".to_string(),
//!     )))?
//! }
//!
//! assert!(call_provider().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod json;
mod pipeline;
mod provider;
mod storage;

pub use error::{FabulaError, FabulaErrorKind, FabulaResult};
pub use json::JsonError;
pub use pipeline::{PipelineError, PipelineErrorKind};
pub use provider::{ProviderError, ProviderErrorKind};
pub use storage::{StorageError, StorageErrorKind};
