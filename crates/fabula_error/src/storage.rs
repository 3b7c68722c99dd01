//! Checkpoint storage error types.

/// Specific error conditions for checkpoint store operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum StorageErrorKind {
    /// Failed to read an artifact
    #[display("Failed to read checkpoint '{}/{}': {}", run_id, phase, message)]
    ReadFailed {
        /// Run identifier
        run_id: String,
        /// Phase name
        phase: String,
        /// Underlying error
        message: String,
    },
    /// Failed to write an artifact
    #[display("Failed to write checkpoint '{}/{}': {}", run_id, phase, message)]
    WriteFailed {
        /// Run identifier
        run_id: String,
        /// Phase name
        phase: String,
        /// Underlying error
        message: String,
    },
    /// Failed to append to the event log
    #[display("Failed to append event log entry: {}", _0)]
    LogFailed(String),
    /// Store directory could not be created
    #[display("Failed to initialize store directory: {}", _0)]
    InitFailed(String),
}

/// Error type for checkpoint store operations.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Storage Error: {} at line {} in {}", kind, line, file)]
pub struct StorageError {
    /// The specific error condition
    pub kind: StorageErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl StorageError {
    /// Create a new StorageError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StorageErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
