//! Pipeline error types.

/// Specific error conditions for pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum PipelineErrorKind {
    /// A phase failed terminally
    #[display("Phase '{}' failed: {}", phase, message)]
    PhaseFailed {
        /// Phase name
        phase: String,
        /// Failure description
        message: String,
    },
    /// Cast repair could not satisfy the schema
    #[display("Cast repair failed schema validation: {}", _0)]
    CastRepairFailed(String),
    /// A quality error with no automated recovery path
    #[display("Unrecoverable quality error: {}", _0)]
    QualityUnrecoverable(String),
    /// The blueprint for the requested category is missing a scene
    #[display("Blueprint for category '{}' has no scenes", _0)]
    EmptyBlueprint(String),
    /// Configuration error
    #[display("Configuration error: {}", _0)]
    Configuration(String),
}

/// Error type for pipeline operations.
///
/// # Examples
///
/// ```
/// use fabula_error::{PipelineError, PipelineErrorKind};
///
/// let err = PipelineError::new(PipelineErrorKind::CastRepairFailed(
///     "pool character missing visual signature".to_string(),
/// ));
/// assert!(format!("{}", err).contains("repair"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Pipeline Error: {} at line {} in {}", kind, line, file)]
pub struct PipelineError {
    /// The specific error condition
    pub kind: PipelineErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl PipelineError {
    /// Create a new PipelineError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: PipelineErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
