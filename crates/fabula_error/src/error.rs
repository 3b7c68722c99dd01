//! Top-level error wrapper types.

use crate::{JsonError, PipelineError, ProviderError, StorageError};

/// Foundation error enum for the Fabula workspace.
///
/// # Examples
///
/// ```
/// use fabula_error::{FabulaError, JsonError};
///
/// let json_err = JsonError::new("unexpected token");
/// let err: FabulaError = json_err.into();
/// assert!(format!("{}", err).contains("JSON Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum FabulaErrorKind {
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
    /// Generative provider error
    #[from(ProviderError)]
    Provider(ProviderError),
    /// Checkpoint storage error
    #[from(StorageError)]
    Storage(StorageError),
    /// Pipeline execution error
    #[from(PipelineError)]
    Pipeline(PipelineError),
}

/// Fabula error with kind discrimination.
///
/// # Examples
///
/// ```
/// use fabula_error::{FabulaResult, StorageError, StorageErrorKind};
///
/// fn might_fail() -> FabulaResult<()> {
///     Err(StorageError::new(StorageErrorKind::LogFailed("disk full".into())))?
/// }
///
/// assert!(might_fail().is_err());
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Fabula Error: {}", _0)]
pub struct FabulaError(Box<FabulaErrorKind>);

impl FabulaError {
    /// Create a new error from a kind.
    pub fn new(kind: FabulaErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &FabulaErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to FabulaErrorKind
impl<T> From<T> for FabulaError
where
    T: Into<FabulaErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Fabula operations.
pub type FabulaResult<T> = std::result::Result<T, FabulaError>;
