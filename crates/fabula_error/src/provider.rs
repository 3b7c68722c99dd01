//! Generative provider error types.

/// Specific error conditions for generative provider calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ProviderErrorKind {
    /// The provider request failed (network, auth, server-side)
    #[display("Provider request failed: {}", _0)]
    RequestFailed(String),
    /// The provider call timed out
    #[display("Provider call timed out after {}s", _0)]
    Timeout(u64),
    /// The provider returned an empty response
    #[display("Provider returned an empty response")]
    EmptyResponse,
    /// The response could not be parsed into the expected shape
    #[display("Malformed provider response: {}", _0)]
    MalformedResponse(String),
    /// The provider rejected the request content
    #[display("Provider rejected request: {}", _0)]
    Rejected(String),
}

/// Error type for generative provider operations.
///
/// # Examples
///
/// ```
/// use fabula_error::{ProviderError, ProviderErrorKind};
///
/// let err = ProviderError::new(ProviderErrorKind::EmptyResponse);
/// assert!(format!("{}", err).contains("empty"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Provider Error: {} at line {} in {}", kind, line, file)]
pub struct ProviderError {
    /// The specific error condition
    pub kind: ProviderErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl ProviderError {
    /// Create a new ProviderError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ProviderErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
