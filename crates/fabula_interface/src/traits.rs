//! Trait definitions for generative providers.

use async_trait::async_trait;
use fabula_core::{GenerateRequest, GenerateResponse, GeneratedImage, ImageSpec, TokenUsage};
use fabula_error::FabulaResult;

/// Core trait all text providers must implement.
///
/// The pipeline only requires this capability: generate content for a
/// prompt under constraints, or fail. Timeouts and retries are the
/// provider client's responsibility; the pipeline treats a timeout like
/// any other call failure.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate model output for a multimessage request.
    async fn generate(&self, req: &GenerateRequest) -> FabulaResult<GenerateResponse>;

    /// Provider name (e.g. "anthropic", "openai", "gemini").
    fn provider_name(&self) -> &'static str;

    /// Model identifier.
    fn model_name(&self) -> &str;
}

/// Trait for providers that render chapter illustrations.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Render one chapter illustration from a validated spec.
    async fn render(&self, spec: &ImageSpec) -> FabulaResult<(GeneratedImage, TokenUsage)>;

    /// Provider name.
    fn provider_name(&self) -> &'static str;
}

/// Optional trait for providers that can check a rendered image against its
/// spec (vision validation). Implementations return a list of human-readable
/// findings; an empty list means the image passed.
#[async_trait]
pub trait VisionValidator: Send + Sync {
    /// Check a rendered image against the spec it was generated from.
    async fn check(&self, spec: &ImageSpec, image: &GeneratedImage)
    -> FabulaResult<Vec<String>>;
}
