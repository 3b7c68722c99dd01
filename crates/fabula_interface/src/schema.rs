//! Schema validation seam.

use fabula_core::{CastSet, ImageSpec, SceneDirective, VariantPlan};

/// Outcome of validating one artifact. Never an error: validators report,
/// callers decide.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct SchemaReport {
    /// Whether the artifact satisfied its schema
    pub valid: bool,
    /// Human-readable violations, empty when valid
    pub errors: Vec<String>,
}

impl SchemaReport {
    /// A passing report.
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing report with the given violations.
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Validates pipeline artifacts against their fixed schemas.
///
/// Implementations must never panic or return transport errors; a broken
/// artifact yields `valid: false` with messages.
pub trait SchemaValidator: Send + Sync {
    /// Validate a cast set.
    fn validate_cast(&self, cast: &CastSet) -> SchemaReport;

    /// Validate a scene directive.
    fn validate_directive(&self, directive: &SceneDirective) -> SchemaReport;

    /// Validate an image spec.
    fn validate_image_spec(&self, spec: &ImageSpec) -> SchemaReport;

    /// Validate a variant plan.
    fn validate_variant_plan(&self, plan: &VariantPlan) -> SchemaReport;
}
