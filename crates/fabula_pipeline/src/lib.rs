//! Story generation pipeline engine for Fabula.
//!
//! This crate holds the engineering core of the system: the deterministic
//! planning stages (variant planner, cast normalizer, directive builder,
//! canon-fusion planner), the rule-based quality gate engine, the bounded
//! revision controller that decides when and how to re-invoke the generative
//! model, the phase orchestrator with idempotent checkpointing, and the
//! image-spec validator.
//!
//! Data flows strictly forward:
//!
//! ```text
//! request → blueprint → variant plan → cast → integration plan
//!         → directives → canon fusion → draft → quality report
//!         → (revision loop) → image specs → images → result
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod blueprints;
mod canon;
mod cast;
mod directive;
mod extraction;
mod image_spec;
mod orchestrator;
mod prompts;
mod quality;
mod revision;
mod sanitize;
mod schema;
mod text;
mod variant;

pub use blueprints::blueprint_for;
pub use canon::{CanonFusionPlanner, detect_banned_phrases};
pub use cast::{
    CastNormalizer, MatchScoreBreakdown, SlotRequirements, build_integration_plan, score_match,
};
pub use directive::DirectiveBuilder;
pub use extraction::{extract_json, parse_json};
pub use image_spec::{ImageSpecValidator, build_image_specs};
pub use orchestrator::{Orchestrator, StoryRequest};
pub use prompts::{chapter_edit_request, polish_request, rewrite_request, story_request};
pub use quality::QualityGateEngine;
pub use revision::{RevisionController, RevisionOutcome, RevisionStatus};
pub use sanitize::sanitize_draft;
pub use schema::DefaultSchemaValidator;
pub use variant::plan_variants;
