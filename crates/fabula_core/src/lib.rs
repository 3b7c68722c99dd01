//! Core data types for the Fabula story pipeline.
//!
//! This crate holds the full data model owned by a pipeline run — cast,
//! blueprint, variant plan, scene directives, canon-fusion plan, story draft,
//! quality report, image specs — plus the thin LLM plumbing types
//! (messages, generate request/response, token usage and budgets) shared by
//! every other Fabula crate.
//!
//! All artifacts are serde-serializable: each one is persisted to the
//! checkpoint store keyed by `(run_id, phase)`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod blueprint;
mod canon;
mod cast;
mod config;
mod directive;
mod draft;
mod image;
mod message;
mod quality;
mod request;
mod role;
mod run;
mod usage;
mod variant;

pub use blueprint::{ArtifactUsage, Blueprint, BlueprintScene, Mood};
pub use canon::{CanonFusionPlan, ChapterBeat, CharacterArc, IntroStyle};
pub use cast::{Artifact, CastSet, CharacterSheet, IntegrationPlan, MatchScore, RoleType, SlotKey};
pub use config::{ConfigCache, PipelineConfig};
pub use directive::SceneDirective;
pub use draft::{Chapter, StoryDraft};
pub use image::{AssetId, GeneratedImage, ImageSpec, ImageSpecIssue, ImageSpecIssueCode};
pub use message::Message;
pub use quality::{
    GateName, QualityGateCode, QualityIssue, QualityReport, Severity, ValidationReport,
};
pub use request::{
    GenerateRequest, GenerateRequestBuilder, GenerateRequestBuilderError, GenerateResponse,
};
pub use role::Role;
pub use run::{
    Language, LengthHint, NormalizedRequest, PhaseName, PipelineRunResult, RunId, RunStatus,
    StoryCategory, WordBudget,
};
pub use usage::{RunBudget, TokenUsage};
pub use variant::{ChapterOverride, VariantAxis, VariantPlan};
