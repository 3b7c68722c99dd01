//! Run identity, request normalization, and the fixed phase sequence.

use crate::{
    CastSet, GeneratedImage, ImageSpec, SceneDirective, StoryDraft, TokenUsage, ValidationReport,
    VariantPlan,
};
use serde::{Deserialize, Serialize};

/// Identity for one story generation run.
///
/// Never reused across requests; the run id is the idempotency key for all
/// checkpointed artifacts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Generate a fresh run id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Lifecycle status of a pipeline run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum RunStatus {
    /// The run is executing phases
    Running,
    /// All phases completed; draft and images are persisted
    Complete,
    /// A phase failed terminally; the error message is persisted
    Error,
}

/// The fixed, linearly ordered phase sequence.
///
/// Phases never form a DAG; the orchestrator executes them in declaration
/// order and `strum::EnumIter` iterates them in that same order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum PhaseName {
    /// Canonicalize the user request
    NormalizeRequest,
    /// Load the fixed narrative blueprint for the category
    Blueprint,
    /// Seeded variant planning
    VariantPlan,
    /// Cast resolution and repair
    Cast,
    /// Chapter-by-chapter slot integration
    IntegrationPlan,
    /// One structured directive per chapter
    SceneDirectives,
    /// Per-character entry/active/exit beats and catchphrase placement
    CanonFusion,
    /// Generated story text plus the revision loop
    StoryText,
    /// Final quality report for the accepted draft
    QualityReport,
    /// Per-chapter image generation specs
    ImageSpecs,
    /// Generated images
    Images,
    /// Final validation report
    Validation,
}

/// Story language. Phrase tables and banned-phrase lists are bilingual.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    Default,
)]
pub enum Language {
    /// German
    #[default]
    De,
    /// English
    En,
}

/// Narrative category selecting the blueprint and variant tables.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumIter,
)]
pub enum StoryCategory {
    /// Quest-style adventure
    Adventure,
    /// Classic fairytale
    Fairytale,
    /// Gentle mystery
    Mystery,
    /// Friendship and everyday life
    Friendship,
    /// Space and science wonder
    Space,
}

/// Coarse length hint from the user request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display, Default,
)]
pub enum LengthHint {
    /// Bedtime-short chapters
    Short,
    /// Standard chapters
    #[default]
    Medium,
    /// Long-form chapters
    Long,
}

impl LengthHint {
    /// Target words per chapter for this hint.
    pub fn words_per_chapter(&self) -> usize {
        match self {
            LengthHint::Short => 150,
            LengthHint::Medium => 250,
            LengthHint::Long => 400,
        }
    }
}

/// Word-count bounds derived from the length hint and chapter count.
///
/// # Examples
///
/// ```
/// use fabula_core::{LengthHint, WordBudget};
///
/// let budget = WordBudget::derive(LengthHint::Medium, 5);
/// assert!(budget.min_words_per_chapter < budget.max_words_per_chapter);
/// assert!(budget.min_total_words < budget.max_total_words);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordBudget {
    /// Minimum total word count across all chapters
    pub min_total_words: usize,
    /// Maximum total word count across all chapters
    pub max_total_words: usize,
    /// Minimum word count per chapter
    pub min_words_per_chapter: usize,
    /// Maximum word count per chapter
    pub max_words_per_chapter: usize,
}

impl WordBudget {
    /// Derive bounds from a length hint and chapter count.
    ///
    /// Per-chapter bounds are 60%–160% of the hint's target; totals scale
    /// by chapter count with slack for title framing.
    pub fn derive(hint: LengthHint, chapter_count: u32) -> Self {
        let target = hint.words_per_chapter();
        let min_per = target * 6 / 10;
        let max_per = target * 16 / 10;
        let chapters = chapter_count.max(1) as usize;
        Self {
            min_total_words: min_per * chapters,
            max_total_words: max_per * chapters,
            min_words_per_chapter: min_per,
            max_words_per_chapter: max_per,
        }
    }
}

/// Canonicalized user input. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct NormalizedRequest {
    /// Story language
    language: Language,
    /// Reader age range (inclusive)
    age_range: (u8, u8),
    /// Number of chapters to generate
    chapter_count: u32,
    /// Coarse length hint
    length_hint: LengthHint,
    /// Seed for all deterministic planning
    seed: u64,
    /// Narrative category
    category: StoryCategory,
}

impl NormalizedRequest {
    /// Create a normalized request, clamping degenerate inputs.
    ///
    /// Chapter count is clamped to 1..=12 and the age range is reordered if
    /// given backwards.
    pub fn new(
        language: Language,
        age_range: (u8, u8),
        chapter_count: u32,
        length_hint: LengthHint,
        seed: u64,
        category: StoryCategory,
    ) -> Self {
        let age_range = if age_range.0 <= age_range.1 {
            age_range
        } else {
            (age_range.1, age_range.0)
        };
        Self {
            language,
            age_range,
            chapter_count: chapter_count.clamp(1, 12),
            length_hint,
            seed,
            category,
        }
    }

    /// The word budget derived from this request.
    pub fn word_budget(&self) -> WordBudget {
        WordBudget::derive(self.length_hint, self.chapter_count)
    }
}

/// The produced artifact consumed by the presentation layer.
///
/// Fields are optional because an errored run persists only the artifacts
/// produced before the failing phase.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineRunResult {
    /// Run identity
    pub run_id: Option<RunId>,
    /// Terminal status
    pub status: Option<RunStatus>,
    /// Canonicalized request
    pub normalized_request: Option<NormalizedRequest>,
    /// Seeded variant plan
    pub variant_plan: Option<VariantPlan>,
    /// Resolved and repaired cast
    pub cast_set: Option<CastSet>,
    /// One directive per chapter
    pub scene_directives: Option<Vec<SceneDirective>>,
    /// The accepted story draft
    pub story_draft: Option<StoryDraft>,
    /// Validated per-chapter image specs
    pub image_specs: Option<Vec<ImageSpec>>,
    /// Generated images
    pub images: Option<Vec<GeneratedImage>>,
    /// Final validation report (always present on terminal runs)
    pub validation_report: Option<ValidationReport>,
    /// Cumulative token usage across all generative calls
    pub token_usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_clamps_degenerate_input() {
        let req = NormalizedRequest::new(
            Language::De,
            (9, 4),
            0,
            LengthHint::Short,
            7,
            StoryCategory::Adventure,
        );
        assert_eq!(*req.age_range(), (4, 9));
        assert_eq!(*req.chapter_count(), 1);
    }

    #[test]
    fn test_word_budget_scales_with_chapters() {
        let five = WordBudget::derive(LengthHint::Medium, 5);
        let ten = WordBudget::derive(LengthHint::Medium, 10);
        assert_eq!(five.min_total_words * 2, ten.min_total_words);
        assert_eq!(five.min_words_per_chapter, ten.min_words_per_chapter);
    }

    #[test]
    fn test_phase_order_is_declaration_order() {
        use strum::IntoEnumIterator;
        let phases: Vec<PhaseName> = PhaseName::iter().collect();
        assert_eq!(phases.first(), Some(&PhaseName::NormalizeRequest));
        assert_eq!(phases.last(), Some(&PhaseName::Validation));
        assert_eq!(phases.len(), 12);
    }
}
