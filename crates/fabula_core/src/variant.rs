//! Variant plan types: seeded narrative variety over a fixed blueprint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named variant axis sampled independently per run.
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
pub enum VariantAxis {
    /// Where the story takes place
    Setting,
    /// Who or what the protagonists meet
    Encounter,
    /// What the artifact does
    ArtifactFunction,
    /// How the rescue plays out
    Rescue,
    /// The late-story twist
    Twist,
}

/// Textual deltas applied to a single chapter's directive fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChapterOverride {
    /// 1-based chapter this override targets
    pub chapter: u32,
    /// Replacement setting, if any
    pub setting: Option<String>,
    /// Replacement goal, if any
    pub goal: Option<String>,
    /// Replacement conflict, if any
    pub conflict: Option<String>,
    /// Replacement outcome, if any
    pub outcome: Option<String>,
}

/// Deterministic variant selection for one run.
///
/// Invariant: identical `(seed, category)` yields identical
/// `variant_choices` — the plan is a pure function of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPlan {
    /// The seed the plan was drawn from
    pub seed: u64,
    /// One chosen value per sampled axis
    pub variant_choices: BTreeMap<VariantAxis, String>,
    /// Up to 3 chapter-scoped textual overrides
    pub scene_overrides: Vec<ChapterOverride>,
}

impl VariantPlan {
    /// The override targeting a chapter, if one was sampled.
    pub fn override_for(&self, chapter: u32) -> Option<&ChapterOverride> {
        self.scene_overrides.iter().find(|o| o.chapter == chapter)
    }
}
