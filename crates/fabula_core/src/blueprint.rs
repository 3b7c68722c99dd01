//! Fixed narrative blueprints: the per-category scene templates.

use crate::{SlotKey, StoryCategory};
use serde::{Deserialize, Serialize};

/// Emotional register of a scene. Drives catchphrase placement scoring and
/// the tension-arc quality gate.
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
pub enum Mood {
    /// Victory and payoff
    Triumph,
    /// Danger and suspense
    Tense,
    /// Wonder and secrets
    Mysterious,
    /// Lighthearted comedy
    Funny,
    /// Quiet and restorative
    Calm,
    /// Loss or longing
    Sad,
}

/// How the artifact participates in a scene.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display, Default,
)]
pub enum ArtifactUsage {
    /// Artifact does not appear
    #[default]
    Absent,
    /// Artifact is visible but passive
    Present,
    /// Artifact actively drives the scene and must appear in the image
    Central,
}

/// One templated scene beat in a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintScene {
    /// 1-based scene/chapter index
    pub index: u32,
    /// Scene title
    pub title: String,
    /// Default setting
    pub setting: String,
    /// Emotional register
    pub mood: Mood,
    /// What the protagonists want here
    pub goal: String,
    /// What stands in the way
    pub conflict: String,
    /// How the scene resolves
    pub outcome: String,
    /// Slots that must be on stage regardless of variant choices
    pub mandatory_slots: Vec<SlotKey>,
    /// Artifact participation
    pub artifact_usage: ArtifactUsage,
    /// Scene-level image avoid list
    pub avoid: Vec<String>,
    /// Optional anchor line quoted verbatim in the prompt
    pub canon_anchor: Option<String>,
}

/// Fixed narrative template for a story category.
///
/// Blueprints are static data: variant planning perturbs their scenes but
/// never changes their structure or ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Category this blueprint serves
    pub category: StoryCategory,
    /// Ordered scene beats, one per chapter
    pub scenes: Vec<BlueprintScene>,
}

impl Blueprint {
    /// The scene for a 1-based chapter number, if within range.
    pub fn scene(&self, chapter: u32) -> Option<&BlueprintScene> {
        self.scenes.iter().find(|s| s.index == chapter)
    }
}
