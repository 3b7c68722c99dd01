//! Scene directives: one structured generation directive per chapter.

use crate::{ArtifactUsage, Mood, SlotKey};
use serde::{Deserialize, Serialize};

/// One per-chapter directive handed to the text and image generators.
///
/// Invariants (enforced by the directive builder):
/// - `characters_on_stage` holds no duplicates
/// - blueprint-mandated slots and the artifact slot (when the scene's
///   artifact policy requires it) are always present
/// - `image_must_show` is capped at 10 unique items, `image_avoid` at 30
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDirective {
    /// 1-based chapter number
    pub chapter: u32,
    /// Scene title carried from the blueprint
    pub title: String,
    /// Setting after variant overrides
    pub setting: String,
    /// Emotional register
    pub mood: Mood,
    /// On-stage slots, deduplicated, in stable order
    pub characters_on_stage: Vec<SlotKey>,
    /// Scene goal after variant overrides
    pub goal: String,
    /// Scene conflict after variant overrides
    pub conflict: String,
    /// Scene outcome after variant overrides
    pub outcome: String,
    /// Artifact participation
    pub artifact_usage: ArtifactUsage,
    /// Optional anchor line quoted verbatim in prompts
    pub canon_anchor_line: Option<String>,
    /// Tokens the chapter image must show (≤ 10)
    pub image_must_show: Vec<String>,
    /// Tokens the chapter image must avoid (≤ 30)
    pub image_avoid: Vec<String>,
}

impl SceneDirective {
    /// Whether this scene requires the artifact on stage.
    pub fn requires_artifact(&self) -> bool {
        self.artifact_usage == ArtifactUsage::Central
    }
}
