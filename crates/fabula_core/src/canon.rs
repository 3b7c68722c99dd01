//! Canon-fusion types: per-character arcs that make pool characters read as
//! native to the story instead of pasted in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Narrative style of a character's introduction, fixed by role type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum IntroStyle {
    /// Eases in over a few sentences
    Gradual,
    /// Arrives on a story beat
    Dramatic,
    /// Simply there, no ceremony
    Casual,
    /// Hinted at before appearing
    Mysterious,
}

/// Per-chapter behavior cue for one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterBeat {
    /// Why the character acts in this chapter
    pub motivation: String,
    /// One concrete on-page action
    pub action: String,
}

/// Entry/active/exit beats for one character across the whole story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterArc {
    /// First chapter the character is on stage
    pub entry_point: u32,
    /// Introduction style, fixed by role type
    pub intro_style: IntroStyle,
    /// Intro hook sentence for the entry chapter
    pub intro_hook: String,
    /// All chapters the character is on stage, ascending
    pub active_chapters: Vec<u32>,
    /// Per-chapter behavior cues keyed by chapter
    pub beats: BTreeMap<u32, ChapterBeat>,
    /// Last on-stage chapter when the character exits before the story ends
    pub exit_point: Option<u32>,
    /// Farewell line plus emotional note for an early exit
    pub farewell: Option<String>,
    /// One-line personality summary injected into prompts
    pub personality_profile: String,
    /// The single chapter chosen for the character's catchphrase, if any.
    /// Assigned at most once per character per plan.
    pub catchphrase_chapter: Option<u32>,
}

/// The whole canon-fusion plan for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CanonFusionPlan {
    /// Per-character arcs keyed by character id
    pub arcs: BTreeMap<String, CharacterArc>,
    /// Derived artifact storyline summary
    pub artifact_arc: Option<String>,
    /// Fixed "pasted-on" phrases the draft must never contain
    pub banned_phrases: Vec<String>,
    /// Chapter-indexed prompt-injection text for the text generator
    pub prompt_sections: BTreeMap<u32, String>,
}

impl CanonFusionPlan {
    /// All catchphrase chapter assignments, one entry per assigned character.
    pub fn catchphrase_assignments(&self) -> impl Iterator<Item = (&str, u32)> {
        self.arcs
            .iter()
            .filter_map(|(id, arc)| arc.catchphrase_chapter.map(|c| (id.as_str(), c)))
    }
}
