//! Cast types: characters, artifacts, slots, and slot assignments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named role placeholder bound to a concrete character or artifact for
/// one run (e.g. `SLOT_AVATAR_1`).
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub struct SlotKey(pub String);

impl SlotKey {
    /// The first avatar slot.
    pub fn avatar(index: u32) -> Self {
        Self(format!("SLOT_AVATAR_{index}"))
    }

    /// A pool-character slot.
    pub fn pool(index: u32) -> Self {
        Self(format!("SLOT_POOL_{index}"))
    }

    /// The artifact slot.
    pub fn artifact() -> Self {
        Self("SLOT_ARTIFACT_1".to_string())
    }

    /// Whether this slot refers to the artifact rather than a character.
    pub fn is_artifact(&self) -> bool {
        self.0.starts_with("SLOT_ARTIFACT")
    }
}

impl From<&str> for SlotKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Narrative role of a cast member.
///
/// Closed enumeration: the personality/action tables in the canon-fusion
/// planner and the conflict-potential table in the match scorer are indexed
/// by this type with exhaustive matching.
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
pub enum RoleType {
    /// The player's own character
    Avatar,
    /// A friendly sidekick from the character pool
    Companion,
    /// A wise guide
    Mentor,
    /// A competitive counterpart
    Rival,
    /// A protective presence
    Guardian,
    /// A mischievous wildcard
    Trickster,
}

/// One scored pairing of this character against a slot requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    /// Slot the score was computed for
    pub slot: SlotKey,
    /// Final combined score in [0, 1]
    pub score: f64,
}

/// Full description of one character, as consumed by prompt builders and
/// image spec generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSheet {
    /// Stable character id
    pub id: String,
    /// Name used in prose and prompts
    pub display_name: String,
    /// Narrative role
    pub role: RoleType,
    /// Free-form archetype tag (e.g. "brave explorer")
    pub archetype: String,
    /// Personality keywords, dominant first
    pub personality: Vec<String>,
    /// Visual tokens that must survive into every image prompt
    pub visual_signature: Vec<String>,
    /// Outfit elements locked across all chapters
    pub outfit_lock: Vec<String>,
    /// Visual elements that must never appear
    pub forbidden: Vec<String>,
    /// Optional signature line, used in at most one chapter
    pub catchphrase: Option<String>,
    /// How often this pool character has been used in prior runs
    pub usage_count: u32,
    /// Precomputed slot match scores
    pub match_scores: Vec<MatchScore>,
}

/// The story's central object (e.g. a magic stone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable artifact id
    pub id: String,
    /// Name used in prose and prompts
    pub display_name: String,
    /// Visual tokens for image prompts
    pub visual_signature: Vec<String>,
}

/// The resolved cast for one run.
///
/// Invariant: every slot referenced by any directive resolves to exactly one
/// character or the artifact; semantic lists on each sheet are non-empty
/// after repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CastSet {
    /// Player avatars
    pub avatars: Vec<CharacterSheet>,
    /// Non-player pool characters (at most 2 after repair)
    pub pool_characters: Vec<CharacterSheet>,
    /// Optional central artifact
    pub artifact: Option<Artifact>,
    /// Slot bindings for this run
    pub slot_assignments: BTreeMap<SlotKey, String>,
}

impl CastSet {
    /// Look up the character bound to a slot, if any.
    pub fn character_for_slot(&self, slot: &SlotKey) -> Option<&CharacterSheet> {
        let id = self.slot_assignments.get(slot)?;
        self.avatars
            .iter()
            .chain(self.pool_characters.iter())
            .find(|c| &c.id == id)
    }

    /// All character sheets, avatars first.
    pub fn all_characters(&self) -> impl Iterator<Item = &CharacterSheet> {
        self.avatars.iter().chain(self.pool_characters.iter())
    }

    /// Whether a slot resolves to a character or to the artifact.
    pub fn resolves(&self, slot: &SlotKey) -> bool {
        if slot.is_artifact() {
            return self.artifact.is_some();
        }
        self.character_for_slot(slot).is_some()
    }
}

/// Which slots are on stage in each chapter, derived from the blueprint and
/// the resolved cast before directives are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IntegrationPlan {
    /// Chapter number (1-based) to on-stage slots
    pub chapter_slots: BTreeMap<u32, Vec<SlotKey>>,
}
