//! Cast resolution: repair of incoming cast sets, slot match scoring, and
//! the chapter-by-chapter integration plan.
//!
//! The cast phase receives character sheets from upstream storage in
//! whatever state they were saved. Repair is mandatory and deterministic;
//! only a cast that still fails schema validation after repair aborts the
//! run.

use crate::schema::DefaultSchemaValidator;
use fabula_core::{
    Blueprint, CastSet, CharacterSheet, IntegrationPlan, MatchScore, RoleType, SlotKey,
};
use fabula_error::{FabulaResult, PipelineError, PipelineErrorKind};
use fabula_interface::SchemaValidator;
use tracing::{debug, warn};

/// Pool characters kept after repair.
const MAX_POOL_CHARACTERS: usize = 2;

/// Match scores kept per sheet after repair, best first.
const MAX_MATCH_SCORES: usize = 40;

/// What a slot wants from the character bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRequirements {
    /// Slot being filled
    pub slot: SlotKey,
    /// Roles that fit the slot natively
    pub preferred_roles: Vec<RoleType>,
    /// Theme keywords matched against archetype and personality
    pub keywords: Vec<String>,
}

/// The four subscores behind one match score, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScoreBreakdown {
    /// Role matches a preferred role of the slot
    pub role_fit: f64,
    /// Share of requirement keywords found on the sheet
    pub keyword_fit: f64,
    /// Friction the role brings to a scene, by role table
    pub conflict_potential: f64,
    /// Visual signature richness, saturating at four tokens
    pub visual_distinctness: f64,
    /// Penalty for pool characters used often in prior runs
    pub overuse_penalty: f64,
}

impl MatchScoreBreakdown {
    /// Combined score: mean of the four subscores minus the overuse penalty,
    /// clamped to [0, 1].
    pub fn total(&self) -> f64 {
        let mean = (self.role_fit
            + self.keyword_fit
            + self.conflict_potential
            + self.visual_distinctness)
            / 4.0;
        (mean - self.overuse_penalty).clamp(0.0, 1.0)
    }
}

/// How much friction a role naturally brings into a scene.
fn conflict_potential(role: RoleType) -> f64 {
    match role {
        RoleType::Avatar => 0.5,
        RoleType::Companion => 0.4,
        RoleType::Mentor => 0.3,
        RoleType::Rival => 0.9,
        RoleType::Guardian => 0.5,
        RoleType::Trickster => 0.8,
    }
}

/// Score one character against one slot's requirements.
///
/// Pure function of the sheet and the requirements; the normalizer calls it
/// when binding pool slots, and tooling can call it to explain a binding.
pub fn score_match(sheet: &CharacterSheet, req: &SlotRequirements) -> MatchScoreBreakdown {
    let role_fit = if req.preferred_roles.contains(&sheet.role) {
        1.0
    } else {
        0.4
    };

    let keyword_fit = if req.keywords.is_empty() {
        0.5
    } else {
        let haystack = format!(
            "{} {}",
            sheet.archetype.to_lowercase(),
            sheet.personality.join(" ").to_lowercase()
        );
        let hits = req
            .keywords
            .iter()
            .filter(|k| haystack.contains(&k.to_lowercase()))
            .count();
        hits as f64 / req.keywords.len() as f64
    };

    let visual_distinctness = (sheet.visual_signature.len() as f64 / 4.0).min(1.0);
    let overuse_penalty = (sheet.usage_count as f64 / 100.0).min(0.2);

    MatchScoreBreakdown {
        role_fit,
        keyword_fit,
        conflict_potential: conflict_potential(sheet.role),
        visual_distinctness,
        overuse_penalty,
    }
}

/// Repairs incoming cast sets and enforces the cast schema.
pub struct CastNormalizer {
    validator: DefaultSchemaValidator,
}

impl Default for CastNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CastNormalizer {
    /// Create a normalizer backed by the default schema validator.
    pub fn new() -> Self {
        Self {
            validator: DefaultSchemaValidator,
        }
    }

    /// Repair a cast set and bind every slot the blueprint mandates.
    ///
    /// Repairs, in order: truncate the pool to two characters (least-used
    /// first), keep the top 40 match scores per sheet, pad empty semantic
    /// lists with role-derived fallbacks, drop slot assignments pointing at
    /// unknown ids, and bind unassigned mandated slots to the best-scoring
    /// free character.
    ///
    /// # Errors
    ///
    /// Returns `CastRepairFailed` when the repaired cast still fails schema
    /// validation; there is no further automated recovery.
    pub fn normalize(&self, mut cast: CastSet, blueprint: &Blueprint) -> FabulaResult<CastSet> {
        if cast.pool_characters.len() > MAX_POOL_CHARACTERS {
            warn!(
                pool = cast.pool_characters.len(),
                "Truncating oversized character pool"
            );
            cast.pool_characters
                .sort_by_key(|c| (c.usage_count, c.id.clone()));
            cast.pool_characters.truncate(MAX_POOL_CHARACTERS);
        }

        for sheet in cast
            .avatars
            .iter_mut()
            .chain(cast.pool_characters.iter_mut())
        {
            repair_sheet(sheet);
        }

        let known_ids: Vec<String> = cast.all_characters().map(|c| c.id.clone()).collect();
        cast.slot_assignments
            .retain(|slot, id| slot.is_artifact() || known_ids.contains(id));

        self.bind_mandated_slots(&mut cast, blueprint);

        let report = self.validator.validate_cast(&cast);
        if !report.valid {
            return Err(PipelineError::new(PipelineErrorKind::CastRepairFailed(
                report.errors.join("; "),
            ))
            .into());
        }
        Ok(cast)
    }

    /// Bind every slot any blueprint scene mandates, preserving existing
    /// assignments. Avatar slots take avatars in order; pool slots take the
    /// best-scoring unassigned pool character.
    fn bind_mandated_slots(&self, cast: &mut CastSet, blueprint: &Blueprint) {
        let mut mandated: Vec<SlotKey> = blueprint
            .scenes
            .iter()
            .flat_map(|s| s.mandatory_slots.iter().cloned())
            .collect();
        mandated.sort();
        mandated.dedup();

        for slot in mandated {
            if slot.is_artifact() || cast.slot_assignments.contains_key(&slot) {
                continue;
            }
            let assigned: Vec<String> = cast.slot_assignments.values().cloned().collect();
            let candidates: Vec<&CharacterSheet> = if slot.0.starts_with("SLOT_AVATAR") {
                cast.avatars.iter().collect()
            } else {
                cast.pool_characters.iter().collect()
            };
            let req = SlotRequirements {
                slot: slot.clone(),
                preferred_roles: preferred_roles_for(&slot),
                keywords: Vec::new(),
            };
            let best = candidates
                .iter()
                .filter(|c| !assigned.contains(&c.id))
                .max_by(|a, b| {
                    score_match(a, &req)
                        .total()
                        .total_cmp(&score_match(b, &req).total())
                });
            if let Some(sheet) = best {
                debug!(%slot, character = %sheet.id, "Bound mandated slot");
                cast.slot_assignments.insert(slot, sheet.id.clone());
            }
        }
    }
}

fn preferred_roles_for(slot: &SlotKey) -> Vec<RoleType> {
    if slot.0.starts_with("SLOT_AVATAR") {
        vec![RoleType::Avatar]
    } else {
        vec![
            RoleType::Companion,
            RoleType::Mentor,
            RoleType::Rival,
            RoleType::Guardian,
            RoleType::Trickster,
        ]
    }
}

/// Deterministic in-place repair of one sheet: trim match scores, pad empty
/// semantic lists with role-derived fallbacks.
fn repair_sheet(sheet: &mut CharacterSheet) {
    if sheet.match_scores.len() > MAX_MATCH_SCORES {
        sheet
            .match_scores
            .sort_by(|a: &MatchScore, b: &MatchScore| b.score.total_cmp(&a.score));
        sheet.match_scores.truncate(MAX_MATCH_SCORES);
    }

    if sheet.personality.is_empty() {
        sheet.personality.push(fallback_personality(sheet.role));
    }
    if sheet.visual_signature.is_empty() {
        sheet.visual_signature.push(fallback_visual(sheet.role));
    }
    if sheet.outfit_lock.is_empty() {
        sheet.outfit_lock.push(fallback_outfit(sheet.role));
    }
    if sheet.forbidden.is_empty() {
        sheet.forbidden.push("photorealistic adult features".to_string());
    }
}

fn fallback_personality(role: RoleType) -> String {
    match role {
        RoleType::Avatar => "curious and brave",
        RoleType::Companion => "loyal and cheerful",
        RoleType::Mentor => "patient and wise",
        RoleType::Rival => "competitive but fair",
        RoleType::Guardian => "calm and watchful",
        RoleType::Trickster => "playful and unpredictable",
    }
    .to_string()
}

fn fallback_visual(role: RoleType) -> String {
    match role {
        RoleType::Avatar => "bright adventuring clothes",
        RoleType::Companion => "a small knapsack",
        RoleType::Mentor => "a long weathered coat",
        RoleType::Rival => "a sharp confident stance",
        RoleType::Guardian => "a broad sheltering silhouette",
        RoleType::Trickster => "mismatched colorful layers",
    }
    .to_string()
}

fn fallback_outfit(role: RoleType) -> String {
    match role {
        RoleType::Avatar => "signature scarf",
        RoleType::Companion => "knapsack strap",
        RoleType::Mentor => "weathered coat",
        RoleType::Rival => "bold emblem",
        RoleType::Guardian => "heavy cloak",
        RoleType::Trickster => "patched hat",
    }
    .to_string()
}

/// Derive the chapter-by-chapter on-stage plan from the blueprint and the
/// resolved cast.
///
/// Every mandated slot that resolves goes on stage; the artifact slot joins
/// whenever the scene's artifact policy is not `Absent` and an artifact
/// exists. Slots that do not resolve are dropped with a warning rather than
/// propagated into directives.
pub fn build_integration_plan(blueprint: &Blueprint, cast: &CastSet) -> IntegrationPlan {
    let mut plan = IntegrationPlan::default();
    for scene in &blueprint.scenes {
        let mut slots: Vec<SlotKey> = Vec::new();
        for slot in &scene.mandatory_slots {
            if cast.resolves(slot) {
                slots.push(slot.clone());
            } else {
                warn!(chapter = scene.index, slot = %slot, "Unresolvable slot dropped");
            }
        }
        if scene.artifact_usage != fabula_core::ArtifactUsage::Absent
            && cast.artifact.is_some()
        {
            slots.push(SlotKey::artifact());
        }
        slots.sort();
        slots.dedup();
        plan.chapter_slots.insert(scene.index, slots);
    }
    plan
}
