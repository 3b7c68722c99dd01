//! Directive builder: one structured generation directive per chapter.
//!
//! Directives are where blueprint, variant plan, integration plan, and cast
//! meet. Everything downstream (prompts, quality gates, image specs) reads
//! directives, never the blueprint directly.

use crate::schema::DefaultSchemaValidator;
use fabula_core::{Blueprint, CastSet, IntegrationPlan, SceneDirective, VariantPlan};
use fabula_error::{FabulaResult, PipelineError, PipelineErrorKind};
use fabula_interface::SchemaValidator;
use tracing::{debug, warn};

/// Caps carried on every directive.
const MAX_MUST_SHOW: usize = 10;
const MAX_AVOID: usize = 30;

/// Builds validated per-chapter directives.
pub struct DirectiveBuilder<'a> {
    blueprint: &'a Blueprint,
    variants: &'a VariantPlan,
    integration: &'a IntegrationPlan,
    cast: &'a CastSet,
    /// Run-wide image avoid tokens appended to every chapter
    global_avoid: Vec<String>,
}

impl<'a> DirectiveBuilder<'a> {
    /// Wire up a builder over the planning artifacts of one run.
    pub fn new(
        blueprint: &'a Blueprint,
        variants: &'a VariantPlan,
        integration: &'a IntegrationPlan,
        cast: &'a CastSet,
        global_avoid: Vec<String>,
    ) -> Self {
        Self {
            blueprint,
            variants,
            integration,
            cast,
            global_avoid,
        }
    }

    /// Build one directive per blueprint scene, in chapter order.
    ///
    /// Variant overrides replace scene fields where present; on-stage slots
    /// come from the integration plan; image lists are deduplicated and
    /// capped. Every directive is schema-validated; findings are logged as
    /// warnings and the directive is kept, since a flawed directive still
    /// drives usable prompts.
    ///
    /// # Errors
    ///
    /// Returns `EmptyBlueprint` for a blueprint without scenes.
    pub fn build(&self) -> FabulaResult<Vec<SceneDirective>> {
        if self.blueprint.scenes.is_empty() {
            return Err(PipelineError::new(PipelineErrorKind::EmptyBlueprint(
                self.blueprint.category.to_string(),
            ))
            .into());
        }

        let validator = DefaultSchemaValidator;
        let mut directives = Vec::with_capacity(self.blueprint.scenes.len());

        for scene in &self.blueprint.scenes {
            let over = self.variants.override_for(scene.index);

            let mut on_stage = self
                .integration
                .chapter_slots
                .get(&scene.index)
                .cloned()
                .unwrap_or_default();
            on_stage.sort();
            on_stage.dedup();

            let setting = over
                .and_then(|o| o.setting.clone())
                .unwrap_or_else(|| scene.setting.clone());
            let directive = SceneDirective {
                chapter: scene.index,
                title: scene.title.clone(),
                setting: setting.clone(),
                mood: scene.mood,
                characters_on_stage: on_stage.clone(),
                goal: over
                    .and_then(|o| o.goal.clone())
                    .unwrap_or_else(|| scene.goal.clone()),
                conflict: over
                    .and_then(|o| o.conflict.clone())
                    .unwrap_or_else(|| scene.conflict.clone()),
                outcome: over
                    .and_then(|o| o.outcome.clone())
                    .unwrap_or_else(|| scene.outcome.clone()),
                artifact_usage: scene.artifact_usage,
                canon_anchor_line: scene.canon_anchor.clone(),
                image_must_show: self.must_show(&setting, &scene.title, &on_stage, scene.artifact_usage),
                image_avoid: self.avoid(scene, &on_stage),
            };

            let report = validator.validate_directive(&directive);
            if !report.valid {
                warn!(
                    chapter = directive.chapter,
                    errors = ?report.errors,
                    "Directive failed schema validation, keeping it"
                );
            }
            debug!(chapter = directive.chapter, on_stage = on_stage.len(), "Built directive");
            directives.push(directive);
        }

        Ok(directives)
    }

    /// Visual tokens the image must show: the setting, the scene title,
    /// every on-stage character's display name with one leading signature
    /// token, and the artifact's name when central.
    fn must_show(
        &self,
        setting: &str,
        title: &str,
        on_stage: &[fabula_core::SlotKey],
        usage: fabula_core::ArtifactUsage,
    ) -> Vec<String> {
        let mut tokens = vec![setting.to_string(), title.to_string()];
        for slot in on_stage {
            if slot.is_artifact() {
                continue;
            }
            if let Some(sheet) = self.cast.character_for_slot(slot) {
                tokens.push(sheet.display_name.clone());
                if let Some(sig) = sheet.visual_signature.first() {
                    tokens.push(sig.clone());
                }
            }
        }
        if usage == fabula_core::ArtifactUsage::Central {
            if let Some(artifact) = &self.cast.artifact {
                tokens.push(artifact.display_name.clone());
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        tokens.retain(|t| seen.insert(t.clone()));
        tokens.truncate(MAX_MUST_SHOW);
        tokens
    }

    /// Avoid tokens: scene-level avoids, run-wide avoids, then per-character
    /// forbidden elements, deduplicated and capped.
    fn avoid(
        &self,
        scene: &fabula_core::BlueprintScene,
        on_stage: &[fabula_core::SlotKey],
    ) -> Vec<String> {
        let mut tokens: Vec<String> = scene.avoid.clone();
        tokens.extend(self.global_avoid.iter().cloned());
        for slot in on_stage {
            if let Some(sheet) = self.cast.character_for_slot(slot) {
                tokens.extend(sheet.forbidden.iter().cloned());
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        tokens.retain(|t| seen.insert(t.clone()));
        tokens.truncate(MAX_AVOID);
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprints::blueprint_for;
    use crate::cast::{CastNormalizer, build_integration_plan};
    use crate::variant::plan_variants;
    use fabula_core::{
        Artifact, CharacterSheet, RoleType, SlotKey, StoryCategory,
    };

    fn test_cast() -> CastSet {
        CastSet {
            avatars: vec![CharacterSheet {
                id: "lena".to_string(),
                display_name: "Lena".to_string(),
                role: RoleType::Avatar,
                archetype: "brave explorer".to_string(),
                personality: vec!["curious".to_string()],
                visual_signature: vec!["red scarf".to_string()],
                outfit_lock: vec!["scarf".to_string()],
                forbidden: vec!["sunglasses".to_string()],
                catchphrase: Some("Auf geht's!".to_string()),
                usage_count: 0,
                match_scores: vec![],
            }],
            pool_characters: vec![CharacterSheet {
                id: "theo".to_string(),
                display_name: "Theo".to_string(),
                role: RoleType::Companion,
                archetype: "loyal friend".to_string(),
                personality: vec!["cheerful".to_string()],
                visual_signature: vec!["blue cap".to_string()],
                outfit_lock: vec!["cap".to_string()],
                forbidden: vec!["umbrella".to_string()],
                catchphrase: None,
                usage_count: 3,
                match_scores: vec![],
            }],
            artifact: Some(Artifact {
                id: "stone".to_string(),
                display_name: "Glitzerstein".to_string(),
                visual_signature: vec!["glittering blue stone".to_string()],
            }),
            slot_assignments: Default::default(),
        }
    }

    fn build_all(chapters: u32, seed: u64) -> Vec<SceneDirective> {
        let bp = blueprint_for(StoryCategory::Adventure, chapters);
        let cast = CastNormalizer::new().normalize(test_cast(), &bp).unwrap();
        let variants = plan_variants(seed, StoryCategory::Adventure, &bp);
        let integration = build_integration_plan(&bp, &cast);
        DirectiveBuilder::new(&bp, &variants, &integration, &cast, vec!["violence".to_string()])
            .build()
            .unwrap()
    }

    #[test]
    fn test_one_directive_per_chapter_in_order() {
        let directives = build_all(5, 1);
        assert_eq!(directives.len(), 5);
        for (i, d) in directives.iter().enumerate() {
            assert_eq!(d.chapter, i as u32 + 1);
        }
    }

    #[test]
    fn test_artifact_on_stage_when_central() {
        let directives = build_all(5, 2);
        let finale = directives.last().unwrap();
        assert!(finale.requires_artifact());
        assert!(finale.characters_on_stage.contains(&SlotKey::artifact()));
        assert!(finale
            .image_must_show
            .iter()
            .any(|t| t.contains("Glitzerstein")));
    }

    #[test]
    fn test_variant_override_replaces_fields() {
        let bp = blueprint_for(StoryCategory::Adventure, 4);
        let cast = CastNormalizer::new().normalize(test_cast(), &bp).unwrap();
        let mut variants = plan_variants(9, StoryCategory::Adventure, &bp);
        variants.scene_overrides = vec![fabula_core::ChapterOverride {
            chapter: 2,
            setting: Some("a moonlit orchard".to_string()),
            goal: None,
            conflict: None,
            outcome: None,
        }];
        let integration = build_integration_plan(&bp, &cast);
        let directives =
            DirectiveBuilder::new(&bp, &variants, &integration, &cast, vec![])
                .build()
                .unwrap();
        assert_eq!(directives[1].setting, "a moonlit orchard");
        assert_eq!(directives[0].setting, bp.scenes[0].setting);
    }

    #[test]
    fn test_must_show_carries_setting_title_and_names() {
        let directives = build_all(3, 5);
        for d in &directives {
            assert!(d.image_must_show.contains(&d.setting));
            assert!(d.image_must_show.contains(&d.title));
            assert!(d.image_must_show.iter().any(|t| t == "Lena"));
            assert!(d.image_must_show.iter().any(|t| t == "red scarf"));
            assert!(d.image_must_show.len() <= 10);
        }
    }

    #[test]
    fn test_invalid_directive_is_kept() {
        let mut bp = blueprint_for(StoryCategory::Adventure, 3);
        bp.scenes[1].goal = String::new();
        let cast = CastNormalizer::new().normalize(test_cast(), &bp).unwrap();
        let mut variants = plan_variants(4, StoryCategory::Adventure, &bp);
        variants.scene_overrides = vec![];
        let integration = build_integration_plan(&bp, &cast);
        let directives = DirectiveBuilder::new(&bp, &variants, &integration, &cast, vec![])
            .build()
            .unwrap();
        // The schema finding is logged, not fatal: the run keeps going with
        // the directive as built.
        assert_eq!(directives.len(), 3);
        assert!(directives[1].goal.is_empty());
    }

    #[test]
    fn test_avoid_lists_merge_and_dedupe() {
        let directives = build_all(3, 5);
        for d in &directives {
            assert!(d.image_avoid.iter().any(|t| t == "violence"));
            assert!(d.image_avoid.len() <= 30);
            let mut sorted = d.image_avoid.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), d.image_avoid.len());
        }
    }
}
