//! Rule-based schema validation for pipeline artifacts.

use fabula_core::{CastSet, ImageSpec, SceneDirective, SlotKey, VariantAxis, VariantPlan};
use fabula_interface::{SchemaReport, SchemaValidator};
use strum::IntoEnumIterator;

/// Item caps enforced on directives.
const MAX_MUST_SHOW: usize = 10;
const MAX_AVOID: usize = 30;

/// The stock validator used by the pipeline.
///
/// Checks are structural and deterministic. Prose quality is the quality
/// gate engine's business, not the schema's.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSchemaValidator;

impl SchemaValidator for DefaultSchemaValidator {
    fn validate_cast(&self, cast: &CastSet) -> SchemaReport {
        let mut errors = Vec::new();

        if cast.avatars.is_empty() {
            errors.push("cast has no avatar".to_string());
        }
        if cast.pool_characters.len() > 2 {
            errors.push(format!(
                "pool holds {} characters, maximum is 2",
                cast.pool_characters.len()
            ));
        }

        for sheet in cast.all_characters() {
            if sheet.display_name.trim().is_empty() {
                errors.push(format!("character '{}' has no display name", sheet.id));
            }
            for (list, name) in [
                (&sheet.personality, "personality"),
                (&sheet.visual_signature, "visual_signature"),
                (&sheet.outfit_lock, "outfit_lock"),
                (&sheet.forbidden, "forbidden"),
            ] {
                if list.is_empty() {
                    errors.push(format!("character '{}' has empty {name}", sheet.id));
                }
            }
        }

        for (slot, id) in &cast.slot_assignments {
            if !slot.is_artifact() && !cast.all_characters().any(|c| &c.id == id) {
                errors.push(format!("slot {slot} bound to unknown character '{id}'"));
            }
        }
        if !cast.slot_assignments.contains_key(&SlotKey::avatar(1)) {
            errors.push("primary avatar slot is unassigned".to_string());
        }

        report(errors)
    }

    fn validate_directive(&self, directive: &SceneDirective) -> SchemaReport {
        let mut errors = Vec::new();

        if directive.chapter == 0 {
            errors.push("chapter numbers are 1-based".to_string());
        }
        for (value, name) in [
            (&directive.title, "title"),
            (&directive.setting, "setting"),
            (&directive.goal, "goal"),
            (&directive.conflict, "conflict"),
            (&directive.outcome, "outcome"),
        ] {
            if value.trim().is_empty() {
                errors.push(format!(
                    "directive for chapter {} has empty {name}",
                    directive.chapter
                ));
            }
        }

        if directive.characters_on_stage.is_empty() {
            errors.push(format!("chapter {} has nobody on stage", directive.chapter));
        }
        let mut seen = directive.characters_on_stage.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != directive.characters_on_stage.len() {
            errors.push(format!(
                "chapter {} lists duplicate on-stage slots",
                directive.chapter
            ));
        }
        if directive.requires_artifact()
            && !directive
                .characters_on_stage
                .iter()
                .any(SlotKey::is_artifact)
        {
            errors.push(format!(
                "chapter {} requires the artifact but it is not on stage",
                directive.chapter
            ));
        }

        if directive.image_must_show.len() > MAX_MUST_SHOW {
            errors.push(format!(
                "chapter {} image_must_show exceeds {MAX_MUST_SHOW} items",
                directive.chapter
            ));
        }
        if directive.image_avoid.len() > MAX_AVOID {
            errors.push(format!(
                "chapter {} image_avoid exceeds {MAX_AVOID} items",
                directive.chapter
            ));
        }

        report(errors)
    }

    fn validate_image_spec(&self, spec: &ImageSpec) -> SchemaReport {
        let mut errors = Vec::new();

        if spec.chapter == 0 {
            errors.push("chapter numbers are 1-based".to_string());
        }
        if spec.on_stage_exact.is_empty() {
            errors.push(format!("image spec for chapter {} shows nobody", spec.chapter));
        }
        if spec.final_prompt_text.trim().is_empty() {
            errors.push(format!(
                "image spec for chapter {} has an empty prompt",
                spec.chapter
            ));
        }

        report(errors)
    }

    fn validate_variant_plan(&self, plan: &VariantPlan) -> SchemaReport {
        let mut errors = Vec::new();

        for axis in VariantAxis::iter() {
            match plan.variant_choices.get(&axis) {
                None => errors.push(format!("axis {axis} has no choice")),
                Some(choice) if choice.trim().is_empty() => {
                    errors.push(format!("axis {axis} chose an empty value"));
                }
                Some(_) => {}
            }
        }

        if plan.scene_overrides.len() > 3 {
            errors.push(format!(
                "{} scene overrides, maximum is 3",
                plan.scene_overrides.len()
            ));
        }
        for o in &plan.scene_overrides {
            if o.setting.is_none() && o.goal.is_none() && o.conflict.is_none() && o.outcome.is_none()
            {
                errors.push(format!("override for chapter {} carries no delta", o.chapter));
            }
        }

        report(errors)
    }
}

fn report(errors: Vec<String>) -> SchemaReport {
    if errors.is_empty() {
        SchemaReport::ok()
    } else {
        SchemaReport::failed(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_core::{ArtifactUsage, Mood};

    #[test]
    fn test_empty_cast_is_invalid() {
        let report = DefaultSchemaValidator.validate_cast(&CastSet::default());
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("no avatar")));
    }

    #[test]
    fn test_directive_requires_artifact_on_stage() {
        let directive = SceneDirective {
            chapter: 3,
            title: "T".to_string(),
            setting: "S".to_string(),
            mood: Mood::Tense,
            characters_on_stage: vec![SlotKey::avatar(1)],
            goal: "G".to_string(),
            conflict: "C".to_string(),
            outcome: "O".to_string(),
            artifact_usage: ArtifactUsage::Central,
            canon_anchor_line: None,
            image_must_show: vec![],
            image_avoid: vec![],
        };
        let report = DefaultSchemaValidator.validate_directive(&directive);
        assert!(!report.valid);

        let mut fixed = directive;
        fixed.characters_on_stage.push(SlotKey::artifact());
        assert!(DefaultSchemaValidator.validate_directive(&fixed).valid);
    }

    #[test]
    fn test_variant_plan_needs_all_axes() {
        let plan = VariantPlan {
            seed: 1,
            variant_choices: Default::default(),
            scene_overrides: vec![],
        };
        let report = DefaultSchemaValidator.validate_variant_plan(&plan);
        assert_eq!(report.errors.len(), 5);
    }
}
