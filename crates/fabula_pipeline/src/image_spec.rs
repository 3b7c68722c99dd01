//! Image spec generation and the deterministic lint/fix loop.
//!
//! One spec per chapter. Prompts are assembled from directive and cast data;
//! the linter checks the framing and reference invariants the image provider
//! depends on, and the fixer repairs findings without any generative call.

use crate::schema::DefaultSchemaValidator;
use fabula_core::{
    AssetId, CastSet, ImageSpec, ImageSpecIssue, ImageSpecIssueCode, SceneDirective, SlotKey,
};
use fabula_interface::SchemaValidator;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Fix passes before residual issues are reported as-is.
const MAX_FIX_PASSES: usize = 3;

/// Framing tokens that must never appear in a chapter illustration prompt.
const FORBIDDEN_FRAMING: [(&str, ImageSpecIssueCode); 4] = [
    ("portrait", ImageSpecIssueCode::PortraitFraming),
    ("close-up", ImageSpecIssueCode::PortraitFraming),
    ("looking at the camera", ImageSpecIssueCode::CameraFacing),
    ("facing the camera", ImageSpecIssueCode::CameraFacing),
];

/// Build one image spec per directive.
///
/// `on_stage_exact` lists display names of the non-artifact on-stage slots;
/// `refs` carries one reference asset per on-stage slot (artifact included);
/// the prompt states the exact character count and full-body framing the
/// linter later enforces.
pub fn build_image_specs(
    directives: &[SceneDirective],
    cast: &CastSet,
    global_negatives: &[String],
) -> Vec<ImageSpec> {
    directives
        .iter()
        .map(|directive| {
            let mut negatives = directive.image_avoid.clone();
            for n in global_negatives {
                if !negatives.contains(n) {
                    negatives.push(n.clone());
                }
            }
            let mut props_visible = Vec::new();
            if directive.requires_artifact() {
                if let Some(artifact) = &cast.artifact {
                    props_visible.push(artifact.display_name.clone());
                }
            }
            let on_stage_exact = on_stage_names(directive, cast);
            ImageSpec {
                chapter: directive.chapter,
                refs: expected_refs(directive, cast),
                final_prompt_text: render_prompt(directive, cast, &on_stage_exact),
                on_stage_exact,
                props_visible,
                negatives,
            }
        })
        .collect()
}

fn on_stage_names(directive: &SceneDirective, cast: &CastSet) -> Vec<String> {
    directive
        .characters_on_stage
        .iter()
        .filter(|slot| !slot.is_artifact())
        .filter_map(|slot| cast.character_for_slot(slot))
        .map(|sheet| sheet.display_name.clone())
        .collect()
}

/// The reference-asset set a chapter requires: one per resolvable on-stage
/// slot, the artifact included.
fn expected_refs(directive: &SceneDirective, cast: &CastSet) -> BTreeMap<SlotKey, AssetId> {
    let mut refs = BTreeMap::new();
    for slot in &directive.characters_on_stage {
        if slot.is_artifact() {
            if let Some(artifact) = &cast.artifact {
                refs.insert(slot.clone(), AssetId(format!("ref-{}", artifact.id)));
            }
        } else if let Some(sheet) = cast.character_for_slot(slot) {
            refs.insert(slot.clone(), AssetId(format!("ref-{}", sheet.id)));
        }
    }
    refs
}

fn render_prompt(directive: &SceneDirective, cast: &CastSet, names: &[String]) -> String {
    let mut prompt = format!(
        "Children's book illustration, chapter {}: {}. Mood: {}. ",
        directive.chapter, directive.setting, directive.mood
    );
    prompt.push_str(&format!(
        "Exactly {} character{} in frame, full body, mid-action. ",
        names.len(),
        if names.len() == 1 { "" } else { "s" }
    ));
    for slot in &directive.characters_on_stage {
        if let Some(sheet) = cast.character_for_slot(slot) {
            prompt.push_str(&format!(
                "{}: {}, wearing {}. ",
                sheet.display_name,
                sheet.visual_signature.join(", "),
                sheet.outfit_lock.join(", ")
            ));
        }
    }
    if directive.requires_artifact() {
        if let Some(artifact) = &cast.artifact {
            prompt.push_str(&format!(
                "{} clearly visible: {}. ",
                artifact.display_name,
                artifact.visual_signature.join(", ")
            ));
        }
    }
    if !directive.image_must_show.is_empty() {
        prompt.push_str(&format!("Show: {}. ", directive.image_must_show.join("; ")));
    }
    prompt
}

/// Lints image specs and repairs findings deterministically.
pub struct ImageSpecValidator<'a> {
    directives: &'a [SceneDirective],
    cast: &'a CastSet,
}

impl<'a> ImageSpecValidator<'a> {
    /// Wire up a validator over one run's directives and cast.
    pub fn new(directives: &'a [SceneDirective], cast: &'a CastSet) -> Self {
        Self { directives, cast }
    }

    /// Lint one spec against its directive.
    pub fn lint(&self, spec: &ImageSpec) -> Vec<ImageSpecIssue> {
        let mut issues = Vec::new();
        let Some(directive) = self.directives.iter().find(|d| d.chapter == spec.chapter) else {
            issues.push(finding(
                spec.chapter,
                ImageSpecIssueCode::SchemaInvalid,
                format!("no directive for chapter {}", spec.chapter),
            ));
            return issues;
        };
        let prompt = spec.final_prompt_text.to_lowercase();

        let count_phrase = format!("exactly {} character", spec.on_stage_exact.len());
        if !prompt.contains(&count_phrase) {
            issues.push(finding(
                spec.chapter,
                ImageSpecIssueCode::MissingCountPhrase,
                format!("prompt does not state \"{count_phrase}\""),
            ));
        }
        if !prompt.contains("full body") {
            issues.push(finding(
                spec.chapter,
                ImageSpecIssueCode::MissingFullBodyFraming,
                "prompt does not demand full-body framing".to_string(),
            ));
        }
        for (token, code) in FORBIDDEN_FRAMING {
            if prompt.contains(token) {
                issues.push(finding(
                    spec.chapter,
                    code,
                    format!("prompt contains \"{token}\""),
                ));
            }
        }

        if directive.requires_artifact() {
            if let Some(artifact) = &self.cast.artifact {
                let name = artifact.display_name.to_lowercase();
                if !prompt.contains(&name)
                    && !spec.props_visible.iter().any(|p| p.to_lowercase() == name)
                {
                    issues.push(finding(
                        spec.chapter,
                        ImageSpecIssueCode::ArtifactNotVisible,
                        format!("'{}' is required but not in the prompt", artifact.display_name),
                    ));
                }
            }
        }

        let expected = expected_refs(directive, self.cast);
        for slot in spec.refs.keys() {
            if !expected.contains_key(slot) {
                issues.push(finding(
                    spec.chapter,
                    ImageSpecIssueCode::UnexpectedRef,
                    format!("reference for off-stage slot {slot}"),
                ));
            }
        }
        if spec.refs.len() != expected.len() {
            issues.push(finding(
                spec.chapter,
                ImageSpecIssueCode::RefCountMismatch,
                format!("{} references, expected {}", spec.refs.len(), expected.len()),
            ));
        }

        let report = DefaultSchemaValidator.validate_image_spec(spec);
        if !report.valid {
            issues.push(finding(
                spec.chapter,
                ImageSpecIssueCode::SchemaInvalid,
                report.errors.join("; "),
            ));
        }

        issues
    }

    /// Repair one spec in place. Every fix is deterministic: strip forbidden
    /// framing tokens, restate count and framing phrases, surface the
    /// artifact, and rebuild the reference set.
    pub fn fix(&self, spec: &mut ImageSpec, issues: &[ImageSpecIssue]) {
        let Some(directive) = self.directives.iter().find(|d| d.chapter == spec.chapter) else {
            return;
        };
        for issue in issues {
            match issue.code {
                ImageSpecIssueCode::PortraitFraming | ImageSpecIssueCode::CameraFacing => {
                    let mut prompt = spec.final_prompt_text.clone();
                    for re in forbidden_framing_res() {
                        prompt = re.replace_all(&prompt, "").into_owned();
                    }
                    spec.final_prompt_text = prompt;
                }
                ImageSpecIssueCode::MissingCountPhrase => {
                    spec.final_prompt_text.push_str(&format!(
                        " Exactly {} character{} in frame.",
                        spec.on_stage_exact.len(),
                        if spec.on_stage_exact.len() == 1 { "" } else { "s" }
                    ));
                }
                ImageSpecIssueCode::MissingFullBodyFraming => {
                    spec.final_prompt_text.push_str(" Full body, mid-action.");
                }
                ImageSpecIssueCode::ArtifactNotVisible => {
                    if let Some(artifact) = &self.cast.artifact {
                        spec.props_visible.push(artifact.display_name.clone());
                        spec.final_prompt_text.push_str(&format!(
                            " {} clearly visible.",
                            artifact.display_name
                        ));
                    }
                }
                ImageSpecIssueCode::RefCountMismatch | ImageSpecIssueCode::UnexpectedRef => {
                    spec.refs = expected_refs(directive, self.cast);
                }
                ImageSpecIssueCode::SchemaInvalid => {
                    if spec.on_stage_exact.is_empty() {
                        spec.on_stage_exact = on_stage_names(directive, self.cast);
                    }
                    if spec.final_prompt_text.trim().is_empty() {
                        spec.final_prompt_text =
                            render_prompt(directive, self.cast, &spec.on_stage_exact);
                    }
                }
            }
        }
    }

    /// Lint and repair every spec until clean, the issue set stops changing,
    /// or the pass ceiling is reached. Returns the repaired specs and any
    /// residual issues.
    pub fn validate_and_fix(
        &self,
        mut specs: Vec<ImageSpec>,
    ) -> (Vec<ImageSpec>, Vec<ImageSpecIssue>) {
        let mut previous: Option<Vec<ImageSpecIssue>> = None;
        for pass in 0..MAX_FIX_PASSES {
            let mut all_issues: Vec<ImageSpecIssue> = Vec::new();
            for spec in &mut specs {
                let issues = self.lint(spec);
                if !issues.is_empty() {
                    self.fix(spec, &issues);
                    all_issues.extend(issues);
                }
            }
            if all_issues.is_empty() {
                debug!(pass, "Image specs clean");
                return (specs, Vec::new());
            }
            if previous.as_ref() == Some(&all_issues) {
                debug!(pass, residual = all_issues.len(), "Image spec issues stabilized");
                return (specs, all_issues);
            }
            previous = Some(all_issues);
        }

        // Final lint after the last fix pass.
        let residual: Vec<ImageSpecIssue> =
            specs.iter().flat_map(|s| self.lint(s)).collect();
        (specs, residual)
    }
}

fn forbidden_framing_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        FORBIDDEN_FRAMING
            .iter()
            .map(|(token, _)| Regex::new(&format!("(?i){}", regex::escape(token))).unwrap())
            .collect()
    })
}

fn finding(chapter: u32, code: ImageSpecIssueCode, message: String) -> ImageSpecIssue {
    ImageSpecIssue {
        chapter,
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprints::blueprint_for;
    use crate::cast::{CastNormalizer, build_integration_plan};
    use crate::directive::DirectiveBuilder;
    use crate::variant::plan_variants;
    use fabula_core::{Artifact, CharacterSheet, RoleType, StoryCategory};

    fn fixture() -> (Vec<SceneDirective>, CastSet) {
        let bp = blueprint_for(StoryCategory::Adventure, 4);
        let raw = CastSet {
            avatars: vec![CharacterSheet {
                id: "lena".to_string(),
                display_name: "Lena".to_string(),
                role: RoleType::Avatar,
                archetype: "explorer".to_string(),
                personality: vec!["curious".to_string()],
                visual_signature: vec!["red scarf".to_string()],
                outfit_lock: vec!["scarf".to_string()],
                forbidden: vec!["sunglasses".to_string()],
                catchphrase: None,
                usage_count: 0,
                match_scores: vec![],
            }],
            pool_characters: vec![CharacterSheet {
                id: "theo".to_string(),
                display_name: "Theo".to_string(),
                role: RoleType::Companion,
                archetype: "friend".to_string(),
                personality: vec!["cheerful".to_string()],
                visual_signature: vec!["blue cap".to_string()],
                outfit_lock: vec!["cap".to_string()],
                forbidden: vec!["umbrella".to_string()],
                catchphrase: None,
                usage_count: 0,
                match_scores: vec![],
            }],
            artifact: Some(Artifact {
                id: "stone".to_string(),
                display_name: "Glitzerstein".to_string(),
                visual_signature: vec!["glittering blue stone".to_string()],
            }),
            slot_assignments: Default::default(),
        };
        let cast = CastNormalizer::new().normalize(raw, &bp).unwrap();
        let variants = plan_variants(2, StoryCategory::Adventure, &bp);
        let integration = build_integration_plan(&bp, &cast);
        let directives = DirectiveBuilder::new(&bp, &variants, &integration, &cast, vec![])
            .build()
            .unwrap();
        (directives, cast)
    }

    #[test]
    fn test_built_specs_pass_lint() {
        let (directives, cast) = fixture();
        let specs = build_image_specs(&directives, &cast, &["blurry".to_string()]);
        let validator = ImageSpecValidator::new(&directives, &cast);
        for spec in &specs {
            assert!(validator.lint(spec).is_empty(), "chapter {}", spec.chapter);
        }
        assert_eq!(specs.len(), 4);
        assert!(specs.iter().all(|s| s.negatives.contains(&"blurry".to_string())));
    }

    #[test]
    fn test_fix_loop_converges_on_broken_prompt() {
        let (directives, cast) = fixture();
        let mut specs = build_image_specs(&directives, &cast, &[]);
        specs[0].final_prompt_text = "A lovely portrait of Lena looking at the camera.".to_string();
        specs[0].refs.clear();

        let validator = ImageSpecValidator::new(&directives, &cast);
        let (fixed, residual) = validator.validate_and_fix(specs);
        assert!(residual.is_empty(), "residual: {residual:?}");
        let prompt = fixed[0].final_prompt_text.to_lowercase();
        assert!(!prompt.contains("portrait"));
        assert!(prompt.contains("full body"));
        assert!(prompt.contains("exactly 1 character"));
        assert!(!fixed[0].refs.is_empty());
    }

    #[test]
    fn test_artifact_surfaced_when_required() {
        let (directives, cast) = fixture();
        let finale = directives.last().unwrap();
        assert!(finale.requires_artifact());
        let specs = build_image_specs(&directives, &cast, &[]);
        let spec = specs.last().unwrap();
        assert!(spec.final_prompt_text.contains("Glitzerstein"));
        assert!(spec.props_visible.contains(&"Glitzerstein".to_string()));
        assert!(spec.refs.contains_key(&SlotKey::artifact()));
    }
}
