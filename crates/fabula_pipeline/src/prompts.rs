//! Prompt assembly for the generative text calls.
//!
//! Every request carries the full constraint set in its system message and
//! the task-specific material in the user message. All story calls demand
//! strict JSON output so the extraction layer can parse responses without
//! provider-specific handling.

use fabula_core::{
    CanonFusionPlan, CastSet, GenerateRequest, Language, Message, NormalizedRequest,
    PipelineConfig, QualityIssue, SceneDirective, StoryDraft, WordBudget,
};
use fabula_error::{FabulaResult, PipelineError, PipelineErrorKind};

/// Output contract for full-story calls.
const STORY_JSON_SHAPE: &str = r#"{"title": "...", "description": "...", "chapters": [{"chapter": 1, "text": "..."}]}"#;

/// Output contract for single-chapter edit calls.
const CHAPTER_JSON_SHAPE: &str = r#"{"chapter": 1, "text": "..."}"#;

fn language_line(language: Language) -> &'static str {
    match language {
        Language::De => "Write all story text in German.",
        Language::En => "Write all story text in English.",
    }
}

fn system_message(
    request: &NormalizedRequest,
    budget: &WordBudget,
    canon: &CanonFusionPlan,
    cast: &CastSet,
) -> Message {
    let mut text = String::new();
    text.push_str("You are a children's story author. ");
    text.push_str(language_line(*request.language()));
    text.push_str(&format!(
        "\nAudience: readers aged {} to {}.\n",
        request.age_range().0,
        request.age_range().1
    ));
    text.push_str(&format!(
        "Each chapter must have between {} and {} words. The whole story must stay between {} and {} words.\n",
        budget.min_words_per_chapter,
        budget.max_words_per_chapter,
        budget.min_total_words,
        budget.max_total_words,
    ));
    text.push_str(
        "Every chapter needs 2 to 6 lines of spoken dialogue in quotation marks. \
         Use only the characters listed below; never invent new named characters.\n",
    );

    text.push_str("\nCast:\n");
    for sheet in cast.all_characters() {
        text.push_str(&format!(
            "- {} ({}): {}\n",
            sheet.display_name,
            sheet.archetype,
            sheet.personality.join(", ")
        ));
    }
    if let Some(artifact) = &cast.artifact {
        text.push_str(&format!(
            "- {} (artifact): {}\n",
            artifact.display_name,
            artifact.visual_signature.join(", ")
        ));
    }
    if let Some(arc) = &canon.artifact_arc {
        text.push_str(&format!("Artifact storyline: {arc}\n"));
    }

    if !canon.banned_phrases.is_empty() {
        text.push_str("\nNever use any of these phrases:\n");
        for phrase in &canon.banned_phrases {
            text.push_str(&format!("- \"{phrase}\"\n"));
        }
    }

    text.push_str(&format!(
        "\nRespond with JSON only, exactly this shape:\n{STORY_JSON_SHAPE}\n"
    ));
    Message::system(text)
}

fn chapter_section(directive: &SceneDirective, canon: &CanonFusionPlan) -> String {
    let mut text = format!(
        "Chapter {} — {}\nSetting: {}\nMood: {}\nGoal: {}\nConflict: {}\nOutcome: {}\n",
        directive.chapter,
        directive.title,
        directive.setting,
        directive.mood,
        directive.goal,
        directive.conflict,
        directive.outcome,
    );
    if let Some(anchor) = &directive.canon_anchor_line {
        text.push_str(&format!("Include this line verbatim: \"{anchor}\"\n"));
    }
    if let Some(section) = canon.prompt_sections.get(&directive.chapter) {
        text.push_str("Character notes:\n");
        text.push_str(section);
        text.push('\n');
    }
    text
}

/// Build the initial full-story generation request.
///
/// # Errors
///
/// Returns a configuration error if the request cannot be assembled.
pub fn story_request(
    request: &NormalizedRequest,
    directives: &[SceneDirective],
    canon: &CanonFusionPlan,
    cast: &CastSet,
    budget: &WordBudget,
    config: &PipelineConfig,
) -> FabulaResult<GenerateRequest> {
    let mut user = String::from("Write the story chapter by chapter, following this plan:\n\n");
    for directive in directives {
        user.push_str(&chapter_section(directive, canon));
        user.push('\n');
    }

    build(
        vec![system_message(request, budget, canon, cast), Message::user(user)],
        config,
    )
}

/// Build a full-story rewrite request citing the current draft's issues.
pub fn rewrite_request(
    request: &NormalizedRequest,
    directives: &[SceneDirective],
    canon: &CanonFusionPlan,
    cast: &CastSet,
    budget: &WordBudget,
    config: &PipelineConfig,
    draft: &StoryDraft,
    issues: &[QualityIssue],
) -> FabulaResult<GenerateRequest> {
    let mut user = String::from("The draft below has quality problems. Rewrite the whole story, keeping its plot and cast, and fix every listed problem.\n\nProblems:\n");
    for issue in issues {
        match issue.chapter {
            Some(ch) => user.push_str(&format!("- Chapter {ch}: {}\n", issue.message)),
            None => user.push_str(&format!("- {}\n", issue.message)),
        }
    }
    user.push_str("\nPlan:\n\n");
    for directive in directives {
        user.push_str(&chapter_section(directive, canon));
        user.push('\n');
    }
    user.push_str("\nCurrent draft:\n");
    user.push_str(&draft_as_text(draft));

    build(
        vec![system_message(request, budget, canon, cast), Message::user(user)],
        config,
    )
}

/// Build a single-chapter targeted edit request.
///
/// The edit is scoped: only the named chapter changes, and only to fix the
/// listed issues.
pub fn chapter_edit_request(
    request: &NormalizedRequest,
    directive: &SceneDirective,
    canon: &CanonFusionPlan,
    cast: &CastSet,
    budget: &WordBudget,
    config: &PipelineConfig,
    chapter_text: &str,
    issues: &[QualityIssue],
) -> FabulaResult<GenerateRequest> {
    let mut system = String::from("You are a children's story editor. ");
    system.push_str(language_line(*request.language()));
    system.push_str(&format!(
        "\nEdit exactly one chapter. Keep its plot, cast, and voice. \
         The chapter must have between {} and {} words.\n",
        budget.min_words_per_chapter, budget.max_words_per_chapter,
    ));
    system.push_str("Use only these characters: ");
    let names: Vec<&str> = cast
        .all_characters()
        .map(|c| c.display_name.as_str())
        .collect();
    system.push_str(&names.join(", "));
    system.push_str(&format!(
        ".\nRespond with JSON only, exactly this shape:\n{CHAPTER_JSON_SHAPE}\n"
    ));

    let mut user = format!("Fix these problems in chapter {}:\n", directive.chapter);
    for issue in issues {
        user.push_str(&format!("- {}\n", issue.message));
    }
    user.push('\n');
    user.push_str(&chapter_section(directive, canon));
    user.push_str("\nCurrent chapter text:\n");
    user.push_str(chapter_text);

    build(vec![Message::system(system), Message::user(user)], config)
}

/// Build a warning-polish request: stylistic cleanup without structural
/// change.
pub fn polish_request(
    request: &NormalizedRequest,
    cast: &CastSet,
    budget: &WordBudget,
    config: &PipelineConfig,
    draft: &StoryDraft,
    warnings: &[QualityIssue],
) -> FabulaResult<GenerateRequest> {
    let mut system = String::from("You are a children's story editor. ");
    system.push_str(language_line(*request.language()));
    system.push_str(&format!(
        "\nPolish the story below without changing its plot, chapter structure, or cast. \
         Keep every chapter between {} and {} words.\n",
        budget.min_words_per_chapter, budget.max_words_per_chapter,
    ));
    system.push_str("Use only these characters: ");
    let names: Vec<&str> = cast
        .all_characters()
        .map(|c| c.display_name.as_str())
        .collect();
    system.push_str(&names.join(", "));
    system.push_str(&format!(
        ".\nRespond with JSON only, exactly this shape:\n{STORY_JSON_SHAPE}\n"
    ));

    let mut user = String::from("Smooth out these stylistic issues:\n");
    for warning in warnings {
        match warning.chapter {
            Some(ch) => user.push_str(&format!("- Chapter {ch}: {}\n", warning.message)),
            None => user.push_str(&format!("- {}\n", warning.message)),
        }
    }
    user.push_str("\nStory:\n");
    user.push_str(&draft_as_text(draft));

    build(vec![Message::system(system), Message::user(user)], config)
}

fn draft_as_text(draft: &StoryDraft) -> String {
    let mut text = format!("Title: {}\n{}\n\n", draft.title, draft.description);
    for chapter in &draft.chapters {
        text.push_str(&format!("Chapter {}:\n{}\n\n", chapter.chapter, chapter.text));
    }
    text
}

fn build(messages: Vec<Message>, config: &PipelineConfig) -> FabulaResult<GenerateRequest> {
    GenerateRequest::builder()
        .messages(messages)
        .max_tokens(Some(8192))
        .temperature(Some(*config.temperature()))
        .model(Some(config.text_model().clone()))
        .build()
        .map_err(|e| {
            PipelineError::new(PipelineErrorKind::Configuration(e.to_string())).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprints::blueprint_for;
    use crate::canon::CanonFusionPlanner;
    use crate::cast::{CastNormalizer, build_integration_plan};
    use crate::directive::DirectiveBuilder;
    use crate::variant::plan_variants;
    use fabula_core::{
        Artifact, CharacterSheet, LengthHint, RoleType, StoryCategory,
    };

    fn fixture() -> (
        NormalizedRequest,
        Vec<SceneDirective>,
        CanonFusionPlan,
        CastSet,
        WordBudget,
        PipelineConfig,
    ) {
        let request = NormalizedRequest::new(
            Language::De,
            (5, 8),
            4,
            LengthHint::Short,
            11,
            StoryCategory::Adventure,
        );
        let bp = blueprint_for(StoryCategory::Adventure, 4);
        let raw = CastSet {
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
            pool_characters: vec![],
            artifact: Some(Artifact {
                id: "stone".to_string(),
                display_name: "Glitzerstein".to_string(),
                visual_signature: vec!["glittering blue stone".to_string()],
            }),
            slot_assignments: Default::default(),
        };
        let cast = CastNormalizer::new().normalize(raw, &bp).unwrap();
        let variants = plan_variants(11, StoryCategory::Adventure, &bp);
        let integration = build_integration_plan(&bp, &cast);
        let directives = DirectiveBuilder::new(&bp, &variants, &integration, &cast, vec![])
            .build()
            .unwrap();
        let canon = CanonFusionPlanner::new(Language::De, 11).plan(&cast, &directives);
        let budget = request.word_budget();
        (request, directives, canon, cast, budget, PipelineConfig::default())
    }

    #[test]
    fn test_story_request_carries_constraints() {
        let (request, directives, canon, cast, budget, config) = fixture();
        let req = story_request(&request, &directives, &canon, &cast, &budget, &config).unwrap();
        assert_eq!(req.messages.len(), 2);
        let system = &req.messages[0].content;
        assert!(system.contains("German"));
        assert!(system.contains("Lena"));
        assert!(system.contains("Glitzerstein"));
        assert!(system.contains("gehören seit jeher"));
        let user = &req.messages[1].content;
        assert!(user.contains("Chapter 1"));
        assert!(user.contains("Chapter 4"));
    }

    #[test]
    fn test_chapter_edit_scopes_to_one_chapter() {
        let (request, directives, canon, cast, budget, config) = fixture();
        let issues = vec![QualityIssue {
            gate: fabula_core::GateName::LengthPacing,
            chapter: Some(2),
            code: fabula_core::QualityGateCode::ChapterTooShort,
            message: "40 words, minimum is 90".to_string(),
            severity: fabula_core::Severity::Error,
        }];
        let req = chapter_edit_request(
            &request,
            &directives[1],
            &canon,
            &cast,
            &budget,
            &config,
            "Ein kurzer Text.",
            &issues,
        )
        .unwrap();
        assert!(req.messages[0].content.contains("exactly one chapter"));
        assert!(req.messages[1].content.contains("chapter 2"));
        assert!(req.messages[1].content.contains("minimum is 90"));
    }

    #[test]
    fn test_model_and_temperature_come_from_config() {
        let (request, directives, canon, cast, budget, config) = fixture();
        let req = story_request(&request, &directives, &canon, &cast, &budget, &config).unwrap();
        assert_eq!(req.model.as_deref(), Some("story-text-large"));
        assert_eq!(req.temperature, Some(0.8));
    }
}
