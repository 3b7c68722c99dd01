//! The rule-based quality gate engine.
//!
//! Eleven independent gates evaluate an accepted draft candidate and emit
//! coded issues. Evaluation is a pure function of its inputs: no provider
//! calls, no randomness, no state. Evaluating the same draft twice yields
//! the same report.

use crate::canon::detect_banned_phrases;
use crate::text::{
    contains_ignore_case, dialogue_line_count, has_dialogue_marker, similarity, split_sentences,
    word_count,
};
use fabula_core::{
    CastSet, GateName, Language, QualityGateCode, QualityIssue, QualityReport, SceneDirective,
    Severity, StoryDraft, WordBudget,
};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Minimum sentences per chapter.
const MIN_SENTENCES: usize = 5;

/// Dialogue quota bounds per chapter. Falling below the floor blocks the
/// gate; exceeding the ceiling is only surfaced.
const MIN_DIALOGUE_LINES: usize = 2;
const MAX_DIALOGUE_LINES: usize = 6;

/// Similarity above which two sentences in different chapters count as
/// duplicates.
const DUPLICATE_THRESHOLD: f64 = 0.85;

/// Shortest sentence (in words) considered for duplicate detection.
const DUPLICATE_MIN_WORDS: usize = 6;

/// Uses of one filler word tolerated across the whole draft.
const FILLER_ALLOWANCE: usize = 3;

/// Metaphor markers allowed per chapter before the imagery gate objects.
const MAX_METAPHORS_PER_CHAPTER: usize = 3;

/// Filler words checked per language.
const FILLERS_DE: [&str; 4] = ["plötzlich", "auf einmal", "dann", "sehr"];
const FILLERS_EN: [&str; 4] = ["suddenly", "all at once", "then", "very"];

/// Meta text that must never leak into prose.
const LEAK_MARKERS: [&str; 8] = [
    "system:",
    "assistant:",
    "word count",
    "wortanzahl",
    "as an ai",
    "als ki",
    "[instruction",
    "prompt:",
];

fn attribution_regex(language: Language) -> &'static Regex {
    static DE: OnceLock<Regex> = OnceLock::new();
    static EN: OnceLock<Regex> = OnceLock::new();
    match language {
        Language::De => DE.get_or_init(|| {
            Regex::new(
                r"(?:sagte|rief|fragte|antwortete|flüsterte|meinte|lachte|murmelte)\s+([A-ZÄÖÜ][a-zäöüß]+)",
            )
            .unwrap()
        }),
        Language::En => EN.get_or_init(|| {
            Regex::new(
                r"(?:said|cried|asked|answered|whispered|laughed|murmured)\s+([A-Z][a-z]+)|([A-Z][a-z]+)\s+(?:said|cried|asked|answered|whispered|laughed|murmured)",
            )
            .unwrap()
        }),
    }
}

/// Evaluates drafts against the full gate set.
pub struct QualityGateEngine<'a> {
    budget: WordBudget,
    language: Language,
    directives: &'a [SceneDirective],
    cast: &'a CastSet,
    banned_phrases: &'a [String],
}

impl<'a> QualityGateEngine<'a> {
    /// Wire up an engine over the planning artifacts of one run.
    pub fn new(
        budget: WordBudget,
        language: Language,
        directives: &'a [SceneDirective],
        cast: &'a CastSet,
        banned_phrases: &'a [String],
    ) -> Self {
        Self {
            budget,
            language,
            directives,
            cast,
            banned_phrases,
        }
    }

    /// Run every gate against a sanitized draft.
    ///
    /// Issues come back in gate declaration order; the report's score and
    /// pass/fail sets are derived from them.
    pub fn evaluate(&self, draft: &StoryDraft) -> QualityReport {
        let mut issues = Vec::new();
        self.length_pacing(draft, &mut issues);
        self.chapter_structure(draft, &mut issues);
        self.dialogue_quota(draft, &mut issues);
        self.character_integration(draft, &mut issues);
        self.cast_lock(draft, &mut issues);
        self.repetition_limiter(draft, &mut issues);
        self.imagery_balance(draft, &mut issues);
        self.tension_arc(draft, &mut issues);
        self.artifact_arc(draft, &mut issues);
        self.ending_payoff(draft, &mut issues);
        self.instruction_leak(draft, &mut issues);

        let report = QualityReport::from_issues(issues);
        debug!(
            score = report.score,
            errors = report.error_count(),
            warnings = report.warning_count(),
            "Draft evaluated"
        );
        report
    }

    fn length_pacing(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        let total = draft.total_word_count();
        if total < self.budget.min_total_words {
            issues.push(issue(
                GateName::LengthPacing,
                None,
                QualityGateCode::TotalTooShort,
                format!("{total} words, minimum is {}", self.budget.min_total_words),
                Severity::Error,
            ));
        }
        if total > self.budget.max_total_words {
            issues.push(issue(
                GateName::LengthPacing,
                None,
                QualityGateCode::TotalTooLong,
                format!("{total} words, maximum is {}", self.budget.max_total_words),
                Severity::Error,
            ));
        }
        for chapter in &draft.chapters {
            let words = chapter.word_count();
            if words < self.budget.min_words_per_chapter {
                issues.push(issue(
                    GateName::LengthPacing,
                    Some(chapter.chapter),
                    QualityGateCode::ChapterTooShort,
                    format!(
                        "{words} words, minimum is {}",
                        self.budget.min_words_per_chapter
                    ),
                    Severity::Error,
                ));
            }
            if words > self.budget.max_words_per_chapter {
                issues.push(issue(
                    GateName::LengthPacing,
                    Some(chapter.chapter),
                    QualityGateCode::ChapterTooLong,
                    format!(
                        "{words} words, maximum is {}",
                        self.budget.max_words_per_chapter
                    ),
                    Severity::Error,
                ));
            }
        }
    }

    fn chapter_structure(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        for chapter in &draft.chapters {
            let sentences = split_sentences(&chapter.text);
            if sentences.len() < MIN_SENTENCES {
                issues.push(issue(
                    GateName::ChapterStructure,
                    Some(chapter.chapter),
                    QualityGateCode::TooFewSentences,
                    format!("{} sentences, minimum is {MIN_SENTENCES}", sentences.len()),
                    Severity::Warning,
                ));
            }
            if !has_dialogue_marker(&chapter.text) {
                issues.push(issue(
                    GateName::ChapterStructure,
                    Some(chapter.chapter),
                    QualityGateCode::MissingDialogueMarkers,
                    "no dialogue markers in chapter".to_string(),
                    Severity::Warning,
                ));
            }
        }
    }

    fn dialogue_quota(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        for chapter in &draft.chapters {
            let lines = dialogue_line_count(&chapter.text);
            if lines < MIN_DIALOGUE_LINES {
                issues.push(issue(
                    GateName::DialogueQuota,
                    Some(chapter.chapter),
                    QualityGateCode::TooFewDialogueLines,
                    format!("{lines} dialogue lines, target is {MIN_DIALOGUE_LINES}–{MAX_DIALOGUE_LINES}"),
                    Severity::Error,
                ));
            }
            if lines > MAX_DIALOGUE_LINES {
                issues.push(issue(
                    GateName::DialogueQuota,
                    Some(chapter.chapter),
                    QualityGateCode::TooManyDialogueLines,
                    format!("{lines} dialogue lines, target is {MIN_DIALOGUE_LINES}–{MAX_DIALOGUE_LINES}"),
                    Severity::Warning,
                ));
            }
        }
    }

    /// On-stage characters must appear and act; banned phrasing betraying a
    /// pasted-in character is an error wherever it occurs.
    fn character_integration(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        for directive in self.directives {
            let Some(text) = draft.chapter_text(directive.chapter) else {
                continue;
            };
            for slot in &directive.characters_on_stage {
                let Some(sheet) = self.cast.character_for_slot(slot) else {
                    continue;
                };
                let mentions = name_mentions(&text.to_lowercase(), &sheet.display_name);
                if mentions == 0 {
                    issues.push(issue(
                        GateName::CharacterIntegration,
                        Some(directive.chapter),
                        QualityGateCode::MissingCharacter,
                        format!("'{}' is on stage but never appears", sheet.display_name),
                        Severity::Error,
                    ));
                } else if mentions == 1 && word_count(text) > 150 {
                    issues.push(issue(
                        GateName::CharacterIntegration,
                        Some(directive.chapter),
                        QualityGateCode::PassiveCharacter,
                        format!(
                            "'{}' is mentioned once and never acts",
                            sheet.display_name
                        ),
                        Severity::Warning,
                    ));
                }
            }
            for phrase in detect_banned_phrases(text, self.banned_phrases) {
                issues.push(issue(
                    GateName::CharacterIntegration,
                    Some(directive.chapter),
                    QualityGateCode::BannedPhrase,
                    format!("banned phrase: \"{phrase}\""),
                    Severity::Error,
                ));
            }
        }
    }

    /// Dialogue attribution names outside the locked cast.
    fn cast_lock(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        let known: Vec<String> = self
            .cast
            .all_characters()
            .map(|c| c.display_name.clone())
            .chain(self.cast.artifact.iter().map(|a| a.display_name.clone()))
            .collect();
        let re = attribution_regex(self.language);

        for chapter in &draft.chapters {
            let mut flagged: Vec<String> = Vec::new();
            for caps in re.captures_iter(&chapter.text) {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string());
                let Some(name) = name else { continue };
                if !known.iter().any(|k| contains_ignore_case(k, &name))
                    && !flagged.contains(&name)
                {
                    flagged.push(name);
                }
            }
            for name in flagged {
                issues.push(issue(
                    GateName::CastLock,
                    Some(chapter.chapter),
                    QualityGateCode::UnknownCharacter,
                    format!("'{name}' speaks but is not in the cast"),
                    Severity::Warning,
                ));
            }
        }
    }

    fn repetition_limiter(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        let fillers = match self.language {
            Language::De => FILLERS_DE,
            Language::En => FILLERS_EN,
        };
        let full_text: String = draft
            .chapters
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();

        for filler in fillers {
            let hits = full_text.matches(filler).count();
            if hits > FILLER_ALLOWANCE {
                issues.push(issue(
                    GateName::RepetitionLimiter,
                    None,
                    QualityGateCode::FillerOveruse,
                    format!("'{filler}' appears {hits} times, allowance is {FILLER_ALLOWANCE}"),
                    Severity::Warning,
                ));
            }
        }

        // Near-duplicate sentences showing up again in a later chapter.
        let sentences: Vec<(u32, &str)> = draft
            .chapters
            .iter()
            .flat_map(|c| {
                split_sentences(&c.text)
                    .into_iter()
                    .filter(|s| word_count(s) >= DUPLICATE_MIN_WORDS)
                    .map(move |s| (c.chapter, s))
            })
            .collect();
        let mut reported_chapters = Vec::new();
        for (i, (chapter_a, a)) in sentences.iter().enumerate() {
            for (chapter_b, b) in sentences.iter().skip(i + 1) {
                if *chapter_b != *chapter_a
                    && similarity(a, b) > DUPLICATE_THRESHOLD
                    && !reported_chapters.contains(chapter_b)
                {
                    reported_chapters.push(*chapter_b);
                    issues.push(issue(
                        GateName::RepetitionLimiter,
                        Some(*chapter_b),
                        QualityGateCode::DuplicateSentence,
                        format!("near-duplicate sentence: \"{}\"", truncate(b, 60)),
                        Severity::Warning,
                    ));
                }
            }
        }
    }

    fn imagery_balance(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        let markers: &[&str] = match self.language {
            Language::De => &["wie ein", "wie eine", "als ob", "als wäre"],
            Language::En => &["like a", "like an", "as if", "as though"],
        };
        for chapter in &draft.chapters {
            let lower = chapter.text.to_lowercase();
            let count: usize = markers.iter().map(|m| lower.matches(m).count()).sum();
            if count > MAX_METAPHORS_PER_CHAPTER {
                issues.push(issue(
                    GateName::ImageryBalance,
                    Some(chapter.chapter),
                    QualityGateCode::MetaphorOverload,
                    format!("{count} metaphor markers, maximum is {MAX_METAPHORS_PER_CHAPTER}"),
                    Severity::Warning,
                ));
            }
        }
    }

    /// The climax chapter must not be noticeably thinner than the rest.
    fn tension_arc(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        let Some(climax) = self
            .directives
            .iter()
            .find(|d| d.mood == fabula_core::Mood::Tense)
        else {
            return;
        };
        let Some(text) = draft.chapter_text(climax.chapter) else {
            return;
        };
        let chapters = draft.chapters.len().max(1);
        let avg = draft.total_word_count() / chapters;
        let words = word_count(text);
        if words * 10 < avg * 8 {
            issues.push(issue(
                GateName::TensionArc,
                Some(climax.chapter),
                QualityGateCode::WeakClimax,
                format!("climax has {words} words against a {avg}-word average"),
                Severity::Warning,
            ));
        }
    }

    fn artifact_arc(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        let Some(artifact) = &self.cast.artifact else {
            return;
        };
        let mentions_by_chapter: Vec<(u32, usize)> = draft
            .chapters
            .iter()
            .map(|c| {
                (
                    c.chapter,
                    c.text
                        .to_lowercase()
                        .matches(&artifact.display_name.to_lowercase())
                        .count(),
                )
            })
            .collect();
        let total: usize = mentions_by_chapter.iter().map(|(_, n)| n).sum();
        if total < 2 {
            issues.push(issue(
                GateName::ArtifactArc,
                None,
                QualityGateCode::ArtifactUnderused,
                format!("'{}' is mentioned {total} times", artifact.display_name),
                Severity::Warning,
            ));
        }

        let first_mention = mentions_by_chapter
            .iter()
            .find(|(_, n)| *n > 0)
            .map(|(ch, _)| *ch);
        let first_required = self
            .directives
            .iter()
            .find(|d| d.requires_artifact())
            .map(|d| d.chapter);
        if let (Some(mentioned), Some(required)) = (first_mention, first_required) {
            if mentioned > required {
                issues.push(issue(
                    GateName::ArtifactArc,
                    Some(required),
                    QualityGateCode::ArtifactLateIntroduction,
                    format!(
                        "'{}' first appears in chapter {mentioned}, expected by chapter {required}",
                        artifact.display_name
                    ),
                    Severity::Warning,
                ));
            }
        }
    }

    fn ending_payoff(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        let Some(last) = draft.chapters.last() else {
            return;
        };
        let words = last.word_count();
        if words * 10 < self.budget.min_words_per_chapter * 8 {
            issues.push(issue(
                GateName::EndingPayoff,
                Some(last.chapter),
                QualityGateCode::EndingTooShort,
                format!("final chapter has {words} words"),
                Severity::Warning,
            ));
        }

        let cliffhanger_markers: &[&str] = match self.language {
            Language::De => &["fortsetzung folgt", "was würde als nächstes"],
            Language::En => &["to be continued", "what would happen next"],
        };
        let lower = last.text.to_lowercase();
        let final_sentence_open = split_sentences(&last.text)
            .last()
            .is_some_and(|s| s.trim_end_matches(['"', '\u{201c}', '\u{00bb}']).ends_with('?'));
        if final_sentence_open || cliffhanger_markers.iter().any(|m| lower.contains(m)) {
            issues.push(issue(
                GateName::EndingPayoff,
                Some(last.chapter),
                QualityGateCode::Cliffhanger,
                "the story ends on an open question".to_string(),
                Severity::Warning,
            ));
        }
    }

    fn instruction_leak(&self, draft: &StoryDraft, issues: &mut Vec<QualityIssue>) {
        for chapter in &draft.chapters {
            let lower = chapter.text.to_lowercase();
            for marker in LEAK_MARKERS {
                if lower.contains(marker) {
                    issues.push(issue(
                        GateName::InstructionLeak,
                        Some(chapter.chapter),
                        QualityGateCode::InstructionLeak,
                        format!("leaked instruction text: \"{marker}\""),
                        Severity::Error,
                    ));
                    break;
                }
            }
        }
    }
}

/// Count mentions of a display name in lowercased prose: the full name or
/// any whitespace-separated part of at least three characters counts.
fn name_mentions(text_lower: &str, display_name: &str) -> usize {
    let full = display_name.to_lowercase();
    std::iter::once(full.as_str())
        .chain(full.split_whitespace().filter(|part| part.chars().count() >= 3))
        .map(|needle| text_lower.matches(needle).count())
        .max()
        .unwrap_or(0)
}

fn issue(
    gate: GateName,
    chapter: Option<u32>,
    code: QualityGateCode,
    message: String,
    severity: Severity,
) -> QualityIssue {
    QualityIssue {
        gate,
        chapter,
        code,
        message,
        severity,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
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
        Artifact, CharacterSheet, Chapter, LengthHint, RoleType, StoryCategory,
    };

    struct Fixture {
        budget: WordBudget,
        directives: Vec<SceneDirective>,
        cast: CastSet,
        banned: Vec<String>,
    }

    impl Fixture {
        fn new(chapters: u32) -> Self {
            let bp = blueprint_for(StoryCategory::Adventure, chapters);
            let raw = CastSet {
                avatars: vec![sheet("Lena", RoleType::Avatar)],
                pool_characters: vec![sheet("Theo", RoleType::Companion)],
                artifact: Some(Artifact {
                    id: "stone".to_string(),
                    display_name: "Glitzerstein".to_string(),
                    visual_signature: vec!["glittering".to_string()],
                }),
                slot_assignments: Default::default(),
            };
            let cast = CastNormalizer::new().normalize(raw, &bp).unwrap();
            let variants = plan_variants(1, StoryCategory::Adventure, &bp);
            let integration = build_integration_plan(&bp, &cast);
            let directives = DirectiveBuilder::new(&bp, &variants, &integration, &cast, vec![])
                .build()
                .unwrap();
            let banned = CanonFusionPlanner::new(Language::De, 1).banned_phrases();
            Self {
                budget: WordBudget::derive(LengthHint::Short, chapters),
                directives,
                cast,
                banned,
            }
        }

        fn engine(&self) -> QualityGateEngine<'_> {
            QualityGateEngine::new(
                self.budget,
                Language::De,
                &self.directives,
                &self.cast,
                &self.banned,
            )
        }
    }

    fn sheet(name: &str, role: RoleType) -> CharacterSheet {
        CharacterSheet {
            id: name.to_lowercase(),
            display_name: name.to_string(),
            role,
            archetype: "test".to_string(),
            personality: vec!["kind".to_string()],
            visual_signature: vec!["hat".to_string()],
            outfit_lock: vec!["hat".to_string()],
            forbidden: vec!["none".to_string()],
            catchphrase: None,
            usage_count: 0,
            match_scores: vec![],
        }
    }

    /// A chapter that satisfies the gates: enough words, sentences, and
    /// dialogue, with both cast names and the artifact woven in.
    fn good_chapter(n: u32, names: &str) -> Chapter {
        let base = format!(
            "{names} liefen gemeinsam den Pfad entlang und der Glitzerstein funkelte hell. \
             \u{201e}Schau nur, wie er leuchtet!\u{201c} rief Lena begeistert und zeigte nach vorn. \
             Theo nickte ernst und prüfte noch einmal die Karte in seiner Tasche. \
             \u{201e}Gleich hinter dem Bach beginnt der Wald\u{201c}, sagte Theo leise. \
             Gemeinsam kletterten die beiden über moosige Steine und zählten ihre Schritte. \
             Der Wind trug den Duft von Harz und nassem Laub zu ihnen herüber. \
             Am Ende der Lichtung fanden die Freunde einen Hinweis und freuten sich sehr."
        );
        // Pad to clear the per-chapter minimum without tripping the maximum.
        let filler = "Schritt für Schritt ging es weiter über Wurzeln und weiche Erde voran.";
        let mut text = base;
        while crate::text::word_count(&text) < 100 {
            text.push(' ');
            text.push_str(filler);
        }
        Chapter { chapter: n, text }
    }

    fn good_draft(chapters: u32) -> StoryDraft {
        StoryDraft {
            title: "Der Glitzerstein".to_string(),
            description: "Eine Abenteuergeschichte".to_string(),
            chapters: (1..=chapters).map(|n| good_chapter(n, "Lena und Theo")).collect(),
        }
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let fx = Fixture::new(3);
        let draft = good_draft(3);
        let a = fx.engine().evaluate(&draft);
        let b = fx.engine().evaluate(&draft);
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_chapter_is_an_error() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        draft.chapters[1].text = "Viel zu kurz. \u{201e}Oh!\u{201c} rief Lena. Theo und der Glitzerstein warteten.".to_string();
        let report = fx.engine().evaluate(&draft);
        assert!(report
            .error_keys()
            .contains(&(GateName::LengthPacing, QualityGateCode::ChapterTooShort, Some(2))));
    }

    #[test]
    fn test_overlong_chapter_is_an_error() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        let filler = " Schritt für Schritt ging es weiter über Wurzeln und weiche Erde voran.";
        while draft.chapters[0].word_count() <= fx.budget.max_words_per_chapter {
            draft.chapters[0].text.push_str(filler);
        }
        let report = fx.engine().evaluate(&draft);
        assert!(report
            .error_keys()
            .contains(&(GateName::LengthPacing, QualityGateCode::ChapterTooLong, Some(1))));
    }

    #[test]
    fn test_dialogue_below_quota_is_an_error() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        // Drop one of the two dialogue lines in chapter 2.
        draft.chapters[1].text = draft.chapters[1].text.replace(
            "\u{201e}Gleich hinter dem Bach beginnt der Wald\u{201c}, sagte Theo leise.",
            "Theo deutete still auf den Weg hinter dem Bach.",
        );
        let report = fx.engine().evaluate(&draft);
        assert!(report
            .error_keys()
            .contains(&(GateName::DialogueQuota, QualityGateCode::TooFewDialogueLines, Some(2))));
    }

    #[test]
    fn test_sparse_chapter_structure_is_a_warning() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        draft.chapters[1].text = "Lena und Theo wanderten an diesem hellen Morgen \
            gemeinsam über die weite, taufrische Wiese hinunter zum alten Bach, wo \
            der Glitzerstein in Lenas Tasche leise funkelte und beide an ihr großes \
            Ziel erinnerte. \u{201e}Wir schaffen das noch vor dem Mittag, wenn wir \
            den schmalen Weg hinter der großen Eiche nehmen\u{201c}, sagte Lena ruhig \
            und strich die Karte auf einem flachen Stein glatt. \u{201e}Die Karte \
            zeigt gleich hinter den Felsen eine schmale Furt durch das klare \
            Wasser\u{201c}, sagte Theo und rückte seine Kappe zurecht. Danach \
            stapften die beiden Freunde zufrieden weiter, zählten am Ufer die \
            bunten Kiesel und hielten nach dem ersten verwitterten Wegweiser am \
            Waldrand Ausschau."
            .to_string();
        let report = fx.engine().evaluate(&draft);
        let hit = report
            .issues_with_code(QualityGateCode::TooFewSentences)
            .find(|i| i.chapter == Some(2))
            .unwrap();
        assert_eq!(hit.severity, Severity::Warning);
        assert!(!report.failed_gates.contains(&GateName::ChapterStructure));
    }

    #[test]
    fn test_near_duplicates_flagged_across_chapters() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        draft.chapters[0]
            .text
            .push_str(" Die Freunde folgten dem schmalen Pfad tief hinein in den stillen Wald.");
        draft.chapters[1]
            .text
            .push_str(" Die Freunde folgten dem schmalen Pfad weit hinein in den dunklen Wald.");
        let report = fx.engine().evaluate(&draft);
        assert!(report
            .issues_with_code(QualityGateCode::DuplicateSentence)
            .any(|i| i.chapter == Some(2)));
    }

    #[test]
    fn test_name_parts_count_as_mentions() {
        assert_eq!(name_mentions("jonas zog die karte hervor", "Kapitän Jonas"), 1);
        assert_eq!(name_mentions("der lange tag verging still", "Kapitän Jonas"), 0);
        // Parts shorter than three characters never match on their own.
        assert_eq!(name_mentions("ab und zu regnete es", "Bo Ab"), 0);
    }

    #[test]
    fn test_two_word_name_found_by_part() {
        let bp = blueprint_for(StoryCategory::Adventure, 3);
        let mut avatar = sheet("Lena", RoleType::Avatar);
        avatar.display_name = "Kapitänin Lena".to_string();
        let raw = CastSet {
            avatars: vec![avatar],
            pool_characters: vec![sheet("Theo", RoleType::Companion)],
            artifact: Some(Artifact {
                id: "stone".to_string(),
                display_name: "Glitzerstein".to_string(),
                visual_signature: vec!["glittering".to_string()],
            }),
            slot_assignments: Default::default(),
        };
        let cast = CastNormalizer::new().normalize(raw, &bp).unwrap();
        let variants = plan_variants(1, StoryCategory::Adventure, &bp);
        let integration = build_integration_plan(&bp, &cast);
        let directives = DirectiveBuilder::new(&bp, &variants, &integration, &cast, vec![])
            .build()
            .unwrap();
        let banned = CanonFusionPlanner::new(Language::De, 1).banned_phrases();
        let engine = QualityGateEngine::new(
            WordBudget::derive(LengthHint::Short, 3),
            Language::De,
            &directives,
            &cast,
            &banned,
        );
        // The draft only ever says "Lena", never the full display name.
        let report = engine.evaluate(&good_draft(3));
        assert!(report
            .issues_with_code(QualityGateCode::MissingCharacter)
            .next()
            .is_none());
    }

    #[test]
    fn test_missing_character_is_an_error() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        // Remove Theo from chapter 2 entirely.
        draft.chapters[1].text = draft.chapters[1].text.replace("Theo", "Jemand");
        let report = fx.engine().evaluate(&draft);
        assert!(report
            .issues_with_code(QualityGateCode::MissingCharacter)
            .any(|i| i.chapter == Some(2)));
    }

    #[test]
    fn test_banned_phrase_is_an_error() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        draft.chapters[0]
            .text
            .push_str(" Lena und Theo gehören seit jeher zusammen.");
        let report = fx.engine().evaluate(&draft);
        assert!(report
            .issues_with_code(QualityGateCode::BannedPhrase)
            .next()
            .is_some());
        assert!(report.failed_gates.contains(&GateName::CharacterIntegration));
    }

    #[test]
    fn test_unknown_speaker_is_a_warning() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        draft.chapters[2]
            .text
            .push_str(" \u{201e}Halt!\u{201c} rief Konrad aus dem Gebüsch.");
        let report = fx.engine().evaluate(&draft);
        let hit = report
            .issues_with_code(QualityGateCode::UnknownCharacter)
            .next()
            .unwrap();
        assert_eq!(hit.severity, Severity::Warning);
        assert!(hit.message.contains("Konrad"));
    }

    #[test]
    fn test_instruction_leak_is_an_error() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        draft.chapters[0].text.push_str(" Word count: 312.");
        let report = fx.engine().evaluate(&draft);
        assert!(report.failed_gates.contains(&GateName::InstructionLeak));
    }

    #[test]
    fn test_clean_draft_passes_all_gates() {
        let fx = Fixture::new(3);
        let report = fx.engine().evaluate(&good_draft(3));
        assert!(
            report.failed_gates.is_empty(),
            "unexpected failures: {:?}",
            report
                .issues
                .iter()
                .filter(|i| i.severity == Severity::Error)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_cliffhanger_detected() {
        let fx = Fixture::new(3);
        let mut draft = good_draft(3);
        draft.chapters[2]
            .text
            .push_str(" Doch was lauerte dort hinten im Schatten?");
        let report = fx.engine().evaluate(&draft);
        assert!(report
            .issues_with_code(QualityGateCode::Cliffhanger)
            .next()
            .is_some());
    }
}
