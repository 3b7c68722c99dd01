//! The bounded revision controller.
//!
//! Decides when and how to re-invoke the text generator after a draft fails
//! the quality gates. Cheapest remedy first: a deterministic trim pass costs
//! nothing, targeted chapter edits cost one chapter each, a whole-story
//! rewrite is last. Every generative call is gated by the run's token
//! ceiling, and a rewrite candidate replaces the current draft only when it
//! is strictly better.

use crate::extraction::{extract_json, parse_json};
use crate::prompts::{chapter_edit_request, polish_request, rewrite_request, story_request};
use crate::quality::QualityGateEngine;
use crate::sanitize::sanitize_draft;
use crate::text::split_sentences;
use fabula_core::{
    CanonFusionPlan, CastSet, Chapter, NormalizedRequest, PipelineConfig, QualityGateCode,
    QualityIssue, QualityReport, RunBudget, SceneDirective, Severity, StoryDraft, TokenUsage,
    WordBudget,
};
use fabula_error::{FabulaResult, ProviderError, ProviderErrorKind};
use fabula_interface::TextGenerator;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Score below which warning pile-ups justify emergency recovery.
const EMERGENCY_SCORE_THRESHOLD: f64 = 8.2;

/// Warning count (of rewrite-worthy codes) that, combined with a low score,
/// justifies emergency recovery.
const EMERGENCY_WARNING_COUNT: usize = 3;

/// Rewrite passes guaranteed when emergency recovery fires and rewrites are
/// allowed at all.
const EMERGENCY_REWRITE_PASSES: u32 = 2;

/// Warning codes a whole-story rewrite can plausibly fix.
const REWRITE_WORTHY: [QualityGateCode; 6] = [
    QualityGateCode::FillerOveruse,
    QualityGateCode::DuplicateSentence,
    QualityGateCode::WeakClimax,
    QualityGateCode::MetaphorOverload,
    QualityGateCode::PassiveCharacter,
    QualityGateCode::UnknownCharacter,
];

/// Warning codes a polish pass targets.
const POLISH_WORTHY: [QualityGateCode; 5] = [
    QualityGateCode::FillerOveruse,
    QualityGateCode::DuplicateSentence,
    QualityGateCode::MetaphorOverload,
    QualityGateCode::Cliffhanger,
    QualityGateCode::EndingTooShort,
];

/// How a revision run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RevisionStatus {
    /// The accepted draft has no error-severity issues
    Clean,
    /// Remedies ran out (call counters or token ceiling) with errors left
    BudgetExhausted,
    /// A rewrite pass left most of its targets unresolved; further passes
    /// were pointless
    Stalled,
}

/// The accepted draft with its final report and the tokens spent on it.
#[derive(Debug, Clone)]
pub struct RevisionOutcome {
    /// The best draft produced
    pub draft: StoryDraft,
    /// The report describing that draft
    pub report: QualityReport,
    /// Tokens spent across all calls, initial generation included
    pub usage: TokenUsage,
    /// Terminal condition of the revision loop
    pub status: RevisionStatus,
}

/// Runs initial generation and the revision loop for one story.
pub struct RevisionController<'a> {
    generator: &'a dyn TextGenerator,
    request: &'a NormalizedRequest,
    directives: &'a [SceneDirective],
    canon: &'a CanonFusionPlan,
    cast: &'a CastSet,
    budget: WordBudget,
    run_budget: RunBudget,
    config: &'a PipelineConfig,
}

impl<'a> RevisionController<'a> {
    /// Wire up a controller over one run's planning artifacts.
    pub fn new(
        generator: &'a dyn TextGenerator,
        request: &'a NormalizedRequest,
        directives: &'a [SceneDirective],
        canon: &'a CanonFusionPlan,
        cast: &'a CastSet,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            generator,
            request,
            directives,
            canon,
            cast,
            budget: request.word_budget(),
            run_budget: *config.budget(),
            config,
        }
    }

    fn engine(&self) -> QualityGateEngine<'_> {
        QualityGateEngine::new(
            self.budget,
            *self.request.language(),
            self.directives,
            self.cast,
            &self.canon.banned_phrases,
        )
    }

    /// Generate the initial draft and revise it until clean or out of
    /// remedies.
    ///
    /// # Errors
    ///
    /// Fails when the initial generation call fails or returns a draft that
    /// cannot be parsed. Revision-call failures after a usable draft exists
    /// are logged and treated as exhausted remedies, not as run failures.
    pub async fn run(&self) -> FabulaResult<RevisionOutcome> {
        let mut usage = TokenUsage::default();
        let mut draft = self.generate_initial(&mut usage).await?;
        let mut report = self.engine().evaluate(&draft);
        info!(score = report.score, errors = report.error_count(), "Initial draft evaluated");

        // Free remedy first: when the total overrun is the only hard error
        // the draft is trimmed, never regenerated. Any other error means a
        // generative remedy is due anyway.
        if only_total_too_long(&report) {
            draft = trim_draft(draft, &self.budget);
            report = self.engine().evaluate(&draft);
            debug!(score = report.score, "Draft trimmed to budget");
        }

        let mut edits_used = 0u32;
        while report.error_count() > 0
            && edits_used < *self.run_budget.max_expand_calls()
            && !self.run_budget.tokens_exhausted(&usage)
        {
            let targets = chapter_error_map(&report);
            let Some((&chapter, issues)) = targets.iter().max_by_key(|(ch, issues)| {
                (issues.len(), std::cmp::Reverse(**ch))
            }) else {
                break;
            };

            match self
                .edit_chapter(&mut draft, chapter, issues, &mut usage)
                .await
            {
                Ok(()) => {}
                Err(e) => {
                    warn!(chapter, error = %e, "Chapter edit failed, keeping current draft");
                    break;
                }
            }
            edits_used += 1;
            report = self.engine().evaluate(&draft);
        }

        // Emergency recovery widens the rewrite bound and grants a polish
        // pass even when the caller asked for none.
        let emergency = self.needs_rewrite(&report);
        let rewrite_limit = if emergency && *self.run_budget.max_rewrite_passes() > 0 {
            (*self.run_budget.max_rewrite_passes()).max(EMERGENCY_REWRITE_PASSES)
        } else {
            *self.run_budget.max_rewrite_passes()
        };
        let polish_limit = if emergency {
            (*self.run_budget.max_polish_passes()).max(1)
        } else {
            *self.run_budget.max_polish_passes()
        };

        let mut stalled = false;
        let mut rewrites_used = 0u32;
        while self.needs_rewrite(&report)
            && rewrites_used < rewrite_limit
            && !self.run_budget.tokens_exhausted(&usage)
            && !stalled
        {
            rewrites_used += 1;
            let targets = report.error_keys();
            match self.rewrite(&draft, &report, &mut usage).await {
                Ok((candidate, candidate_report)) => {
                    if candidate_beats_current(&candidate_report, &report) {
                        info!(
                            old_score = report.score,
                            new_score = candidate_report.score,
                            "Rewrite accepted"
                        );
                        draft = candidate;
                        report = candidate_report;
                    } else {
                        debug!("Rewrite rejected, keeping current draft");
                    }
                    // A pass that leaves at least half its targets standing
                    // ends the loop early.
                    let unresolved = targets.intersection(&report.error_keys()).count();
                    if !targets.is_empty() && unresolved * 2 >= targets.len() {
                        debug!(unresolved, targeted = targets.len(), "Rewrite pass stalled");
                        stalled = true;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Rewrite call failed, keeping current draft");
                    break;
                }
            }
        }
        report.rewrite_attempts = rewrites_used;

        if report.error_count() == 0
            && polish_limit > 0
            && !self.run_budget.tokens_exhausted(&usage)
        {
            let polish_targets: Vec<QualityIssue> = report
                .issues
                .iter()
                .filter(|i| i.severity == Severity::Warning && POLISH_WORTHY.contains(&i.code))
                .cloned()
                .collect();
            if !polish_targets.is_empty() {
                if let Ok((candidate, candidate_report)) =
                    self.polish(&draft, &polish_targets, &mut usage).await
                {
                    if candidate_report.error_count() == 0
                        && candidate_report.warning_count() < report.warning_count()
                    {
                        let rewrites = report.rewrite_attempts;
                        draft = candidate;
                        report = candidate_report;
                        report.rewrite_attempts = rewrites;
                    }
                }
            }
        }

        let status = if report.error_count() == 0 {
            RevisionStatus::Clean
        } else if stalled {
            RevisionStatus::Stalled
        } else {
            RevisionStatus::BudgetExhausted
        };
        Ok(RevisionOutcome {
            draft,
            report,
            usage,
            status,
        })
    }

    /// A rewrite is warranted by any remaining hard error, or by a low score
    /// carrying enough rewrite-worthy warnings.
    fn needs_rewrite(&self, report: &QualityReport) -> bool {
        if report.error_count() > 0 {
            return true;
        }
        let worthy = report
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Warning && REWRITE_WORTHY.contains(&i.code))
            .count();
        report.score < EMERGENCY_SCORE_THRESHOLD && worthy >= EMERGENCY_WARNING_COUNT
    }

    async fn generate_initial(&self, usage: &mut TokenUsage) -> FabulaResult<StoryDraft> {
        let req = story_request(
            self.request,
            self.directives,
            self.canon,
            self.cast,
            &self.budget,
            self.config,
        )?;
        let response = self.generator.generate(&req).await?;
        self.absorb(usage, &response.usage);
        let draft: StoryDraft = parse_json(&extract_json(&response.content)?)?;
        self.check_shape(&draft)?;
        Ok(sanitize_draft(draft))
    }

    async fn edit_chapter(
        &self,
        draft: &mut StoryDraft,
        chapter: u32,
        issues: &[QualityIssue],
        usage: &mut TokenUsage,
    ) -> FabulaResult<()> {
        let directive = self
            .directives
            .iter()
            .find(|d| d.chapter == chapter)
            .ok_or_else(|| {
                ProviderError::new(ProviderErrorKind::MalformedResponse(format!(
                    "no directive for chapter {chapter}"
                )))
            })?;
        let current = draft.chapter_text(chapter).unwrap_or_default().to_string();
        let req = chapter_edit_request(
            self.request,
            directive,
            self.canon,
            self.cast,
            &self.budget,
            self.config,
            &current,
            issues,
        )?;
        let response = self.generator.generate(&req).await?;
        self.absorb(usage, &response.usage);

        let edited: Chapter = parse_json(&extract_json(&response.content)?)?;
        if edited.chapter != chapter {
            warn!(
                expected = chapter,
                got = edited.chapter,
                "Edit came back for the wrong chapter, discarded"
            );
            return Ok(());
        }
        if let Some(slot) = draft.chapters.iter_mut().find(|c| c.chapter == chapter) {
            *slot = edited;
            *draft = sanitize_draft(std::mem::take(draft));
        }
        Ok(())
    }

    async fn rewrite(
        &self,
        draft: &StoryDraft,
        report: &QualityReport,
        usage: &mut TokenUsage,
    ) -> FabulaResult<(StoryDraft, QualityReport)> {
        let req = rewrite_request(
            self.request,
            self.directives,
            self.canon,
            self.cast,
            &self.budget,
            self.config,
            draft,
            &report.issues,
        )?;
        let response = self.generator.generate(&req).await?;
        self.absorb(usage, &response.usage);
        let candidate: StoryDraft = parse_json(&extract_json(&response.content)?)?;
        self.check_shape(&candidate)?;
        let candidate = sanitize_draft(candidate);
        let candidate_report = self.engine().evaluate(&candidate);
        Ok((candidate, candidate_report))
    }

    async fn polish(
        &self,
        draft: &StoryDraft,
        warnings: &[QualityIssue],
        usage: &mut TokenUsage,
    ) -> FabulaResult<(StoryDraft, QualityReport)> {
        let req = polish_request(
            self.request,
            self.cast,
            &self.budget,
            self.config,
            draft,
            warnings,
        )?;
        let response = self.generator.generate(&req).await?;
        self.absorb(usage, &response.usage);
        let candidate: StoryDraft = parse_json(&extract_json(&response.content)?)?;
        self.check_shape(&candidate)?;
        let candidate = sanitize_draft(candidate);
        let candidate_report = self.engine().evaluate(&candidate);
        Ok((candidate, candidate_report))
    }

    fn absorb(&self, usage: &mut TokenUsage, call: &TokenUsage) {
        let (prompt_price, completion_price) = *self.config.token_prices();
        usage.absorb(
            &TokenUsage::new(call.prompt_tokens, call.completion_tokens)
                .with_cost(prompt_price, completion_price),
        );
    }

    fn check_shape(&self, draft: &StoryDraft) -> FabulaResult<()> {
        if draft.chapters.len() != self.directives.len() {
            return Err(ProviderError::new(ProviderErrorKind::MalformedResponse(format!(
                "draft has {} chapters, expected {}",
                draft.chapters.len(),
                self.directives.len()
            )))
            .into());
        }
        Ok(())
    }
}

/// Chapter-scoped error issues, keyed by chapter.
fn chapter_error_map(report: &QualityReport) -> BTreeMap<u32, Vec<QualityIssue>> {
    let mut map: BTreeMap<u32, Vec<QualityIssue>> = BTreeMap::new();
    for issue in &report.issues {
        if issue.severity != Severity::Error {
            continue;
        }
        if let Some(ch) = issue.chapter {
            map.entry(ch).or_default().push(issue.clone());
        }
    }
    map
}

/// The trim pass applies only when the total-length overrun is the sole
/// remaining hard error.
fn only_total_too_long(report: &QualityReport) -> bool {
    report.error_count() > 0
        && report
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .all(|i| i.code == QualityGateCode::TotalTooLong)
}

/// The strict acceptance comparator for rewrite candidates.
///
/// A candidate wins only by being strictly better on the first differing
/// criterion: fewer errors, then more targeted errors resolved than new ones
/// introduced, then fewer failed gates, then fewer warnings, then a higher
/// score. A full tie keeps the current draft.
fn candidate_beats_current(candidate: &QualityReport, current: &QualityReport) -> bool {
    use std::cmp::Ordering;

    match candidate.error_count().cmp(&current.error_count()) {
        Ordering::Less => return true,
        Ordering::Greater => return false,
        Ordering::Equal => {}
    }

    let current_keys = current.error_keys();
    let candidate_keys = candidate.error_keys();
    let resolved = current_keys.difference(&candidate_keys).count();
    let introduced = candidate_keys.difference(&current_keys).count();
    match resolved.cmp(&introduced) {
        Ordering::Greater => return true,
        Ordering::Less => return false,
        Ordering::Equal => {}
    }

    let c = (candidate.failed_gates.len(), candidate.warning_count());
    let k = (current.failed_gates.len(), current.warning_count());
    match c.cmp(&k) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => candidate.score > current.score,
    }
}

/// Deterministic trim: drop trailing sentences from the longest chapters
/// until the draft fits its total budget, never shrinking a chapter below
/// its per-chapter minimum.
fn trim_draft(mut draft: StoryDraft, budget: &WordBudget) -> StoryDraft {
    while draft.total_word_count() > budget.max_total_words {
        let Some(longest) = draft
            .chapters
            .iter_mut()
            .filter(|c| c.word_count() > budget.min_words_per_chapter)
            .max_by_key(|c| c.word_count())
        else {
            break;
        };
        let sentences = split_sentences(&longest.text);
        if sentences.len() <= 1 {
            break;
        }
        let kept = sentences[..sentences.len() - 1].join(" ");
        if kept.split_whitespace().count() < budget.min_words_per_chapter {
            break;
        }
        longest.text = kept;
    }
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_core::{GateName, LengthHint};

    fn report_with(errors: usize, warnings: usize) -> QualityReport {
        let mut issues = Vec::new();
        for i in 0..errors {
            issues.push(QualityIssue {
                gate: GateName::LengthPacing,
                chapter: Some(i as u32 + 1),
                code: QualityGateCode::ChapterTooShort,
                message: "e".to_string(),
                severity: Severity::Error,
            });
        }
        for _ in 0..warnings {
            issues.push(QualityIssue {
                gate: GateName::RepetitionLimiter,
                chapter: None,
                code: QualityGateCode::FillerOveruse,
                message: "w".to_string(),
                severity: Severity::Warning,
            });
        }
        QualityReport::from_issues(issues)
    }

    fn error_report(chapters: &[u32]) -> QualityReport {
        QualityReport::from_issues(
            chapters
                .iter()
                .map(|&ch| QualityIssue {
                    gate: GateName::LengthPacing,
                    chapter: Some(ch),
                    code: QualityGateCode::ChapterTooShort,
                    message: "e".to_string(),
                    severity: Severity::Error,
                })
                .collect(),
        )
    }

    #[test]
    fn test_comparator_prefers_fewer_errors() {
        assert!(candidate_beats_current(&report_with(0, 5), &report_with(1, 0)));
        assert!(!candidate_beats_current(&report_with(2, 0), &report_with(1, 0)));
    }

    #[test]
    fn test_comparator_rejects_full_tie() {
        assert!(!candidate_beats_current(&report_with(1, 2), &report_with(1, 2)));
    }

    #[test]
    fn test_comparator_breaks_error_tie_on_warnings() {
        assert!(candidate_beats_current(&report_with(1, 1), &report_with(1, 3)));
    }

    #[test]
    fn test_comparator_credits_net_resolution() {
        // Same error count, but the candidate concentrates both errors in
        // chapter 1: one current key resolved, none introduced.
        let current = error_report(&[1, 2]);
        let candidate = error_report(&[1, 1]);
        assert!(candidate_beats_current(&candidate, &current));
    }

    #[test]
    fn test_comparator_rejects_pure_key_swap() {
        // Trading two error keys for two fresh ones is no improvement.
        let current = error_report(&[1, 2]);
        let candidate = error_report(&[3, 4]);
        assert!(!candidate_beats_current(&candidate, &current));
    }

    #[test]
    fn test_trim_only_when_total_overrun_is_sole_error() {
        let sole = QualityReport::from_issues(vec![QualityIssue {
            gate: GateName::LengthPacing,
            chapter: None,
            code: QualityGateCode::TotalTooLong,
            message: "e".to_string(),
            severity: Severity::Error,
        }]);
        assert!(only_total_too_long(&sole));

        let mut mixed_issues = sole.issues.clone();
        mixed_issues.push(QualityIssue {
            gate: GateName::LengthPacing,
            chapter: Some(2),
            code: QualityGateCode::ChapterTooShort,
            message: "e".to_string(),
            severity: Severity::Error,
        });
        assert!(!only_total_too_long(&QualityReport::from_issues(mixed_issues)));

        assert!(!only_total_too_long(&report_with(0, 2)));
    }

    #[test]
    fn test_trim_respects_chapter_floor() {
        let budget = WordBudget::derive(LengthHint::Short, 2);
        let sentence = "Dies ist ein ganz normaler Beispielsatz mit genau neun Wörtern hier.";
        let long_text = (0..40).map(|_| sentence).collect::<Vec<_>>().join(" ");
        let draft = StoryDraft {
            title: "T".to_string(),
            description: "D".to_string(),
            chapters: vec![
                Chapter { chapter: 1, text: long_text.clone() },
                Chapter { chapter: 2, text: long_text },
            ],
        };
        let trimmed = trim_draft(draft, &budget);
        assert!(trimmed.total_word_count() <= budget.max_total_words);
        for c in &trimmed.chapters {
            assert!(c.word_count() >= budget.min_words_per_chapter);
        }
    }

    #[test]
    fn test_chapter_error_map_groups_by_chapter() {
        let report = report_with(3, 2);
        let map = chapter_error_map(&report);
        assert_eq!(map.len(), 3);
        assert!(map.values().all(|v| v.len() == 1));
    }
}
