//! Quality issues, reports, and the aggregate score formula.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Severity of a quality issue.
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
)]
pub enum Severity {
    /// Blocks the gate; drives revision
    Error,
    /// Surfaced for visibility; never blocks completion
    Warning,
}

/// The independent rule evaluators of the quality gate engine.
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
pub enum GateName {
    /// Total and per-chapter word counts within budget
    LengthPacing,
    /// Sentence count and dialogue markers per chapter
    ChapterStructure,
    /// 2–6 dialogue lines per chapter
    DialogueQuota,
    /// On-stage characters appear and act in their chapters
    CharacterIntegration,
    /// No characters invented outside the locked cast
    CastLock,
    /// Filler frequency and near-duplicate sentences
    RepetitionLimiter,
    /// Metaphor density cap
    ImageryBalance,
    /// Climax chapter length floor
    TensionArc,
    /// Artifact mentions and early introduction
    ArtifactArc,
    /// Ending length and no cliffhanger
    EndingPayoff,
    /// No leaked prompt or instruction text
    InstructionLeak,
}

/// Machine-readable issue codes emitted by the gates.
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
    strum::IntoStaticStr,
)]
#[allow(missing_docs)]
pub enum QualityGateCode {
    TotalTooShort,
    TotalTooLong,
    ChapterTooShort,
    ChapterTooLong,
    TooFewSentences,
    MissingDialogueMarkers,
    TooFewDialogueLines,
    TooManyDialogueLines,
    MissingCharacter,
    PassiveCharacter,
    BannedPhrase,
    UnknownCharacter,
    FillerOveruse,
    DuplicateSentence,
    MetaphorOverload,
    WeakClimax,
    ArtifactUnderused,
    ArtifactLateIntroduction,
    EndingTooShort,
    Cliffhanger,
    InstructionLeak,
}

/// One finding from one gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Gate that produced the issue
    pub gate: GateName,
    /// Chapter the issue concerns, if chapter-scoped
    pub chapter: Option<u32>,
    /// Machine-readable code
    pub code: QualityGateCode,
    /// Human-readable explanation
    pub message: String,
    /// Severity
    pub severity: Severity,
}

impl QualityIssue {
    /// Stable identity key for net-resolved-vs-introduced comparisons.
    pub fn key(&self) -> (GateName, QualityGateCode, Option<u32>) {
        (self.gate, self.code, self.chapter)
    }
}

/// Aggregated evaluation of one draft.
///
/// `score = max(0, 10 − errors − 0.5·warnings)`; a gate fails iff it
/// produced at least one Error issue.
///
/// # Examples
///
/// ```
/// use fabula_core::QualityReport;
///
/// let report = QualityReport::from_issues(vec![]);
/// assert_eq!(report.score, 10.0);
/// assert!(report.failed_gates.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityReport {
    /// All issues in gate order
    pub issues: Vec<QualityIssue>,
    /// Aggregate score in [0, 10]
    pub score: f64,
    /// Gates that produced no Error issue
    pub passed_gates: BTreeSet<GateName>,
    /// Gates that produced at least one Error issue
    pub failed_gates: BTreeSet<GateName>,
    /// Rewrite passes spent producing the draft this report describes
    pub rewrite_attempts: u32,
}

impl QualityReport {
    /// Build a report from a raw issue list.
    pub fn from_issues(issues: Vec<QualityIssue>) -> Self {
        use strum::IntoEnumIterator;

        let errors = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count();
        let warnings = issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count();
        let score = (10.0 - errors as f64 - 0.5 * warnings as f64).max(0.0);

        let failed_gates: BTreeSet<GateName> = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.gate)
            .collect();
        let passed_gates: BTreeSet<GateName> = GateName::iter()
            .filter(|g| !failed_gates.contains(g))
            .collect();

        Self {
            issues,
            score,
            passed_gates,
            failed_gates,
            rewrite_attempts: 0,
        }
    }

    /// Count of Error-severity issues.
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    /// Count of Warning-severity issues.
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Identity keys of all Error-severity issues.
    pub fn error_keys(&self) -> BTreeSet<(GateName, QualityGateCode, Option<u32>)> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(QualityIssue::key)
            .collect()
    }

    /// Issues with the given code.
    pub fn issues_with_code(&self, code: QualityGateCode) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }
}

/// Terminal validation report persisted for every run, complete or errored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    /// Final quality report, when the text phase was reached
    pub quality: Option<QualityReport>,
    /// Residual image spec issues after the fix loop
    pub image_issues: Vec<crate::ImageSpecIssue>,
    /// Terminal error message for errored runs
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(code: QualityGateCode, severity: Severity) -> QualityIssue {
        QualityIssue {
            gate: GateName::LengthPacing,
            chapter: Some(1),
            code,
            message: "test".to_string(),
            severity,
        }
    }

    #[test]
    fn test_score_formula() {
        let report = QualityReport::from_issues(vec![
            issue(QualityGateCode::ChapterTooShort, Severity::Error),
            issue(QualityGateCode::FillerOveruse, Severity::Warning),
            issue(QualityGateCode::FillerOveruse, Severity::Warning),
        ]);
        assert_eq!(report.score, 8.0);
        assert!(report.failed_gates.contains(&GateName::LengthPacing));
    }

    #[test]
    fn test_score_floor_at_zero() {
        let issues: Vec<_> = (0..12)
            .map(|_| issue(QualityGateCode::ChapterTooShort, Severity::Error))
            .collect();
        let report = QualityReport::from_issues(issues);
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn test_warning_only_gate_passes() {
        let report = QualityReport::from_issues(vec![issue(
            QualityGateCode::FillerOveruse,
            Severity::Warning,
        )]);
        assert!(report.passed_gates.contains(&GateName::LengthPacing));
        assert!(report.failed_gates.is_empty());
        assert_eq!(report.score, 9.5);
    }
}
