//! The phase orchestrator: runs the fixed phase sequence with idempotent
//! checkpointing.
//!
//! Every phase result is persisted under `(run_id, phase)` before the next
//! phase starts. Re-running a run id skips phases whose artifacts already
//! exist, so a crashed or cancelled run resumes where it stopped instead of
//! burning tokens on work already done.

use crate::blueprints::blueprint_for;
use crate::canon::CanonFusionPlanner;
use crate::cast::{CastNormalizer, build_integration_plan};
use crate::directive::DirectiveBuilder;
use crate::image_spec::{ImageSpecValidator, build_image_specs};
use crate::revision::{RevisionController, RevisionOutcome, RevisionStatus};
use crate::schema::DefaultSchemaValidator;
use crate::variant::plan_variants;
use fabula_core::{
    Blueprint, CanonFusionPlan, CastSet, GeneratedImage, ImageSpec, ImageSpecIssue,
    IntegrationPlan, Language, LengthHint, NormalizedRequest, PhaseName, PipelineConfig,
    PipelineRunResult, QualityGateCode, QualityReport, RunId, RunStatus, SceneDirective, Severity,
    StoryCategory, StoryDraft, TokenUsage, ValidationReport, VariantPlan,
};
use fabula_error::{FabulaError, FabulaResult, JsonError, PipelineError, PipelineErrorKind};
use fabula_interface::{CheckpointStore, ImageGenerator, SchemaValidator, TextGenerator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Raw caller input: the user's wishes plus the stored cast material for
/// this reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryRequest {
    /// Story language
    pub language: Language,
    /// Reader age range, in any order
    pub age_range: (u8, u8),
    /// Requested chapter count (clamped during normalization)
    pub chapter_count: u32,
    /// Coarse length hint
    pub length_hint: LengthHint,
    /// Planning seed; a random seed is drawn when absent
    pub seed: Option<u64>,
    /// Narrative category
    pub category: StoryCategory,
    /// Raw cast material as stored, repaired during the cast phase
    pub cast: CastSet,
}

/// The story-text checkpoint artifact: draft, report, and the tokens spent
/// producing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoryTextArtifact {
    draft: StoryDraft,
    report: QualityReport,
    usage: TokenUsage,
}

/// The image-specs checkpoint artifact: validated specs plus residual lint
/// findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageSpecsArtifact {
    specs: Vec<ImageSpec>,
    residual: Vec<ImageSpecIssue>,
}

/// The images checkpoint artifact: rendered images and the tokens spent.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImagesArtifact {
    images: Vec<GeneratedImage>,
    usage: TokenUsage,
}

/// Drives one run through the fixed phase sequence.
pub struct Orchestrator<'a> {
    text: &'a dyn TextGenerator,
    images: Option<&'a dyn ImageGenerator>,
    store: &'a dyn CheckpointStore,
    config: PipelineConfig,
}

impl<'a> Orchestrator<'a> {
    /// Wire up an orchestrator. Passing no image generator skips rendering;
    /// image specs are still produced and validated.
    pub fn new(
        text: &'a dyn TextGenerator,
        images: Option<&'a dyn ImageGenerator>,
        store: &'a dyn CheckpointStore,
        config: PipelineConfig,
    ) -> Self {
        Self {
            text,
            images,
            store,
            config,
        }
    }

    /// Execute (or resume) one run.
    ///
    /// Always persists a terminal validation report, for errored runs too.
    /// A phase failure is persisted under the validation phase and then
    /// re-raised, so callers see the error while the store keeps a record
    /// of how far the run got.
    ///
    /// # Errors
    ///
    /// Returns the failing phase's error, or a store error when persisting
    /// the terminal report fails.
    pub async fn run(&self, run_id: RunId, request: StoryRequest) -> FabulaResult<PipelineRunResult> {
        let mut result = PipelineRunResult {
            run_id: Some(run_id),
            status: Some(RunStatus::Running),
            ..Default::default()
        };

        let outcome = self.execute(run_id, request, &mut result).await;

        let start = Instant::now();
        let prior = result.validation_report.take().unwrap_or_default();
        let validation = match &outcome {
            Ok(()) => {
                result.status = Some(RunStatus::Complete);
                ValidationReport {
                    quality: prior.quality,
                    image_issues: prior.image_issues,
                    error: None,
                }
            }
            Err(e) => {
                error!(%run_id, error = %e, "Run failed");
                result.status = Some(RunStatus::Error);
                ValidationReport {
                    quality: prior.quality,
                    image_issues: prior.image_issues,
                    error: Some(e.to_string()),
                }
            }
        };

        let value = serde_json::to_value(&validation)
            .map_err(|e| JsonError::new(format!("failed to serialize validation report: {e}")))?;
        self.store.put(run_id, PhaseName::Validation, value).await?;
        self.store
            .log_event(
                run_id,
                fabula_interface::LogEvent {
                    phase: PhaseName::Validation,
                    duration_ms: start.elapsed().as_millis() as u64,
                    summary: match &validation.error {
                        Some(e) => format!("errored: {e}"),
                        None => "complete".to_string(),
                    },
                },
            )
            .await?;
        result.validation_report = Some(validation);
        outcome?;
        Ok(result)
    }

    async fn execute(
        &self,
        run_id: RunId,
        request: StoryRequest,
        result: &mut PipelineRunResult,
    ) -> FabulaResult<()> {
        let raw_cast = request.cast.clone();

        let normalized: NormalizedRequest = self
            .checkpointed(run_id, PhaseName::NormalizeRequest, || async {
                Ok(NormalizedRequest::new(
                    request.language,
                    request.age_range,
                    request.chapter_count,
                    request.length_hint,
                    request.seed.unwrap_or_else(rand::random),
                    request.category,
                ))
            })
            .await?;
        result.normalized_request = Some(normalized.clone());

        let blueprint: Blueprint = self
            .checkpointed(run_id, PhaseName::Blueprint, || async {
                let bp = blueprint_for(*normalized.category(), *normalized.chapter_count());
                if bp.scenes.is_empty() {
                    return Err(PipelineError::new(PipelineErrorKind::EmptyBlueprint(
                        normalized.category().to_string(),
                    ))
                    .into());
                }
                Ok(bp)
            })
            .await?;

        let variants: VariantPlan = self
            .checkpointed(run_id, PhaseName::VariantPlan, || async {
                let plan = plan_variants(*normalized.seed(), *normalized.category(), &blueprint);
                let report = DefaultSchemaValidator.validate_variant_plan(&plan);
                if !report.valid {
                    return Err(PipelineError::new(PipelineErrorKind::PhaseFailed {
                        phase: PhaseName::VariantPlan.to_string(),
                        message: report.errors.join("; "),
                    })
                    .into());
                }
                Ok(plan)
            })
            .await?;
        result.variant_plan = Some(variants.clone());

        let cast: CastSet = self
            .checkpointed(run_id, PhaseName::Cast, || async {
                CastNormalizer::new().normalize(raw_cast, &blueprint)
            })
            .await?;
        result.cast_set = Some(cast.clone());

        let integration: IntegrationPlan = self
            .checkpointed(run_id, PhaseName::IntegrationPlan, || async {
                Ok(build_integration_plan(&blueprint, &cast))
            })
            .await?;

        let directives: Vec<SceneDirective> = self
            .checkpointed(run_id, PhaseName::SceneDirectives, || async {
                DirectiveBuilder::new(
                    &blueprint,
                    &variants,
                    &integration,
                    &cast,
                    self.config.global_avoid().clone(),
                )
                .build()
            })
            .await?;
        result.scene_directives = Some(directives.clone());

        let canon: CanonFusionPlan = self
            .checkpointed(run_id, PhaseName::CanonFusion, || async {
                Ok(CanonFusionPlanner::new(*normalized.language(), *normalized.seed())
                    .plan(&cast, &directives))
            })
            .await?;

        let story: StoryTextArtifact = self
            .checkpointed(run_id, PhaseName::StoryText, || async {
                let controller = RevisionController::new(
                    self.text,
                    &normalized,
                    &directives,
                    &canon,
                    &cast,
                    &self.config,
                );
                let RevisionOutcome {
                    draft,
                    report,
                    usage,
                    status,
                } = controller.run().await?;
                if status != RevisionStatus::Clean {
                    warn!(%status, score = report.score, "Draft accepted with residual errors");
                }
                Ok(StoryTextArtifact {
                    draft,
                    report,
                    usage,
                })
            })
            .await?;
        result.story_draft = Some(story.draft.clone());
        result.token_usage.absorb(&story.usage);

        // An instruction leak or a missing lead character surviving the
        // revision loop cannot be shipped; the run fails rather than
        // delivering a broken story.
        let unrecoverable: Vec<String> = story
            .report
            .issues
            .iter()
            .filter(|i| {
                i.severity == Severity::Error
                    && matches!(
                        i.code,
                        QualityGateCode::InstructionLeak | QualityGateCode::MissingCharacter
                    )
            })
            .map(|i| i.message.clone())
            .collect();
        if !unrecoverable.is_empty() {
            result.validation_report = Some(ValidationReport {
                quality: Some(story.report.clone()),
                image_issues: Vec::new(),
                error: None,
            });
            return Err(PipelineError::new(PipelineErrorKind::QualityUnrecoverable(
                unrecoverable.join("; "),
            ))
            .into());
        }

        let quality: QualityReport = self
            .checkpointed(run_id, PhaseName::QualityReport, || async {
                Ok(story.report.clone())
            })
            .await?;
        result.validation_report = Some(ValidationReport {
            quality: Some(quality.clone()),
            image_issues: Vec::new(),
            error: None,
        });

        let specs: ImageSpecsArtifact = self
            .checkpointed(run_id, PhaseName::ImageSpecs, || async {
                let built =
                    build_image_specs(&directives, &cast, self.config.global_negatives());
                let validator = ImageSpecValidator::new(&directives, &cast);
                let (specs, residual) = validator.validate_and_fix(built);
                Ok(ImageSpecsArtifact { specs, residual })
            })
            .await?;
        result.image_specs = Some(specs.specs.clone());
        if let Some(v) = result.validation_report.as_mut() {
            v.image_issues = specs.residual.clone();
        }

        let rendered: ImagesArtifact = self
            .checkpointed(run_id, PhaseName::Images, || async {
                let Some(renderer) = self.images else {
                    debug!("No image generator configured, skipping rendering");
                    return Ok(ImagesArtifact {
                        images: Vec::new(),
                        usage: TokenUsage::default(),
                    });
                };
                let mut images = Vec::with_capacity(specs.specs.len());
                let mut usage = TokenUsage::default();
                for spec in &specs.specs {
                    let (image, call_usage) = renderer.render(spec).await?;
                    usage.absorb(&call_usage);
                    images.push(image);
                }
                Ok(ImagesArtifact { images, usage })
            })
            .await?;
        result.token_usage.absorb(&rendered.usage);
        result.images = Some(rendered.images);

        info!(%run_id, "Run complete");
        Ok(())
    }

    /// Run one phase with checkpointing: a persisted artifact short-circuits
    /// the computation, otherwise the fresh artifact is persisted before it
    /// is returned.
    async fn checkpointed<T, F, Fut>(
        &self,
        run_id: RunId,
        phase: PhaseName,
        compute: F,
    ) -> FabulaResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = FabulaResult<T>>,
    {
        if let Some(value) = self.store.get(run_id, phase).await? {
            match serde_json::from_value::<T>(value) {
                Ok(artifact) => {
                    debug!(%run_id, %phase, "Resuming from checkpoint");
                    return Ok(artifact);
                }
                Err(e) => {
                    // A stale or hand-edited artifact is recomputed, not
                    // trusted.
                    warn!(%run_id, %phase, error = %e, "Unreadable checkpoint, recomputing");
                }
            }
        }

        let start = Instant::now();
        let artifact = compute().await.map_err(|e: FabulaError| {
            // Phase failures are logged against the phase before bubbling.
            error!(%run_id, %phase, error = %e, "Phase failed");
            e
        })?;
        let value = serde_json::to_value(&artifact)
            .map_err(|e| JsonError::new(format!("failed to serialize {phase} artifact: {e}")))?;
        self.store.put(run_id, phase, value).await?;
        self.store
            .log_event(
                run_id,
                fabula_interface::LogEvent {
                    phase,
                    duration_ms: start.elapsed().as_millis() as u64,
                    summary: format!("{phase} complete"),
                },
            )
            .await?;
        Ok(artifact)
    }
}
