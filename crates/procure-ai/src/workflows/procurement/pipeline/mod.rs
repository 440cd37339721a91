//! Five-stage recommendation pipeline: retrieve, normalize, evaluate, explain, learn.
//!
//! Each call to [`ProcurementPipeline::recommend`] owns a fresh fact base and candidate
//! set. The only state shared across runs is the feedback loop and the literature cache.

mod evaluate;
mod explain;
mod normalize;
mod outcome;
mod retrieve;

pub use outcome::{
    AcquisitionAction, AcquisitionRequest, ExplainedCandidate, ExplanationSource, Exclusion,
    FatalReason, FeedbackError, FeedbackReceipt, FeedbackSubmission, NoRecommendation,
    PipelineWarning, Recommendation, RecommendationOutcome, Stage, StageEntry, StageReport,
    StageStatus,
};

pub(crate) use evaluate::percepts;
pub(crate) use explain::template_explanation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::collaborators::{
    LiteratureCollaborator, OfflineEvidence, ReasoningCollaborator, SearchCollaborator,
};
use super::config::ProcurementConfig;
use super::domain::{ProcurementRequest, RunId};
use super::feedback::{FeedbackLoop, FeedbackRecord, FeedbackStore, SubScores};
use super::goal::{self, GoalMetrics};
use super::inference::{AdaptiveInput, InferenceEngine};
use super::literature::{CacheStats, CachedLiterature};
use super::quotation::Quotation;

use evaluate::Evaluation;
use explain::ExplainPlan;
use retrieve::RetrievalPlan;

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Millisecond start time followed by the per-process sequence.
fn next_run_id() -> RunId {
    let id = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RunId(format!("run-{}-{id:06}", Utc::now().format("%Y%m%dT%H%M%S%3f")))
}

/// External services the pipeline consults. Only search is mandatory.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Vec<Arc<dyn SearchCollaborator>>,
    pub literature: Arc<dyn LiteratureCollaborator>,
    pub reasoning: Option<Arc<dyn ReasoningCollaborator>>,
}

impl Collaborators {
    /// Search only; evidence falls back to the offline heuristic and explanations to the
    /// template.
    pub fn offline(search: Vec<Arc<dyn SearchCollaborator>>) -> Self {
        Self {
            search,
            literature: Arc::new(OfflineEvidence),
            reasoning: None,
        }
    }

    pub fn with_literature(mut self, literature: Arc<dyn LiteratureCollaborator>) -> Self {
        self.literature = literature;
        self
    }

    pub fn with_reasoning(mut self, reasoning: Arc<dyn ReasoningCollaborator>) -> Self {
        self.reasoning = Some(reasoning);
        self
    }
}

type SharedLiterature = CachedLiterature<Arc<dyn LiteratureCollaborator>>;

pub struct ProcurementPipeline<S> {
    config: Arc<ProcurementConfig>,
    search: Vec<Arc<dyn SearchCollaborator>>,
    literature: Arc<SharedLiterature>,
    reasoning: Option<Arc<dyn ReasoningCollaborator>>,
    feedback: Arc<FeedbackLoop<S>>,
    engine: InferenceEngine,
}

impl<S: FeedbackStore + 'static> ProcurementPipeline<S> {
    pub fn new(
        config: ProcurementConfig,
        collaborators: Collaborators,
        feedback: Arc<FeedbackLoop<S>>,
    ) -> Self {
        let engine = InferenceEngine::standard(config.iteration_cap);
        Self::with_engine(config, collaborators, feedback, engine)
    }

    /// Build a pipeline around a custom rule set.
    pub fn with_engine(
        config: ProcurementConfig,
        collaborators: Collaborators,
        feedback: Arc<FeedbackLoop<S>>,
        engine: InferenceEngine,
    ) -> Self {
        let literature = Arc::new(CachedLiterature::with_ttl_hours(
            collaborators.literature,
            config.evidence_cache_ttl_hours,
        ));

        Self {
            config: Arc::new(config),
            search: collaborators.search,
            literature,
            reasoning: collaborators.reasoning,
            feedback,
            engine,
        }
    }

    pub fn config(&self) -> &ProcurementConfig {
        &self.config
    }

    pub fn feedback(&self) -> &Arc<FeedbackLoop<S>> {
        &self.feedback
    }

    pub fn evidence_cache(&self) -> CacheStats {
        self.literature.stats()
    }

    /// Run stages one to four for a request. Stage five happens later through
    /// [`ProcurementPipeline::learn`].
    pub async fn recommend(&self, request: ProcurementRequest) -> RecommendationOutcome {
        let run_id = next_run_id();
        let config = &self.config;
        let timeout = config.collaborator_timeout();
        let mut stages = StageReport::default();
        let mut warnings = Vec::new();

        info!(run_id = %run_id, query = %request.query, budget = request.budget, "procurement run started");

        if let Some(warning) = self.feedback.take_warning() {
            warnings.push(PipelineWarning::PersistenceFailure {
                detail: warning.message,
            });
        }

        let line_items = request.requested_line_items();
        let retrieval = retrieve::retrieve(
            &line_items,
            &RetrievalPlan {
                search: &self.search,
                reasoning: self.reasoning.as_ref(),
                max_results: config.max_results_per_query,
                max_variants: config.max_query_variants,
                timeout,
            },
        )
        .await;
        let retrieved = retrieval.records.len();
        stages.push(
            Stage::Retrieve,
            if retrieval.warnings.is_empty() {
                StageStatus::Completed
            } else {
                StageStatus::Degraded
            },
            format!(
                "{retrieved} records from {} queries ({} failed, {} duplicates)",
                retrieval.queries, retrieval.failures, retrieval.duplicates
            ),
        );
        warnings.extend(retrieval.warnings);

        let literature: Arc<dyn LiteratureCollaborator> = self.literature.clone();
        let normalized =
            normalize::normalize(retrieval.records, &request.currency, literature, timeout).await;
        stages.push(
            Stage::Normalize,
            if normalized.warnings.is_empty() {
                StageStatus::Completed
            } else {
                StageStatus::Degraded
            },
            format!(
                "{} candidates, {} dropped, {} evidence lookups",
                normalized.candidates.len(),
                normalized.dropped.len(),
                normalized.evidence_lookups
            ),
        );
        warnings.extend(normalized.warnings);
        let candidates = normalized.candidates;
        let dropped = normalized.dropped;

        let adaptive = AdaptiveInput {
            weights: self.feedback.effective_weights(),
            confidence: self.feedback.confidence(),
            decisions: self.feedback.decisions(),
        };
        let Evaluation {
            inference,
            ranking,
            excluded,
            acquisitions,
            weights,
            warnings: evaluation_warnings,
        } = evaluate::evaluate(&self.engine, config, &request, &candidates, adaptive);
        warnings.extend(evaluation_warnings);

        let fatal = if !request.budget_is_valid() {
            Some(FatalReason::InvalidBudget)
        } else if retrieved == 0 {
            Some(FatalReason::NoSearchResults)
        } else if candidates.is_empty() {
            Some(FatalReason::NoValidCandidates)
        } else if ranking.is_empty() {
            Some(FatalReason::AllCandidatesExcluded)
        } else {
            None
        };

        if let Some(reason) = fatal {
            stages.push(Stage::Evaluate, StageStatus::Failed, reason.summary());
            stages.push(Stage::Explain, StageStatus::Skipped, "nothing to explain");
            stages.push(Stage::Learn, StageStatus::Skipped, "no recommendation to rate");
            warn!(run_id = %run_id, reason = reason.summary(), "no recommendation possible");

            let detail = match reason {
                FatalReason::InvalidBudget => format!("budget {} is not usable", request.budget),
                FatalReason::AllCandidatesExcluded => excluded
                    .iter()
                    .map(|exclusion| format!("{}: {}", exclusion.candidate, exclusion.reason))
                    .collect::<Vec<_>>()
                    .join("; "),
                _ => reason.summary().to_string(),
            };

            return RecommendationOutcome::NoRecommendation(NoRecommendation {
                run_id,
                reason,
                detail,
                inference: Some(inference),
                excluded,
                dropped,
                acquisitions,
                warnings,
                stages,
            });
        }

        stages.push(
            Stage::Evaluate,
            StageStatus::Completed,
            format!(
                "{} ranked, {} excluded, {} inference steps",
                ranking.len(),
                excluded.len(),
                inference.trace.len()
            ),
        );

        let mut explain_warnings = Vec::new();
        let recommended = explain::explain(
            &ExplainPlan {
                query: &request.query,
                top_k: config.top_k,
                reasoning: self.reasoning.as_ref(),
                timeout,
            },
            &ranking,
            &candidates,
            &inference,
            &mut explain_warnings,
        )
        .await;
        stages.push(
            Stage::Explain,
            if explain_warnings.is_empty() {
                StageStatus::Completed
            } else {
                StageStatus::Degraded
            },
            format!("{} candidates explained", recommended.len()),
        );
        warnings.extend(explain_warnings);
        stages.push(
            Stage::Learn,
            StageStatus::AwaitingFeedback,
            "submit feedback against this run id",
        );

        let quotation = Quotation::build(&line_items, &ranking, &candidates, &request.currency);
        let prices: Vec<f64> = recommended
            .iter()
            .map(|entry| entry.candidate.price)
            .collect();
        let evidence: Vec<f64> = recommended
            .iter()
            .map(|entry| entry.breakdown.evidence_fitness)
            .collect();
        let goal = goal::evaluate(
            GoalMetrics::aggregate(
                &prices,
                &evidence,
                request.budget,
                quotation.matched,
                quotation.requested,
            ),
            &config.goal_thresholds,
        );

        let recommendation = Recommendation {
            run_id,
            request,
            weights,
            recommended,
            ranking,
            candidates,
            quotation,
            goal,
            inference,
            excluded,
            dropped,
            acquisitions,
            warnings,
            stages,
            created_at: Utc::now(),
        };

        let outcome = RecommendationOutcome::Recommended(Box::new(recommendation));
        info!(summary = %outcome.summary(), "procurement run finished");
        outcome
    }

    /// Record the user's decision on a recommendation and fold it into the learned weights.
    pub fn learn(
        &self,
        recommendation: &Recommendation,
        submission: FeedbackSubmission,
    ) -> Result<FeedbackReceipt, FeedbackError> {
        if let Some(rating) = submission.rating {
            if !(1..=5).contains(&rating) {
                return Err(FeedbackError::InvalidRating(rating));
            }
        }

        let chosen = recommendation
            .candidate(&submission.chosen)
            .ok_or_else(|| FeedbackError::UnknownCandidate(submission.chosen.clone()))?;
        let breakdown = recommendation
            .breakdown_for(&submission.chosen)
            .ok_or_else(|| FeedbackError::UnknownCandidate(submission.chosen.clone()))?;
        let agreed_with_top = recommendation
            .ranking
            .first()
            .is_some_and(|top| top.candidate == submission.chosen);

        let record = FeedbackRecord {
            run_id: recommendation.run_id.clone(),
            query: recommendation.request.query.clone(),
            chosen: submission.chosen.clone(),
            vendor: chosen.vendor.clone(),
            rating: submission.rating,
            agreed_with_top,
            sub_scores: SubScores {
                cost: breakdown.cost_fitness,
                evidence: breakdown.evidence_fitness,
                availability: breakdown.availability_fitness,
            },
            recorded_at: Utc::now(),
        };

        let learning = self.feedback.record(record)?;
        Ok(FeedbackReceipt {
            run_id: recommendation.run_id.clone(),
            chosen: submission.chosen,
            agreed_with_top,
            learning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_carry_a_timestamp_and_sequence() {
        let first = next_run_id();
        let second = next_run_id();
        assert_ne!(first, second);

        let parts: Vec<&str> = first.0.split('-').collect();
        assert_eq!(parts.len(), 3, "unexpected run id {first}");
        assert_eq!(parts[0], "run");
        assert_eq!(parts[1].len(), "20250301T090000123".len());
        assert_eq!(parts[1].as_bytes()[8], b'T');
        assert!(parts[1]
            .chars()
            .enumerate()
            .all(|(index, c)| index == 8 || c.is_ascii_digit()));
        assert!(parts[2].parse::<u64>().is_ok());
    }
}
