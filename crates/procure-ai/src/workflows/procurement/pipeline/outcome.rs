use chrono::{DateTime, Utc};
use serde::Serialize;

use super::super::domain::{Candidate, CandidateId, ProcurementRequest, RunId};
use super::super::feedback::LearningSummary;
use super::super::goal::GoalState;
use super::super::inference::{InferenceGoal, InferenceOutcome, Predicate, TraceEntry};
use super::super::normalizer::DroppedRecord;
use super::super::quotation::Quotation;
use super::super::scoring::{ScoreBreakdown, Weights};

/// The five pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Retrieve,
    Normalize,
    Evaluate,
    Explain,
    Learn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Degraded,
    Failed,
    Skipped,
    AwaitingFeedback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageEntry {
    pub stage: Stage,
    pub status: StageStatus,
    pub detail: String,
}

/// Status of each stage of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageReport {
    pub stages: Vec<StageEntry>,
}

impl StageReport {
    pub(crate) fn push(&mut self, stage: Stage, status: StageStatus, detail: impl Into<String>) {
        self.stages.push(StageEntry {
            stage,
            status,
            detail: detail.into(),
        });
    }

    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|entry| entry.stage == stage)
            .map(|entry| entry.status)
    }
}

/// Recoverable problems recorded alongside a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    CollaboratorUnavailable {
        collaborator: String,
        stage: Stage,
        detail: String,
    },
    ValidationFailure {
        subject: String,
        detail: String,
    },
    ScoringPrecondition {
        detail: String,
    },
    PersistenceFailure {
        detail: String,
    },
}

impl PipelineWarning {
    pub fn summary(&self) -> String {
        match self {
            PipelineWarning::CollaboratorUnavailable {
                collaborator,
                stage,
                detail,
            } => format!("{collaborator} unavailable during {stage:?}: {detail}"),
            PipelineWarning::ValidationFailure { subject, detail } => {
                format!("{subject} rejected: {detail}")
            }
            PipelineWarning::ScoringPrecondition { detail } => {
                format!("scoring precondition: {detail}")
            }
            PipelineWarning::PersistenceFailure { detail } => {
                format!("feedback persistence: {detail}")
            }
        }
    }
}

/// Candidate removed from the ranking by a rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub candidate: CandidateId,
    pub reason: String,
}

/// Follow-up the pipeline would need to close an unmet goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionAction {
    RequestSubstitutes,
    RequestLiterature,
    CollectFeedback,
    ClarifyRequest,
}

/// A goal predicate backward chaining could not establish, mapped to an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionRequest {
    pub goal: InferenceGoal,
    pub predicate: Predicate,
    pub action: AcquisitionAction,
    pub note: String,
}

/// Where an explanation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationSource {
    Reasoning,
    Template,
}

/// A top-k candidate with its full justification.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainedCandidate {
    pub rank: usize,
    pub candidate: Candidate,
    pub breakdown: ScoreBreakdown,
    pub flags: Vec<&'static str>,
    pub trace: Vec<TraceEntry>,
    pub explanation: String,
    pub explanation_source: ExplanationSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub run_id: RunId,
    pub request: ProcurementRequest,
    pub weights: Weights,
    pub recommended: Vec<ExplainedCandidate>,
    pub ranking: Vec<ScoreBreakdown>,
    pub candidates: Vec<Candidate>,
    pub quotation: Quotation,
    pub goal: GoalState,
    pub inference: InferenceOutcome,
    pub excluded: Vec<Exclusion>,
    pub dropped: Vec<DroppedRecord>,
    pub acquisitions: Vec<AcquisitionRequest>,
    pub warnings: Vec<PipelineWarning>,
    pub stages: StageReport,
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn top(&self) -> Option<&ExplainedCandidate> {
        self.recommended.first()
    }

    pub fn breakdown_for(&self, candidate: &CandidateId) -> Option<&ScoreBreakdown> {
        self.ranking
            .iter()
            .find(|breakdown| &breakdown.candidate == candidate)
    }

    pub fn candidate(&self, candidate: &CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|entry| &entry.id == candidate)
    }
}

/// Reason a run ended without a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalReason {
    NoSearchResults,
    NoValidCandidates,
    AllCandidatesExcluded,
    InvalidBudget,
}

impl FatalReason {
    pub fn summary(&self) -> &'static str {
        match self {
            FatalReason::NoSearchResults => "no search results for any line item",
            FatalReason::NoValidCandidates => "no search result could be normalized",
            FatalReason::AllCandidatesExcluded => "every candidate was excluded by the rules",
            FatalReason::InvalidBudget => "budget must be a positive number",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NoRecommendation {
    pub run_id: RunId,
    pub reason: FatalReason,
    pub detail: String,
    pub inference: Option<InferenceOutcome>,
    pub excluded: Vec<Exclusion>,
    pub dropped: Vec<DroppedRecord>,
    pub acquisitions: Vec<AcquisitionRequest>,
    pub warnings: Vec<PipelineWarning>,
    pub stages: StageReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecommendationOutcome {
    Recommended(Box<Recommendation>),
    NoRecommendation(NoRecommendation),
}

impl RecommendationOutcome {
    pub fn summary(&self) -> String {
        match self {
            RecommendationOutcome::Recommended(recommendation) => match recommendation.top() {
                Some(top) => format!(
                    "recommended {} from {} (score {:.3})",
                    top.candidate.name, top.candidate.vendor, top.breakdown.weighted_total
                ),
                None => "recommendation without ranked candidates".to_string(),
            },
            RecommendationOutcome::NoRecommendation(outcome) => {
                format!("no recommendation: {}", outcome.reason.summary())
            }
        }
    }

    pub fn run_id(&self) -> &RunId {
        match self {
            RecommendationOutcome::Recommended(recommendation) => &recommendation.run_id,
            RecommendationOutcome::NoRecommendation(outcome) => &outcome.run_id,
        }
    }
}

/// User decision submitted against a stored recommendation.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, Serialize)]
pub struct FeedbackSubmission {
    pub chosen: CandidateId,
    #[serde(default)]
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackReceipt {
    pub run_id: RunId,
    pub chosen: CandidateId,
    pub agreed_with_top: bool,
    pub learning: LearningSummary,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("rating {0} is outside 1..=5")]
    InvalidRating(u8),
    #[error("candidate {0} is not part of this recommendation")]
    UnknownCandidate(CandidateId),
    #[error(transparent)]
    Store(#[from] super::super::feedback::FeedbackStoreError),
}
