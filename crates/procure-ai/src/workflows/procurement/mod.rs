//! Laboratory procurement decision pipeline.
//!
//! Offers retrieved from search collaborators are normalized into candidates, reasoned
//! about by a small production-rule engine, scored with adaptive weights, and explained.
//! Feedback on stored recommendations folds back into the weights used by later runs.

pub mod collaborators;
mod config;
pub mod domain;
pub mod feedback;
pub mod goal;
pub mod inference;
pub mod literature;
pub(crate) mod normalizer;
pub mod pipeline;
pub mod quotation;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
mod units;

#[cfg(test)]
mod tests;

pub use collaborators::{
    CollaboratorError, ExplanationRequest, LiteratureCollaborator, OfflineEvidence,
    ReasoningCollaborator, SearchCollaborator,
};
pub use config::{OverBudgetPolicy, ProcurementConfig};
pub use domain::{
    Availability, Candidate, CandidateId, ProcurementRequest, RawProductRecord, RunId,
};
pub use feedback::{
    FeedbackLoop, FeedbackRecord, FeedbackStore, FeedbackStoreError, JsonlFeedbackStore,
    LearningSummary, MemoryFeedbackStore, SubScores, VendorStats,
};
pub use goal::{GoalMetrics, GoalState, GoalThresholds};
pub use inference::{InferenceEngine, InferenceGoal, InferenceMode, InferenceOutcome};
pub use literature::CachedLiterature;
pub use normalizer::{DropReason, DroppedRecord};
pub use pipeline::{
    AcquisitionRequest, Collaborators, ExplainedCandidate, FatalReason, FeedbackError,
    FeedbackReceipt, FeedbackSubmission, NoRecommendation, PipelineWarning, ProcurementPipeline,
    Recommendation, RecommendationOutcome, Stage, StageReport, StageStatus,
};
pub use quotation::{Quotation, QuotationLine};
pub use repository::{RecommendationRecord, RecommendationRepository, RepositoryError};
pub use router::recommendation_router;
pub use scoring::{EvidenceCurve, ScoreBreakdown, ScoringEngine, ScoringParams, Weights};
pub use service::{ProcurementService, ProcurementServiceError};
