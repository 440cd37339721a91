use serde::Serialize;

use super::domain::RunId;
use super::pipeline::{FeedbackReceipt, Recommendation};

/// Stored recommendation plus the feedback submitted against it, if any.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationRecord {
    pub recommendation: Recommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackReceipt>,
}

impl RecommendationRecord {
    pub fn new(recommendation: Recommendation) -> Self {
        Self {
            recommendation,
            feedback: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.recommendation.run_id
    }

    pub fn status_label(&self) -> &'static str {
        if self.feedback.is_some() {
            "feedback_recorded"
        } else {
            "awaiting_feedback"
        }
    }
}

/// Storage abstraction so the service module can be exercised in isolation.
pub trait RecommendationRepository: Send + Sync {
    fn insert(&self, record: RecommendationRecord)
        -> Result<RecommendationRecord, RepositoryError>;
    fn update(&self, record: RecommendationRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, run_id: &RunId) -> Result<Option<RecommendationRecord>, RepositoryError>;
    fn recent(&self, limit: usize) -> Result<Vec<RecommendationRecord>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
