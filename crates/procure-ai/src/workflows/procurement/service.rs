use std::sync::{Arc, Mutex};

use tracing::info;

use super::domain::{ProcurementRequest, RunId};
use super::feedback::{FeedbackStore, LearningSummary};
use super::pipeline::{
    FeedbackError, FeedbackReceipt, FeedbackSubmission, ProcurementPipeline,
    RecommendationOutcome,
};
use super::repository::{RecommendationRecord, RecommendationRepository, RepositoryError};

/// Service composing the pipeline with recommendation storage so feedback can arrive
/// after the request that produced the recommendation.
pub struct ProcurementService<R, S> {
    repository: Arc<R>,
    pipeline: Arc<ProcurementPipeline<S>>,
    // Held from the duplicate check until the decision is stored.
    feedback_gate: Mutex<()>,
}

impl<R, S> ProcurementService<R, S>
where
    R: RecommendationRepository + 'static,
    S: FeedbackStore + 'static,
{
    pub fn new(repository: Arc<R>, pipeline: Arc<ProcurementPipeline<S>>) -> Self {
        Self {
            repository,
            pipeline,
            feedback_gate: Mutex::new(()),
        }
    }

    pub fn pipeline(&self) -> &Arc<ProcurementPipeline<S>> {
        &self.pipeline
    }

    /// Run the pipeline and store successful recommendations under their run id.
    pub async fn recommend(
        &self,
        request: ProcurementRequest,
    ) -> Result<RecommendationOutcome, ProcurementServiceError> {
        if request.query.trim().is_empty() {
            return Err(ProcurementServiceError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let outcome = self.pipeline.recommend(request).await;
        if let RecommendationOutcome::Recommended(recommendation) = &outcome {
            self.repository
                .insert(RecommendationRecord::new(recommendation.as_ref().clone()))?;
        }
        Ok(outcome)
    }

    pub fn get(&self, run_id: &RunId) -> Result<RecommendationRecord, ProcurementServiceError> {
        let record = self
            .repository
            .fetch(run_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<RecommendationRecord>, ProcurementServiceError> {
        Ok(self.repository.recent(limit)?)
    }

    /// Accept one decision per stored recommendation.
    pub fn submit_feedback(
        &self,
        run_id: &RunId,
        submission: FeedbackSubmission,
    ) -> Result<FeedbackReceipt, ProcurementServiceError> {
        let _gate = self
            .feedback_gate
            .lock()
            .expect("feedback gate mutex poisoned");
        let mut record = self.get(run_id)?;
        if record.feedback.is_some() {
            return Err(ProcurementServiceError::FeedbackAlreadyRecorded(
                run_id.clone(),
            ));
        }

        let receipt = self.pipeline.learn(&record.recommendation, submission)?;
        record.feedback = Some(receipt.clone());
        self.repository.update(record)?;

        info!(
            run_id = %run_id,
            chosen = %receipt.chosen,
            agreed = receipt.agreed_with_top,
            "feedback accepted"
        );
        Ok(receipt)
    }

    pub fn learning(&self) -> LearningSummary {
        self.pipeline.feedback().summary()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcurementServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("feedback for {0} was already recorded")]
    FeedbackAlreadyRecorded(RunId),
    #[error(transparent)]
    Feedback(#[from] FeedbackError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
