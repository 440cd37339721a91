use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::domain::{Candidate, RawProductRecord};
use super::inference::TraceEntry;
use super::scoring::ScoreBreakdown;

/// Product search source (supplier catalog, web shop, marketplace).
pub trait SearchCollaborator: Send + Sync {
    fn name(&self) -> &str;
    fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawProductRecord>, CollaboratorError>;
}

/// Scientific-literature lookup returning an evidence score in `0..=1`.
pub trait LiteratureCollaborator: Send + Sync {
    fn evidence_for(&self, terms: &[String]) -> Result<f64, CollaboratorError>;
}

impl<T: LiteratureCollaborator + ?Sized> LiteratureCollaborator for Arc<T> {
    fn evidence_for(&self, terms: &[String]) -> Result<f64, CollaboratorError> {
        (**self).evidence_for(terms)
    }
}

/// Language-model style helper for query expansion and explanations.
pub trait ReasoningCollaborator: Send + Sync {
    fn expand_query(&self, query: &str) -> Result<Vec<String>, CollaboratorError>;
    fn explain(&self, request: ExplanationRequest) -> Result<String, CollaboratorError>;
}

/// Everything a reasoning collaborator sees when asked to justify a recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationRequest {
    pub query: String,
    pub rank: usize,
    pub candidate: Candidate,
    pub breakdown: ScoreBreakdown,
    pub trace: Vec<TraceEntry>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("quota exhausted: {0}")]
    Quota(String),
    #[error("timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Run a blocking collaborator call on the blocking pool, giving up after `timeout`.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, CollaboratorError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(CollaboratorError::Unavailable(format!(
            "collaborator task aborted: {join_error}"
        ))),
        Err(_) => Err(CollaboratorError::Timeout {
            after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Evidence heuristic used when no literature service is wired: longer product
/// descriptions earn more credit, saturating at 200 characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineEvidence;

impl LiteratureCollaborator for OfflineEvidence {
    fn evidence_for(&self, terms: &[String]) -> Result<f64, CollaboratorError> {
        let length = terms.join(" ").chars().count() as f64;
        Ok((length / 200.0).min(1.0))
    }
}
