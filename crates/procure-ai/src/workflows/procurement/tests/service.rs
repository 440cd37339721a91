use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::common::*;
use crate::workflows::procurement::domain::{CandidateId, RunId};
use crate::workflows::procurement::pipeline::{
    FeedbackError, FeedbackSubmission, RecommendationOutcome,
};
use crate::workflows::procurement::repository::{
    RecommendationRecord, RecommendationRepository, RepositoryError,
};
use crate::workflows::procurement::{
    MemoryFeedbackStore, ProcurementService, ProcurementServiceError,
};

fn choose(value: &str, rating: Option<u8>) -> FeedbackSubmission {
    FeedbackSubmission {
        chosen: CandidateId(value.to_string()),
        rating,
    }
}

async fn stored_run(
    service: &ProcurementService<MemoryRepository, MemoryFeedbackStore>,
) -> RunId {
    let outcome = service
        .recommend(request("pbs buffer", 5000.0))
        .await
        .expect("recommendation");
    outcome.run_id().clone()
}

#[tokio::test]
async fn recommend_stores_successful_runs() {
    let (service, repository) = build_service(scenario_records());

    let run_id = stored_run(&service).await;

    let stored = repository
        .fetch(&run_id)
        .expect("repository readable")
        .expect("record stored");
    assert_eq!(stored.status_label(), "awaiting_feedback");
    assert_eq!(
        service.get(&run_id).expect("record").recommendation.run_id,
        run_id
    );
    assert_eq!(service.recent(10).expect("recent").len(), 1);
}

#[tokio::test]
async fn no_recommendation_is_not_stored() {
    let (service, repository) = build_service(Vec::new());

    let outcome = service
        .recommend(request("unobtainium", 100.0))
        .await
        .expect("pipeline outcome");

    assert!(matches!(outcome, RecommendationOutcome::NoRecommendation(_)));
    assert!(repository
        .records
        .lock()
        .expect("repository mutex poisoned")
        .is_empty());
}

#[tokio::test]
async fn empty_query_is_rejected_before_the_pipeline_runs() {
    let (service, _) = build_service(scenario_records());

    match service.recommend(request("   ", 5000.0)).await {
        Err(ProcurementServiceError::InvalidRequest(message)) => {
            assert!(message.contains("query"))
        }
        other => panic!("expected invalid request, got {other:?}"),
    }
}

#[tokio::test]
async fn feedback_is_accepted_once_per_run() {
    let (service, repository) = build_service(scenario_records());
    let run_id = stored_run(&service).await;

    let receipt = service
        .submit_feedback(&run_id, choose("lonza:PBS-1L", Some(5)))
        .expect("feedback accepted");
    assert!(receipt.agreed_with_top);
    assert_eq!(receipt.learning.decisions, 1);

    let stored = repository
        .fetch(&run_id)
        .expect("repository readable")
        .expect("record stored");
    assert_eq!(stored.status_label(), "feedback_recorded");

    match service.submit_feedback(&run_id, choose("gibco:PBS-PRO", Some(2))) {
        Err(ProcurementServiceError::FeedbackAlreadyRecorded(id)) => assert_eq!(id, run_id),
        other => panic!("expected duplicate feedback error, got {other:?}"),
    }
    assert_eq!(service.learning().decisions, 1);
}

#[tokio::test]
async fn feedback_validation_errors_leave_the_run_open() {
    let (service, _) = build_service(scenario_records());
    let run_id = stored_run(&service).await;

    match service.submit_feedback(&run_id, choose("lonza:PBS-1L", Some(9))) {
        Err(ProcurementServiceError::Feedback(FeedbackError::InvalidRating(9))) => {}
        other => panic!("expected invalid rating, got {other:?}"),
    }
    match service.submit_feedback(&run_id, choose("acme:UNKNOWN", None)) {
        Err(ProcurementServiceError::Feedback(FeedbackError::UnknownCandidate(_))) => {}
        other => panic!("expected unknown candidate, got {other:?}"),
    }

    service
        .submit_feedback(&run_id, choose("gibco:PBS-PRO", None))
        .expect("valid feedback still accepted");
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let (service, _) = build_service(scenario_records());
    let missing = RunId("run-999999".to_string());

    match service.get(&missing) {
        Err(ProcurementServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
    match service.submit_feedback(&missing, choose("lonza:PBS-1L", None)) {
        Err(ProcurementServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn repository_outage_surfaces_as_error() {
    let service = ProcurementService::new(
        Arc::new(UnavailableRepository),
        Arc::new(offline_pipeline(scenario_records())),
    );

    match service.recommend(request("pbs buffer", 5000.0)).await {
        Err(ProcurementServiceError::Repository(RepositoryError::Unavailable(message))) => {
            assert!(message.contains("offline"))
        }
        other => panic!("expected repository error, got {other:?}"),
    }
}

/// Widens the window between reading a run and storing its feedback.
#[derive(Default)]
struct SlowFetchRepository {
    inner: MemoryRepository,
}

impl RecommendationRepository for SlowFetchRepository {
    fn insert(
        &self,
        record: RecommendationRecord,
    ) -> Result<RecommendationRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, record: RecommendationRecord) -> Result<(), RepositoryError> {
        self.inner.update(record)
    }

    fn fetch(&self, run_id: &RunId) -> Result<Option<RecommendationRecord>, RepositoryError> {
        let record = self.inner.fetch(run_id);
        thread::sleep(Duration::from_millis(50));
        record
    }

    fn recent(&self, limit: usize) -> Result<Vec<RecommendationRecord>, RepositoryError> {
        self.inner.recent(limit)
    }
}

#[tokio::test]
async fn concurrent_feedback_for_one_run_is_recorded_once() {
    let service = ProcurementService::new(
        Arc::new(SlowFetchRepository::default()),
        Arc::new(offline_pipeline(scenario_records())),
    );
    let run_id = service
        .recommend(request("pbs buffer", 5000.0))
        .await
        .expect("recommendation")
        .run_id()
        .clone();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| service.submit_feedback(&run_id, choose("lonza:PBS-1L", Some(5))))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("feedback thread panicked"))
            .collect()
    });

    let accepted = results.iter().filter(|result| result.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|result| matches!(result, Err(ProcurementServiceError::FeedbackAlreadyRecorded(_))))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(duplicates, 1);
    assert_eq!(service.learning().decisions, 1);
}
