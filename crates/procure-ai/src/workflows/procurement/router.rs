use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ProcurementRequest, RunId};
use super::feedback::FeedbackStore;
use super::pipeline::{FeedbackError, FeedbackSubmission, RecommendationOutcome};
use super::repository::{RecommendationRepository, RepositoryError};
use super::service::{ProcurementService, ProcurementServiceError};

/// Router builder exposing recommendation, feedback, and learning endpoints.
pub fn recommendation_router<R, S>(service: Arc<ProcurementService<R, S>>) -> Router
where
    R: RecommendationRepository + 'static,
    S: FeedbackStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/recommendations",
            post(recommend_handler::<R, S>).get(recent_handler::<R, S>),
        )
        .route(
            "/api/v1/recommendations/:run_id",
            get(recommendation_handler::<R, S>),
        )
        .route(
            "/api/v1/recommendations/:run_id/feedback",
            post(feedback_handler::<R, S>),
        )
        .route("/api/v1/learning", get(learning_handler::<R, S>))
        .with_state(service)
}

fn error_response(status: StatusCode, error: &ProcurementServiceError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn recommend_handler<R, S>(
    State(service): State<Arc<ProcurementService<R, S>>>,
    axum::Json(request): axum::Json<ProcurementRequest>,
) -> Response
where
    R: RecommendationRepository + 'static,
    S: FeedbackStore + 'static,
{
    match service.recommend(request).await {
        Ok(outcome @ RecommendationOutcome::Recommended(_)) => {
            (StatusCode::CREATED, axum::Json(outcome)).into_response()
        }
        Ok(outcome @ RecommendationOutcome::NoRecommendation(_)) => {
            (StatusCode::OK, axum::Json(outcome)).into_response()
        }
        Err(error @ ProcurementServiceError::InvalidRequest(_)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &error)
        }
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &other),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn default_recent_limit() -> usize {
    20
}

pub(crate) async fn recent_handler<R, S>(
    State(service): State<Arc<ProcurementService<R, S>>>,
    Query(query): Query<RecentQuery>,
) -> Response
where
    R: RecommendationRepository + 'static,
    S: FeedbackStore + 'static,
{
    match service.recent(query.limit) {
        Ok(records) => {
            let items: Vec<_> = records
                .iter()
                .map(|record| {
                    let top = record.recommendation.top();
                    json!({
                        "run_id": record.run_id(),
                        "status": record.status_label(),
                        "query": record.recommendation.request.query,
                        "top_candidate": top.map(|entry| &entry.candidate.id),
                        "score": top.map(|entry| entry.breakdown.weighted_total),
                        "created_at": record.recommendation.created_at,
                    })
                })
                .collect();
            (StatusCode::OK, axum::Json(json!({ "recommendations": items }))).into_response()
        }
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &other),
    }
}

pub(crate) async fn recommendation_handler<R, S>(
    State(service): State<Arc<ProcurementService<R, S>>>,
    Path(run_id): Path<String>,
) -> Response
where
    R: RecommendationRepository + 'static,
    S: FeedbackStore + 'static,
{
    let id = RunId(run_id);
    match service.get(&id) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(ProcurementServiceError::Repository(RepositoryError::NotFound)) => {
            let payload = json!({
                "run_id": id.0,
                "error": "recommendation not found",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &other),
    }
}

pub(crate) async fn feedback_handler<R, S>(
    State(service): State<Arc<ProcurementService<R, S>>>,
    Path(run_id): Path<String>,
    axum::Json(submission): axum::Json<FeedbackSubmission>,
) -> Response
where
    R: RecommendationRepository + 'static,
    S: FeedbackStore + 'static,
{
    let id = RunId(run_id);
    match service.submit_feedback(&id, submission) {
        Ok(receipt) => (StatusCode::CREATED, axum::Json(receipt)).into_response(),
        Err(ProcurementServiceError::Repository(RepositoryError::NotFound)) => {
            let payload = json!({
                "run_id": id.0,
                "error": "recommendation not found",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(error @ ProcurementServiceError::FeedbackAlreadyRecorded(_)) => {
            error_response(StatusCode::CONFLICT, &error)
        }
        Err(
            error @ ProcurementServiceError::Feedback(
                FeedbackError::InvalidRating(_) | FeedbackError::UnknownCandidate(_),
            ),
        ) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &error),
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &other),
    }
}

pub(crate) async fn learning_handler<R, S>(
    State(service): State<Arc<ProcurementService<R, S>>>,
) -> Response
where
    R: RecommendationRepository + 'static,
    S: FeedbackStore + 'static,
{
    (StatusCode::OK, axum::Json(service.learning())).into_response()
}
