use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::workflows::procurement::collaborators::{
    CollaboratorError, ExplanationRequest, LiteratureCollaborator, ReasoningCollaborator,
    SearchCollaborator,
};
use crate::workflows::procurement::domain::{
    Availability, Candidate, CandidateId, ProcurementRequest, RawProductRecord, RunId,
};
use crate::workflows::procurement::feedback::{
    FeedbackLoop, FeedbackRecord, MemoryFeedbackStore, SubScores,
};
use crate::workflows::procurement::pipeline::{
    Collaborators, ProcurementPipeline, Recommendation, RecommendationOutcome,
};
use crate::workflows::procurement::repository::{
    RecommendationRecord, RecommendationRepository, RepositoryError,
};
use crate::workflows::procurement::{ProcurementConfig, ProcurementService, Weights};

pub(super) fn raw(vendor: &str, sku: &str, name: &str, price: &str) -> RawProductRecord {
    RawProductRecord {
        sku: sku.to_string(),
        vendor: vendor.to_string(),
        name: name.to_string(),
        spec_text: "purity: 99%".to_string(),
        unit: None,
        pack_size: None,
        price: price.to_string(),
        currency: Some("EUR".to_string()),
        stock: Some(10),
        eta_days: Some(3),
        evidence: None,
        source: "fixture".to_string(),
    }
}

pub(super) fn raw_with_evidence(
    vendor: &str,
    sku: &str,
    name: &str,
    price: &str,
    evidence: f64,
) -> RawProductRecord {
    RawProductRecord {
        evidence: Some(evidence),
        ..raw(vendor, sku, name, price)
    }
}

pub(super) fn candidate(id: &str, price: f64, evidence: Option<f64>) -> Candidate {
    let (vendor, sku) = id.split_once(':').unwrap_or(("vendor", id));
    let mut attributes = BTreeMap::new();
    attributes.insert("purity".to_string(), "99%".to_string());
    Candidate {
        id: CandidateId(id.to_string()),
        sku: sku.to_string(),
        vendor: vendor.to_string(),
        name: format!("{sku} reagent"),
        description: "purity: 99%".to_string(),
        price,
        currency: "EUR".to_string(),
        attributes,
        availability: Availability {
            in_stock: true,
            lead_time_days: 3,
        },
        evidence,
        source: "fixture".to_string(),
        line_item: "reagent".to_string(),
        pack_volume_litres: None,
    }
}

pub(super) fn request(query: &str, budget: f64) -> ProcurementRequest {
    ProcurementRequest::new(query, budget)
}

pub(super) fn feedback_record(
    run: &str,
    vendor: &str,
    rating: Option<u8>,
    sub_scores: SubScores,
) -> FeedbackRecord {
    FeedbackRecord {
        run_id: RunId(run.to_string()),
        query: "reagent".to_string(),
        chosen: CandidateId(format!("{vendor}:SKU")),
        vendor: vendor.to_string(),
        rating,
        agreed_with_top: true,
        sub_scores,
        recorded_at: Utc
            .with_ymd_and_hms(2026, 3, 2, 9, 30, 0)
            .single()
            .expect("valid timestamp"),
    }
}

/// Cost-only preference repeated `count` times.
pub(super) fn cost_focused_log(count: usize) -> Vec<FeedbackRecord> {
    (0..count)
        .map(|index| {
            feedback_record(
                &format!("run-{index:06}"),
                "budgetlab",
                Some(5),
                SubScores {
                    cost: 1.0,
                    evidence: 0.0,
                    availability: 0.0,
                },
            )
        })
        .collect()
}

pub(super) fn config() -> ProcurementConfig {
    ProcurementConfig {
        collaborator_timeout_ms: 1_000,
        ..ProcurementConfig::default()
    }
}

pub(super) fn feedback_loop(records: Vec<FeedbackRecord>) -> Arc<FeedbackLoop<MemoryFeedbackStore>> {
    Arc::new(FeedbackLoop::open(
        Arc::new(MemoryFeedbackStore::with_records(records)),
        Weights::DEFAULT,
        10,
    ))
}

pub(super) fn pipeline_with(
    config: ProcurementConfig,
    collaborators: Collaborators,
    records: Vec<FeedbackRecord>,
) -> ProcurementPipeline<MemoryFeedbackStore> {
    ProcurementPipeline::new(config, collaborators, feedback_loop(records))
}

pub(super) fn offline_pipeline(records: Vec<RawProductRecord>) -> ProcurementPipeline<MemoryFeedbackStore> {
    pipeline_with(
        config(),
        Collaborators::offline(vec![Arc::new(StaticSearch::new("fixture", records))]),
        Vec::new(),
    )
}

pub(super) fn scenario_records() -> Vec<RawProductRecord> {
    vec![
        raw_with_evidence("Lonza", "PBS-1L", "PBS buffer standard", "3000", 0.8),
        raw_with_evidence("Gibco", "PBS-PRO", "PBS buffer premium", "6000", 0.9),
    ]
}

pub(super) fn expect_recommended(outcome: RecommendationOutcome) -> Recommendation {
    match outcome {
        RecommendationOutcome::Recommended(recommendation) => *recommendation,
        other => panic!("expected recommendation, got {}", other.summary()),
    }
}

pub(super) fn build_service(
    records: Vec<RawProductRecord>,
) -> (
    ProcurementService<MemoryRepository, MemoryFeedbackStore>,
    Arc<MemoryRepository>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let service = ProcurementService::new(repository.clone(), Arc::new(offline_pipeline(records)));
    (service, repository)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Returns the same records for every query.
pub(super) struct StaticSearch {
    name: String,
    records: Vec<RawProductRecord>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub(super) fn new(name: &str, records: Vec<RawProductRecord>) -> Self {
        Self {
            name: name.to_string(),
            records,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchCollaborator for StaticSearch {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<RawProductRecord>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.iter().take(max_results).cloned().collect())
    }
}

pub(super) struct FailingSearch;

impl SearchCollaborator for FailingSearch {
    fn name(&self) -> &str {
        "flaky-shop"
    }

    fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<RawProductRecord>, CollaboratorError> {
        Err(CollaboratorError::Network("connection reset".to_string()))
    }
}

pub(super) struct SlowSearch(pub(super) Duration);

impl SearchCollaborator for SlowSearch {
    fn name(&self) -> &str {
        "slow-shop"
    }

    fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<RawProductRecord>, CollaboratorError> {
        std::thread::sleep(self.0);
        Ok(Vec::new())
    }
}

/// Fixed literature score that counts live calls.
#[derive(Default)]
pub(super) struct CountingLiterature {
    pub(super) score: f64,
    calls: AtomicUsize,
}

impl CountingLiterature {
    pub(super) fn new(score: f64) -> Self {
        Self {
            score,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LiteratureCollaborator for CountingLiterature {
    fn evidence_for(&self, _terms: &[String]) -> Result<f64, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.score)
    }
}

pub(super) struct QuotaLiterature;

impl LiteratureCollaborator for QuotaLiterature {
    fn evidence_for(&self, _terms: &[String]) -> Result<f64, CollaboratorError> {
        Err(CollaboratorError::Quota("daily limit reached".to_string()))
    }
}

/// Reasoning collaborator with canned expansions that records what it was asked.
#[derive(Default)]
pub(super) struct ScriptedReasoning {
    pub(super) expansions: Vec<String>,
    pub(super) fail_explain: bool,
    explained: Mutex<Vec<usize>>,
}

impl ScriptedReasoning {
    pub(super) fn expanding(expansions: &[&str]) -> Self {
        Self {
            expansions: expansions.iter().map(|value| value.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(super) fn failing_explanations() -> Self {
        Self {
            fail_explain: true,
            ..Self::default()
        }
    }

    pub(super) fn explained_ranks(&self) -> Vec<usize> {
        self.explained.lock().expect("reasoning mutex poisoned").clone()
    }
}

impl ReasoningCollaborator for ScriptedReasoning {
    fn expand_query(&self, _query: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.expansions.clone())
    }

    fn explain(&self, request: ExplanationRequest) -> Result<String, CollaboratorError> {
        self.explained
            .lock()
            .expect("reasoning mutex poisoned")
            .push(request.rank);
        if self.fail_explain {
            return Err(CollaboratorError::Unavailable("model offline".to_string()));
        }
        Ok(format!(
            "Rank {} goes to {} for its balance of price and evidence.",
            request.rank, request.candidate.name
        ))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<RunId, RecommendationRecord>>>,
}

impl RecommendationRepository for MemoryRepository {
    fn insert(
        &self,
        record: RecommendationRecord,
    ) -> Result<RecommendationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(record.run_id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.run_id().clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: RecommendationRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(record.run_id().clone(), record);
        Ok(())
    }

    fn fetch(&self, run_id: &RunId) -> Result<Option<RecommendationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(run_id).cloned())
    }

    fn recent(&self, limit: usize) -> Result<Vec<RecommendationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().take(limit).cloned().collect())
    }
}

pub(super) struct UnavailableRepository;

impl RecommendationRepository for UnavailableRepository {
    fn insert(
        &self,
        _record: RecommendationRecord,
    ) -> Result<RecommendationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: RecommendationRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _run_id: &RunId) -> Result<Option<RecommendationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn recent(&self, _limit: usize) -> Result<Vec<RecommendationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}
