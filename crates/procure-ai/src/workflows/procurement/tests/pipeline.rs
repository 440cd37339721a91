use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::workflows::catalog::CatalogSearch;
use crate::workflows::procurement::collaborators::SearchCollaborator;
use crate::workflows::procurement::domain::CandidateId;
use crate::workflows::procurement::feedback::{FeedbackLoop, JsonlFeedbackStore};
use crate::workflows::procurement::inference::Predicate;
use crate::workflows::procurement::pipeline::{
    template_explanation, AcquisitionAction, Collaborators, ExplanationSource, FatalReason,
    FeedbackError, FeedbackSubmission, NoRecommendation, PipelineWarning, ProcurementPipeline,
    RecommendationOutcome, Stage, StageStatus,
};
use crate::workflows::procurement::{DropReason, OverBudgetPolicy, Weights};

fn expect_no_recommendation(outcome: RecommendationOutcome) -> NoRecommendation {
    match outcome {
        RecommendationOutcome::NoRecommendation(outcome) => outcome,
        other => panic!("expected no recommendation, got {}", other.summary()),
    }
}

fn id(value: &str) -> CandidateId {
    CandidateId(value.to_string())
}

fn searches(search: &Arc<StaticSearch>) -> Vec<Arc<dyn SearchCollaborator>> {
    vec![search.clone()]
}

#[tokio::test]
async fn cheaper_adequate_offer_beats_premium_over_budget_offer() {
    let pipeline = offline_pipeline(scenario_records());

    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    let order: Vec<&str> = recommendation
        .ranking
        .iter()
        .map(|breakdown| breakdown.candidate.0.as_str())
        .collect();
    assert_eq!(order, vec!["lonza:PBS-1L", "gibco:PBS-PRO"]);
    assert!((recommendation.ranking[0].weighted_total - 0.70).abs() < 1e-9);
    assert!((recommendation.ranking[1].weighted_total - 0.605).abs() < 1e-9);
    assert_eq!(recommendation.weights, Weights::DEFAULT);

    let premium = &recommendation.recommended[1];
    assert_eq!(premium.flags, vec!["over_budget"]);
    assert!(recommendation.recommended[0].flags.is_empty());
    assert!(recommendation.excluded.is_empty());

    assert!((recommendation.goal.metrics.rc - 0.1).abs() < 1e-9);
    assert!((recommendation.goal.metrics.re - 0.85).abs() < 1e-9);
    assert_eq!(recommendation.goal.metrics.rq, 1.0);
    assert!(!recommendation.goal.cost.passed);
    assert!(!recommendation.goal.achieved);

    assert!(recommendation.warnings.is_empty());
    assert!(recommendation.acquisitions.is_empty());
    assert_eq!(recommendation.quotation.matched, 1);
    assert_eq!(
        recommendation.quotation.lines[0].candidate,
        Some(id("lonza:PBS-1L"))
    );
    for (stage, status) in [
        (Stage::Retrieve, StageStatus::Completed),
        (Stage::Normalize, StageStatus::Completed),
        (Stage::Evaluate, StageStatus::Completed),
        (Stage::Explain, StageStatus::Completed),
        (Stage::Learn, StageStatus::AwaitingFeedback),
    ] {
        assert_eq!(recommendation.stages.status(stage), Some(status), "{stage:?}");
    }
}

#[tokio::test]
async fn recommended_candidates_carry_template_explanations_and_traces() {
    let pipeline = offline_pipeline(scenario_records());

    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);
    let top = recommendation.top().expect("top candidate");

    assert_eq!(top.rank, 1);
    assert_eq!(top.explanation_source, ExplanationSource::Template);
    assert_eq!(
        top.explanation,
        template_explanation(1, &top.candidate, &top.breakdown, &[])
    );
    assert!(top.explanation.contains("Lonza"));
    assert!(!top.trace.is_empty());
    assert!(top
        .trace
        .iter()
        .all(|entry| entry.candidate.as_ref() == Some(&top.candidate.id)));
}

#[tokio::test]
async fn zero_search_results_yield_no_recommendation_with_trace() {
    let pipeline = offline_pipeline(Vec::new());

    let outcome = expect_no_recommendation(pipeline.recommend(request("unobtainium", 100.0)).await);

    assert_eq!(outcome.reason, FatalReason::NoSearchResults);
    let inference = outcome.inference.as_ref().expect("inference ran");
    assert!(!inference.trace.is_empty());
    assert!(outcome
        .acquisitions
        .iter()
        .any(|request| request.action == AcquisitionAction::RequestSubstitutes));
    assert_eq!(outcome.stages.status(Stage::Evaluate), Some(StageStatus::Failed));
    assert_eq!(outcome.stages.status(Stage::Explain), Some(StageStatus::Skipped));
    assert_eq!(outcome.stages.status(Stage::Learn), Some(StageStatus::Skipped));
}

#[tokio::test]
async fn invalid_budget_is_reported_before_anything_else() {
    let pipeline = offline_pipeline(Vec::new());

    let outcome = expect_no_recommendation(pipeline.recommend(request("pbs buffer", 0.0)).await);

    assert_eq!(outcome.reason, FatalReason::InvalidBudget);
    assert!(outcome.detail.contains("budget 0"));
    assert!(outcome.acquisitions.iter().any(|request| {
        request.predicate == Predicate::BudgetSet
            && request.action == AcquisitionAction::ClarifyRequest
    }));
}

#[tokio::test]
async fn feedback_shifts_ranking_towards_cost() {
    let records = vec![
        raw_with_evidence("CheapCo", "C-1", "buffer grade C", "20", 0.2),
        raw_with_evidence("DearCo", "D-1", "buffer grade D", "70", 0.9),
    ];

    let fresh = pipeline_with(
        config(),
        Collaborators::offline(vec![Arc::new(StaticSearch::new("fixture", records.clone()))]),
        Vec::new(),
    );
    let before = expect_recommended(fresh.recommend(request("buffer", 100.0)).await);
    assert_eq!(before.ranking[0].candidate, id("dearco:D-1"));

    let trained = pipeline_with(
        config(),
        Collaborators::offline(vec![Arc::new(StaticSearch::new("fixture", records))]),
        cost_focused_log(50),
    );
    let after = expect_recommended(trained.recommend(request("buffer", 100.0)).await);
    assert_eq!(after.weights, Weights::new(1.0, 0.0, 0.0));
    assert_eq!(after.ranking[0].candidate, id("cheapco:C-1"));
}

#[tokio::test]
async fn failing_search_degrades_but_does_not_abort() {
    let collaborators = Collaborators::offline(vec![
        Arc::new(StaticSearch::new("fixture", scenario_records())),
        Arc::new(FailingSearch),
    ]);
    let pipeline = pipeline_with(config(), collaborators, Vec::new());

    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    assert_eq!(
        recommendation.stages.status(Stage::Retrieve),
        Some(StageStatus::Degraded)
    );
    match recommendation.warnings.as_slice() {
        [PipelineWarning::CollaboratorUnavailable {
            collaborator,
            stage,
            detail,
        }] => {
            assert_eq!(collaborator, "flaky-shop");
            assert_eq!(*stage, Stage::Retrieve);
            assert!(detail.contains("connection reset"));
        }
        other => panic!("expected one collaborator warning, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_search_times_out_with_warning() {
    let mut config = config();
    config.collaborator_timeout_ms = 50;
    let collaborators = Collaborators::offline(vec![
        Arc::new(StaticSearch::new("fixture", scenario_records())),
        Arc::new(SlowSearch(Duration::from_millis(400))),
    ]);
    let pipeline = pipeline_with(config, collaborators, Vec::new());

    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    assert!(recommendation.warnings.iter().any(|warning| matches!(
        warning,
        PipelineWarning::CollaboratorUnavailable { collaborator, detail, .. }
            if collaborator == "slow-shop" && detail.contains("timed out after 50 ms")
    )));
}

#[tokio::test]
async fn exclusion_policy_can_remove_every_candidate() {
    let mut config = config();
    config.over_budget = OverBudgetPolicy::Exclude;
    let pipeline = pipeline_with(
        config,
        Collaborators::offline(vec![Arc::new(StaticSearch::new(
            "fixture",
            scenario_records(),
        ))]),
        Vec::new(),
    );

    let outcome = expect_no_recommendation(pipeline.recommend(request("pbs buffer", 1000.0)).await);

    assert_eq!(outcome.reason, FatalReason::AllCandidatesExcluded);
    assert_eq!(outcome.excluded.len(), 2);
    assert!(outcome.detail.contains("exceeds budget"));
}

#[tokio::test]
async fn unusable_records_are_dropped_with_reasons() {
    let mut dollars = raw("Gibco", "PBS-US", "PBS buffer import", "25");
    dollars.currency = Some("USD".to_string());
    let records = vec![
        raw_with_evidence("Lonza", "PBS-1L", "PBS buffer standard", "30", 0.8),
        raw("Sigma", "PBS-Q", "PBS buffer quote", "on request"),
        dollars,
    ];
    let pipeline = offline_pipeline(records);

    let recommendation = expect_recommended(pipeline.recommend(request("pbs buffer", 100.0)).await);

    assert_eq!(recommendation.candidates.len(), 1);
    assert_eq!(recommendation.dropped.len(), 2);
    assert!(matches!(
        recommendation.dropped[0].reason,
        DropReason::UnparseablePrice { .. }
    ));
    assert!(matches!(
        recommendation.dropped[1].reason,
        DropReason::CurrencyMismatch { .. }
    ));
    assert_eq!(
        recommendation.stages.status(Stage::Normalize),
        Some(StageStatus::Degraded)
    );
    assert_eq!(
        recommendation
            .warnings
            .iter()
            .filter(|warning| matches!(warning, PipelineWarning::ValidationFailure { .. }))
            .count(),
        2
    );
}

#[tokio::test]
async fn no_valid_candidates_when_every_record_is_rejected() {
    let pipeline = offline_pipeline(vec![raw("Sigma", "PBS-Q", "PBS buffer quote", "n/a")]);

    let outcome = expect_no_recommendation(pipeline.recommend(request("pbs buffer", 100.0)).await);

    assert_eq!(outcome.reason, FatalReason::NoValidCandidates);
    assert_eq!(outcome.dropped.len(), 1);
}

#[tokio::test]
async fn query_variants_are_deduplicated_before_searching() {
    let search = Arc::new(StaticSearch::new("fixture", scenario_records()));
    let reasoning = Arc::new(ScriptedReasoning::expanding(&[
        "PBS Buffer",
        "phosphate buffered saline",
        "  ",
    ]));
    let collaborators = Collaborators::offline(searches(&search)).with_reasoning(reasoning);
    let pipeline = pipeline_with(config(), collaborators, Vec::new());

    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    assert_eq!(search.calls(), 2);
    assert_eq!(recommendation.candidates.len(), 2);
    let retrieve = recommendation
        .stages
        .stages
        .iter()
        .find(|entry| entry.stage == Stage::Retrieve)
        .expect("retrieve stage");
    assert_eq!(
        retrieve.detail,
        "2 records from 2 queries (0 failed, 2 duplicates)"
    );
}

#[tokio::test]
async fn reasoning_collaborator_writes_explanations() {
    let reasoning = Arc::new(ScriptedReasoning::expanding(&[]));
    let collaborators = Collaborators::offline(vec![Arc::new(StaticSearch::new(
        "fixture",
        scenario_records(),
    ))])
    .with_reasoning(reasoning.clone());
    let pipeline = pipeline_with(config(), collaborators, Vec::new());

    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    assert_eq!(reasoning.explained_ranks(), vec![1, 2]);
    let top = recommendation.top().expect("top candidate");
    assert_eq!(top.explanation_source, ExplanationSource::Reasoning);
    assert!(top.explanation.starts_with("Rank 1 goes to PBS buffer standard"));
}

#[tokio::test]
async fn failing_reasoning_falls_back_to_template_once() {
    let reasoning = Arc::new(ScriptedReasoning::failing_explanations());
    let collaborators = Collaborators::offline(vec![Arc::new(StaticSearch::new(
        "fixture",
        scenario_records(),
    ))])
    .with_reasoning(reasoning.clone());
    let pipeline = pipeline_with(config(), collaborators, Vec::new());

    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    assert_eq!(reasoning.explained_ranks(), vec![1]);
    assert!(recommendation
        .recommended
        .iter()
        .all(|entry| entry.explanation_source == ExplanationSource::Template));
    assert_eq!(
        recommendation.stages.status(Stage::Explain),
        Some(StageStatus::Degraded)
    );
    assert_eq!(recommendation.warnings.len(), 1);
}

#[tokio::test]
async fn literature_lookups_are_cached_across_runs() {
    let literature = Arc::new(CountingLiterature::new(0.7));
    let records = vec![
        raw("Lonza", "PBS-1L", "PBS buffer standard", "30"),
        raw("Gibco", "PBS-PRO", "PBS buffer premium", "60"),
    ];
    let collaborators = Collaborators::offline(vec![Arc::new(StaticSearch::new(
        "fixture", records,
    ))])
    .with_literature(literature.clone());
    let pipeline = pipeline_with(config(), collaborators, Vec::new());

    let first = expect_recommended(pipeline.recommend(request("pbs buffer", 100.0)).await);
    let second = expect_recommended(pipeline.recommend(request("pbs buffer", 100.0)).await);

    assert_eq!(literature.calls(), 2);
    assert_ne!(first.run_id, second.run_id);
    assert!(second
        .candidates
        .iter()
        .all(|candidate| candidate.evidence == Some(0.7)));
    let stats = pipeline.evidence_cache();
    assert_eq!((stats.hits, stats.misses, stats.entries), (2, 2, 2));
}

#[tokio::test]
async fn literature_outage_leaves_evidence_missing() {
    let records = vec![raw("Lonza", "PBS-1L", "PBS buffer standard", "30")];
    let collaborators = Collaborators::offline(vec![Arc::new(StaticSearch::new(
        "fixture", records,
    ))])
    .with_literature(Arc::new(QuotaLiterature));
    let pipeline = pipeline_with(config(), collaborators, Vec::new());

    let recommendation = expect_recommended(pipeline.recommend(request("pbs buffer", 100.0)).await);

    assert_eq!(recommendation.candidates[0].evidence, None);
    assert_eq!(recommendation.recommended[0].flags, vec!["evidence_low"]);
    assert_eq!(
        recommendation.stages.status(Stage::Normalize),
        Some(StageStatus::Degraded)
    );
    assert!(matches!(
        recommendation.warnings.as_slice(),
        [PipelineWarning::CollaboratorUnavailable { stage: Stage::Normalize, .. }]
    ));
}

#[tokio::test]
async fn unmatched_line_item_halves_quotation_coverage() {
    let catalog = CatalogSearch::from_reader(Cursor::new(
        "sku,vendor,name,spec_text,unit,pack_size,price,currency,stock,eta_days\n\
PBS-1L,Lonza,PBS buffer,purity: 99%,L,1,30,EUR,10,2\n",
    ))
    .expect("catalog parses");
    let pipeline = pipeline_with(
        config(),
        Collaborators::offline(vec![Arc::new(catalog)])
            .with_literature(Arc::new(CountingLiterature::new(0.9))),
        Vec::new(),
    );
    let mut request = request("bench order", 100.0);
    request.line_items = vec!["pbs buffer".to_string(), "centrifuge rotor".to_string()];

    let recommendation = expect_recommended(pipeline.recommend(request).await);

    assert_eq!(recommendation.quotation.requested, 2);
    assert_eq!(recommendation.quotation.matched, 1);
    assert_eq!(recommendation.quotation.lines[1].candidate, None);
    assert_eq!(recommendation.goal.metrics.rq, 0.5);
    assert!(recommendation.goal.cost.passed);
    assert!(recommendation.goal.evidence.passed);
    assert!(!recommendation.goal.quotation.passed);
    assert!(!recommendation.goal.achieved);
}

#[tokio::test]
async fn learn_records_disagreement_with_the_top_candidate() {
    let pipeline = offline_pipeline(scenario_records());
    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    let receipt = pipeline
        .learn(
            &recommendation,
            FeedbackSubmission {
                chosen: id("gibco:PBS-PRO"),
                rating: Some(4),
            },
        )
        .expect("feedback recorded");

    assert!(!receipt.agreed_with_top);
    assert_eq!(receipt.run_id, recommendation.run_id);
    assert_eq!(receipt.learning.decisions, 1);
    assert_eq!(receipt.learning.agreement_rate, 0.0);
    assert_eq!(pipeline.feedback().decisions(), 1);
}

#[tokio::test]
async fn learn_rejects_bad_submissions() {
    let pipeline = offline_pipeline(scenario_records());
    let recommendation =
        expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    match pipeline.learn(
        &recommendation,
        FeedbackSubmission {
            chosen: id("lonza:PBS-1L"),
            rating: Some(0),
        },
    ) {
        Err(FeedbackError::InvalidRating(0)) => {}
        other => panic!("expected invalid rating, got {other:?}"),
    }

    match pipeline.learn(
        &recommendation,
        FeedbackSubmission {
            chosen: id("sigma:NOPE"),
            rating: None,
        },
    ) {
        Err(FeedbackError::UnknownCandidate(candidate)) => assert_eq!(candidate.0, "sigma:NOPE"),
        other => panic!("expected unknown candidate, got {other:?}"),
    }
    assert_eq!(pipeline.feedback().decisions(), 0);
}

#[tokio::test]
async fn unreadable_feedback_log_warns_on_first_run_only() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = JsonlFeedbackStore::new(dir.path());
    std::fs::create_dir_all(store.log_path()).expect("directory in place of the log");
    let feedback = Arc::new(FeedbackLoop::open(Arc::new(store), Weights::DEFAULT, 10));
    let pipeline = ProcurementPipeline::new(
        config(),
        Collaborators::offline(vec![Arc::new(StaticSearch::new(
            "fixture",
            scenario_records(),
        ))]),
        feedback,
    );

    let first = expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);
    let second = expect_recommended(pipeline.recommend(request("pbs buffer", 5000.0)).await);

    assert!(matches!(
        first.warnings.as_slice(),
        [PipelineWarning::PersistenceFailure { .. }]
    ));
    assert!(second.warnings.is_empty());
    assert_eq!(first.weights, Weights::DEFAULT);
}
