use std::fs;
use std::sync::Arc;

use super::common::*;
use crate::workflows::procurement::feedback::{
    FeedbackLoop, FeedbackStore, JsonlFeedbackStore, LearningState, MemoryFeedbackStore,
    SubScores,
};
use crate::workflows::procurement::Weights;

fn balanced() -> SubScores {
    SubScores {
        cost: 0.4,
        evidence: 0.8,
        availability: 1.0,
    }
}

fn jsonl_line(run: &str, vendor: &str) -> String {
    let record = feedback_record(run, vendor, Some(4), balanced());
    serde_json::to_string(&record).expect("record encodes")
}

#[test]
fn no_feedback_keeps_default_weights_exactly() {
    let feedback = feedback_loop(Vec::new());

    assert_eq!(feedback.decisions(), 0);
    assert_eq!(feedback.confidence(), 0.0);
    assert_eq!(feedback.effective_weights(), Weights::DEFAULT);
    assert!(feedback.take_warning().is_none());
}

#[test]
fn saturated_cost_preference_converges_to_cost_only_weights() {
    let feedback = feedback_loop(cost_focused_log(50));

    assert_eq!(feedback.decisions(), 50);
    assert_eq!(feedback.confidence(), 1.0);
    assert_eq!(feedback.learned_weights(), Weights::new(1.0, 0.0, 0.0));
    assert_eq!(feedback.effective_weights(), Weights::new(1.0, 0.0, 0.0));
}

#[test]
fn confidence_grows_monotonically_until_saturation() {
    let mut state = LearningState::default();
    let mut previous = state.confidence(10);
    for record in cost_focused_log(12) {
        state = state.apply(&record);
        let current = state.confidence(10);
        assert!(current >= previous, "confidence dropped from {previous} to {current}");
        previous = current;
    }
    assert_eq!(previous, 1.0);
    assert_eq!(state.confidence(0), 1.0);
}

#[test]
fn partial_confidence_blends_towards_learned_weights() {
    let feedback = feedback_loop(cost_focused_log(5));

    let effective = feedback.effective_weights();
    assert_eq!(feedback.confidence(), 0.5);
    assert!(effective.alpha > Weights::DEFAULT.alpha);
    assert!(effective.alpha < 1.0);
    assert!(effective.is_normalized());
}

#[test]
fn ratings_scale_influence_and_feed_vendor_stats() {
    let records = vec![
        feedback_record("run-1", "lonza", Some(5), balanced()),
        feedback_record("run-2", "lonza", Some(3), balanced()),
        feedback_record("run-3", "gibco", None, balanced()),
    ];
    let summary = LearningState::replay(&records).summary(Weights::DEFAULT, 10);

    assert_eq!(summary.decisions, 3);
    assert_eq!(summary.agreement_rate, 1.0);
    assert_eq!(summary.average_rating, Some(4.0));

    let vendors: Vec<(&str, u64)> = summary
        .vendors
        .iter()
        .map(|stats| (stats.vendor.as_str(), stats.selections))
        .collect();
    assert_eq!(vendors, vec![("lonza", 2), ("gibco", 1)]);
    assert_eq!(summary.vendors[0].average_rating, Some(4.0));
    assert_eq!(summary.vendors[1].average_rating, None);
    assert!((summary.vendors[0].selection_rate - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn out_of_range_sub_scores_are_sanitized() {
    let scores = SubScores {
        cost: 1.7,
        evidence: f64::NAN,
        availability: -0.2,
    }
    .sanitized();

    assert_eq!(scores.cost, 1.0);
    assert_eq!(scores.evidence, 0.0);
    assert_eq!(scores.availability, 0.0);
}

#[test]
fn record_appends_and_refreshes_snapshot() {
    let store = Arc::new(MemoryFeedbackStore::default());
    let feedback = FeedbackLoop::open(store.clone(), Weights::DEFAULT, 10);

    let summary = feedback
        .record(feedback_record("run-1", "lonza", Some(5), balanced()))
        .expect("record stored");

    assert_eq!(summary.decisions, 1);
    assert_eq!(store.load().expect("load").records.len(), 1);
    let snapshot = store.snapshot().expect("snapshot written");
    assert_eq!(snapshot.decisions, 1);
    assert!((snapshot.confidence - 0.1).abs() < 1e-12);
}

#[test]
fn jsonl_store_skips_corrupt_lines_and_repairs_torn_tail() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(JsonlFeedbackStore::new(dir.path()));
    let contents = format!(
        "{}\nnot json at all\n{}\n{{\"run_id\":\"run-9\"",
        jsonl_line("run-1", "lonza"),
        jsonl_line("run-2", "gibco"),
    );
    fs::write(store.log_path(), contents).expect("seed log");

    let loaded = store.load().expect("log readable");
    assert_eq!(loaded.records.len(), 2);
    assert_eq!(loaded.corrupt_lines, vec![2]);
    assert!(loaded.torn_tail);

    let feedback = FeedbackLoop::open(store.clone(), Weights::DEFAULT, 10);
    assert_eq!(feedback.decisions(), 2);
    let warning = feedback.take_warning().expect("corrupt line warning");
    assert_eq!(warning.corrupt_lines, vec![2]);
    assert!(feedback.take_warning().is_none(), "warning is handed out once");

    feedback
        .record(feedback_record("run-3", "lonza", Some(5), balanced()))
        .expect("append after torn tail");

    let reloaded = store.load().expect("log readable");
    let runs: Vec<&str> = reloaded
        .records
        .iter()
        .map(|record| record.run_id.0.as_str())
        .collect();
    assert_eq!(runs, vec!["run-1", "run-2", "run-3"]);
    assert_eq!(reloaded.corrupt_lines, vec![2, 4]);
    assert!(!reloaded.torn_tail);

    let snapshot = store
        .read_snapshot()
        .expect("snapshot readable")
        .expect("snapshot present");
    assert_eq!(snapshot.decisions, 3);
}

#[test]
fn jsonl_store_missing_log_starts_empty() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = JsonlFeedbackStore::new(dir.path().join("fresh"));

    let loaded = store.load().expect("missing log is empty");
    assert!(loaded.records.is_empty());
    assert!(store.read_snapshot().expect("no snapshot").is_none());
}

#[test]
fn unreadable_log_falls_back_to_defaults_with_one_warning() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(JsonlFeedbackStore::new(dir.path()));
    fs::create_dir_all(store.log_path()).expect("directory in place of the log");

    let feedback = FeedbackLoop::open(store, Weights::DEFAULT, 10);

    assert_eq!(feedback.effective_weights(), Weights::DEFAULT);
    let warning = feedback.take_warning().expect("unreadable log warning");
    assert!(warning.message.contains("unreadable"));
    assert!(feedback.take_warning().is_none());
}
