use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::super::collaborators::{bounded, LiteratureCollaborator};
use super::super::domain::Candidate;
use super::super::normalizer::{normalize_record, DropReason, DroppedRecord};
use super::outcome::{PipelineWarning, Stage};
use super::retrieve::RetrievedRecord;

#[derive(Debug, Default)]
pub(crate) struct Normalized {
    pub candidates: Vec<Candidate>,
    pub dropped: Vec<DroppedRecord>,
    pub evidence_lookups: usize,
    pub warnings: Vec<PipelineWarning>,
}

/// Turn raw records into candidates, one per vendor and SKU, then fill in missing
/// evidence scores from the literature collaborator.
pub(crate) async fn normalize(
    records: Vec<RetrievedRecord>,
    currency: &str,
    literature: Arc<dyn LiteratureCollaborator>,
    timeout: Duration,
) -> Normalized {
    let mut normalized = Normalized::default();
    let mut seen = HashSet::new();

    for RetrievedRecord { line_item, record } in records {
        match normalize_record(&record, &line_item, currency) {
            Ok(candidate) => {
                if !seen.insert(candidate.id.clone()) {
                    let reason = DropReason::DuplicateOffer {
                        candidate: candidate.id.clone(),
                    };
                    debug!(candidate = %candidate.id, "duplicate offer dropped");
                    normalized.dropped.push(DroppedRecord::new(&record, reason));
                    continue;
                }
                normalized.candidates.push(candidate);
            }
            Err(reason) => {
                info!(
                    source = %record.source,
                    vendor = %record.vendor,
                    name = %record.name,
                    reason = %reason.summary(),
                    "raw record dropped"
                );
                normalized.warnings.push(PipelineWarning::ValidationFailure {
                    subject: format!("{} / {}", record.vendor.trim(), record.name.trim()),
                    detail: reason.summary(),
                });
                normalized.dropped.push(DroppedRecord::new(&record, reason));
            }
        }
    }

    attach_evidence(&mut normalized, literature, timeout).await;
    normalized
}

async fn attach_evidence(
    normalized: &mut Normalized,
    literature: Arc<dyn LiteratureCollaborator>,
    timeout: Duration,
) {
    let mut tasks = JoinSet::new();
    for (index, candidate) in normalized.candidates.iter().enumerate() {
        if candidate.evidence.is_some() {
            continue;
        }
        normalized.evidence_lookups += 1;
        let terms = candidate.evidence_terms();
        let literature = Arc::clone(&literature);
        tasks.spawn(async move {
            let result = bounded(timeout, move || literature.evidence_for(&terms)).await;
            (index, result)
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(score))) => {
                if let Some(candidate) = normalized.candidates.get_mut(index) {
                    candidate.evidence = Some(score.clamp(0.0, 1.0));
                }
            }
            Ok((index, Err(err))) => failures.push((index, err.to_string())),
            Err(join_error) => failures.push((usize::MAX, join_error.to_string())),
        }
    }

    // Report in candidate order so warnings are stable across runs.
    failures.sort();
    for (index, detail) in failures {
        let subject = normalized
            .candidates
            .get(index)
            .map(|candidate| candidate.id.to_string())
            .unwrap_or_else(|| "literature".to_string());
        warn!(candidate = %subject, error = %detail, "evidence lookup failed; evidence left missing");
        normalized.warnings.push(PipelineWarning::CollaboratorUnavailable {
            collaborator: "literature".to_string(),
            stage: Stage::Normalize,
            detail: format!("{subject}: {detail}"),
        });
    }
}
