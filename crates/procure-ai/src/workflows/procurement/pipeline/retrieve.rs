use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::super::collaborators::{bounded, ReasoningCollaborator, SearchCollaborator};
use super::super::domain::RawProductRecord;
use super::super::normalizer::dedupe_key;
use super::outcome::{PipelineWarning, Stage};

/// Raw offer tagged with the line item it answers.
#[derive(Debug, Clone)]
pub(crate) struct RetrievedRecord {
    pub line_item: String,
    pub record: RawProductRecord,
}

#[derive(Debug, Default)]
pub(crate) struct Retrieval {
    pub records: Vec<RetrievedRecord>,
    pub queries: usize,
    pub failures: usize,
    pub duplicates: usize,
    pub warnings: Vec<PipelineWarning>,
}

pub(crate) struct RetrievalPlan<'a> {
    pub search: &'a [Arc<dyn SearchCollaborator>],
    pub reasoning: Option<&'a Arc<dyn ReasoningCollaborator>>,
    pub max_results: usize,
    pub max_variants: usize,
    pub timeout: Duration,
}

/// Query variants for one line item; the original query always comes first.
pub(crate) async fn expand(
    line_item: &str,
    reasoning: Option<&Arc<dyn ReasoningCollaborator>>,
    max_variants: usize,
    timeout: Duration,
    warnings: &mut Vec<PipelineWarning>,
) -> Vec<String> {
    let mut variants = vec![line_item.trim().to_string()];

    if let Some(reasoning) = reasoning {
        let reasoning = Arc::clone(reasoning);
        let query = line_item.to_string();
        match bounded(timeout, move || reasoning.expand_query(&query)).await {
            Ok(expanded) => variants.extend(expanded),
            Err(err) => {
                warn!(line_item, error = %err, "query expansion failed; using original query");
                warnings.push(PipelineWarning::CollaboratorUnavailable {
                    collaborator: "reasoning".to_string(),
                    stage: Stage::Retrieve,
                    detail: err.to_string(),
                });
            }
        }
    }

    let mut seen = HashSet::new();
    variants.retain(|variant| {
        let key = variant.trim().to_lowercase();
        !key.is_empty() && seen.insert(key)
    });
    variants.truncate(max_variants.max(1));
    variants
}

/// Expand every line item and fan the searches out concurrently. Failed or timed-out
/// searches contribute no records and a warning; they never abort the run.
pub(crate) async fn retrieve(line_items: &[String], plan: &RetrievalPlan<'_>) -> Retrieval {
    let mut retrieval = Retrieval::default();
    let mut tasks = JoinSet::new();

    for (item_index, line_item) in line_items.iter().enumerate() {
        let variants = expand(
            line_item,
            plan.reasoning,
            plan.max_variants,
            plan.timeout,
            &mut retrieval.warnings,
        )
        .await;

        for (variant_index, variant) in variants.into_iter().enumerate() {
            for (source_index, source) in plan.search.iter().enumerate() {
                retrieval.queries += 1;
                let source = Arc::clone(source);
                let name = source.name().to_string();
                let query = variant.clone();
                let max_results = plan.max_results;
                let timeout = plan.timeout;
                tasks.spawn(async move {
                    let result = bounded(timeout, move || source.search(&query, max_results)).await;
                    ((item_index, variant_index, source_index), name, result)
                });
            }
        }
    }

    let mut batches = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((order, name, Ok(records))) => {
                debug!(collaborator = %name, count = records.len(), "search returned");
                batches.push((order, records));
            }
            Ok((_, name, Err(err))) => {
                warn!(collaborator = %name, error = %err, "search failed; continuing without it");
                retrieval.failures += 1;
                retrieval.warnings.push(PipelineWarning::CollaboratorUnavailable {
                    collaborator: name,
                    stage: Stage::Retrieve,
                    detail: err.to_string(),
                });
            }
            Err(join_error) => {
                warn!(error = %join_error, "search task aborted");
                retrieval.failures += 1;
                retrieval.warnings.push(PipelineWarning::CollaboratorUnavailable {
                    collaborator: "search".to_string(),
                    stage: Stage::Retrieve,
                    detail: join_error.to_string(),
                });
            }
        }
    }

    // Completion order is nondeterministic; restore submission order first.
    batches.sort_by_key(|(order, _)| *order);

    let mut seen = HashSet::new();
    for ((item_index, _, _), records) in batches {
        let line_item = &line_items[item_index];
        for record in records {
            let (vendor, name) = dedupe_key(&record.vendor, &record.name);
            if !seen.insert((item_index, vendor, name)) {
                retrieval.duplicates += 1;
                continue;
            }
            retrieval.records.push(RetrievedRecord {
                line_item: line_item.clone(),
                record,
            });
        }
    }

    retrieval
}
