use metrics_exporter_prometheus::PrometheusHandle;
use procure_ai::config::AppConfig;
use procure_ai::error::AppError;
use procure_ai::workflows::catalog::CatalogSearch;
use procure_ai::workflows::procurement::{
    Collaborators, FeedbackLoop, InferenceMode, JsonlFeedbackStore, ProcurementPipeline,
    RecommendationRecord, RecommendationRepository, RepositoryError, RunId,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Recommendations kept in process memory; insertion order drives the recent listing.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRecommendationRepository {
    records: Arc<Mutex<HashMap<RunId, RecommendationRecord>>>,
    order: Arc<Mutex<Vec<RunId>>>,
}

impl RecommendationRepository for InMemoryRecommendationRepository {
    fn insert(
        &self,
        record: RecommendationRecord,
    ) -> Result<RecommendationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(record.run_id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.run_id().clone(), record.clone());
        self.order
            .lock()
            .expect("repository mutex poisoned")
            .push(record.run_id().clone());
        Ok(record)
    }

    fn update(&self, record: RecommendationRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(record.run_id()) {
            guard.insert(record.run_id().clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, run_id: &RunId) -> Result<Option<RecommendationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(run_id).cloned())
    }

    fn recent(&self, limit: usize) -> Result<Vec<RecommendationRecord>, RepositoryError> {
        let records = self.records.lock().expect("repository mutex poisoned");
        let order = self.order.lock().expect("repository mutex poisoned");
        Ok(order
            .iter()
            .rev()
            .filter_map(|run_id| records.get(run_id).cloned())
            .take(limit)
            .collect())
    }
}

/// Catalog from an explicit path, the configured one, or the bundled sample.
pub(crate) fn load_catalog(
    config: &AppConfig,
    path: Option<&Path>,
) -> Result<CatalogSearch, AppError> {
    let path = path.or(config.storage.catalog_path.as_deref());
    let catalog = match path {
        Some(path) => {
            let name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("catalog")
                .to_string();
            CatalogSearch::from_path(path)?.with_name(name)
        }
        None => CatalogSearch::bundled()?,
    };
    info!(products = catalog.len(), "supplier catalog loaded");
    Ok(catalog)
}

/// Pipeline over the catalog with feedback persisted under the configured directory.
pub(crate) fn build_pipeline(
    config: &AppConfig,
    catalog: CatalogSearch,
) -> ProcurementPipeline<JsonlFeedbackStore> {
    let procurement = config.procurement.clone();
    let feedback = Arc::new(FeedbackLoop::open(
        Arc::new(JsonlFeedbackStore::new(config.storage.feedback_dir.clone())),
        procurement.default_weights,
        procurement.feedback_saturation,
    ));
    ProcurementPipeline::new(
        procurement,
        Collaborators::offline(vec![Arc::new(catalog)]),
        feedback,
    )
}

pub(crate) fn parse_mode(raw: &str) -> Result<InferenceMode, String> {
    InferenceMode::parse(raw)
        .ok_or_else(|| format!("unknown inference mode '{raw}' (forward, backward, hybrid)"))
}
