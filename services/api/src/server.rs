use crate::cli::ServeArgs;
use crate::infra::{build_pipeline, load_catalog, AppState, InMemoryRecommendationRepository};
use crate::routes::with_procurement_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use procure_ai::config::AppConfig;
use procure_ai::error::AppError;
use procure_ai::telemetry;
use procure_ai::workflows::procurement::ProcurementService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = load_catalog(&config, args.catalog.as_deref())?;
    let pipeline = Arc::new(build_pipeline(&config, catalog));
    let repository = Arc::new(InMemoryRecommendationRepository::default());
    let procurement_service = Arc::new(ProcurementService::new(repository, pipeline));

    let app = with_procurement_routes(procurement_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        feedback_dir = %config.storage.feedback_dir.display(),
        "procurement decision service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
