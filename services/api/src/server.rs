use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::report_routes;
use amo_report::config::AppConfig;
use amo_report::error::AppError;
use amo_report::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
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

    let stage_config = config.report.load_stage_config()?;
    info!(
        path = %config.report.stage_config_path.display(),
        groups = stage_config.stages.len(),
        "stage groups loaded"
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        stage_config: Arc::new(stage_config),
        csv_delimiter: config.report.csv_delimiter,
    };

    let app = report_routes()
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "funnel report service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
