use super::{build_coordinator, load_config};
use crate::ConfigArgs;
use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use colored::Colorize;
use mongo_collectors::{CollectorKind, ScrapeCoordinator};
use mongo_core::ExporterError;
use mongo_metrics::exporters::PrometheusExporter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    coordinator: Arc<ScrapeCoordinator>,
    start_time: Instant,
    telemetry_path: String,
    target: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    target: String,
    collectors: Vec<CollectorKind>,
}

pub async fn execute(
    args: ConfigArgs,
    listen: Option<String>,
    path: Option<String>,
) -> Result<()> {
    let mut config = load_config(args).await?;
    if let Some(listen) = listen {
        config.listen_address = listen;
    }
    if let Some(path) = path {
        config.telemetry_path = path;
    }
    config.validate().map_err(ExporterError::InvalidConfig)?;

    let coordinator = build_coordinator(&config)?;
    let state = AppState {
        coordinator: Arc::new(coordinator),
        start_time: Instant::now(),
        telemetry_path: config.telemetry_path.clone(),
        target: config.session_options().redacted_uri(),
    };
    let app = router(state);

    println!("{}", "=== MongoDB Exporter ===".bold().cyan());
    println!("Target: {}", config.session_options().redacted_uri());
    info!("Starting exporter on {}", config.listen_address);
    info!("Endpoints:");
    info!("  GET  {:<15} - Prometheus metrics", config.telemetry_path);
    info!("  GET  {:<15} - Health check", "/health");

    let listener = tokio::net::TcpListener::bind(&config.listen_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Exporter stopped");
    Ok(())
}

fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route(&state.telemetry_path, get(metrics))
        .route("/health", get(health_check));
    if state.telemetry_path != "/" {
        app = app.route("/", get(landing_page));
    }
    app.with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Response {
    let report = state.coordinator.scrape().await;
    match report.to_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PrometheusExporter::content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        target: state.target.clone(),
        collectors: state.coordinator.enabled(),
    })
}

async fn landing_page(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>MongoDB Exporter</title></head>\n<body>\n<h1>MongoDB Exporter</h1>\n<p><a href=\"{path}\">Metrics</a></p>\n</body>\n</html>\n",
        path = state.telemetry_path
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
