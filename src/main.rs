use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod content;
mod engine;
mod error;
mod features;
mod fetch;
mod model;
mod probes;
mod storage;
mod types;
mod urlinfo;
mod whois;

use config::Config;
use engine::DetectionEngine;
use error::AppError;
use types::{PredictRequest, PredictResponse, StatsResponse, UrlCheck};

type AppState = Arc<DetectionEngine>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kavach_engine=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    info!("Loaded configuration: {:?}", config);
    let port = config.port;

    let engine = DetectionEngine::new(&config)?;
    let app_state = Arc::new(engine);

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .expect("Failed to install Prometheus exporter");

    let app = Router::new()
        .route("/", get(home_handler))
        .route("/predict", post(predict_handler))
        .route("/history", get(history_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting Kavach phishing detection engine on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn home_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Kavach Phishing Detection API",
        "status": "online"
    }))
}

async fn predict_handler(
    State(engine): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, AppError> {
    let start = Instant::now();

    metrics::counter!("requests_total").increment(1);

    let result = engine.check(request).await?;

    let latency = start.elapsed().as_millis() as f64;
    metrics::histogram!("request_duration_ms").record(latency);

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<u32>,
}

async fn history_handler(
    State(engine): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<UrlCheck>>, AppError> {
    let limit = params.limit.unwrap_or(20).min(500);
    Ok(Json(engine.history(limit)?))
}

async fn stats_handler(State(engine): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    Ok(Json(engine.stats()?))
}

async fn health_handler(State(engine): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "model_version": engine.model_version(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, starting graceful shutdown");
}
