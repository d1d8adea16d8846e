//! HTTP service for on-demand resolution and validation.
//!
//! Shares the cache file with the batch pipeline. Dirty entries are flushed on an interval
//! and once more on shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use locus::config::Config;
use locus::geocode::NominatimClient;
use locus::models::{AdminLabel, BoundingBox, Coordinates, LocationQuery, ResolvedLocation};
use locus::pipeline::Pipeline;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "serve")]
#[command(about = "Location resolution server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Listen address (overrides the configuration)
    #[arg(short, long)]
    listen: Option<String>,

    /// Resolve from the dictionary and fallbacks only
    #[arg(long)]
    offline: bool,
}

/// Application state shared across handlers
struct AppState {
    pipeline: Pipeline<NominatimClient>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if args.offline {
        config.provider.enabled = false;
    }

    info!("Locus server");

    let state = Arc::new(AppState {
        pipeline: Pipeline::from_config(&config)?,
    });

    let flusher = tokio::spawn(flush_periodically(
        Arc::clone(&state),
        Duration::from_secs(config.server.flush_interval_secs.max(1)),
    ));

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/resolve", get(resolve_handler))
        .route("/v1/validate", get(validate_handler))
        .route("/v1/regions", get(regions_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    info!("Starting server on {}", config.server.listen);

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    flusher.abort();
    state
        .pipeline
        .cache()
        .flush()
        .context("Final cache flush failed")?;
    info!("Cache flushed, bye");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

async fn flush_periodically(state: Arc<AppState>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match state.pipeline.cache().flush_if_dirty() {
            Ok(true) => info!("Flushed geocode cache"),
            Ok(false) => {}
            Err(e) => error!("Cache flush failed: {}", e),
        }
    }
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let cache = state.pipeline.cache();
    Json(HealthResponse {
        status: "ok",
        cached_locations: cache.len(),
        pending_writes: cache.dirty_count(),
        regions: state.pipeline.reference().regions().len(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    cached_locations: usize,
    pending_writes: usize,
    regions: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveParams {
    record_id: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    province: String,
    county: Option<String>,
    #[serde(default)]
    address: String,
    #[serde(default)]
    postal_code: String,
}

/// Resolve one location, cache-first
async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveParams>,
) -> Result<Json<ResolvedLocation>, (StatusCode, String)> {
    if params.record_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "recordId must not be empty".to_string()));
    }

    let mut query = LocationQuery::new(params.record_id, params.city, params.province)
        .with_address(params.address, params.postal_code);
    if let Some(county) = params.county.filter(|c| !c.trim().is_empty()) {
        query = query.with_county(county);
    }

    let resolved = state.pipeline.resolver().resolve(&query).await;
    Ok(Json(resolved))
}

#[derive(Deserialize)]
struct ValidateParams {
    lat: f64,
    lon: f64,
    #[serde(default)]
    province: String,
}

#[derive(Serialize)]
struct ValidateResponse {
    valid: bool,
    province: AdminLabel,
    containing: Vec<String>,
}

/// Check a point against a province box
async fn validate_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateParams>,
) -> Result<Json<ValidateResponse>, (StatusCode, String)> {
    let coords = Coordinates::new(params.lat, params.lon);
    if !coords.is_finite() {
        return Err((StatusCode::BAD_REQUEST, "lat and lon must be finite".to_string()));
    }

    let validator = state.pipeline.validator();
    let province = AdminLabel::from(params.province);

    Ok(Json(ValidateResponse {
        valid: validator.is_valid(coords, &province),
        containing: validator
            .containing_regions(coords)
            .iter()
            .map(|r| r.name.clone())
            .collect(),
        province,
    }))
}

#[derive(Serialize)]
struct RegionResponse {
    name: String,
    bbox: BoundingBox,
    centroid: Coordinates,
}

/// List the reference provinces
async fn regions_handler(State(state): State<Arc<AppState>>) -> Json<Vec<RegionResponse>> {
    Json(
        state
            .pipeline
            .reference()
            .regions()
            .iter()
            .map(|r| RegionResponse {
                name: r.name.clone(),
                bbox: r.bbox,
                centroid: r.centroid,
            })
            .collect(),
    )
}
