//! footballapi: binary entrypoint.
//! Loads configuration, builds the score service and serves the Axum router on Shuttle.

use footballapi::config::AppConfig;
use footballapi::metrics::Metrics;
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let cfg = AppConfig::from_env().map_err(anyhow::Error::from)?;
    footballapi::init_tracing(cfg.log_format);
    tracing::info!(
        max_live_stale_seconds = cfg.max_live_stale_seconds,
        cache_seconds = cfg.cache_ttl.as_secs(),
        kickoff_tolerance_minutes = cfg.kickoff_tolerance_minutes,
        filter_stage = ?cfg.filter_stage,
        "configuration loaded"
    );

    let metrics = Metrics::init(cfg.cache_ttl.as_secs())?;
    let service = footballapi::build_service(cfg)?;
    let router = footballapi::router(service).merge(metrics.router());

    Ok(router.into())
}
