// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod gate;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod providers;
pub mod resolve;
pub mod service;

use std::sync::Arc;

use crate::config::{AppConfig, LogFormat};
use crate::service::ScoreService;

pub use crate::api::{create_router, router};
pub use crate::cache::CacheStatus;
pub use crate::model::{Match, MatchStatus, Observation, QualityReport, RawObservation, SourceId};

/// Install the tracing subscriber. Returns quietly if one is already installed
/// (the Shuttle runtime sets its own).
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("footballapi=info,warn"));
    let result = match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Build the full service (real HTTP adapters, alias table, cache) from configuration.
pub fn build_service(cfg: AppConfig) -> anyhow::Result<Arc<ScoreService>> {
    let aliases = cfg.load_aliases()?;
    tracing::info!(
        team_aliases = aliases.team_alias_count(),
        competition_aliases = aliases.competition_alias_count(),
        "alias table loaded"
    );
    let adapters = providers::default_adapters(&cfg)?;
    Ok(Arc::new(ScoreService::new(adapters, aliases, cfg)))
}

/// In-process app from the environment, without the `/metrics` route.
pub fn app() -> anyhow::Result<axum::Router> {
    let cfg = AppConfig::from_env()?;
    Ok(router(build_service(cfg)?))
}
