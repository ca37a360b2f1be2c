// src/providers/types.rs
use std::time::Duration;
use thiserror::Error;

use crate::model::{RawObservation, SourceId};

/// Browser-like agent; several upstreams reject unknown clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Failure of one source. Isolated per source by the orchestrator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{source_id}: upstream returned HTTP {status}")]
    Http { source_id: SourceId, status: u16 },
    #[error("{source_id}: network error: {message}")]
    Network { source_id: SourceId, message: String },
    #[error("{source_id}: could not parse payload: {message}")]
    Parse { source_id: SourceId, message: String },
    #[error("{source_id}: timed out after {}s", elapsed.as_secs())]
    Timeout { source_id: SourceId, elapsed: Duration },
}

impl FetchError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Http { .. } => "http",
            FetchError::Network { .. } => "network",
            FetchError::Parse { .. } => "parse",
            FetchError::Timeout { .. } => "timeout",
        }
    }

    pub fn parse(source_id: SourceId, message: impl Into<String>) -> Self {
        FetchError::Parse {
            source_id,
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;
    async fn fetch(&self) -> Result<Vec<RawObservation>, FetchError>;
}

/// Shared HTTP client for all adapters.
pub fn build_client(timeout: Duration, insecure_tls: bool) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure_tls)
        .build()
}

/// GET `url` and return the body, mapping transport failures onto `FetchError`.
pub async fn get_text(
    client: &reqwest::Client,
    source_id: SourceId,
    url: &str,
    accept: &str,
) -> Result<String, FetchError> {
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, accept)
        .send()
        .await
        .map_err(|e| FetchError::Network {
            source_id,
            message: e.to_string(),
        })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Http {
            source_id,
            status: status.as_u16(),
        });
    }
    resp.text().await.map_err(|e| FetchError::Network {
        source_id,
        message: e.to_string(),
    })
}

/// Where an adapter reads its payload from.
pub(crate) enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl Mode {
    pub(crate) async fn load(&self, source_id: SourceId, accept: &str) -> Result<String, FetchError> {
        match self {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::Http { url, client } => {
                tracing::debug!(target: "providers", source = %source_id, %url, "fetching");
                get_text(client, source_id, url, accept).await
            }
        }
    }
}

/// Adapter over a fixed list of records. Used by tests and local demos.
pub struct StaticAdapter {
    id: SourceId,
    result: Result<Vec<RawObservation>, String>,
    delay: Option<Duration>,
}

impl StaticAdapter {
    pub fn new(id: SourceId, records: Vec<RawObservation>) -> Self {
        Self {
            id,
            result: Ok(records),
            delay: None,
        }
    }

    /// Adapter whose every fetch fails with a network error.
    pub fn failing(id: SourceId, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Err(message.into()),
            delay: None,
        }
    }

    /// Sleep before answering (exercises timeouts).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl SourceAdapter for StaticAdapter {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn fetch(&self) -> Result<Vec<RawObservation>, FetchError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match &self.result {
            Ok(records) => Ok(records.clone()),
            Err(message) => Err(FetchError::Network {
                source_id: self.id,
                message: message.clone(),
            }),
        }
    }
}
