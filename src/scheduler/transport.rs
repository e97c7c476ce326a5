use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::registry::{EntityKind, Registry};
use crate::sync::{FullMigrationReport, SyncEngine};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Entity '{0}' is not registered")]
    NotRegistered(EntityKind),

    #[error("Invalid trigger URL: {0}")]
    InvalidUrl(String),

    #[error("Trigger request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Trigger returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed trigger response: {0}")]
    Malformed(String),
}

/// How the scheduler reaches an entity's full migration
#[async_trait]
pub trait MigrationTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn full_migration(&self, kind: EntityKind) -> Result<FullMigrationReport, TransportError>;
}

/// Calls the sync engine directly
pub struct InProcessTransport {
    registry: Arc<Registry>,
    engine: Arc<SyncEngine>,
}

impl InProcessTransport {
    pub fn new(registry: Arc<Registry>, engine: Arc<SyncEngine>) -> Self {
        Self { registry, engine }
    }
}

#[async_trait]
impl MigrationTransport for InProcessTransport {
    fn name(&self) -> &'static str {
        "in_process"
    }

    async fn full_migration(&self, kind: EntityKind) -> Result<FullMigrationReport, TransportError> {
        let entity = self.registry.get(kind).ok_or(TransportError::NotRegistered(kind))?;
        Ok(self.engine.full_migration(&entity).await)
    }
}

/// Triggers `POST /<slug>-migration/full-migration` on a running API
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    data: Option<FullMigrationReport>,
    error: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn endpoint(&self, kind: EntityKind) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(&format!("{}-migration", kind.slug()))
            .push("full-migration");
        Ok(url)
    }
}

#[async_trait]
impl MigrationTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn full_migration(&self, kind: EntityKind) -> Result<FullMigrationReport, TransportError> {
        let url = self.endpoint(kind)?;
        debug!("POST {}", url);

        let response = self.client.post(url).send().await?;
        let status = response.status();
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        if !status.is_success() || !envelope.success {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        envelope
            .data
            .ok_or_else(|| TransportError::Malformed("response has no data".to_string()))
    }
}
