mod error;
mod model;

use async_trait::async_trait;
use locus_config::{ApiKey, BackendConfig};
use reqwest::{header::CONTENT_TYPE, Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub use error::{TransportError, TransportResult};
pub use model::{
    ChunkResult, EntityPayload, NormalizedEntity, UpsertResponse, UpsertStatus,
    LOCATION_ENTITY_TYPE,
};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const ENTITY_PATH: &str = "v1/entity";
pub const BATCH_PATH: &str = "v1/entities/batch";

/// Submission seam between the dispatcher and the entity store.
#[async_trait]
pub trait EntityTransport: Send + Sync {
    async fn upsert_entity(&self, entity: &NormalizedEntity) -> TransportResult<UpsertResponse>;

    async fn upsert_batch(&self, entities: &[NormalizedEntity]) -> TransportResult<ChunkResult>;
}

#[derive(Clone)]
pub struct BackendClient {
    cfg: BackendConfig,
    api_key: ApiKey,
    http: Client,
}

impl BackendClient {
    pub fn new(cfg: BackendConfig, api_key: ApiKey) -> TransportResult<Self> {
        let timeout = Duration::try_from_secs_f64(cfg.timeout_seconds.max(1.0)).map_err(|err| {
            TransportError::InvalidConfig {
                message: format!("backend.timeout_seconds: {err}"),
            }
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                TransportError::network(format!("failed to construct reqwest client: {err}"))
            })?;

        Ok(Self { cfg, api_key, http })
    }

    fn endpoint(&self, path: &str) -> TransportResult<Url> {
        let base = format!("{}/", self.cfg.url.trim_end_matches('/'));
        Url::parse(&base)
            .and_then(|url| url.join(path))
            .map_err(|err| TransportError::InvalidUrl {
                message: format!("{}: {err}", self.cfg.url),
            })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> TransportResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_vec(body)
            .map_err(|err| TransportError::decode(format!("failed to encode request: {err}")))?;

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, self.api_key.expose())
            .body(payload)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await.map_err(|err| {
            TransportError::network(format!(
                "failed to read backend response body (status {status}): {err}"
            ))
        })?;

        if !status.is_success() {
            return Err(TransportError::status(status.as_u16(), text));
        }

        serde_json::from_str(&text)
            .map_err(|err| TransportError::decode(format!("{err}; body: {text}")))
    }
}

#[async_trait]
impl EntityTransport for BackendClient {
    async fn upsert_entity(&self, entity: &NormalizedEntity) -> TransportResult<UpsertResponse> {
        self.post_json(ENTITY_PATH, entity).await
    }

    async fn upsert_batch(&self, entities: &[NormalizedEntity]) -> TransportResult<ChunkResult> {
        self.post_json(BATCH_PATH, entities).await
    }
}
