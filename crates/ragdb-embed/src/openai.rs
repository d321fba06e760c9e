//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragdb_core::config::EmbeddingSettings;
use ragdb_core::traits::Embedder;
use ragdb_core::{Error, Result};

const SERVICE: &str = "embedding provider";

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    batch_size: usize,
    timeout_ms: Option<u64>,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        let defaults = EmbeddingSettings::default();
        Self {
            api_key: api_key.into(),
            model: defaults.model,
            dimension: defaults.dimension,
            base_url: defaults.base_url,
            batch_size: defaults.batch_size,
            timeout_ms: None,
            client: reqwest::Client::new(),
        }
    }

    /// Key comes from the settings or, failing that, `OPENAI_API_KEY`.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| Error::InvalidConfig("embedding.api_key is not set and OPENAI_API_KEY is empty".into()))?;
        Ok(Self::new(api_key)
            .with_model(settings.model.clone())
            .with_dimension(settings.dimension)
            .with_base_url(settings.base_url.clone())
            .with_batch_size(settings.batch_size))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self { self.model = model.into(); self }

    pub fn with_dimension(mut self, dimension: usize) -> Self { self.dimension = dimension; self }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self { self.batch_size = batch_size.max(1); self }

    /// Per-request timeout enforced by the HTTP client.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        Ok(self)
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    pub fn batch_size(&self) -> usize { self.batch_size }

    async fn request_embeddings(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let expected = input.len();
        let request = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: Some(self.dimension),
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        let result: EmbeddingResponse = response.json().await.map_err(|e| Error::upstream(SERVICE, e))?;
        if result.data.len() != expected {
            return Err(Error::upstream(SERVICE, format!("expected {expected} embeddings, got {}", result.data.len())));
        }

        let mut embeddings: Vec<(usize, Vec<f32>)> = result.data.into_iter().map(|e| (e.index, e.embedding)).collect();
        embeddings.sort_by_key(|(idx, _)| *idx);
        if let Some((_, e)) = embeddings.iter().find(|(_, e)| e.len() != self.dimension) {
            return Err(Error::InvalidConfig(format!(
                "model {} returned {}-dimensional vectors but embedding.dimension is {}",
                self.model,
                e.len(),
                self.dimension
            )));
        }
        Ok(embeddings.into_iter().map(|(_, e)| e).collect())
    }
}

fn map_send_error(e: reqwest::Error, timeout_ms: Option<u64>) -> Error {
    if e.is_timeout() {
        Error::Timeout { service: SERVICE.to_string(), timeout_ms: timeout_ms.unwrap_or_default() }
    } else if e.is_connect() {
        Error::unavailable(SERVICE, e)
    } else {
        Error::upstream(SERVICE, e)
    }
}

fn map_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::InvalidConfig(format!("embedding provider rejected the credentials ({status}): {body}"))
        }
        StatusCode::NOT_FOUND => Error::InvalidConfig(format!("unknown embedding endpoint or model ({status}): {body}")),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Error::unavailable(SERVICE, format!("API error {status}: {body}"))
        }
        _ => Error::upstream(SERVICE, format!("API error {status}: {body}")),
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dim(&self) -> usize { self.dimension }

    fn model_id(&self) -> &str { &self.model }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.request_embeddings(batch.to_vec()).await?);
        }
        debug!(texts = texts.len(), model = %self.model, "embedded batch");
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
