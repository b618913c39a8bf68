use async_trait::async_trait;
use calsync_core::EmbeddingService;
use calsync_domain::{CalSyncError, EmbeddingConfig, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::HttpClient;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
pub struct OpenAIEmbeddings {
    http_client: HttpClient,
    api_key: String,
    model: String,
    api_url: String,
}

impl OpenAIEmbeddings {
    pub fn new(api_key: String, http_client: HttpClient) -> Self {
        Self {
            http_client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig, http_client: HttpClient) -> Self {
        let client = Self::new(config.api_key.clone(), http_client);
        let client =
            if config.model.is_empty() { client } else { client.with_model(config.model.clone()) };
        if config.api_url.is_empty() {
            client
        } else {
            client.with_api_url(config.api_url.clone())
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingService for OpenAIEmbeddings {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.api_key.is_empty() {
            return Err(CalSyncError::Config("embedding api_key is not configured".into()));
        }

        let request_builder = self
            .http_client
            .request(Method::POST, &self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&EmbeddingRequest { model: &self.model, input: text });

        let response: EmbeddingResponse =
            self.http_client.send_json(request_builder).await.map_err(embedding_error)?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or_else(|| CalSyncError::Embedding("response contained no embedding".into()))?;
        debug!(dimensions = embedding.len(), "embedding received");
        Ok(embedding)
    }
}

/// Every failure of this adapter is reported as an embedding failure; the
/// original classification stays in the message.
fn embedding_error(err: CalSyncError) -> CalSyncError {
    match err {
        CalSyncError::Embedding(_) => err,
        other => CalSyncError::Embedding(format!("{} ({})", other, other.label())),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(api_url: String) -> OpenAIEmbeddings {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(5))
            .max_attempts(1) // No retries in tests
            .build()
            .expect("http client");

        OpenAIEmbeddings::new("test-api-key".to_string(), http_client).with_api_url(api_url)
    }

    #[tokio::test]
    async fn embeds_text_with_configured_model() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(body_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": "Standup: daily sync"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [{"object": "embedding", "index": 0, "embedding": [0.25, -0.5, 1.0]}],
                "model": "text-embedding-3-small"
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(format!("{}/v1/embeddings", mock_server.uri()));
        let vector = client.embed("Standup: daily sync").await.expect("should embed");

        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn authentication_failure_is_an_embedding_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&mock_server)
            .await;

        let client = test_client(format!("{}/v1/embeddings", mock_server.uri()));
        let err = client.embed("text").await.unwrap_err();

        match err {
            CalSyncError::Embedding(message) => assert!(message.contains("auth"), "{message}"),
            other => panic!("expected embedding error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_data_is_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(format!("{}/v1/embeddings", mock_server.uri()));

        assert!(matches!(client.embed("text").await, Err(CalSyncError::Embedding(_))));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let http_client = HttpClient::builder().max_attempts(1).build().unwrap();
        let client = OpenAIEmbeddings::new(String::new(), http_client);

        assert!(matches!(client.embed("text").await, Err(CalSyncError::Config(_))));
    }

    #[test]
    fn from_config_applies_model_and_url() {
        let http_client = HttpClient::builder().max_attempts(1).build().unwrap();
        let config = EmbeddingConfig {
            api_url: "http://localhost:1/v1/embeddings".into(),
            api_key: "k".into(),
            model: "text-embedding-3-large".into(),
        };

        let client = OpenAIEmbeddings::from_config(&config, http_client);

        assert_eq!(client.model(), "text-embedding-3-large");
        assert_eq!(client.api_url, "http://localhost:1/v1/embeddings");
    }
}
