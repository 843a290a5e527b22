//! Cloud Natural Language style analysis client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ensure_success, request_error, IntegrationError, IntegrationResult, LanguageService};
use crate::config::LanguageConfig;

const SERVICE: &str = "language-analysis";

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    document: Document<'a>,
    #[serde(rename = "encodingType")]
    encoding_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Document<'a> {
    #[serde(rename = "type")]
    doc_type: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentimentResponse {
    document_sentiment: Option<Sentiment>,
}

#[derive(Debug, Deserialize)]
struct Sentiment {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    entities: Option<Vec<Entity>>,
}

#[derive(Debug, Deserialize)]
struct Entity {
    name: String,
}

#[derive(Debug, Clone)]
pub struct CloudLanguageClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl CloudLanguageClient {
    pub fn new(client: reqwest::Client, config: &LanguageConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
        }
    }

    async fn analyze<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        content: &str,
    ) -> IntegrationResult<T> {
        let url = format!("{}/v1beta2/documents:{}", self.base_url, method);

        let mut request = self.client.post(&url).json(&AnalyzeRequest {
            document: Document {
                doc_type: "PLAIN_TEXT",
                content,
            },
            encoding_type: "UTF8",
        });
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(request_error(SERVICE))?;
        ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(request_error(SERVICE))
    }
}

#[async_trait]
impl LanguageService for CloudLanguageClient {
    async fn analyze_sentiment(&self, content: &str) -> IntegrationResult<f64> {
        let body: SentimentResponse = self.analyze("analyzeSentiment", content).await?;
        body.document_sentiment
            .and_then(|s| s.score)
            .ok_or_else(|| IntegrationError::malformed(SERVICE, "no documentSentiment.score"))
    }

    async fn analyze_entities(&self, content: &str) -> IntegrationResult<Vec<String>> {
        let body: EntitiesResponse = self.analyze("analyzeEntities", content).await?;
        // An absent list means the text mentioned no entities
        Ok(body
            .entities
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.name)
            .collect())
    }
}
