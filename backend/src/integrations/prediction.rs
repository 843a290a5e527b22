//! Cloud ML Engine style online prediction client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ensure_success, request_error, IntegrationError, IntegrationResult, PredictionService};
use crate::config::ModelConfig;

const SERVICE: &str = "model-prediction";

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    predicted: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct MlEngineClient {
    client: reqwest::Client,
    base_url: String,
    project: String,
    access_token: Option<String>,
}

impl MlEngineClient {
    pub fn new(client: reqwest::Client, config: &ModelConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            access_token: config.access_token.clone(),
        }
    }

    /// Fully qualified model name, `projects/{project}/models/{model}`
    pub fn model_path(&self, model: &str) -> String {
        format!("projects/{}/models/{}", self.project, model)
    }
}

/// Numbers pass through; numeric strings are parsed.
fn scalar(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl PredictionService for MlEngineClient {
    async fn predict(&self, model: &str, instance: &str) -> IntegrationResult<f64> {
        let url = format!("{}/v1/{}:predict", self.base_url, self.model_path(model));
        debug!(%url, "Requesting online prediction");

        let mut request = self.client.post(&url).json(&PredictRequest {
            instances: vec![instance],
        });
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(request_error(SERVICE))?;
        let body: PredictResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(request_error(SERVICE))?;

        if let Some(error) = body.error {
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: 200,
                body: error,
            });
        }

        let predicted = body
            .predictions
            .first()
            .and_then(|p| p.predicted.as_ref())
            .ok_or_else(|| IntegrationError::malformed(SERVICE, "no predictions[0].predicted"))?;

        scalar(predicted).ok_or_else(|| {
            IntegrationError::malformed(SERVICE, format!("non-numeric prediction {}", predicted))
        })
    }
}
