// External service integrations
//
// Each predictor and the CRM sit behind a small async trait so the triggers can
// be exercised without the network.

pub mod crm;
pub mod language;
pub mod prediction;

pub use crm::{CreateResult, CrmSession, SalesforceClient};
pub use language::CloudLanguageClient;
pub use prediction::MlEngineClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("{service} request failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned an unexpected response: {detail}")]
    MalformedResponse { service: &'static str, detail: String },
    #[error("{service} authentication failed: {detail}")]
    Auth { service: &'static str, detail: String },
    #[error("{service} rejected the record: {detail}")]
    Rejected { service: &'static str, detail: String },
}

impl IntegrationError {
    pub fn service(&self) -> &'static str {
        match self {
            Self::Request { service, .. }
            | Self::Status { service, .. }
            | Self::MalformedResponse { service, .. }
            | Self::Auth { service, .. }
            | Self::Rejected { service, .. } => service,
        }
    }

    pub(crate) fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service,
            detail: detail.into(),
        }
    }
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// Hosted predictive model service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionService: Send + Sync {
    /// Run one instance through `model` and return its scalar prediction.
    async fn predict(&self, model: &str, instance: &str) -> IntegrationResult<f64>;
}

/// Natural-language analysis service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageService: Send + Sync {
    /// Document sentiment score
    async fn analyze_sentiment(&self, content: &str) -> IntegrationResult<f64>;
    /// Entity names in order of appearance in the response
    async fn analyze_entities(&self, content: &str) -> IntegrationResult<Vec<String>>;
}

/// Outbound CRM
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrmConnector: Send + Sync {
    async fn login(&self) -> IntegrationResult<CrmSession>;
    async fn create(
        &self,
        session: &CrmSession,
        object_type: &str,
        fields: &serde_json::Value,
    ) -> IntegrationResult<CreateResult>;
}

/// Shared HTTP client construction for every integration
pub fn http_client(timeout: Duration) -> IntegrationResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("triage/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|source| IntegrationError::Request {
            service: "http",
            source,
        })
}

/// Turn a non-success response into an error carrying the body.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> IntegrationResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(IntegrationError::Auth {
            service,
            detail: body,
        });
    }
    Err(IntegrationError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn request_error(service: &'static str) -> impl Fn(reqwest::Error) -> IntegrationError {
    move |source| IntegrationError::Request { service, source }
}
