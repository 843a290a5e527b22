//! Salesforce REST connector: username-password login and sObject creation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ensure_success, request_error, CrmConnector, IntegrationError, IntegrationResult};
use crate::config::CrmConfig;

const SERVICE: &str = "crm";

/// An authenticated CRM session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmSession {
    pub access_token: String,
    pub instance_url: String,
}

/// Outcome of an sObject create call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    instance_url: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SalesforceClient {
    client: reqwest::Client,
    config: CrmConfig,
}

impl SalesforceClient {
    pub fn new(client: reqwest::Client, config: CrmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CrmConnector for SalesforceClient {
    async fn login(&self) -> IntegrationResult<CrmSession> {
        let url = format!(
            "{}/services/oauth2/token",
            self.config.login_url.trim_end_matches('/')
        );
        let secret = self.config.login_secret();
        let form = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", self.config.username.as_str()),
            ("password", secret.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(request_error(SERVICE))?;

        // Login failures come back as 400 with an OAuth error body
        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<TokenResponse>(&body)
                .ok()
                .and_then(|t| t.error_description)
                .unwrap_or(body);
            return Err(IntegrationError::Auth {
                service: SERVICE,
                detail,
            });
        }

        let token: TokenResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(request_error(SERVICE))?;

        match (token.access_token, token.instance_url) {
            (Some(access_token), Some(instance_url)) => {
                info!(%instance_url, "Authenticated with CRM");
                Ok(CrmSession {
                    access_token,
                    instance_url,
                })
            }
            _ => Err(IntegrationError::malformed(
                SERVICE,
                "token response without access_token or instance_url",
            )),
        }
    }

    async fn create(
        &self,
        session: &CrmSession,
        object_type: &str,
        fields: &serde_json::Value,
    ) -> IntegrationResult<CreateResult> {
        let url = format!(
            "{}/services/data/{}/sobjects/{}/",
            session.instance_url.trim_end_matches('/'),
            self.config.api_version,
            object_type
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.access_token)
            .json(fields)
            .send()
            .await
            .map_err(request_error(SERVICE))?;

        ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(request_error(SERVICE))
    }
}
