//! Typed client for the share-service HTTP surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access level of the visited resource, as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Open,
    TokenRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Project,
    File,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Project => "project",
            ResourceType::File => "file",
        }
    }
}

/// The resource a page load wants to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub project_id: String,
    pub resource_type: ResourceType,
    /// None means the project itself.
    pub resource_id: Option<String>,
}

impl ResourceRequest {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            resource_type: ResourceType::Project,
            resource_id: None,
        }
    }

    pub fn file(project_id: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            resource_type: ResourceType::File,
            resource_id: Some(file_id.into()),
        }
    }
}

/// Resolution facts the guard's transition rules run on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAccess {
    pub access_level: AccessLevel,
    pub token_valid: bool,
    pub device_bound: bool,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },
}

/// Backend operations the guard depends on. Injected so tests can script
/// responses and failures.
#[async_trait]
pub trait ShareApi: Send + Sync {
    /// Resolve a visit into access facts.
    async fn resolve(
        &self,
        resource: &ResourceRequest,
        token: Option<&str>,
        device_id: &str,
    ) -> Result<ResolvedAccess, ApiError>;

    /// Ask the service to issue a fresh access code for the invitation
    /// behind `token` and email it to the invited address.
    async fn send_code(&self, token: &str) -> Result<(), ApiError>;

    /// Verify an entered code; returns the invitation's token as the durable
    /// credential for the rest of the session.
    async fn verify_code(
        &self,
        project_id: &str,
        email: &str,
        code: &str,
        device_id: &str,
    ) -> Result<String, ApiError>;
}

/// HTTP implementation against a running share-service.
#[derive(Clone)]
pub struct HttpShareApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpShareApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn error_for(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();

        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => "request failed".to_string(),
        };
        ApiError::Api { status, message }
    }
}

#[async_trait]
impl ShareApi for HttpShareApi {
    async fn resolve(
        &self,
        resource: &ResourceRequest,
        token: Option<&str>,
        device_id: &str,
    ) -> Result<ResolvedAccess, ApiError> {
        let mut query: Vec<(&str, String)> = vec![
            ("project_id", resource.project_id.clone()),
            ("resource_type", resource.resource_type.as_str().to_string()),
            ("device_id", device_id.to_string()),
        ];
        if let Some(resource_id) = &resource.resource_id {
            query.push(("resource_id", resource_id.clone()));
        }
        if let Some(token) = token {
            query.push(("token", token.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/access/resolve", self.base_url))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        Ok(response.json().await?)
    }

    async fn send_code(&self, token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/access-codes/send", self.base_url))
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        Ok(())
    }

    async fn verify_code(
        &self,
        project_id: &str,
        email: &str,
        code: &str,
        device_id: &str,
    ) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct VerifyResponse {
            token: String,
        }

        let response = self
            .client
            .post(format!("{}/access-codes/verify", self.base_url))
            .json(&serde_json::json!({
                "project_id": project_id,
                "email": email,
                "code": code,
                "device_id": device_id,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        let body: VerifyResponse = response.json().await?;
        Ok(body.token)
    }
}
