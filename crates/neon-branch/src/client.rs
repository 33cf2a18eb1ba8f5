//! Neon HTTP API client
//!
//! Implements [`BranchProvider`] against the Neon v2 REST API. Each trait
//! call maps to exactly one request; failures are returned as-is.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::NeonError;
use crate::{BranchProvider, EndpointType, Result};

/// Default Neon API base URL
pub const DEFAULT_API_URL: &str = "https://console.neon.tech/api/v2";

/// Neon API configuration
#[derive(Debug, Clone)]
pub struct NeonConfig {
    /// API base URL
    pub api_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Project that owns every tenant branch
    pub project_id: String,
}

impl NeonConfig {
    /// Create config for a project on the public Neon API
    pub fn new(api_key: &str, project_id: &str) -> Self {
        NeonConfig {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.to_string(),
            project_id: project_id.to_string(),
        }
    }

    /// Point the client at a different API base URL
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn project_url(&self, suffix: &str) -> String {
        format!("{}/projects/{}/{}", self.api_url, self.project_id, suffix)
    }
}

#[derive(Debug, Serialize)]
struct CreateBranchRequest<'a> {
    branch: BranchSpec<'a>,
}

#[derive(Debug, Serialize)]
struct BranchSpec<'a> {
    parent_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    branch: BranchBody,
}

#[derive(Debug, Deserialize)]
struct BranchBody {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateEndpointRequest<'a> {
    endpoint: EndpointSpec<'a>,
}

#[derive(Debug, Serialize)]
struct EndpointSpec<'a> {
    branch_id: &'a str,
    #[serde(rename = "type")]
    kind: EndpointType,
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    endpoint: EndpointBody,
}

#[derive(Debug, Deserialize)]
struct EndpointBody {
    host: String,
}

/// Neon client for branch and endpoint operations
pub struct NeonClient {
    config: NeonConfig,
    http_client: reqwest::Client,
}

impl NeonClient {
    /// Create a new Neon client
    pub fn new(config: NeonConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(NeonError::Config("API key is empty".to_string()));
        }
        if config.project_id.is_empty() {
            return Err(NeonError::Config("project id is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("neon-bulk-migrator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NeonError::Config(e.to_string()))?;

        Ok(NeonClient {
            config,
            http_client,
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.config.api_key)
    }

    async fn check(operation: &'static str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NeonError::Api {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        operation: &'static str,
        response: Response,
    ) -> Result<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| NeonError::UnexpectedResponse {
            operation,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl BranchProvider for NeonClient {
    #[instrument(skip(self))]
    async fn create_branch(&self, parent_branch_id: &str) -> Result<String> {
        let url = self.config.project_url("branches");
        let body = CreateBranchRequest {
            branch: BranchSpec {
                parent_id: parent_branch_id,
            },
        };

        let response = self
            .authed(self.http_client.post(&url))
            .json(&body)
            .send()
            .await?;
        let response = Self::check("create_branch", response).await?;
        let created: BranchResponse = Self::decode("create_branch", response).await?;

        info!(branch = %created.branch.id, "created branch");
        Ok(created.branch.id)
    }

    #[instrument(skip(self))]
    async fn create_endpoint(&self, branch_id: &str, kind: EndpointType) -> Result<String> {
        let url = self.config.project_url("endpoints");
        let body = CreateEndpointRequest {
            endpoint: EndpointSpec { branch_id, kind },
        };

        let response = self
            .authed(self.http_client.post(&url))
            .json(&body)
            .send()
            .await?;
        let response = Self::check("create_endpoint", response).await?;
        let created: EndpointResponse = Self::decode("create_endpoint", response).await?;

        debug!(host = %created.endpoint.host, "created endpoint");
        Ok(created.endpoint.host)
    }

    #[instrument(skip(self))]
    async fn delete_branch(&self, branch_id: &str) -> Result<()> {
        let url = self.config.project_url(&format!("branches/{}", branch_id));

        let response = self
            .authed(self.http_client.delete(&url))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NeonError::BranchNotFound(branch_id.to_string()));
        }
        Self::check("delete_branch", response).await?;

        info!("deleted branch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neon_config_new() {
        let config = NeonConfig::new("key", "proj-123");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.project_id, "proj-123");
    }

    #[test]
    fn test_neon_config_with_api_url_trims_slash() {
        let config = NeonConfig::new("key", "proj").with_api_url("http://localhost:8080/api/v2/");
        assert_eq!(
            config.project_url("branches"),
            "http://localhost:8080/api/v2/projects/proj/branches"
        );
    }

    #[test]
    fn test_client_rejects_empty_credentials() {
        assert!(matches!(
            NeonClient::new(NeonConfig::new("", "proj")),
            Err(NeonError::Config(_))
        ));
        assert!(matches!(
            NeonClient::new(NeonConfig::new("key", "")),
            Err(NeonError::Config(_))
        ));
    }

    #[test]
    fn test_create_branch_request_shape() {
        let body = CreateBranchRequest {
            branch: BranchSpec { parent_id: "br-main" },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"branch": {"parent_id": "br-main"}})
        );
    }

    #[test]
    fn test_create_endpoint_request_shape() {
        let body = CreateEndpointRequest {
            endpoint: EndpointSpec {
                branch_id: "br-new",
                kind: EndpointType::ReadWrite,
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"endpoint": {"branch_id": "br-new", "type": "read_write"}})
        );
    }

    #[test]
    fn test_responses_ignore_extra_fields() {
        let branch: BranchResponse = serde_json::from_str(
            r#"{"branch": {"id": "br-cool-sun-123", "parent_id": "br-main"}, "operations": []}"#,
        )
        .unwrap();
        assert_eq!(branch.branch.id, "br-cool-sun-123");

        let endpoint: EndpointResponse = serde_json::from_str(
            r#"{"endpoint": {"id": "ep-1", "host": "ep-1.us-east-2.aws.neon.tech"}, "operations": []}"#,
        )
        .unwrap();
        assert_eq!(endpoint.endpoint.host, "ep-1.us-east-2.aws.neon.tech");
    }

    #[tokio::test]
    async fn test_unreachable_api_fails_gracefully() {
        let config = NeonConfig::new("key", "proj").with_api_url("http://127.0.0.1:9");
        let client = NeonClient::new(config).unwrap();

        let err = client.create_branch("br-main").await.unwrap_err();
        assert!(matches!(err, NeonError::Http(_)));
    }
}
