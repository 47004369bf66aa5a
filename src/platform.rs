use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::config::AgentConfig;
use crate::types::{AgentInfo, Endpoint, Job, JobKind, Proof, VerifyResult};
use crate::{AgentError, AgentResult};

/// Job lookup and status polling.
#[async_trait]
pub trait JobsApi: Send + Sync {
    /// Jobs registered for an endpoint, narrowed to `request_id` when the
    /// backend supports it.
    async fn list_jobs(&self, endpoint_id: u64, request_id: &str) -> AgentResult<Vec<Job>>;

    /// Authoritative current state of a job.
    async fn get_job(&self, job_id: u64, kind: JobKind) -> AgentResult<Job>;
}

/// Proof retrieval and verification.
#[async_trait]
pub trait ProofsApi: Send + Sync {
    async fn get_proof(&self, endpoint_id: u64, request_id: &str) -> AgentResult<Proof>;

    async fn verify_proof(&self, endpoint_id: u64, proof_id: u64) -> AgentResult<VerifyResult>;
}

/// Agent records and serving endpoints.
#[async_trait]
pub trait AgentsApi: Send + Sync {
    async fn get_agent(&self, agent_id: u64, with_account_data: bool) -> AgentResult<AgentInfo>;

    async fn list_agents(
        &self,
        model_id: u64,
        version_id: u64,
        endpoint_id: u64,
    ) -> AgentResult<Vec<AgentInfo>>;

    async fn update_agent(
        &self,
        agent_id: u64,
        parameters: Map<String, Value>,
    ) -> AgentResult<AgentInfo>;

    async fn list_endpoints(&self, model_id: u64, version_id: u64) -> AgentResult<Vec<Endpoint>>;
}

/// HTTP client for the platform REST API.
#[derive(Clone, Debug)]
pub struct PlatformClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &AgentConfig) -> AgentResult<Self> {
        Self::new(config.api_base(), config.api_key.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AgentResult<T> {
        let response = self.authorized(builder).send().await?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> AgentResult<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::Platform {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl JobsApi for PlatformClient {
    async fn list_jobs(&self, endpoint_id: u64, request_id: &str) -> AgentResult<Vec<Job>> {
        let builder = self
            .client
            .get(self.url(&format!("endpoints/{endpoint_id}/jobs")))
            .query(&[("request_id", request_id)]);
        self.send(builder).await
    }

    async fn get_job(&self, job_id: u64, kind: JobKind) -> AgentResult<Job> {
        let builder = self
            .client
            .get(self.url(&format!("jobs/{job_id}")))
            .query(&[("kind", kind.as_str())]);
        self.send(builder).await
    }
}

#[async_trait]
impl ProofsApi for PlatformClient {
    async fn get_proof(&self, endpoint_id: u64, request_id: &str) -> AgentResult<Proof> {
        let builder = self
            .client
            .get(self.url(&format!("endpoints/{endpoint_id}/proofs/{request_id}")));
        self.send(builder).await
    }

    async fn verify_proof(&self, endpoint_id: u64, proof_id: u64) -> AgentResult<VerifyResult> {
        let builder = self
            .client
            .post(self.url(&format!("endpoints/{endpoint_id}/proofs/{proof_id}/verify")));
        self.send(builder).await
    }
}

#[async_trait]
impl AgentsApi for PlatformClient {
    async fn get_agent(&self, agent_id: u64, with_account_data: bool) -> AgentResult<AgentInfo> {
        let mut builder = self.client.get(self.url(&format!("agents/{agent_id}")));
        if with_account_data {
            builder = builder.query(&[("account_data", "true")]);
        }
        match self.send(builder).await {
            Err(AgentError::Platform { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(AgentError::AgentNotFound(format!("Agent with id {agent_id} not found")))
            }
            other => other,
        }
    }

    async fn list_agents(
        &self,
        model_id: u64,
        version_id: u64,
        endpoint_id: u64,
    ) -> AgentResult<Vec<AgentInfo>> {
        let builder = self.client.get(self.url("agents")).query(&[
            ("q", format!("model_id=={model_id}")),
            ("q", format!("version_id=={version_id}")),
            ("q", format!("endpoint_id=={endpoint_id}")),
        ]);
        self.send(builder).await
    }

    async fn update_agent(
        &self,
        agent_id: u64,
        parameters: Map<String, Value>,
    ) -> AgentResult<AgentInfo> {
        let builder = self
            .client
            .patch(self.url(&format!("agents/{agent_id}")))
            .json(&json!({ "parameters": parameters }));
        self.send(builder).await
    }

    async fn list_endpoints(&self, model_id: u64, version_id: u64) -> AgentResult<Vec<Endpoint>> {
        let builder = self.client.get(self.url("endpoints")).query(&[
            ("model_id", model_id.to_string()),
            ("version_id", version_id.to_string()),
            ("is_active", "true".to_string()),
        ]);
        self.send(builder).await
    }
}

/// The single active endpoint serving a model version.
pub async fn resolve_endpoint(
    agents: &dyn AgentsApi,
    model_id: u64,
    version_id: u64,
) -> AgentResult<Endpoint> {
    let endpoints = agents.list_endpoints(model_id, version_id).await?;
    let mut active = endpoints.into_iter().filter(|e| e.is_active);
    match (active.next(), active.next()) {
        (Some(endpoint), None) => Ok(endpoint),
        (None, _) => Err(AgentError::Configuration(format!(
            "No active endpoint for model {model_id} version {version_id}"
        ))),
        (Some(_), Some(_)) => Err(AgentError::Configuration(format!(
            "More than one active endpoint for model {model_id} version {version_id}"
        ))),
    }
}
