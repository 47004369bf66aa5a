use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Framework, JobSize};
use crate::{AgentError, AgentResult};

/// Input handed to the serving endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceInput {
    /// JSON file holding the input tensors.
    File(PathBuf),
    /// Named tensors, already in memory.
    Feed(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model_id: u64,
    pub version_id: u64,
    pub input: Option<InferenceInput>,
    pub verifiable: bool,
    pub job_size: JobSize,
    pub dry_run: bool,
}

impl InferenceRequest {
    pub fn new(model_id: u64, version_id: u64) -> Self {
        Self {
            model_id,
            version_id,
            input: None,
            verifiable: false,
            job_size: JobSize::default(),
            dry_run: false,
        }
    }

    pub fn with_input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(InferenceInput::File(path.into()));
        self
    }

    pub fn with_input_feed(mut self, feed: Map<String, Value>) -> Self {
        self.input = Some(InferenceInput::Feed(feed));
        self
    }

    pub fn verifiable(mut self, verifiable: bool) -> Self {
        self.verifiable = verifiable;
        self
    }

    pub fn job_size(mut self, job_size: JobSize) -> Self {
        self.job_size = job_size;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The input as JSON, read from disk for file inputs.
    pub async fn payload(&self) -> AgentResult<Value> {
        match &self.input {
            Some(InferenceInput::Feed(feed)) => Ok(Value::Object(feed.clone())),
            Some(InferenceInput::File(path)) => {
                let raw = tokio::fs::read_to_string(path).await?;
                Ok(serde_json::from_str(&raw)?)
            }
            None => Err(AgentError::MissingInput),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceResponse {
    pub result: Value,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Model-serving endpoint.
#[async_trait]
pub trait InferenceApi: Send + Sync {
    /// Run one prediction. Never retried here.
    async fn predict(&self, request: &InferenceRequest) -> AgentResult<InferenceResponse>;
}

#[derive(Debug, Serialize)]
struct PredictBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    input_data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<String>,
    job_size: JobSize,
    dry_run: bool,
}

/// HTTP client for a deployed endpoint.
#[derive(Clone, Debug)]
pub struct InferenceClient {
    client: Client,
    endpoint_uri: Url,
    framework: Framework,
}

impl InferenceClient {
    pub fn new(endpoint_uri: &str, framework: Framework) -> AgentResult<Self> {
        let endpoint_uri = Url::parse(endpoint_uri).map_err(|e| {
            AgentError::Configuration(format!("Invalid endpoint uri {endpoint_uri}: {e}"))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AgentError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            endpoint_uri,
            framework,
        })
    }

    pub fn framework(&self) -> Framework {
        self.framework
    }

    fn route(&self) -> String {
        let base = self.endpoint_uri.as_str().trim_end_matches('/');
        match self.framework {
            Framework::Cairo => format!("{base}/cairo_run"),
            Framework::Ezkl => format!("{base}/predict"),
        }
    }
}

#[async_trait]
impl InferenceApi for InferenceClient {
    async fn predict(&self, request: &InferenceRequest) -> AgentResult<InferenceResponse> {
        let payload = request.payload().await?;
        let body = match self.framework {
            Framework::Cairo => PredictBody {
                input_data: None,
                args: Some(payload.to_string()),
                job_size: request.job_size,
                dry_run: request.dry_run,
            },
            Framework::Ezkl => PredictBody {
                input_data: Some(&payload),
                args: None,
                job_size: request.job_size,
                dry_run: request.dry_run,
            },
        };

        let url = self.route();
        tracing::info!(
            "Requesting {} inference for model {} version {} at {}",
            if request.verifiable { "verifiable" } else { "plain" },
            request.model_id,
            request.version_id,
            url
        );
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Inference failed with status {}: {}", status, body);
            return Err(AgentError::InferenceService {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: InferenceResponse = response.json().await?;
        if request.verifiable && parsed.request_id.is_none() {
            return Err(AgentError::MissingRequestId);
        }
        if let Some(request_id) = &parsed.request_id {
            tracing::info!("Inference done, request id {}", request_id);
        }
        Ok(parsed)
    }
}
