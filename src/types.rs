use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    #[default]
    Proof,
    Verify,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Proof => "PROOF",
            JobKind::Verify => "VERIFY",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Proof => write!(f, "Proof"),
            JobKind::Verify => write!(f, "Verify"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Size hint for the proving backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum JobSize {
    S,
    #[default]
    M,
    L,
    XL,
}

/// Asynchronous backend job, polled by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: u64,
    #[serde(default)]
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(default)]
    pub size: Option<JobSize>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proof {
    pub id: u64,
    pub job_id: u64,
    #[serde(default)]
    pub created_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub request_id: Option<String>,
    /// Inline proof payload or a storage reference to it.
    #[serde(default)]
    pub payload: Option<String>,
}

impl Proof {
    /// Canonical bytes an account signs to vouch for this proof.
    pub fn signing_payload(&self) -> Vec<u8> {
        // Field order is fixed by the struct definition, so this is stable.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifyResult {
    pub verification: bool,
    #[serde(default)]
    pub verification_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Framework {
    #[default]
    Cairo,
    Ezkl,
}

/// Active serving endpoint for a model version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub id: u64,
    pub uri: String,
    #[serde(default)]
    pub model_id: Option<u64>,
    #[serde(default)]
    pub version_id: Option<u64>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub framework: Framework,
}

/// Agent record stored on the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentInfo {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl AgentInfo {
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    pub fn parameter_u64(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(|v| v.as_u64())
    }
}
