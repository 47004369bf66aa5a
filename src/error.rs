use crate::provider::ProviderError;

// More specific error types
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Inference service error (status {status}): {body}")]
    InferenceService { status: u16, body: String },
    #[error("Either an input file or an input feed must be provided")]
    MissingInput,
    #[error("Verifiable inference returned no request id")]
    MissingRequestId,
    #[error("Platform API error (status {status}): {message}")]
    Platform { status: u16, message: String },
    #[error("Proof job for request ID {0} not found")]
    JobNotFound(String),
    #[error("{kind} job {job_id} failed")]
    JobFailed { kind: String, job_id: u64 },
    #[error("{kind} job {job_id} timed out after {elapsed_secs:.1}s")]
    JobTimeout {
        kind: String,
        job_id: u64,
        elapsed_secs: f64,
    },
    #[error("Transient polling error: {0}")]
    PollingError(String),
    #[error("Retry error: {0}")]
    RetryError(String),
    #[error("Proof {proof_id} for request {request_id} could not be verified")]
    VerificationFailed { proof_id: u64, request_id: String },
    #[error("Result has no proof to transmit")]
    MissingProof,
    #[error("Proof was signed by {recovered}, expected {expected}")]
    SignerMismatch { recovered: String, expected: String },
    #[error("Invalid proof signature: {0}")]
    InvalidSignature(String),
    #[error("Function {0} not found in ABI")]
    FunctionNotFound(String),
    #[error("Failed to parse ABI: {0}")]
    AbiParse(String),
    #[error("Failed to encode arguments for {function}: {reason}")]
    Encoding { function: String, reason: String },
    #[error("Failed to decode output of {function}: {reason}")]
    Decoding { function: String, reason: String },
    #[error("Unknown contract: {0}")]
    UnknownContract(String),
    #[error("Contract {0} is not available outside of an open session")]
    SessionNotOpen(String),
    #[error("No ABI registered for contract {0}")]
    MissingAbi(String),
    #[error("Failed to initiate contract {name}: {reason}. Make sure this is executed inside `Agent::execute()`")]
    ContractInitialization { name: String, reason: String },
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Passphrase for account {0} not found in secret store")]
    MissingPassphrase(String),
    #[error("Account error: {0}")]
    Account(String),
    #[error("Agent not found: {0}")]
    AgentNotFound(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("HTTP transport error: {0}")]
    Http(String),
    #[error("HTTP request timed out")]
    HttpTimeout,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    /// Errors worth retrying with backoff: lookups racing job registration and
    /// network hiccups against the platform.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::JobNotFound(_)
            | AgentError::PollingError(_)
            | AgentError::Http(_)
            | AgentError::HttpTimeout => true,
            AgentError::Platform { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentError::HttpTimeout
        } else if err.is_decode() {
            AgentError::Serialization(err.to_string())
        } else {
            AgentError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}
