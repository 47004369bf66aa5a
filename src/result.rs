use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};

use crate::inference::InferenceInput;
use crate::tracker::ProofJobTracker;
use crate::types::{Job, Proof};
use crate::verifier::ProofVerifier;
use crate::{AgentError, AgentResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Unverified,
    Verifying,
    Verified,
    VerifyFailed,
}

/// Evidence gathered by a successful verification. Empty in dry-run mode.
#[derive(Debug, Clone, Default)]
struct Verification {
    job: Option<Job>,
    proof: Option<Proof>,
}

/// Outcome of a verifiable prediction.
///
/// The raw value is only handed out after the proof behind it has been
/// generated and verified. Verification runs on first access, at most once
/// to success; a failed attempt is reported to that caller and the next
/// access starts over.
pub struct ResultHandle {
    input: Option<InferenceInput>,
    request_id: Option<String>,
    value: Value,
    tracker: ProofJobTracker,
    verifier: Arc<ProofVerifier>,
    dry_run: bool,
    state: RwLock<VerificationState>,
    verification: OnceCell<Verification>,
}

impl std::fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle")
            .field("request_id", &self.request_id)
            .field("dry_run", &self.dry_run)
            .field("verified", &self.verified())
            .finish()
    }
}

impl ResultHandle {
    pub fn new(
        input: Option<InferenceInput>,
        value: Value,
        request_id: Option<String>,
        tracker: ProofJobTracker,
        verifier: Arc<ProofVerifier>,
        dry_run: bool,
    ) -> Self {
        Self {
            input,
            request_id,
            value,
            tracker,
            verifier,
            dry_run,
            state: RwLock::new(VerificationState::Unverified),
            verification: OnceCell::new(),
        }
    }

    /// The verified inference value.
    pub async fn value(&self) -> AgentResult<&Value> {
        self.verification
            .get_or_try_init(|| self.run_verification())
            .await?;
        Ok(&self.value)
    }

    /// True once `value` has succeeded at least once.
    pub fn verified(&self) -> bool {
        self.verification.initialized()
    }

    pub async fn state(&self) -> VerificationState {
        *self.state.read().await
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn input(&self) -> Option<&InferenceInput> {
        self.input.as_ref()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn proof(&self) -> Option<&Proof> {
        self.verification.get().and_then(|v| v.proof.as_ref())
    }

    pub fn proof_job(&self) -> Option<&Job> {
        self.verification.get().and_then(|v| v.job.as_ref())
    }

    async fn run_verification(&self) -> AgentResult<Verification> {
        if self.dry_run {
            tracing::warn!("Dry run enabled. Skipping verification of the inference result");
            *self.state.write().await = VerificationState::Verified;
            return Ok(Verification::default());
        }

        *self.state.write().await = VerificationState::Verifying;
        let outcome = self.verify_sequence().await;
        *self.state.write().await = match &outcome {
            Ok(_) => VerificationState::Verified,
            Err(e) => {
                tracing::error!("Verification of the inference result failed: {}", e);
                VerificationState::VerifyFailed
            }
        };
        outcome
    }

    async fn verify_sequence(&self) -> AgentResult<Verification> {
        let request_id = self
            .request_id
            .as_deref()
            .ok_or(AgentError::MissingRequestId)?;

        let job = self.tracker.find_job_with_grace(request_id).await?;
        tracing::info!("Proof job {} found for request {}", job.id, request_id);
        let job = self.tracker.wait_for(&job).await?;

        let proof = self.verifier.fetch_proof(request_id).await?;
        if !self.verifier.verify(&proof).await {
            return Err(AgentError::VerificationFailed {
                proof_id: proof.id,
                request_id: request_id.to_string(),
            });
        }

        Ok(Verification {
            job: Some(job),
            proof: Some(proof),
        })
    }
}
