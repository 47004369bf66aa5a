use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::platform::ProofsApi;
use crate::types::Proof;
use crate::AgentResult;

/// Fetches proofs and asks the platform to check them against the deployed
/// model version. Answers are remembered per proof id.
pub struct ProofVerifier {
    proofs: Arc<dyn ProofsApi>,
    endpoint_id: u64,
    outcomes: RwLock<HashMap<u64, bool>>,
}

impl std::fmt::Debug for ProofVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofVerifier")
            .field("endpoint_id", &self.endpoint_id)
            .finish()
    }
}

impl ProofVerifier {
    pub fn new(proofs: Arc<dyn ProofsApi>, endpoint_id: u64) -> Self {
        Self {
            proofs,
            endpoint_id,
            outcomes: RwLock::new(HashMap::new()),
        }
    }

    pub fn endpoint_id(&self) -> u64 {
        self.endpoint_id
    }

    pub async fn fetch_proof(&self, request_id: &str) -> AgentResult<Proof> {
        let proof = self.proofs.get_proof(self.endpoint_id, request_id).await?;
        tracing::info!("Fetched proof {} for request {}", proof.id, request_id);
        Ok(proof)
    }

    /// Whether the platform accepts `proof`.
    ///
    /// Backend failures count as "not verified" and are not remembered, so a
    /// later call asks again.
    pub async fn verify(&self, proof: &Proof) -> bool {
        if let Some(outcome) = self.outcomes.read().await.get(&proof.id) {
            return *outcome;
        }

        match self.proofs.verify_proof(self.endpoint_id, proof.id).await {
            Ok(result) => {
                if result.verification {
                    tracing::info!(
                        "Proof {} verified in {:.2}s",
                        proof.id,
                        result.verification_time.unwrap_or_default()
                    );
                } else {
                    tracing::warn!("Proof {} was rejected by the verifier", proof.id);
                }
                self.outcomes
                    .write()
                    .await
                    .insert(proof.id, result.verification);
                result.verification
            }
            Err(e) => {
                tracing::error!("Failed to verify proof {}: {}", proof.id, e);
                false
            }
        }
    }

    /// Cached answer for `proof_id`, if the backend already gave one.
    pub async fn outcome(&self, proof_id: u64) -> Option<bool> {
        self.outcomes.read().await.get(&proof_id).copied()
    }
}
