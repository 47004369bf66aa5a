use std::sync::Arc;

use alloy_primitives_v1p2p0::{Address, Signature, U256};
use alloy_signer::SignerSync;
use alloy_signer_local_v1p0p12::PrivateKeySigner;
use serde_json::Value;

use crate::abi::Abi;
use crate::config::TransmitConfig;
use crate::provider::{CallRequest, ChainProvider, ProviderError, TransactionReceipt};
use crate::types::Proof;
use crate::verifier::ProofVerifier;
use crate::{AgentError, AgentResult};

/// A proof vouched for by an account: an EIP-191 signature over the proof's
/// canonical JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedProof {
    pub proof: Proof,
    pub signature: Signature,
}

impl SignedProof {
    pub fn sign(proof: Proof, signer: &PrivateKeySigner) -> AgentResult<Self> {
        let signature = signer
            .sign_message_sync(&proof.signing_payload())
            .map_err(|e| AgentError::InvalidSignature(e.to_string()))?;
        Ok(Self { proof, signature })
    }

    /// Address that produced the signature.
    pub fn signer(&self) -> AgentResult<Address> {
        self.signature
            .recover_address_from_msg(self.proof.signing_payload())
            .map_err(|e| AgentError::InvalidSignature(e.to_string()))
    }
}

/// Builds, signs and submits contract calls backed by a verified proof.
pub struct TransactionSubmitter {
    provider: Arc<dyn ChainProvider>,
    verifier: Arc<ProofVerifier>,
    config: TransmitConfig,
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("config", &self.config)
            .finish()
    }
}

impl TransactionSubmitter {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        verifier: Arc<ProofVerifier>,
        config: TransmitConfig,
    ) -> Self {
        Self {
            provider,
            verifier,
            config,
        }
    }

    pub fn provider(&self) -> &Arc<dyn ChainProvider> {
        &self.provider
    }

    /// Call `function_name` on `contract_address` as `account`.
    ///
    /// Unless `unsafe_mode` is set, the proof must be signed by `account` and
    /// accepted by the verifier before anything reaches the chain. Node-level
    /// failures (reverted estimation, rejected transaction, no receipt in
    /// time) are logged and reported as `Ok(None)`. A single attempt is made.
    #[allow(clippy::too_many_arguments)]
    pub async fn transmit(
        &self,
        account: &PrivateKeySigner,
        contract_address: Address,
        abi: &Abi,
        function_name: &str,
        params: &[Value],
        value: U256,
        evidence: &SignedProof,
    ) -> AgentResult<Option<TransactionReceipt>> {
        let from = account.address();

        if self.config.unsafe_mode {
            tracing::warn!("Unsafe mode enabled, transmitting without checking the proof");
        } else {
            let signer = evidence.signer()?;
            if signer != from {
                tracing::error!("Proof signed by {} but transmitting as {}", signer, from);
                return Err(AgentError::SignerMismatch {
                    recovered: signer.to_string(),
                    expected: from.to_string(),
                });
            }
            if !self.verifier.verify(&evidence.proof).await {
                return Err(AgentError::VerificationFailed {
                    proof_id: evidence.proof.id,
                    request_id: evidence.proof.request_id.clone().unwrap_or_default(),
                });
            }
        }

        let calldata = abi.encode_call(function_name, params)?;
        let call = CallRequest {
            from: Some(from),
            to: contract_address,
            data: calldata,
            value: Some(value),
        };

        let gas_limit = match self.config.gas_limit {
            Some(limit) => limit,
            None => match self.provider.estimate_gas(&call).await {
                Ok(gas) => gas,
                Err(ProviderError::Rpc { message, .. }) => {
                    tracing::error!(
                        "Gas estimation for {} failed, the call would revert: {}",
                        function_name,
                        message
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            },
        };

        let hash = match self.provider.send_transaction(account, &call, gas_limit).await {
            Ok(hash) => hash,
            Err(ProviderError::Rpc { message, .. }) => {
                tracing::error!("Transaction for {} rejected: {}", function_name, message);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!("Transaction {} sent, waiting for receipt", hash);

        match self
            .provider
            .get_receipt(hash, self.config.receipt_timeout())
            .await?
        {
            Some(receipt) => {
                if receipt.succeeded() {
                    tracing::info!(
                        "Transaction {} confirmed in block {:?}",
                        hash,
                        receipt.block_number
                    );
                } else {
                    tracing::warn!("Transaction {} reverted", hash);
                }
                Ok(Some(receipt))
            }
            None => {
                tracing::error!(
                    "No receipt for transaction {} after {:?}",
                    hash,
                    self.config.receipt_timeout()
                );
                Ok(None)
            }
        }
    }
}
