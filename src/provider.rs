use std::time::Duration;

use alloy_network::{EthereumWallet, ReceiptResponse as _, TransactionBuilder};
use alloy_primitives_v1p2p0::{Address, B256, Bytes, U256};
use alloy_provider::{
    PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder, RootProvider,
    WatchTxError,
};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local_v1p0p12::PrivateKeySigner;
use alloy_transport::{RpcError, TransportError};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The node answered with a JSON-RPC error: reverts, bad nonces,
    /// insufficient funds and similar node-level value errors.
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Failed to decode RPC response: {0}")]
    Decode(String),
}

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => ProviderError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
                data: payload
                    .data
                    .as_ref()
                    .and_then(|raw| serde_json::from_str(raw.get()).ok()),
            },
            RpcError::DeserError { err, .. } => ProviderError::Decode(err.to_string()),
            RpcError::Transport(kind) => ProviderError::Transport(kind.to_string()),
            other => ProviderError::Transport(other.to_string()),
        }
    }
}

/// Message call used for `eth_call`, `eth_estimateGas` and transactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: Option<U256>,
}

impl CallRequest {
    pub fn to_request(&self) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .with_to(self.to)
            .with_input(self.data.clone());
        if let Some(from) = self.from {
            request = request.with_from(from);
        }
        if let Some(value) = self.value {
            request = request.with_value(value);
        }
        request
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub status: bool,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status
    }
}

impl From<alloy_rpc_types_eth::TransactionReceipt> for TransactionReceipt {
    fn from(receipt: alloy_rpc_types_eth::TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            status: receipt.status(),
            gas_used: receipt.gas_used,
            contract_address: receipt.contract_address,
        }
    }
}

/// The blockchain node capabilities the agent relies on.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ProviderError>;
    async fn get_code(&self, address: Address) -> Result<Bytes, ProviderError>;
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ProviderError>;
    async fn call(&self, call: &CallRequest) -> Result<Bytes, ProviderError>;
    /// Sign `call` as `signer` and broadcast it. Nonce, fees and chain id are
    /// filled in by the node client.
    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        call: &CallRequest,
        gas_limit: u64,
    ) -> Result<B256, ProviderError>;
    /// Wait for `hash` to be mined. `None` when no receipt showed up within
    /// `timeout`.
    async fn get_receipt(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, ProviderError>;
}

/// Node client over HTTP backed by an alloy provider.
#[derive(Debug, Clone)]
pub struct RpcProvider {
    url: Url,
    provider: RootProvider,
}

impl RpcProvider {
    pub fn new(rpc_url: &str) -> Result<Self, ProviderError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| ProviderError::Transport(format!("Invalid rpc_url: {e}")))?;
        let provider = RootProvider::new_http(url.clone());
        Ok(Self { url, provider })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ChainProvider for RpcProvider {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ProviderError> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ProviderError> {
        Ok(self.provider.estimate_gas(call.to_request()).await?)
    }

    async fn call(&self, call: &CallRequest) -> Result<Bytes, ProviderError> {
        Ok(self.provider.call(call.to_request()).await?)
    }

    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        call: &CallRequest,
        gas_limit: u64,
    ) -> Result<B256, ProviderError> {
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.url.clone());
        let request = call
            .to_request()
            .with_from(signer.address())
            .with_gas_limit(gas_limit);
        let pending = provider.send_transaction(request).await?;
        Ok(*pending.tx_hash())
    }

    async fn get_receipt(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        let pending = PendingTransactionBuilder::new(self.provider.clone(), hash)
            .with_timeout(Some(timeout));
        match pending.get_receipt().await {
            Ok(receipt) => Ok(Some(receipt.into())),
            Err(PendingTransactionError::TxWatcher(WatchTxError::Timeout)) => Ok(None),
            Err(PendingTransactionError::TransportError(e)) => Err(e.into()),
            Err(e) => Err(ProviderError::Transport(e.to_string())),
        }
    }
}
