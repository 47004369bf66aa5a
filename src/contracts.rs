use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives_v1p2p0::Address;
use serde_json::Value;

use crate::abi::Abi;
use crate::provider::{CallRequest, ChainProvider};
use crate::{AgentError, AgentResult};

/// Live handle on a deployed contract, valid for one session.
///
/// Proxies are only lent out by the handler, never copied out of it:
///
/// ```compile_fail
/// fn keep(proxy: &giza_agent::contracts::ContractProxy) -> giza_agent::contracts::ContractProxy {
///     proxy.clone()
/// }
/// ```
pub struct ContractProxy {
    name: String,
    address: Address,
    abi: Option<Arc<Abi>>,
    provider: Arc<dyn ChainProvider>,
}

impl std::fmt::Debug for ContractProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractProxy")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("has_abi", &self.abi.is_some())
            .finish()
    }
}

impl ContractProxy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> AgentResult<&Arc<Abi>> {
        self.abi
            .as_ref()
            .ok_or_else(|| AgentError::MissingAbi(self.name.clone()))
    }

    /// Read-only call through `eth_call`, decoded with the contract's ABI.
    pub async fn call(&self, method: &str, args: &[Value]) -> AgentResult<Vec<DynSolValue>> {
        let abi = self.abi()?;
        let data = abi.encode_call(method, args)?;
        tracing::debug!("Calling {}.{} at {}", self.name, method, self.address);
        let output = self
            .provider
            .call(&CallRequest {
                from: None,
                to: self.address,
                data,
                value: None,
            })
            .await?;
        abi.decode_output(method, args.len(), &output)
    }
}

/// Named contracts an agent talks to.
///
/// Addresses are fixed at construction. Proxies only exist between
/// [`handle`](Self::handle) and [`release`](Self::release).
pub struct ContractHandler {
    contracts: BTreeMap<String, Address>,
    abis: HashMap<String, Arc<Abi>>,
    instances: HashMap<String, ContractProxy>,
}

impl std::fmt::Debug for ContractHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandler")
            .field("contracts", &self.contracts)
            .field("live", &!self.instances.is_empty())
            .finish()
    }
}

impl ContractHandler {
    pub fn new(contracts: &BTreeMap<String, String>) -> AgentResult<Self> {
        let contracts = contracts
            .iter()
            .map(|(name, address)| {
                let parsed = address.parse::<Address>().map_err(|e| AgentError::InvalidAddress {
                    address: address.clone(),
                    reason: e.to_string(),
                })?;
                Ok((name.clone(), parsed))
            })
            .collect::<AgentResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            contracts,
            abis: HashMap::new(),
            instances: HashMap::new(),
        })
    }

    pub fn with_abi(mut self, name: impl Into<String>, abi: Abi) -> Self {
        self.abis.insert(name.into(), Arc::new(abi));
        self
    }

    pub fn set_abi(&mut self, name: impl Into<String>, abi: Abi) {
        self.abis.insert(name.into(), Arc::new(abi));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    pub fn address(&self, name: &str) -> AgentResult<Address> {
        self.contracts
            .get(name)
            .copied()
            .ok_or_else(|| AgentError::UnknownContract(name.to_string()))
    }

    /// Instantiate every declared contract against `provider`.
    ///
    /// Either every contract is reachable and deployed, or nothing is exposed.
    pub async fn handle(&mut self, provider: Arc<dyn ChainProvider>) -> AgentResult<()> {
        let mut instances = HashMap::with_capacity(self.contracts.len());
        for (name, address) in &self.contracts {
            let code = provider.get_code(*address).await.map_err(|e| {
                AgentError::ContractInitialization {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            if code.is_empty() {
                return Err(AgentError::ContractInitialization {
                    name: name.clone(),
                    reason: format!("no contract deployed at {address}"),
                });
            }
            instances.insert(
                name.clone(),
                ContractProxy {
                    name: name.clone(),
                    address: *address,
                    abi: self.abis.get(name).cloned(),
                    provider: provider.clone(),
                },
            );
        }

        tracing::info!("Initiated {} contract(s)", instances.len());
        self.instances = instances;
        Ok(())
    }

    pub fn get(&self, name: &str) -> AgentResult<&ContractProxy> {
        if !self.contracts.contains_key(name) {
            return Err(AgentError::UnknownContract(name.to_string()));
        }
        self.instances
            .get(name)
            .ok_or_else(|| AgentError::SessionNotOpen(name.to_string()))
    }

    pub fn release(&mut self) {
        if !self.instances.is_empty() {
            tracing::debug!("Releasing {} contract proxies", self.instances.len());
        }
        self.instances.clear();
    }
}
