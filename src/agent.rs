use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives_v1p2p0::{Address, U256};
use alloy_signer_local_v1p0p12::PrivateKeySigner;
use serde_json::{Map, Value};

use crate::abi::Abi;
use crate::config::AgentConfig;
use crate::contracts::{ContractHandler, ContractProxy};
use crate::inference::{InferenceApi, InferenceClient, InferenceRequest};
use crate::platform::{AgentsApi, JobsApi, PlatformClient, ProofsApi, resolve_endpoint};
use crate::provider::{ChainProvider, RpcProvider, TransactionReceipt};
use crate::result::ResultHandle;
use crate::retry::retry_or_give_up;
use crate::secrets::{
    SecretStore, ensure_keystore, keystore_path, load_account, passphrase_var, require_passphrase,
};
use crate::tracker::ProofJobTracker;
use crate::transmit::{SignedProof, TransactionSubmitter};
use crate::types::AgentInfo;
use crate::verifier::ProofVerifier;
use crate::{AgentError, AgentResult};

const AGENT_LOOKUP_ATTEMPTS: u32 = 3;

/// Backends an [`Agent`] is composed of.
#[derive(Clone)]
pub struct AgentServices {
    pub inference: Arc<dyn InferenceApi>,
    pub jobs: Arc<dyn JobsApi>,
    pub proofs: Arc<dyn ProofsApi>,
    pub agents: Arc<dyn AgentsApi>,
    pub provider: Arc<dyn ChainProvider>,
    pub secrets: Arc<dyn SecretStore>,
}

/// What a prediction produced.
#[derive(Debug)]
pub enum Prediction {
    /// Plain inference, nothing to verify.
    Unverified(Value),
    Verifiable(ResultHandle),
}

impl Prediction {
    pub fn into_handle(self) -> Option<ResultHandle> {
        match self {
            Prediction::Verifiable(handle) => Some(handle),
            Prediction::Unverified(_) => None,
        }
    }
}

/// Runs verifiable inference for one deployed model version and acts on the
/// results through its contracts.
pub struct Agent {
    config: AgentConfig,
    info: AgentInfo,
    model_id: u64,
    version_id: u64,
    endpoint_id: u64,
    chain: String,
    account: String,
    inference: Arc<dyn InferenceApi>,
    agents: Arc<dyn AgentsApi>,
    provider: Arc<dyn ChainProvider>,
    secrets: Arc<dyn SecretStore>,
    tracker: ProofJobTracker,
    verifier: Arc<ProofVerifier>,
    contracts: ContractHandler,
    submitter: TransactionSubmitter,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.info.id)
            .field("model_id", &self.model_id)
            .field("version_id", &self.version_id)
            .field("endpoint_id", &self.endpoint_id)
            .field("chain", &self.chain)
            .field("account", &self.account)
            .field("contracts", &self.contracts)
            .finish()
    }
}

fn required<T>(value: Option<T>, name: &str) -> AgentResult<T> {
    value.ok_or_else(|| AgentError::Configuration(format!("{name} is required")))
}

fn missing_parameter(name: &str) -> AgentError {
    tracing::error!("Agent is missing required parameters");
    AgentError::Configuration(format!("Agent is missing required parameters: {name}"))
}

/// Fill contracts, chain and account the caller left out from the agent record.
fn fill_from_record(config: &mut AgentConfig, info: &AgentInfo) -> AgentResult<()> {
    if config.contracts.is_empty() {
        let contracts = info
            .parameters
            .get("contracts")
            .and_then(Value::as_object)
            .ok_or_else(|| missing_parameter("contracts"))?;
        config.contracts = contracts
            .iter()
            .map(|(name, address)| {
                address
                    .as_str()
                    .map(|a| (name.clone(), a.to_string()))
                    .ok_or_else(|| missing_parameter("contracts"))
            })
            .collect::<AgentResult<BTreeMap<_, _>>>()?;
    }
    if config.chain.is_none() {
        config.chain = Some(
            info.parameter_str("chain")
                .ok_or_else(|| missing_parameter("chain"))?
                .to_string(),
        );
    }
    if config.account.is_none() {
        config.account = Some(
            info.parameter_str("account")
                .ok_or_else(|| missing_parameter("account"))?
                .to_string(),
        );
    }
    Ok(())
}

async fn retrieve_agent(
    agents: &dyn AgentsApi,
    model_id: u64,
    version_id: u64,
    endpoint_id: u64,
) -> AgentResult<AgentInfo> {
    let found = retry_or_give_up(
        "retrieve_agent",
        || agents.list_agents(model_id, version_id, endpoint_id),
        AGENT_LOOKUP_ATTEMPTS,
    )
    .await?;
    found.into_iter().next().ok_or_else(|| {
        AgentError::AgentNotFound(format!(
            "Agent with model ID {model_id} and version ID {version_id} not found"
        ))
    })
}

impl Agent {
    /// Connect to the platform and the chain named in `config` (or in the
    /// agent record), resolving the serving endpoint on the way.
    pub async fn connect(mut config: AgentConfig, secrets: Arc<dyn SecretStore>) -> AgentResult<Self> {
        let platform = Arc::new(PlatformClient::from_config(&config)?);
        let model_id = required(config.model_id, "model_id")?;
        let version_id = required(config.version_id, "version_id")?;

        let endpoint = resolve_endpoint(platform.as_ref(), model_id, version_id).await?;
        if let Some(configured) = config.endpoint_id.filter(|id| *id != endpoint.id) {
            tracing::warn!(
                "Configured endpoint {} is not the active one, using {}",
                configured,
                endpoint.id
            );
        }
        config.endpoint_id = Some(endpoint.id);

        let info = retrieve_agent(platform.as_ref(), model_id, version_id, endpoint.id).await?;
        fill_from_record(&mut config, &info)?;
        config.poll.validate()?;
        let chain = required(config.chain.clone(), "chain")?;
        let provider = RpcProvider::new(&chain)
            .map_err(|e| AgentError::Configuration(format!("Chain {chain} not usable: {e}")))?;

        let services = AgentServices {
            inference: Arc::new(InferenceClient::new(&endpoint.uri, endpoint.framework)?),
            jobs: platform.clone(),
            proofs: platform.clone(),
            agents: platform,
            provider: Arc::new(provider),
            secrets,
        };
        Self::assemble(config, info, services).await
    }

    /// Build an agent from the platform record `agent_id`.
    pub async fn from_id(
        agent_id: u64,
        mut config: AgentConfig,
        secrets: Arc<dyn SecretStore>,
    ) -> AgentResult<Self> {
        let platform = PlatformClient::from_config(&config)?;
        let info = platform.get_agent(agent_id, false).await?;
        config.agent_id = Some(agent_id);
        if config.model_id.is_none() {
            config.model_id = Some(
                info.parameter_u64("model_id")
                    .ok_or_else(|| missing_parameter("model_id"))?,
            );
        }
        if config.version_id.is_none() {
            config.version_id = Some(
                info.parameter_u64("version_id")
                    .ok_or_else(|| missing_parameter("version_id"))?,
            );
        }
        fill_from_record(&mut config, &info)?;
        Self::connect(config, secrets).await
    }

    /// Build an agent on top of already constructed backends. The endpoint id
    /// must be known.
    pub async fn with_services(config: AgentConfig, services: AgentServices) -> AgentResult<Self> {
        let model_id = required(config.model_id, "model_id")?;
        let version_id = required(config.version_id, "version_id")?;
        let endpoint_id = required(config.endpoint_id, "endpoint_id")?;
        let info = retrieve_agent(services.agents.as_ref(), model_id, version_id, endpoint_id).await?;
        Self::assemble(config, info, services).await
    }

    async fn assemble(
        mut config: AgentConfig,
        info: AgentInfo,
        services: AgentServices,
    ) -> AgentResult<Self> {
        fill_from_record(&mut config, &info)?;
        let model_id = required(config.model_id, "model_id")?;
        let version_id = required(config.version_id, "version_id")?;
        let endpoint_id = required(config.endpoint_id, "endpoint_id")?;
        let chain = required(config.chain.clone(), "chain")?;
        let account = required(config.account.clone(), "account")?;

        if let Err(e) = require_passphrase(services.secrets.as_ref(), &account) {
            tracing::error!(
                "Passphrase for account {} not found. It must be stored in {}",
                account,
                passphrase_var(&account)
            );
            return Err(e);
        }

        let mut contracts = ContractHandler::new(&config.contracts)?;
        for (name, path) in &config.contract_abis {
            contracts.set_abi(name.clone(), Abi::from_path(path)?);
        }

        let verifier = Arc::new(ProofVerifier::new(services.proofs.clone(), endpoint_id));
        let tracker = ProofJobTracker::new(services.jobs.clone(), endpoint_id, config.poll.clone());
        let submitter = TransactionSubmitter::new(
            services.provider.clone(),
            verifier.clone(),
            config.transmit.clone(),
        );

        let agent = Self {
            config,
            info,
            model_id,
            version_id,
            endpoint_id,
            chain,
            account,
            inference: services.inference,
            agents: services.agents,
            provider: services.provider,
            secrets: services.secrets,
            tracker,
            verifier,
            contracts,
            submitter,
        };
        agent.ensure_account().await?;
        tracing::info!(
            "Agent {} ready for model {} version {} on endpoint {}",
            agent.info.id,
            model_id,
            version_id,
            endpoint_id
        );
        Ok(agent)
    }

    pub fn id(&self) -> u64 {
        self.info.id
    }

    pub fn info(&self) -> &AgentInfo {
        &self.info
    }

    pub fn endpoint_id(&self) -> u64 {
        self.endpoint_id
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn contracts(&self) -> &ContractHandler {
        &self.contracts
    }

    pub fn verifier(&self) -> &Arc<ProofVerifier> {
        &self.verifier
    }

    fn keystore_dir(&self) -> PathBuf {
        self.config.effective_keystore_dir()
    }

    /// Make the account keystore available locally, pulling it from the agent
    /// record when missing.
    async fn ensure_account(&self) -> AgentResult<()> {
        let dir = self.keystore_dir();
        if tokio::fs::try_exists(keystore_path(&dir, &self.account)).await? {
            return Ok(());
        }
        tracing::info!(
            "Account {} not found locally, creating it from agent",
            self.account
        );
        let record = self.agents.get_agent(self.info.id, true).await?;
        ensure_keystore(&dir, &self.account, record.parameters.get("account_data")).await?;
        tracing::info!("Account {} created from agent", self.account);
        Ok(())
    }

    /// Request template for this agent's model version.
    pub fn request(&self) -> InferenceRequest {
        InferenceRequest::new(self.model_id, self.version_id).dry_run(self.config.dry_run)
    }

    pub async fn predict(&self, request: InferenceRequest) -> AgentResult<Prediction> {
        let response = self.inference.predict(&request).await?;
        if !request.verifiable {
            tracing::warn!(
                "Inference is not verifiable. No request ID was returned. No proof will be generated."
            );
            return Ok(Prediction::Unverified(response.result));
        }

        Ok(Prediction::Verifiable(ResultHandle::new(
            request.input,
            response.result,
            response.request_id,
            self.tracker.clone(),
            self.verifier.clone(),
            request.dry_run,
        )))
    }

    /// Push changed chain, account and contracts to the agent record.
    pub async fn update_agent(&mut self) -> AgentResult<()> {
        let mut patch = Map::new();

        if self.info.parameter_str("chain") != Some(self.chain.as_str()) {
            tracing::info!("Updating agent with chain {}", self.chain);
            patch.insert("chain".into(), Value::String(self.chain.clone()));
        }

        if self.info.parameter_str("account") != Some(self.account.as_str()) {
            tracing::info!("Updating agent with account {}", self.account);
            let path = keystore_path(&self.keystore_dir(), &self.account);
            let account_data: Value = serde_json::from_slice(&tokio::fs::read(&path).await?)?;
            patch.insert("account".into(), Value::String(self.account.clone()));
            patch.insert("account_data".into(), account_data);
        }

        let contracts: Map<String, Value> = self
            .config
            .contracts
            .iter()
            .map(|(name, address)| (name.clone(), Value::String(address.clone())))
            .collect();
        if self.info.parameters.get("contracts") != Some(&Value::Object(contracts.clone())) {
            tracing::info!("Updating agent with latest contracts");
            patch.insert("contracts".into(), Value::Object(contracts));
        }

        if patch.is_empty() {
            return Ok(());
        }
        self.info = self.agents.update_agent(self.info.id, patch).await?;
        tracing::info!("Agent updated!");
        Ok(())
    }

    /// Open a session: sync the agent record, unlock the account and bring
    /// every contract up. Closing the session (dropping it) releases both.
    pub async fn execute(&mut self) -> AgentResult<AgentSession<'_>> {
        self.update_agent().await?;
        let signer = load_account(&self.keystore_dir(), &self.account, self.secrets.as_ref()).await?;
        self.contracts.handle(self.provider.clone()).await?;
        Ok(AgentSession::open(&mut self.contracts, &self.submitter, signer))
    }
}

/// Scope in which contracts are live and the account can sign.
pub struct AgentSession<'a> {
    contracts: &'a mut ContractHandler,
    submitter: &'a TransactionSubmitter,
    signer: PrivateKeySigner,
}

impl std::fmt::Debug for AgentSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("account", &self.signer.address())
            .field("contracts", &self.contracts)
            .finish()
    }
}

impl<'a> AgentSession<'a> {
    fn open(
        contracts: &'a mut ContractHandler,
        submitter: &'a TransactionSubmitter,
        signer: PrivateKeySigner,
    ) -> Self {
        tracing::info!("Agent session opened for {}", signer.address());
        Self {
            contracts,
            submitter,
            signer,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn contract(&self, name: &str) -> AgentResult<&ContractProxy> {
        self.contracts.get(name)
    }

    /// Call `function_name` on contract `contract_name` with a verified result
    /// behind it, vouched for by the session account. Dry-run results never
    /// reach the chain.
    pub async fn transmit(
        &self,
        contract_name: &str,
        function_name: &str,
        params: &[Value],
        value: U256,
        result: &ResultHandle,
    ) -> AgentResult<Option<TransactionReceipt>> {
        if result.is_dry_run() {
            tracing::warn!("Dry run result, skipping transmission of {}", function_name);
            return Ok(None);
        }
        self.contracts.get(contract_name)?.abi()?;
        result.value().await?;
        let proof = result.proof().cloned().ok_or(AgentError::MissingProof)?;
        let evidence = SignedProof::sign(proof, &self.signer)?;
        self.transmit_signed(contract_name, function_name, params, value, result, &evidence)
            .await
    }

    /// Like [`transmit`](Self::transmit), with the proof signed elsewhere.
    /// The signature must recover to the session account.
    pub async fn transmit_signed(
        &self,
        contract_name: &str,
        function_name: &str,
        params: &[Value],
        value: U256,
        result: &ResultHandle,
        evidence: &SignedProof,
    ) -> AgentResult<Option<TransactionReceipt>> {
        if result.is_dry_run() {
            tracing::warn!("Dry run result, skipping transmission of {}", function_name);
            return Ok(None);
        }

        let proxy = self.contracts.get(contract_name)?;
        let abi = proxy.abi()?;
        result.value().await?;
        let proof = result.proof().ok_or(AgentError::MissingProof)?;
        if proof.id != evidence.proof.id {
            return Err(AgentError::InvalidSignature(format!(
                "signed proof {} does not back result proof {}",
                evidence.proof.id, proof.id
            )));
        }

        self.submitter
            .transmit(
                &self.signer,
                proxy.address(),
                abi,
                function_name,
                params,
                value,
                evidence,
            )
            .await
    }
}

impl Drop for AgentSession<'_> {
    fn drop(&mut self) {
        self.contracts.release();
        tracing::info!("Agent session closed");
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives_v1p2p0::B256;
    use serde_json::json;

    use super::*;
    use crate::config::PollConfig;
    use crate::result::VerificationState;
    use crate::secrets::StaticSecretStore;
    use crate::testing::{AgentsStub, InferenceStub, JobsStub, ProofsStub, ProviderStub, job, proof};
    use crate::types::JobStatus;

    const LOTTERY: &str = "0x1000000000000000000000000000000000000001";

    struct Fixture {
        dir: tempfile::TempDir,
        agents: Arc<AgentsStub>,
        inference: Arc<InferenceStub>,
        jobs: Arc<JobsStub>,
        proofs: Arc<ProofsStub>,
        provider: Arc<ProviderStub>,
    }

    fn record(parameters: Value) -> AgentInfo {
        AgentInfo {
            id: 7,
            name: Some("lottery-agent".into()),
            parameters: parameters.as_object().cloned().unwrap_or_default(),
        }
    }

    fn full_record() -> AgentInfo {
        record(json!({
            "chain": "http://localhost:8545",
            "account": "alice",
            "contracts": {"lottery": LOTTERY},
            "account_data": {"version": 3, "id": "keystore", "crypto": {}}
        }))
    }

    impl Fixture {
        fn new(info: AgentInfo) -> Self {
            let jobs = JobsStub::with_jobs(vec![job(1, JobStatus::Completed, "req-1")]);
            Self {
                dir: tempfile::tempdir().unwrap(),
                agents: Arc::new(AgentsStub {
                    agents: vec![info],
                    ..Default::default()
                }),
                inference: Arc::new(InferenceStub::new(json!([1]), Some("req-1"))),
                jobs: Arc::new(jobs),
                proofs: Arc::new(ProofsStub::new(proof(3, "req-1"))),
                provider: Arc::new(
                    ProviderStub::with_contracts(&[LOTTERY.parse().unwrap()]).confirming(),
                ),
            }
        }

        fn config(&self) -> AgentConfig {
            AgentConfig {
                model_id: Some(1),
                version_id: Some(2),
                endpoint_id: Some(3),
                keystore_dir: Some(self.dir.path().to_path_buf()),
                poll: PollConfig {
                    poll_interval_secs: 0.1,
                    ..Default::default()
                },
                ..Default::default()
            }
        }

        fn services(&self, secrets: StaticSecretStore) -> AgentServices {
            AgentServices {
                inference: self.inference.clone(),
                jobs: self.jobs.clone(),
                proofs: self.proofs.clone(),
                agents: self.agents.clone(),
                provider: self.provider.clone(),
                secrets: Arc::new(secrets),
            }
        }

        async fn agent(&self) -> AgentResult<Agent> {
            let secrets = StaticSecretStore::new().with("alice", "pw");
            Agent::with_services(self.config(), self.services(secrets)).await
        }
    }

    fn feed() -> Map<String, Value> {
        json!({"x": [1, 2]}).as_object().cloned().unwrap()
    }

    fn lottery_abi() -> Abi {
        Abi::from_json_value(json!([{
            "type": "function",
            "name": "draw",
            "stateMutability": "nonpayable",
            "inputs": [{"name": "winner", "type": "uint256"}],
            "outputs": []
        }]))
        .unwrap()
    }

    #[tokio::test]
    async fn test_fills_parameters_from_record_and_bootstraps_account() {
        let fixture = Fixture::new(full_record());
        let agent = fixture.agent().await.unwrap();
        assert_eq!(agent.id(), 7);
        assert_eq!(agent.account(), "alice");
        assert_eq!(agent.chain(), "http://localhost:8545");
        assert_eq!(
            agent.contracts().address("lottery").unwrap(),
            LOTTERY.parse::<Address>().unwrap()
        );
        assert!(fixture.dir.path().join("alice.json").exists());
    }

    #[tokio::test]
    async fn test_zero_poll_interval_is_rejected_up_front() {
        let fixture = Fixture::new(full_record());
        let mut config = fixture.config();
        config.poll.poll_interval_secs = 0.0;
        let secrets = StaticSecretStore::new().with("alice", "pw");
        assert!(matches!(
            Agent::with_services(config, fixture.services(secrets)).await,
            Err(AgentError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_record_parameter() {
        let fixture = Fixture::new(record(json!({"account": "alice"})));
        assert!(matches!(
            fixture.agent().await,
            Err(AgentError::Configuration(ref m)) if m.contains("contracts")
        ));
    }

    #[tokio::test]
    async fn test_no_agent_for_model() {
        let mut fixture = Fixture::new(full_record());
        fixture.agents = Arc::new(AgentsStub::default());
        assert!(matches!(
            fixture.agent().await,
            Err(AgentError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_passphrase_fails_fast() {
        let fixture = Fixture::new(full_record());
        let err = Agent::with_services(fixture.config(), fixture.services(StaticSecretStore::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MissingPassphrase(ref a) if a == "alice"));
    }

    #[tokio::test]
    async fn test_unverifiable_prediction() {
        let fixture = Fixture::new(full_record());
        let agent = fixture.agent().await.unwrap();
        let prediction = agent
            .predict(agent.request().with_input_feed(feed()))
            .await
            .unwrap();
        assert!(matches!(prediction, Prediction::Unverified(ref v) if v == &json!([1])));
    }

    #[tokio::test]
    async fn test_dry_run_prediction_is_verified_without_io() {
        let fixture = Fixture::new(full_record());
        let agent = fixture.agent().await.unwrap();
        let request = agent
            .request()
            .with_input_feed(feed())
            .verifiable(true)
            .dry_run(true);
        let handle = agent.predict(request).await.unwrap().into_handle().unwrap();
        assert_eq!(handle.value().await.unwrap(), &json!([1]));
        assert_eq!(handle.state().await, VerificationState::Verified);
        assert_eq!(fixture.jobs.list_calls(), 0);
        assert_eq!(fixture.proofs.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_agent_patches_only_changes() {
        let fixture = Fixture::new(full_record());
        let mut agent = fixture.agent().await.unwrap();
        agent.update_agent().await.unwrap();
        assert!(fixture.agents.updates.lock().unwrap().is_empty());

        let mut config = fixture.config();
        config.chain = Some("http://localhost:9545".into());
        let secrets = StaticSecretStore::new().with("alice", "pw");
        let mut agent = Agent::with_services(config, fixture.services(secrets))
            .await
            .unwrap();
        agent.update_agent().await.unwrap();
        let updates = fixture.agents.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, 7);
        assert_eq!(
            Value::Object(updates[0].1.clone()),
            json!({"chain": "http://localhost:9545"})
        );
    }

    #[tokio::test]
    async fn test_execute_with_undecryptable_keystore() {
        let fixture = Fixture::new(full_record());
        let mut agent = fixture.agent().await.unwrap();
        assert!(matches!(agent.execute().await, Err(AgentError::Account(_))));
        assert!(fixture.provider.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_transmits_verified_result() {
        let fixture = Fixture::new(full_record());
        let mut agent = fixture.agent().await.unwrap();
        agent.contracts.set_abi("lottery", lottery_abi());
        let handle = agent
            .predict(agent.request().with_input_feed(feed()).verifiable(true))
            .await
            .unwrap()
            .into_handle()
            .unwrap();

        let signer = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x42)).unwrap();
        agent.contracts.handle(fixture.provider.clone()).await.unwrap();
        {
            let session = AgentSession::open(&mut agent.contracts, &agent.submitter, signer);
            assert!(session.contract("lottery").is_ok());
            let receipt = session
                .transmit("lottery", "draw", &[json!(7)], U256::ZERO, &handle)
                .await
                .unwrap();
            assert!(receipt.unwrap().succeeded());
        }
        assert!(handle.verified());
        assert!(matches!(
            agent.contracts().get("lottery"),
            Err(AgentError::SessionNotOpen(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_rejects_proof_signed_by_another_account() {
        let fixture = Fixture::new(full_record());
        let mut agent = fixture.agent().await.unwrap();
        agent.contracts.set_abi("lottery", lottery_abi());
        let handle = agent
            .predict(agent.request().with_input_feed(feed()).verifiable(true))
            .await
            .unwrap()
            .into_handle()
            .unwrap();
        handle.value().await.unwrap();

        let other = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x01)).unwrap();
        let evidence = SignedProof::sign(handle.proof().cloned().unwrap(), &other).unwrap();

        let signer = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x42)).unwrap();
        agent.contracts.handle(fixture.provider.clone()).await.unwrap();
        let before = fixture.provider.calls().len();
        let session = AgentSession::open(&mut agent.contracts, &agent.submitter, signer);
        let err = session
            .transmit_signed("lottery", "draw", &[json!(7)], U256::ZERO, &handle, &evidence)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SignerMismatch { .. }));
        assert_eq!(fixture.provider.calls().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_rejects_evidence_for_another_proof() {
        let fixture = Fixture::new(full_record());
        let mut agent = fixture.agent().await.unwrap();
        agent.contracts.set_abi("lottery", lottery_abi());
        let handle = agent
            .predict(agent.request().with_input_feed(feed()).verifiable(true))
            .await
            .unwrap()
            .into_handle()
            .unwrap();

        let signer = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x42)).unwrap();
        let evidence = SignedProof::sign(proof(99, "req-1"), &signer).unwrap();
        agent.contracts.handle(fixture.provider.clone()).await.unwrap();
        let before = fixture.provider.calls().len();
        let session = AgentSession::open(&mut agent.contracts, &agent.submitter, signer);
        let err = session
            .transmit_signed("lottery", "draw", &[json!(7)], U256::ZERO, &handle, &evidence)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidSignature(_)));
        assert_eq!(fixture.provider.calls().len(), before);
    }

    #[tokio::test]
    async fn test_session_skips_dry_run_results() {
        let fixture = Fixture::new(full_record());
        let mut agent = fixture.agent().await.unwrap();
        let handle = agent
            .predict(
                agent
                    .request()
                    .with_input_feed(feed())
                    .verifiable(true)
                    .dry_run(true),
            )
            .await
            .unwrap()
            .into_handle()
            .unwrap();

        let signer = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x42)).unwrap();
        let session = AgentSession::open(&mut agent.contracts, &agent.submitter, signer);
        let receipt = session
            .transmit("lottery", "draw", &[json!(7)], U256::ZERO, &handle)
            .await
            .unwrap();
        assert!(receipt.is_none());
        assert!(fixture.provider.calls().is_empty());
    }
}
