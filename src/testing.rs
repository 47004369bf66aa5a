//! In-memory stand-ins for the platform, serving endpoint and chain node.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use alloy_primitives_v1p2p0::{Address, B256, Bytes};
use alloy_signer_local_v1p0p12::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::inference::{InferenceApi, InferenceRequest, InferenceResponse};
use crate::platform::{AgentsApi, JobsApi, ProofsApi};
use crate::provider::{CallRequest, ChainProvider, ProviderError, TransactionReceipt};
use crate::types::{AgentInfo, Endpoint, Job, JobKind, JobStatus, Proof, VerifyResult};
use crate::{AgentError, AgentResult};

pub(crate) fn job(id: u64, status: JobStatus, request_id: &str) -> Job {
    Job {
        id,
        kind: JobKind::Proof,
        status,
        size: None,
        request_id: Some(request_id.to_string()),
    }
}

pub(crate) fn proof(id: u64, request_id: &str) -> Proof {
    Proof {
        id,
        job_id: 1,
        created_date: None,
        request_id: Some(request_id.to_string()),
        payload: Some("0xproof".to_string()),
    }
}

#[derive(Default)]
pub(crate) struct JobsStub {
    jobs: Mutex<Vec<Job>>,
    late_job: Mutex<Option<(u32, Job)>>,
    polls: Mutex<VecDeque<AgentResult<JobStatus>>>,
    list_calls: AtomicU32,
    get_calls: AtomicU32,
}

impl JobsStub {
    pub(crate) fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
            ..Default::default()
        }
    }

    /// Job only shows up in listings after `lists` empty answers.
    pub(crate) fn register_after_lists(&self, lists: u32, job: Job) {
        *self.late_job.lock().unwrap() = Some((lists, job));
    }

    pub(crate) fn push_status(&self, status: JobStatus) {
        self.polls.lock().unwrap().push_back(Ok(status));
    }

    pub(crate) fn push_error(&self, error: AgentError) {
        self.polls.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobsApi for JobsStub {
    async fn list_jobs(&self, _endpoint_id: u64, _request_id: &str) -> AgentResult<Vec<Job>> {
        let calls = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut jobs = self.jobs.lock().unwrap().clone();
        if let Some((after, job)) = self.late_job.lock().unwrap().as_ref() {
            if calls > *after {
                jobs.push(job.clone());
            }
        }
        Ok(jobs)
    }

    async fn get_job(&self, job_id: u64, kind: JobKind) -> AgentResult<Job> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(JobStatus::Processing));
        next.map(|status| Job {
            id: job_id,
            kind,
            status,
            size: None,
            request_id: None,
        })
    }
}

pub(crate) struct ProofsStub {
    proof: Proof,
    verdicts: Mutex<VecDeque<AgentResult<bool>>>,
    proof_errors: Mutex<VecDeque<AgentError>>,
    get_calls: AtomicU32,
    verify_calls: AtomicU32,
}

impl ProofsStub {
    pub(crate) fn new(proof: Proof) -> Self {
        Self {
            proof,
            verdicts: Mutex::new(VecDeque::new()),
            proof_errors: Mutex::new(VecDeque::new()),
            get_calls: AtomicU32::new(0),
            verify_calls: AtomicU32::new(0),
        }
    }

    /// Next verification answers; valid once the queue runs dry.
    pub(crate) fn push_verdict(&self, verdict: AgentResult<bool>) {
        self.verdicts.lock().unwrap().push_back(verdict);
    }

    pub(crate) fn fail_next_fetch(&self, error: AgentError) {
        self.proof_errors.lock().unwrap().push_back(error);
    }

    pub(crate) fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn verify_calls(&self) -> u32 {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProofsApi for ProofsStub {
    async fn get_proof(&self, _endpoint_id: u64, _request_id: &str) -> AgentResult<Proof> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.proof_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.proof.clone())
    }

    async fn verify_proof(&self, _endpoint_id: u64, _proof_id: u64) -> AgentResult<VerifyResult> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let verdict = self.verdicts.lock().unwrap().pop_front().unwrap_or(Ok(true));
        verdict.map(|verification| VerifyResult {
            verification,
            verification_time: Some(0.5),
        })
    }
}

pub(crate) struct InferenceStub {
    pub(crate) response: InferenceResponse,
    pub(crate) calls: AtomicU32,
}

impl InferenceStub {
    pub(crate) fn new(result: Value, request_id: Option<&str>) -> Self {
        Self {
            response: InferenceResponse {
                result,
                request_id: request_id.map(str::to_string),
            },
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl InferenceApi for InferenceStub {
    async fn predict(&self, request: &InferenceRequest) -> AgentResult<InferenceResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        request.payload().await?;
        Ok(self.response.clone())
    }
}

#[derive(Default)]
pub(crate) struct AgentsStub {
    pub(crate) agents: Vec<AgentInfo>,
    pub(crate) endpoints: Vec<Endpoint>,
    pub(crate) updates: Mutex<Vec<(u64, Map<String, Value>)>>,
}

#[async_trait]
impl AgentsApi for AgentsStub {
    async fn get_agent(&self, agent_id: u64, _with_account_data: bool) -> AgentResult<AgentInfo> {
        self.agents
            .iter()
            .find(|a| a.id == agent_id)
            .cloned()
            .ok_or_else(|| AgentError::AgentNotFound(format!("Agent with id {agent_id} not found")))
    }

    async fn list_agents(&self, _: u64, _: u64, _: u64) -> AgentResult<Vec<AgentInfo>> {
        Ok(self.agents.clone())
    }

    async fn update_agent(
        &self,
        agent_id: u64,
        parameters: Map<String, Value>,
    ) -> AgentResult<AgentInfo> {
        self.updates
            .lock()
            .unwrap()
            .push((agent_id, parameters.clone()));
        let mut agent = self.get_agent(agent_id, false).await?;
        agent.parameters.extend(parameters);
        Ok(agent)
    }

    async fn list_endpoints(&self, _: u64, _: u64) -> AgentResult<Vec<Endpoint>> {
        Ok(self.endpoints.clone())
    }
}

/// Chain node stand-in recording every call it receives.
pub(crate) struct ProviderStub {
    pub(crate) chain_id: u64,
    pub(crate) code: HashMap<Address, Bytes>,
    pub(crate) unreachable: Option<Address>,
    pub(crate) estimate: Mutex<Result<u64, ProviderError>>,
    pub(crate) send: Mutex<Result<B256, ProviderError>>,
    pub(crate) receipt: Mutex<Option<TransactionReceipt>>,
    pub(crate) call_output: Bytes,
    pub(crate) calls: Mutex<Vec<&'static str>>,
    /// Sender, call and gas limit of every transaction sent.
    pub(crate) sent: Mutex<Vec<(Address, CallRequest, u64)>>,
    pub(crate) receipt_timeouts: Mutex<Vec<Duration>>,
}

impl Default for ProviderStub {
    fn default() -> Self {
        Self {
            chain_id: 11155111,
            code: HashMap::new(),
            unreachable: None,
            estimate: Mutex::new(Ok(21_000)),
            send: Mutex::new(Ok(B256::repeat_byte(0xaa))),
            receipt: Mutex::new(None),
            call_output: Bytes::new(),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            receipt_timeouts: Mutex::new(Vec::new()),
        }
    }
}

impl ProviderStub {
    pub(crate) fn with_contracts(addresses: &[Address]) -> Self {
        Self {
            code: addresses
                .iter()
                .map(|a| (*a, Bytes::from(vec![0x60, 0x80])))
                .collect(),
            ..Default::default()
        }
    }

    pub(crate) fn confirming(mut self) -> Self {
        self.receipt = Mutex::new(Some(TransactionReceipt {
            transaction_hash: B256::repeat_byte(0xaa),
            block_number: Some(100),
            status: true,
            gas_used: 21_000,
            contract_address: None,
        }));
        self
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str) {
        self.calls.lock().unwrap().push(method);
    }
}

#[async_trait]
impl ChainProvider for ProviderStub {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.record("eth_chainId");
        Ok(self.chain_id)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ProviderError> {
        self.record("eth_getCode");
        if self.unreachable == Some(address) {
            return Err(ProviderError::Transport("connection refused".into()));
        }
        Ok(self.code.get(&address).cloned().unwrap_or_default())
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> Result<u64, ProviderError> {
        self.record("eth_estimateGas");
        self.estimate.lock().unwrap().clone()
    }

    async fn call(&self, _call: &CallRequest) -> Result<Bytes, ProviderError> {
        self.record("eth_call");
        Ok(self.call_output.clone())
    }

    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        call: &CallRequest,
        gas_limit: u64,
    ) -> Result<B256, ProviderError> {
        self.record("eth_sendTransaction");
        self.sent
            .lock()
            .unwrap()
            .push((signer.address(), call.clone(), gas_limit));
        self.send.lock().unwrap().clone()
    }

    /// Without a prepared receipt this behaves like a node that never mines
    /// the transaction.
    async fn get_receipt(
        &self,
        _hash: B256,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        self.record("eth_getTransactionReceipt");
        self.receipt_timeouts.lock().unwrap().push(timeout);
        Ok(self.receipt.lock().unwrap().clone())
    }
}
