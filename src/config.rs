use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AgentError, AgentResult};

pub const DEFAULT_API_HOST: &str = "https://api.gizatech.xyz";

/// Polling behaviour for proof jobs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollConfig {
    /// Negative or zero values time out on the first non-terminal poll.
    pub timeout_secs: f64,
    pub poll_interval_secs: f64,
    /// Consecutive transient polling errors tolerated before giving up.
    pub poll_error_threshold: u32,
    /// Attempts made to find the proof job right after inference.
    pub job_lookup_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600.0,
            poll_interval_secs: 10.0,
            poll_error_threshold: 5,
            job_lookup_attempts: 5,
        }
    }
}

impl PollConfig {
    pub fn timeout(&self) -> Duration {
        secs_f64(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        secs_f64(self.poll_interval_secs)
    }

    /// The poll interval must be a positive number of seconds.
    pub fn validate(&self) -> AgentResult<()> {
        if !(self.poll_interval_secs.is_finite() && self.poll_interval_secs > 0.0) {
            return Err(AgentError::Configuration(format!(
                "poll_interval_secs must be positive, got {}",
                self.poll_interval_secs
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransmitConfig {
    pub receipt_timeout_secs: u64,
    /// Fixed gas limit; estimated from the node when unset.
    pub gas_limit: Option<u64>,
    /// Skip the signer identity and proof checks before sending.
    pub unsafe_mode: bool,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 300,
            gas_limit: None,
            unsafe_mode: false,
        }
    }
}

impl TransmitConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub api_host: String,
    pub api_key: Option<String>,
    pub agent_id: Option<u64>,
    pub model_id: Option<u64>,
    pub version_id: Option<u64>,
    pub endpoint_id: Option<u64>,
    /// JSON-RPC URL of the chain the agent transacts on.
    pub chain: Option<String>,
    pub account: Option<String>,
    pub keystore_dir: Option<PathBuf>,
    /// Contract name to address.
    pub contracts: BTreeMap<String, String>,
    /// Contract name to ABI file.
    pub contract_abis: BTreeMap<String, PathBuf>,
    pub poll: PollConfig,
    pub transmit: TransmitConfig,
    pub dry_run: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            api_key: None,
            agent_id: None,
            model_id: None,
            version_id: None,
            endpoint_id: None,
            chain: None,
            account: None,
            keystore_dir: None,
            contracts: BTreeMap::new(),
            contract_abis: BTreeMap::new(),
            poll: PollConfig::default(),
            transmit: TransmitConfig::default(),
            dry_run: false,
        }
    }
}

impl AgentConfig {
    /// Load a JSON config file on top of the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AgentConfig = serde_json::from_str(&raw).map_err(|e| {
            AgentError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.poll.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("GIZA_API_HOST") {
            self.api_host = host;
        }
        if let Ok(key) = std::env::var("GIZA_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(rpc_url) = std::env::var("GIZA_RPC_URL") {
            self.chain = Some(rpc_url);
        }
        if let Some(v) = env_f64("GIZA_POLL_TIMEOUT_SECS") {
            self.poll.timeout_secs = v;
        }
        if let Some(v) = env_f64("GIZA_POLL_INTERVAL_SECS").filter(|v| *v > 0.0) {
            self.poll.poll_interval_secs = v;
        }
        if let Some(v) = std::env::var("POLL_ERROR_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            self.poll.poll_error_threshold = v;
        }
    }

    /// Merge this config with another config, taking values from other where provided
    pub fn merge(&mut self, other: &AgentConfig) {
        if other.api_host != DEFAULT_API_HOST {
            self.api_host = other.api_host.clone();
        }

        macro_rules! take_some {
            ($($field:ident),*) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field.clone();
                    }
                )*
            };
        }
        take_some!(api_key, agent_id, model_id, version_id, endpoint_id, chain, account, keystore_dir);

        // Contracts are merged entry by entry
        for (name, address) in &other.contracts {
            self.contracts.insert(name.clone(), address.clone());
        }
        for (name, path) in &other.contract_abis {
            self.contract_abis.insert(name.clone(), path.clone());
        }

        if other.poll != PollConfig::default() {
            self.poll = other.poll.clone();
        }
        if other.transmit != TransmitConfig::default() {
            self.transmit = other.transmit.clone();
        }
        self.dry_run |= other.dry_run;
    }

    /// Directory holding `{account}.json` keystores, `~/.giza/accounts` unless configured.
    pub fn effective_keystore_dir(&self) -> PathBuf {
        self.keystore_dir.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".giza").join("accounts")
        })
    }

    pub fn api_base(&self) -> String {
        format!("{}/api/v1", self.api_host.trim_end_matches('/'))
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok())
}

fn secs_f64(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
