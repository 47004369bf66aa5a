use std::collections::HashMap;
use std::path::{Path, PathBuf};

use alloy_signer_local_v1p0p12::PrivateKeySigner;
use serde_json::Value;

use crate::{AgentError, AgentResult};

/// Source of keystore passphrases.
pub trait SecretStore: Send + Sync {
    fn passphrase(&self, account: &str) -> Option<String>;
}

/// Environment variable holding the passphrase of `account`.
pub fn passphrase_var(account: &str) -> String {
    format!("{}_PASSPHRASE", account.to_uppercase())
}

/// Reads `{ACCOUNT}_PASSPHRASE` from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn passphrase(&self, account: &str) -> Option<String> {
        std::env::var(passphrase_var(account)).ok()
    }
}

/// Fixed passphrases, keyed by account name.
#[derive(Clone, Default)]
pub struct StaticSecretStore(HashMap<String, String>);

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, account: impl Into<String>, passphrase: impl Into<String>) -> Self {
        self.0.insert(account.into(), passphrase.into());
        self
    }
}

impl std::fmt::Debug for StaticSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSecretStore")
            .field("accounts", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretStore for StaticSecretStore {
    fn passphrase(&self, account: &str) -> Option<String> {
        self.0.get(account).cloned()
    }
}

pub fn require_passphrase(secrets: &dyn SecretStore, account: &str) -> AgentResult<String> {
    secrets
        .passphrase(account)
        .ok_or_else(|| AgentError::MissingPassphrase(account.to_string()))
}

pub fn keystore_path(dir: &Path, account: &str) -> PathBuf {
    dir.join(format!("{account}.json"))
}

/// Make sure the keystore of `account` exists locally, writing the copy kept
/// in the agent record when it does not.
pub async fn ensure_keystore(
    dir: &Path,
    account: &str,
    account_data: Option<&Value>,
) -> AgentResult<PathBuf> {
    let path = keystore_path(dir, account);
    if tokio::fs::try_exists(&path).await? {
        return Ok(path);
    }

    let data = account_data.ok_or_else(|| {
        AgentError::Account(format!(
            "Keystore for account {} not found at {} and the agent record has no copy",
            account,
            path.display()
        ))
    })?;
    // Some records store the keystore as an encoded JSON string.
    let keystore = match data {
        Value::String(raw) => serde_json::from_str::<Value>(raw)?,
        other => other.clone(),
    };

    tracing::info!("Writing keystore for account {} to {}", account, path.display());
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, serde_json::to_vec_pretty(&keystore)?).await?;
    Ok(path)
}

/// Unlock the keystore of `account` with the passphrase from `secrets`.
pub async fn load_account(
    dir: &Path,
    account: &str,
    secrets: &dyn SecretStore,
) -> AgentResult<PrivateKeySigner> {
    let passphrase = require_passphrase(secrets, account)?;
    let path = keystore_path(dir, account);
    if !tokio::fs::try_exists(&path).await? {
        return Err(AgentError::Account(format!(
            "Keystore for account {} not found at {}",
            account,
            path.display()
        )));
    }

    // scrypt is slow, keep it off the runtime threads
    let signer = tokio::task::spawn_blocking(move || {
        PrivateKeySigner::decrypt_keystore(&path, passphrase)
    })
    .await
    .map_err(|e| AgentError::Account(format!("Keystore task failed: {e}")))?
    .map_err(|e| AgentError::Account(format!("Failed to unlock account {account}: {e}")))?;

    tracing::info!("Account {} loaded ({})", account, signer.address());
    Ok(signer)
}
