//! Verifiable inference agents.
//!
//! An [`Agent`] runs predictions against a deployed model version. Verifiable
//! predictions come back as a [`ResultHandle`] whose value is released only
//! once the proof behind it has been generated and verified. Inside an
//! [`AgentSession`] the verified value can then be sent to a contract.

pub mod abi;
pub mod agent;
pub mod config;
pub mod contracts;
pub mod error;
pub mod inference;
pub mod platform;
pub mod provider;
pub mod result;
pub mod retry;
pub mod secrets;
pub mod tracker;
pub mod transmit;
pub mod types;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Agent, AgentServices, AgentSession, Prediction};
pub use config::{AgentConfig, PollConfig, TransmitConfig};
pub use error::{AgentError, AgentResult};
pub use inference::{InferenceInput, InferenceRequest};
pub use result::{ResultHandle, VerificationState};
pub use transmit::SignedProof;
