//! Deployment Registry for the merit platform.
//!
//! Owns developer registrations and an append-only log of recorded code
//! deployments. Each valid recording pays exactly one reward out of the
//! treasury, computed from a configurable gas-based policy; duplicate
//! submissions of the same `(developer, contract_address, source_digest)`
//! triple are rejected before any value moves.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use merit_access::AccessError;
use merit_core::{AccountId, Amount};
use merit_ledger::LedgerError;

/// Errors from the deployment registry
#[derive(Error, Debug)]
pub enum DeploymentError {
    /// The caller lacks the role the operation requires
    #[error(transparent)]
    Access(#[from] AccessError),

    /// A ledger mutation failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// One registration per account
    #[error("Developer already registered: {0}")]
    AlreadyRegistered(AccountId),

    /// Developer names must be non-blank
    #[error("Developer name cannot be empty")]
    EmptyName,

    /// Recording requires a prior registration
    #[error("Developer not registered: {0}")]
    NotRegistered(AccountId),

    /// The same `(developer, contract_address, source_digest)` triple was
    /// already recorded
    #[error("Duplicate deployment of {contract_address} by {developer}")]
    DuplicateDeployment {
        developer: AccountId,
        contract_address: String,
    },

    /// No deployment with this id
    #[error("Deployment not found: {0}")]
    NotFound(u64),

    /// A deployment is verified at most once
    #[error("Deployment already verified: {0}")]
    AlreadyVerified(u64),
}

/// Result type for deployment operations
pub type DeploymentResult<T> = Result<T, DeploymentError>;

/// A registered developer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Developer {
    pub account: AccountId,
    pub name: String,
    pub contact: String,
    pub registered_at: u64,
}

/// An audit entry for one published piece of code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Monotonic id, assigned at recording time
    pub id: u64,
    pub developer: AccountId,
    pub contract_name: String,
    pub contract_address: String,
    /// Hex-encoded SHA-256 of the submitted source
    pub source_digest: String,
    pub description: String,
    pub gas_used: u64,
    /// Reward paid when the record was created
    pub reward_paid: Amount,
    /// Flips false -> true exactly once, by an admin
    pub verified: bool,
    pub recorded_at: u64,
}

/// Reward policy for recorded deployments: a fixed base plus a component
/// proportional to gas used. Coefficients are configuration, not constants;
/// the reward is monotonically non-decreasing in `gas_used` by construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RewardPolicy {
    /// Paid for every valid recording
    pub base_reward: Amount,
    /// Gas bucket size for the proportional component
    pub gas_unit: u64,
    /// Paid per full gas bucket
    pub per_gas_unit: Amount,
}

impl RewardPolicy {
    /// Reward for a deployment that consumed `gas_used` gas
    pub fn reward_for(&self, gas_used: u64) -> Amount {
        let units = if self.gas_unit == 0 {
            0
        } else {
            gas_used / self.gas_unit
        };
        self.base_reward
            .saturating_add(Amount::new(self.per_gas_unit.value().saturating_mul(units)))
    }
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            base_reward: Amount::new(50),
            gas_unit: 100_000,
            per_gas_unit: Amount::new(10),
        }
    }
}

/// Aggregate platform counters, maintained transactionally with the
/// operations that change them, never recomputed by scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    pub total_deployments: u64,
    pub total_developers: u64,
    pub total_rewards_distributed: Amount,
}

pub mod registry;

// Re-exports
pub use registry::DeploymentRegistry;
