//! Deployment Registry implementation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};

use merit_access::{AccessControl, Role};
use merit_core::{timestamp_secs, AccountId, Amount, Event, EventSink};
use merit_ledger::TokenLedger;

use crate::{
    Developer, DeploymentError, DeploymentRecord, DeploymentResult, PlatformStats, RewardPolicy,
};

/// All registry tables behind one lock, so a recording and its stats update
/// commit (or roll back) together.
#[derive(Default)]
struct RegistryState {
    developers: HashMap<AccountId, Developer>,
    /// Append-only, keyed by the stable monotonic id
    deployments: BTreeMap<u64, DeploymentRecord>,
    by_developer: HashMap<AccountId, Vec<u64>>,
    /// `(developer, contract_address, source_digest)` triples already seen
    seen: HashSet<(AccountId, String, String)>,
    next_id: u64,
    stats: PlatformStats,
}

/// Developer registrations and the deployment reward log.
///
/// Payouts run under the registry's service account, which an admin must
/// authorize as a reward issuer.
pub struct DeploymentRegistry {
    state: RwLock<RegistryState>,
    policy: RewardPolicy,
    service_account: AccountId,
    access: Arc<AccessControl>,
    ledger: Arc<TokenLedger>,
    events: Arc<dyn EventSink>,
}

impl DeploymentRegistry {
    /// Create an empty registry with the given reward policy
    pub fn new(
        service_account: AccountId,
        policy: RewardPolicy,
        access: Arc<AccessControl>,
        ledger: Arc<TokenLedger>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            policy,
            service_account,
            access,
            ledger,
            events,
        }
    }

    /// Register the caller as a developer. One registration per account.
    pub async fn register_developer(
        &self,
        caller: &AccountId,
        name: &str,
        contact: &str,
    ) -> DeploymentResult<Developer> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DeploymentError::EmptyName);
        }

        let mut state = self.state.write().await;
        if state.developers.contains_key(caller) {
            return Err(DeploymentError::AlreadyRegistered(caller.clone()));
        }
        let developer = Developer {
            account: caller.clone(),
            name: name.to_string(),
            contact: contact.to_string(),
            registered_at: timestamp_secs(),
        };
        state.developers.insert(caller.clone(), developer.clone());
        state.stats.total_developers += 1;
        drop(state);

        info!(developer = %caller, name, "developer registered");
        self.events
            .emit(Event::DeveloperRegistered {
                developer: caller.clone(),
                name: name.to_string(),
            })
            .await;
        Ok(developer)
    }

    /// Record a deployment and pay its reward.
    ///
    /// The record and the stats bump commit before the treasury transfer;
    /// a failed transfer rolls everything back, so a resubmission after a
    /// payout failure is not treated as a duplicate.
    pub async fn record_deployment(
        &self,
        caller: &AccountId,
        contract_name: &str,
        contract_address: &str,
        source: &str,
        description: &str,
        gas_used: u64,
    ) -> DeploymentResult<DeploymentRecord> {
        let mut state = self.state.write().await;
        if !state.developers.contains_key(caller) {
            return Err(DeploymentError::NotRegistered(caller.clone()));
        }

        let digest = hex::encode(Sha256::digest(source.as_bytes()));
        let dedupe_key = (
            caller.clone(),
            contract_address.to_string(),
            digest.clone(),
        );
        if state.seen.contains(&dedupe_key) {
            return Err(DeploymentError::DuplicateDeployment {
                developer: caller.clone(),
                contract_address: contract_address.to_string(),
            });
        }

        let reward = self.policy.reward_for(gas_used);
        let id = state.next_id;
        let record = DeploymentRecord {
            id,
            developer: caller.clone(),
            contract_name: contract_name.to_string(),
            contract_address: contract_address.to_string(),
            source_digest: digest,
            description: description.to_string(),
            gas_used,
            reward_paid: reward,
            verified: false,
            recorded_at: timestamp_secs(),
        };

        state.next_id += 1;
        state.seen.insert(dedupe_key.clone());
        state.deployments.insert(id, record.clone());
        state.by_developer.entry(caller.clone()).or_default().push(id);
        state.stats.total_deployments += 1;
        state.stats.total_rewards_distributed =
            state.stats.total_rewards_distributed.saturating_add(reward);

        if !reward.is_zero() {
            let treasury = self.ledger.treasury().clone();
            if let Err(err) = self
                .ledger
                .transfer(&self.service_account, &treasury, caller, reward)
                .await
            {
                state.deployments.remove(&id);
                state.seen.remove(&dedupe_key);
                if let Some(ids) = state.by_developer.get_mut(caller) {
                    ids.pop();
                }
                state.next_id = id;
                state.stats.total_deployments -= 1;
                state.stats.total_rewards_distributed =
                    state.stats.total_rewards_distributed.saturating_sub(reward);
                warn!(developer = %caller, %err, "deployment reward payout failed, record rolled back");
                return Err(err.into());
            }
        }
        drop(state);

        info!(
            developer = %caller,
            deployment_id = id,
            contract_address,
            %reward,
            "deployment recorded"
        );
        self.events
            .emit(Event::DeploymentRecorded {
                developer: caller.clone(),
                deployment_id: id,
                contract_address: contract_address.to_string(),
                reward,
            })
            .await;
        Ok(record)
    }

    /// Mark a recorded deployment as verified. Admin only; at most once.
    pub async fn verify_deployment(
        &self,
        caller: &AccountId,
        deployment_id: u64,
    ) -> DeploymentResult<()> {
        self.access.require_role(caller, Role::Admin).await?;

        let mut state = self.state.write().await;
        let record = state
            .deployments
            .get_mut(&deployment_id)
            .ok_or(DeploymentError::NotFound(deployment_id))?;
        if record.verified {
            return Err(DeploymentError::AlreadyVerified(deployment_id));
        }
        record.verified = true;
        drop(state);

        info!(deployment_id, "deployment verified");
        self.events
            .emit(Event::DeploymentVerified {
                by: caller.clone(),
                deployment_id,
            })
            .await;
        Ok(())
    }

    /// Look up a developer registration
    pub async fn get_developer(&self, account: &AccountId) -> Option<Developer> {
        self.state.read().await.developers.get(account).cloned()
    }

    /// Whether `account` is a registered developer
    pub async fn is_registered(&self, account: &AccountId) -> bool {
        self.state.read().await.developers.contains_key(account)
    }

    /// Look up a deployment record by id
    pub async fn get_deployment(&self, deployment_id: u64) -> Option<DeploymentRecord> {
        self.state
            .read()
            .await
            .deployments
            .get(&deployment_id)
            .cloned()
    }

    /// All deployments recorded by one developer, oldest first
    pub async fn deployments_of(&self, developer: &AccountId) -> Vec<DeploymentRecord> {
        let state = self.state.read().await;
        state
            .by_developer
            .get(developer)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.deployments.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Aggregate platform counters
    pub async fn get_platform_stats(&self) -> PlatformStats {
        self.state.read().await.stats
    }
}
