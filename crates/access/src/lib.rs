//! Role-based authorization registry for the merit platform.
//!
//! Roles are a capability set checked per operation: an account either holds
//! a role or it does not. The registry is an explicit shared handle passed to
//! every component rather than ambient global state, so tests can construct
//! isolated instances with controlled role sets. It decides permissions only;
//! it never touches balances.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use merit_core::{AccountId, Event, EventSink};

/// A named capability grantable per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May mint, grant/revoke roles, change the exchange rate, and verify
    /// deployments
    Admin,
    /// May trigger system-initiated transfers (reward payouts) without the
    /// holder's consent
    RewardIssuer,
    /// May author course catalog entries and update student progress
    Instructor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::RewardIssuer => write!(f, "reward_issuer"),
            Self::Instructor => write!(f, "instructor"),
        }
    }
}

/// Errors from the authorization registry
#[derive(Error, Debug)]
pub enum AccessError {
    /// The account does not hold the role the operation requires
    #[error("Unauthorized: {account} does not hold role {role}")]
    Unauthorized { account: AccountId, role: Role },

    /// Rejecting a revoke that would leave zero admins
    #[error("Cannot revoke admin from {0}: at least one admin must remain")]
    LastAdminProtected(AccountId),
}

/// Result type for authorization operations
pub type AccessResult<T> = Result<T, AccessError>;

/// The authorization registry: `(account, role) -> bool`, with a bootstrap
/// admin fixed at construction and a floor of one admin at all times.
pub struct AccessControl {
    roles: RwLock<HashMap<AccountId, HashSet<Role>>>,
    events: Arc<dyn EventSink>,
}

impl AccessControl {
    /// Create a registry whose only entry is the bootstrap admin
    pub fn new(bootstrap_admin: AccountId, events: Arc<dyn EventSink>) -> Self {
        let mut roles = HashMap::new();
        roles.insert(bootstrap_admin, HashSet::from([Role::Admin]));
        Self {
            roles: RwLock::new(roles),
            events,
        }
    }

    /// Grant `role` to `account`. Admin only.
    pub async fn grant(
        &self,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> AccessResult<()> {
        self.require_role(caller, Role::Admin).await?;

        let mut roles = self.roles.write().await;
        roles.entry(account.clone()).or_default().insert(role);
        drop(roles);

        info!(%account, %role, "role granted");
        self.events
            .emit(Event::RoleGranted {
                by: caller.clone(),
                account: account.clone(),
                role: role.to_string(),
            })
            .await;
        Ok(())
    }

    /// Revoke `role` from `account`. Admin only. Revoking the admin role is
    /// rejected when `account` is the last admin left.
    pub async fn revoke(
        &self,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> AccessResult<()> {
        self.require_role(caller, Role::Admin).await?;

        let mut roles = self.roles.write().await;
        if role == Role::Admin {
            let target_is_admin = roles
                .get(account)
                .map_or(false, |set| set.contains(&Role::Admin));
            let admin_count = roles
                .values()
                .filter(|set| set.contains(&Role::Admin))
                .count();
            if target_is_admin && admin_count <= 1 {
                return Err(AccessError::LastAdminProtected(account.clone()));
            }
        }
        if let Some(set) = roles.get_mut(account) {
            set.remove(&role);
        }
        drop(roles);

        info!(%account, %role, "role revoked");
        self.events
            .emit(Event::RoleRevoked {
                by: caller.clone(),
                account: account.clone(),
                role: role.to_string(),
            })
            .await;
        Ok(())
    }

    /// Check whether `account` holds `role`
    pub async fn has_role(&self, account: &AccountId, role: Role) -> bool {
        self.roles
            .read()
            .await
            .get(account)
            .map_or(false, |set| set.contains(&role))
    }

    /// Guard used by every privileged operation: error unless `account`
    /// holds `role`.
    pub async fn require_role(&self, account: &AccountId, role: Role) -> AccessResult<()> {
        if self.has_role(account, role).await {
            Ok(())
        } else {
            Err(AccessError::Unauthorized {
                account: account.clone(),
                role,
            })
        }
    }
}
