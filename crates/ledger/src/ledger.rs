//! Balance Ledger implementation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use merit_access::{AccessControl, Role};
use merit_core::{AccountId, Amount, Event, EventSink};

use crate::{LedgerError, LedgerResult};

/// Balance table plus the running supply counter.
///
/// Both live in one struct behind one lock so a transfer mutates the two
/// sides of the move under a single write guard and no intermediate state is
/// observable by any other operation.
#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<AccountId, Amount>,
    total_minted: Amount,
}

/// Serializable copy of the full ledger state at one observation point,
/// handed to the external persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balances: HashMap<AccountId, Amount>,
    pub total_minted: Amount,
}

/// The fungible token ledger.
///
/// Invariant: the sum of all balance entries equals `total_minted` at every
/// observation point, and no entry is ever negative.
pub struct TokenLedger {
    state: RwLock<LedgerState>,
    treasury: AccountId,
    access: Arc<AccessControl>,
    events: Arc<dyn EventSink>,
}

impl TokenLedger {
    /// Create an empty ledger with a reserved treasury account
    pub fn new(
        treasury: AccountId,
        access: Arc<AccessControl>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            treasury,
            access,
            events,
        }
    }

    /// The reserved treasury account funding reward payouts
    pub fn treasury(&self) -> &AccountId {
        &self.treasury
    }

    /// Mint new tokens to `to`. Admin only.
    pub async fn mint(
        &self,
        caller: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> LedgerResult<()> {
        self.access.require_role(caller, Role::Admin).await?;
        self.mint_internal(to, amount).await?;

        info!(%to, %amount, "tokens minted");
        self.events
            .emit(Event::TokensMinted {
                by: caller.clone(),
                to: to.clone(),
                amount,
            })
            .await;
        Ok(())
    }

    /// Credit freshly minted tokens without a role check. Crate-internal:
    /// the exchange is the only other caller, and it does its own
    /// validation before minting against a native deposit.
    pub(crate) async fn mint_internal(&self, to: &AccountId, amount: Amount) -> LedgerResult<()> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "mint amount must be positive".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let balance = state.balances.get(to).copied().unwrap_or_default();
        let new_balance = balance.checked_add(amount).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("minting {} to {} overflows its balance", amount, to))
        })?;
        let new_minted = state.total_minted.checked_add(amount).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("minting {} overflows total supply", amount))
        })?;
        state.balances.insert(to.clone(), new_balance);
        state.total_minted = new_minted;
        drop(state);

        debug!(%to, %amount, "mint applied");
        Ok(())
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// The caller must be the holder of `from`, or hold the RewardIssuer
    /// role (the system payout path, where `from` is the treasury).
    pub async fn transfer(
        &self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> LedgerResult<()> {
        if caller != from && !self.access.has_role(caller, Role::RewardIssuer).await {
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                from: from.clone(),
            });
        }
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "transfer amount must be positive".to_string(),
            ));
        }
        if from == to {
            return Err(LedgerError::InvalidAmount(format!(
                "cannot transfer from {} to itself",
                from
            )));
        }

        let mut state = self.state.write().await;
        let from_balance = state.balances.get(from).copied().unwrap_or_default();
        let new_from = from_balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: from.clone(),
                balance: from_balance,
                needed: amount,
            })?;
        let to_balance = state.balances.get(to).copied().unwrap_or_default();
        let new_to = to_balance.checked_add(amount).ok_or_else(|| {
            LedgerError::InvalidAmount(format!(
                "transferring {} to {} overflows its balance",
                amount, to
            ))
        })?;
        state.balances.insert(from.clone(), new_from);
        state.balances.insert(to.clone(), new_to);
        drop(state);

        debug!(%from, %to, %amount, "transfer applied");
        self.events
            .emit(Event::TokensTransferred {
                by: caller.clone(),
                from: from.clone(),
                to: to.clone(),
                amount,
            })
            .await;
        Ok(())
    }

    /// Move `amount` from the caller into the treasury, earmarking it for
    /// reward payouts.
    pub async fn fund_treasury(&self, caller: &AccountId, amount: Amount) -> LedgerResult<()> {
        let treasury = self.treasury.clone();
        self.transfer(caller, caller, &treasury, amount).await
    }

    /// Toggle the RewardIssuer role for `account`. Admin only.
    pub async fn set_reward_issuer(
        &self,
        caller: &AccountId,
        account: &AccountId,
        enabled: bool,
    ) -> LedgerResult<()> {
        if enabled {
            self.access
                .grant(caller, account, Role::RewardIssuer)
                .await?;
        } else {
            self.access
                .revoke(caller, account, Role::RewardIssuer)
                .await?;
        }
        Ok(())
    }

    /// Current balance of `account`. Accounts without an entry read as zero.
    pub async fn balance_of(&self, account: &AccountId) -> Amount {
        self.state
            .read()
            .await
            .balances
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    /// Total tokens minted so far
    pub async fn total_supply(&self) -> Amount {
        self.state.read().await.total_minted
    }

    /// Snapshot of the full balance table
    pub async fn balances(&self) -> HashMap<AccountId, Amount> {
        self.state.read().await.balances.clone()
    }

    /// Consistent snapshot of balances and supply under one read guard,
    /// for the external persistence collaborator.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read().await;
        LedgerSnapshot {
            balances: state.balances.clone(),
            total_minted: state.total_minted,
        }
    }
}
