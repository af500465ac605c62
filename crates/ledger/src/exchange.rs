//! Fixed-rate native-value to token exchange.
//!
//! Converts a native-value deposit into ledger tokens at an admin-set rate.
//! There is no reverse token-to-native path. The exchange depends only on
//! the Balance Ledger, minting through its crate-internal path so the public
//! admin-only `mint` stays narrow.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use merit_access::{AccessControl, Role};
use merit_core::{AccountId, Amount, Event, EventSink};

use crate::ledger::TokenLedger;
use crate::{LedgerError, LedgerResult};

/// Native-value to token exchange at a fixed, admin-mutable rate
/// (tokens minted per unit of native value deposited).
pub struct Exchange {
    ledger: Arc<TokenLedger>,
    access: Arc<AccessControl>,
    rate: RwLock<u64>,
    events: Arc<dyn EventSink>,
}

impl Exchange {
    /// Create an exchange with a positive initial rate
    pub fn new(
        ledger: Arc<TokenLedger>,
        access: Arc<AccessControl>,
        initial_rate: u64,
        events: Arc<dyn EventSink>,
    ) -> LedgerResult<Self> {
        if initial_rate == 0 {
            return Err(LedgerError::InvalidRate(
                "exchange rate must be positive".to_string(),
            ));
        }
        Ok(Self {
            ledger,
            access,
            rate: RwLock::new(initial_rate),
            events,
        })
    }

    /// Current rate
    pub async fn rate(&self) -> u64 {
        *self.rate.read().await
    }

    /// Mint `native_amount * rate` tokens to the caller's balance
    pub async fn deposit_for_tokens(
        &self,
        caller: &AccountId,
        native_amount: u64,
    ) -> LedgerResult<Amount> {
        if native_amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "deposit must be positive".to_string(),
            ));
        }
        let rate = *self.rate.read().await;
        let tokens = native_amount
            .checked_mul(rate)
            .map(Amount::new)
            .ok_or_else(|| {
                LedgerError::InvalidAmount(format!(
                    "deposit of {} at rate {} overflows",
                    native_amount, rate
                ))
            })?;

        self.ledger.mint_internal(caller, tokens).await?;

        info!(%caller, native_amount, %tokens, "tokens purchased");
        self.events
            .emit(Event::TokensPurchased {
                by: caller.clone(),
                native_amount,
                amount: tokens,
            })
            .await;
        Ok(tokens)
    }

    /// Change the rate. Admin only; zero is rejected.
    pub async fn set_rate(&self, caller: &AccountId, new_rate: u64) -> LedgerResult<()> {
        self.access.require_role(caller, Role::Admin).await?;
        if new_rate == 0 {
            return Err(LedgerError::InvalidRate(
                "exchange rate must be positive".to_string(),
            ));
        }

        *self.rate.write().await = new_rate;

        info!(rate = new_rate, "exchange rate changed");
        self.events
            .emit(Event::RateChanged {
                by: caller.clone(),
                rate: new_rate,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merit_core::MemorySink;

    fn setup(rate: u64) -> (Exchange, Arc<TokenLedger>, AccountId) {
        let admin = AccountId::from("admin");
        let events: Arc<dyn EventSink> = Arc::new(MemorySink::new());
        let access = Arc::new(AccessControl::new(admin.clone(), events.clone()));
        let ledger = Arc::new(TokenLedger::new(
            AccountId::from("treasury"),
            access.clone(),
            events.clone(),
        ));
        let exchange = Exchange::new(ledger.clone(), access, rate, events).unwrap();
        (exchange, ledger, admin)
    }

    #[tokio::test]
    async fn test_deposit_mints_at_rate() {
        let (exchange, ledger, _admin) = setup(100);
        let buyer = AccountId::from("buyer");

        let minted = exchange.deposit_for_tokens(&buyer, 7).await.unwrap();
        assert_eq!(minted, Amount::new(700));
        assert_eq!(ledger.balance_of(&buyer).await, Amount::new(700));
        assert_eq!(ledger.total_supply().await, Amount::new(700));
    }

    #[tokio::test]
    async fn test_zero_deposit_rejected() {
        let (exchange, ledger, _admin) = setup(100);
        let buyer = AccountId::from("buyer");

        let result = exchange.deposit_for_tokens(&buyer, 0).await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
        assert!(ledger.total_supply().await.is_zero());
    }

    #[tokio::test]
    async fn test_overflowing_deposit_rejected() {
        let (exchange, ledger, _admin) = setup(1_000);
        let buyer = AccountId::from("buyer");

        let result = exchange.deposit_for_tokens(&buyer, u64::MAX / 2).await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
        assert!(ledger.total_supply().await.is_zero());
    }

    #[tokio::test]
    async fn test_set_rate_admin_only() {
        let (exchange, _ledger, admin) = setup(100);
        let buyer = AccountId::from("buyer");

        assert!(matches!(
            exchange.set_rate(&buyer, 50).await,
            Err(LedgerError::Access(_))
        ));
        assert!(matches!(
            exchange.set_rate(&admin, 0).await,
            Err(LedgerError::InvalidRate(_))
        ));

        exchange.set_rate(&admin, 50).await.unwrap();
        assert_eq!(exchange.rate().await, 50);

        let minted = exchange.deposit_for_tokens(&buyer, 2).await.unwrap();
        assert_eq!(minted, Amount::new(100));
    }

    #[tokio::test]
    async fn test_zero_initial_rate_rejected() {
        let admin = AccountId::from("admin");
        let events: Arc<dyn EventSink> = Arc::new(MemorySink::new());
        let access = Arc::new(AccessControl::new(admin, events.clone()));
        let ledger = Arc::new(TokenLedger::new(
            AccountId::from("treasury"),
            access.clone(),
            events.clone(),
        ));

        let result = Exchange::new(ledger, access, 0, events);
        assert!(matches!(result, Err(LedgerError::InvalidRate(_))));
    }
}
