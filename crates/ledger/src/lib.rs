//! Fungible token ledger for the merit platform.
//!
//! The [`TokenLedger`] owns the balance table and is the only component that
//! mutates monetary state. Everything else (the course engine, the
//! deployment registry, the [`Exchange`]) decides *when* value moves and
//! calls back in through the ledger's single mutation path. Payouts are
//! transfers out of a reserved treasury account that must be pre-funded, so
//! total supply stays a simple running counter instead of something derived
//! from event replay.

use thiserror::Error;

use merit_access::AccessError;
use merit_core::{AccountId, Amount};

/// Error types for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The caller lacks the role the operation requires
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The caller may not move funds out of this account
    #[error("Unauthorized: {caller} may not transfer from {from}")]
    Unauthorized { caller: AccountId, from: AccountId },

    /// Zero or overflowing amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The source account cannot cover the requested amount
    #[error("Insufficient balance: {account} holds {balance}, needs {needed}")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        needed: Amount,
    },

    /// Zero exchange rate
    #[error("Invalid rate: {0}")]
    InvalidRate(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

pub mod exchange;
pub mod ledger;

// Re-exports
pub use exchange::Exchange;
pub use ledger::{LedgerSnapshot, TokenLedger};
