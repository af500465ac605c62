//! Shared types for the merit incentive ledger.
//!
//! This crate holds the vocabulary every other merit crate speaks: account
//! identities, token amounts in the smallest unit, and the audit event
//! side-channel that surfaces every state transition to external indexers.

pub mod events;
pub mod types;
pub mod utils;

pub use events::{Event, EventSink, MemorySink, TracingSink};
pub use types::{AccountId, Amount};
pub use utils::timestamp_secs;
