//! Audit event side-channel.
//!
//! Every state transition in the merit core is surfaced as an [`Event`]
//! tagged with the acting identity and the affected entity keys. The core
//! emits these through an [`EventSink`] handle and never depends on anyone
//! consuming them; persistence and indexing are external collaborators.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::types::{AccountId, Amount};

/// An observable state transition in the merit core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A role was granted to an account
    RoleGranted {
        by: AccountId,
        account: AccountId,
        role: String,
    },
    /// A role was revoked from an account
    RoleRevoked {
        by: AccountId,
        account: AccountId,
        role: String,
    },
    /// New tokens were minted to an account
    TokensMinted {
        by: AccountId,
        to: AccountId,
        amount: Amount,
    },
    /// Tokens moved between two accounts
    TokensTransferred {
        by: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    /// Tokens were minted against a native-value deposit
    TokensPurchased {
        by: AccountId,
        native_amount: u64,
        amount: Amount,
    },
    /// The exchange rate was changed
    RateChanged { by: AccountId, rate: u64 },
    /// A course was added to the catalog
    CourseCreated { by: AccountId, course_id: String },
    /// A course was activated or deactivated
    CourseActivation {
        by: AccountId,
        course_id: String,
        active: bool,
    },
    /// A student enrolled in a course
    StudentEnrolled {
        student: AccountId,
        course_id: String,
    },
    /// A student's course progress was updated
    ProgressUpdated {
        by: AccountId,
        student: AccountId,
        course_id: String,
        percent: u8,
    },
    /// A completed course was converted into a payout
    RewardClaimed {
        student: AccountId,
        course_id: String,
        amount: Amount,
    },
    /// A developer registered with the platform
    DeveloperRegistered { developer: AccountId, name: String },
    /// A deployment was recorded and its reward paid
    DeploymentRecorded {
        developer: AccountId,
        deployment_id: u64,
        contract_address: String,
        reward: Amount,
    },
    /// A recorded deployment was marked verified
    DeploymentVerified { by: AccountId, deployment_id: u64 },
}

/// A sink for audit events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit a single event
    async fn emit(&self, event: Event);
}

/// Default sink: writes each event to the `tracing` log stream.
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "merit::events", "{}", json),
            Err(_) => info!(target: "merit::events", "{:?}", event),
        }
    }
}

/// Sink that records events in memory, in emission order.
///
/// Used by tests and by external indexers that drain the buffer themselves.
#[derive(Default)]
pub struct MemorySink {
    events: RwLock<Vec<Event>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events
    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    /// Number of recorded events
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether no events have been recorded
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn emit(&self, event: Event) {
        self.events.write().await.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty().await);

        sink.emit(Event::RateChanged {
            by: AccountId::from("admin"),
            rate: 100,
        })
        .await;
        sink.emit(Event::TokensMinted {
            by: AccountId::from("admin"),
            to: AccountId::from("treasury"),
            amount: Amount::new(1_000),
        })
        .await;

        let events = sink.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::RateChanged { rate: 100, .. }));
        assert!(matches!(events[1], Event::TokensMinted { .. }));
    }

    #[test]
    fn test_event_serialization_tags_kind() {
        let event = Event::StudentEnrolled {
            student: AccountId::from("alice"),
            course_id: "RUST_BASICS".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"student_enrolled\""));
        assert!(json.contains("RUST_BASICS"));
    }
}
