//! merit: a token-backed incentive ledger.
//!
//! Gates and rewards two kinds of user progress: completing learning courses
//! and recording verified code deployments. The Balance Ledger owns all
//! monetary state; the Course Reward Engine and Deployment Registry are
//! state machines that decide when a payout happens and trigger it through
//! the ledger, each reward paid exactly once per qualifying event.
//!
//! Every operation takes an explicit caller identity and either fully
//! applies or fully fails; persistence, transport, and signing are external
//! collaborators.

// Re-export the core types from the member crates
pub use merit_access::{AccessControl, AccessError, Role};
pub use merit_core::{AccountId, Amount, Event, EventSink, MemorySink, TracingSink};
pub use merit_courses::{
    Course, CourseEngine, CourseError, Enrollment, EnrollmentStatus, NewCourse,
};
pub use merit_deployments::{
    Developer, DeploymentError, DeploymentRecord, DeploymentRegistry, PlatformStats, RewardPolicy,
};
pub use merit_ledger::{Exchange, LedgerError, LedgerSnapshot, TokenLedger};

pub mod platform;

pub use platform::{Platform, PlatformConfig};
