//! Course Reward Engine for the merit platform.
//!
//! Owns the course catalog and the per-`(student, course)` enrollment state
//! machine `Enrolled -> InProgress -> Completed -> Claimed`. On a successful
//! claim it triggers exactly one payout through the Balance Ledger: the
//! claim flag flips before the transfer and rolls back if the transfer
//! fails, so overlapping claim attempts can never pay twice.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use merit_access::AccessError;
use merit_core::{AccountId, Amount};
use merit_ledger::LedgerError;

/// Errors from the course reward engine
#[derive(Error, Debug)]
pub enum CourseError {
    /// The caller lacks the role the operation requires
    #[error(transparent)]
    Access(#[from] AccessError),

    /// A ledger mutation failed (insufficient balance, bad amount)
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A course with this id already exists
    #[error("Duplicate course id: {0}")]
    DuplicateCourseId(String),

    /// Courses must carry a positive completion reward
    #[error("Invalid reward for course {0}: reward must be positive")]
    InvalidReward(String),

    /// No course with this id
    #[error("Course not found: {0}")]
    CourseNotFound(String),

    /// The course no longer accepts enrollments
    #[error("Course is inactive: {0}")]
    CourseInactive(String),

    /// One enrollment per `(student, course)` pair
    #[error("{student} is already enrolled in course {course_id}")]
    AlreadyEnrolled {
        student: AccountId,
        course_id: String,
    },

    /// No enrollment record for this `(student, course)` pair
    #[error("{student} is not enrolled in course {course_id}")]
    NotEnrolled {
        student: AccountId,
        course_id: String,
    },

    /// Progress is monotonic and capped at 100
    #[error(
        "Invalid progress update to {requested}% for course {course_id}: current is {current}%"
    )]
    InvalidProgress {
        course_id: String,
        current: u8,
        requested: u8,
    },

    /// Claiming requires a completed course
    #[error("{student} has not completed course {course_id}")]
    NotCompleted {
        student: AccountId,
        course_id: String,
    },

    /// The reward for this enrollment was already paid out
    #[error("{student} already claimed the reward for course {course_id}")]
    AlreadyClaimed {
        student: AccountId,
        course_id: String,
    },
}

/// Result type for course operations
pub type CourseResult<T> = Result<T, CourseError>;

/// A catalog entry. Immutable once created except for the `active` toggle,
/// which soft-deletes the course: it stops new enrollments without touching
/// existing ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Unique course identifier, chosen by the instructor
    pub id: String,
    /// Course title
    pub title: String,
    /// Course description
    pub description: String,
    /// Tokens paid out on a successful claim
    pub reward_amount: Amount,
    /// Enrollment price; zero means free
    pub price: Amount,
    /// Nominal course duration in seconds
    pub duration_secs: u64,
    /// The instructor who created the course
    pub instructor: AccountId,
    /// Optional designated grader allowed to update progress
    pub grader: Option<AccountId>,
    /// Whether the course accepts new enrollments
    pub active: bool,
    /// When the course was created
    pub created_at: u64,
}

/// Parameters for creating a course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward_amount: Amount,
    pub price: Amount,
    pub duration_secs: u64,
    pub grader: Option<AccountId>,
}

/// State of one `(student, course)` enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    /// Enrolled, no progress yet
    Enrolled,
    /// Progress strictly between 0 and 100
    InProgress,
    /// Progress reached 100, reward not yet claimed
    Completed,
    /// Reward paid out
    Claimed,
}

/// Per-`(student, course)` progress record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub student: AccountId,
    pub course_id: String,
    pub started_at: u64,
    /// Monotonically non-decreasing, 0..=100
    pub progress_percent: u8,
    pub status: EnrollmentStatus,
    /// Flips true exactly once, on a successful claim
    pub reward_claimed: bool,
    pub updated_at: u64,
}

pub mod engine;

// Re-exports
pub use engine::CourseEngine;
