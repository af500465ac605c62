//! Course Reward Engine implementation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use merit_access::{AccessControl, Role};
use merit_core::{timestamp_secs, AccountId, Amount, Event, EventSink};
use merit_ledger::TokenLedger;

use crate::{Course, CourseError, CourseResult, Enrollment, EnrollmentStatus, NewCourse};

/// The course catalog and enrollment state machine.
///
/// Decides when a payout happens; the Balance Ledger is the only component
/// that actually moves funds. Payouts run under the engine's service
/// account, which an admin must authorize as a reward issuer.
pub struct CourseEngine {
    /// Course catalog by course id
    courses: RwLock<HashMap<String, Course>>,
    /// Enrollment records by `(student, course_id)`
    enrollments: RwLock<HashMap<(AccountId, String), Enrollment>>,
    /// Identity the engine acts under when paying out of the treasury
    service_account: AccountId,
    access: Arc<AccessControl>,
    ledger: Arc<TokenLedger>,
    events: Arc<dyn EventSink>,
}

impl CourseEngine {
    /// Create an engine with an empty catalog
    pub fn new(
        service_account: AccountId,
        access: Arc<AccessControl>,
        ledger: Arc<TokenLedger>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            courses: RwLock::new(HashMap::new()),
            enrollments: RwLock::new(HashMap::new()),
            service_account,
            access,
            ledger,
            events,
        }
    }

    /// Add a course to the catalog. Instructor only.
    pub async fn create_course(
        &self,
        caller: &AccountId,
        course: NewCourse,
    ) -> CourseResult<Course> {
        self.access.require_role(caller, Role::Instructor).await?;
        if course.reward_amount.is_zero() {
            return Err(CourseError::InvalidReward(course.id));
        }

        let mut courses = self.courses.write().await;
        if courses.contains_key(&course.id) {
            return Err(CourseError::DuplicateCourseId(course.id));
        }
        let record = Course {
            id: course.id,
            title: course.title,
            description: course.description,
            reward_amount: course.reward_amount,
            price: course.price,
            duration_secs: course.duration_secs,
            instructor: caller.clone(),
            grader: course.grader,
            active: true,
            created_at: timestamp_secs(),
        };
        courses.insert(record.id.clone(), record.clone());
        drop(courses);

        info!(course_id = %record.id, %caller, "course created");
        self.events
            .emit(Event::CourseCreated {
                by: caller.clone(),
                course_id: record.id.clone(),
            })
            .await;
        Ok(record)
    }

    /// Soft-delete or reactivate a course. Instructor only. Existing
    /// enrollments keep progressing either way.
    pub async fn set_course_active(
        &self,
        caller: &AccountId,
        course_id: &str,
        active: bool,
    ) -> CourseResult<()> {
        self.access.require_role(caller, Role::Instructor).await?;

        let mut courses = self.courses.write().await;
        let course = courses
            .get_mut(course_id)
            .ok_or_else(|| CourseError::CourseNotFound(course_id.to_string()))?;
        course.active = active;
        drop(courses);

        info!(course_id, active, "course activation changed");
        self.events
            .emit(Event::CourseActivation {
                by: caller.clone(),
                course_id: course_id.to_string(),
                active,
            })
            .await;
        Ok(())
    }

    /// Enroll the caller in a course.
    ///
    /// Priced courses debit the student up front; the progress record is
    /// only created after the debit succeeds, so a failed payment leaves no
    /// trace of the enrollment.
    pub async fn enroll(&self, caller: &AccountId, course_id: &str) -> CourseResult<Enrollment> {
        let price = {
            let courses = self.courses.read().await;
            let course = courses
                .get(course_id)
                .ok_or_else(|| CourseError::CourseNotFound(course_id.to_string()))?;
            if !course.active {
                return Err(CourseError::CourseInactive(course_id.to_string()));
            }
            course.price
        };

        let mut enrollments = self.enrollments.write().await;
        let key = (caller.clone(), course_id.to_string());
        if enrollments.contains_key(&key) {
            return Err(CourseError::AlreadyEnrolled {
                student: caller.clone(),
                course_id: course_id.to_string(),
            });
        }

        if !price.is_zero() {
            let treasury = self.ledger.treasury().clone();
            self.ledger.transfer(caller, caller, &treasury, price).await?;
        }

        let now = timestamp_secs();
        let record = Enrollment {
            student: caller.clone(),
            course_id: course_id.to_string(),
            started_at: now,
            progress_percent: 0,
            status: EnrollmentStatus::Enrolled,
            reward_claimed: false,
            updated_at: now,
        };
        enrollments.insert(key, record.clone());
        drop(enrollments);

        info!(student = %caller, course_id, %price, "student enrolled");
        self.events
            .emit(Event::StudentEnrolled {
                student: caller.clone(),
                course_id: course_id.to_string(),
            })
            .await;
        Ok(record)
    }

    /// Update a student's progress. Callable by any instructor or by the
    /// course's designated grader. Progress never decreases and never
    /// exceeds 100; reaching 100 completes the course.
    pub async fn update_progress(
        &self,
        caller: &AccountId,
        student: &AccountId,
        course_id: &str,
        percent: u8,
    ) -> CourseResult<Enrollment> {
        let is_grader = {
            let courses = self.courses.read().await;
            let course = courses
                .get(course_id)
                .ok_or_else(|| CourseError::CourseNotFound(course_id.to_string()))?;
            course.grader.as_ref() == Some(caller)
        };
        if !is_grader {
            self.access.require_role(caller, Role::Instructor).await?;
        }

        let mut enrollments = self.enrollments.write().await;
        let key = (student.clone(), course_id.to_string());
        let record = enrollments
            .get_mut(&key)
            .ok_or_else(|| CourseError::NotEnrolled {
                student: student.clone(),
                course_id: course_id.to_string(),
            })?;

        if percent > 100 || percent < record.progress_percent {
            return Err(CourseError::InvalidProgress {
                course_id: course_id.to_string(),
                current: record.progress_percent,
                requested: percent,
            });
        }

        record.progress_percent = percent;
        if record.status != EnrollmentStatus::Claimed {
            record.status = if percent == 100 {
                EnrollmentStatus::Completed
            } else if percent > 0 {
                EnrollmentStatus::InProgress
            } else {
                EnrollmentStatus::Enrolled
            };
        }
        record.updated_at = timestamp_secs();
        let updated = record.clone();
        drop(enrollments);

        debug!(student = %student, course_id, percent, "progress updated");
        self.events
            .emit(Event::ProgressUpdated {
                by: caller.clone(),
                student: student.clone(),
                course_id: course_id.to_string(),
                percent,
            })
            .await;
        Ok(updated)
    }

    /// Convert a completed course into a token payout. Callable by the
    /// student only; pays exactly once per `(student, course)` pair.
    ///
    /// The claim flag flips before the treasury transfer, and a failed
    /// transfer rolls the flip back. The enrollment write guard is held
    /// across both steps, so no other operation observes the intermediate
    /// state.
    pub async fn claim_reward(&self, caller: &AccountId, course_id: &str) -> CourseResult<Amount> {
        let reward = {
            let courses = self.courses.read().await;
            courses
                .get(course_id)
                .ok_or_else(|| CourseError::CourseNotFound(course_id.to_string()))?
                .reward_amount
        };

        let mut enrollments = self.enrollments.write().await;
        let key = (caller.clone(), course_id.to_string());
        {
            let record = enrollments
                .get_mut(&key)
                .ok_or_else(|| CourseError::NotEnrolled {
                    student: caller.clone(),
                    course_id: course_id.to_string(),
                })?;

            if record.reward_claimed {
                return Err(CourseError::AlreadyClaimed {
                    student: caller.clone(),
                    course_id: course_id.to_string(),
                });
            }
            if record.status != EnrollmentStatus::Completed {
                return Err(CourseError::NotCompleted {
                    student: caller.clone(),
                    course_id: course_id.to_string(),
                });
            }

            record.reward_claimed = true;
            record.status = EnrollmentStatus::Claimed;
            record.updated_at = timestamp_secs();
        }

        let treasury = self.ledger.treasury().clone();
        if let Err(err) = self
            .ledger
            .transfer(&self.service_account, &treasury, caller, reward)
            .await
        {
            // Payout failed: roll the claim back so the student can retry
            // once the treasury is funded.
            if let Some(record) = enrollments.get_mut(&key) {
                record.reward_claimed = false;
                record.status = EnrollmentStatus::Completed;
            }
            warn!(student = %caller, course_id, %err, "reward payout failed, claim rolled back");
            return Err(err.into());
        }
        drop(enrollments);

        info!(student = %caller, course_id, %reward, "course reward claimed");
        self.events
            .emit(Event::RewardClaimed {
                student: caller.clone(),
                course_id: course_id.to_string(),
                amount: reward,
            })
            .await;
        Ok(reward)
    }

    /// Look up a course by id
    pub async fn get_course(&self, course_id: &str) -> Option<Course> {
        self.courses.read().await.get(course_id).cloned()
    }

    /// All course ids in the catalog
    pub async fn course_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.courses.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Look up one enrollment record
    pub async fn get_enrollment(
        &self,
        student: &AccountId,
        course_id: &str,
    ) -> Option<Enrollment> {
        self.enrollments
            .read()
            .await
            .get(&(student.clone(), course_id.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merit_core::MemorySink;
    use merit_ledger::LedgerError;

    struct TestEnv {
        admin: AccountId,
        instructor: AccountId,
        engine: CourseEngine,
        ledger: Arc<TokenLedger>,
    }

    async fn setup() -> TestEnv {
        let admin = AccountId::from("admin");
        let instructor = AccountId::from("instructor");
        let service = AccountId::from("course-service");
        let events: Arc<dyn EventSink> = Arc::new(MemorySink::new());
        let access = Arc::new(AccessControl::new(admin.clone(), events.clone()));
        let ledger = Arc::new(TokenLedger::new(
            AccountId::from("treasury"),
            access.clone(),
            events.clone(),
        ));

        access
            .grant(&admin, &instructor, Role::Instructor)
            .await
            .unwrap();
        ledger
            .set_reward_issuer(&admin, &service, true)
            .await
            .unwrap();

        let engine = CourseEngine::new(service, access, ledger.clone(), events);
        TestEnv {
            admin,
            instructor,
            engine,
            ledger,
        }
    }

    fn course(id: &str, reward: u64, price: u64) -> NewCourse {
        NewCourse {
            id: id.to_string(),
            title: format!("{} title", id),
            description: "A course".to_string(),
            reward_amount: Amount::new(reward),
            price: Amount::new(price),
            duration_secs: 3600 * 24 * 7,
            grader: None,
        }
    }

    async fn fund_treasury(env: &TestEnv, amount: u64) {
        let treasury = env.ledger.treasury().clone();
        env.ledger
            .mint(&env.admin, &treasury, Amount::new(amount))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_course_requires_instructor() {
        let env = setup().await;
        let result = env
            .engine
            .create_course(&AccountId::from("rando"), course("C1", 100, 0))
            .await;
        assert!(matches!(result, Err(CourseError::Access(_))));
    }

    #[tokio::test]
    async fn test_create_course_rejects_duplicates_and_zero_reward() {
        let env = setup().await;

        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        assert!(matches!(
            env.engine
                .create_course(&env.instructor, course("C1", 200, 0))
                .await,
            Err(CourseError::DuplicateCourseId(_))
        ));
        assert!(matches!(
            env.engine
                .create_course(&env.instructor, course("C2", 0, 0))
                .await,
            Err(CourseError::InvalidReward(_))
        ));
    }

    #[tokio::test]
    async fn test_enroll_creates_record_at_zero() {
        let env = setup().await;
        let student = AccountId::from("alice");

        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        let record = env.engine.enroll(&student, "C1").await.unwrap();

        assert_eq!(record.progress_percent, 0);
        assert_eq!(record.status, EnrollmentStatus::Enrolled);
        assert!(!record.reward_claimed);
    }

    #[tokio::test]
    async fn test_no_reenrollment() {
        let env = setup().await;
        let student = AccountId::from("alice");

        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        env.engine.enroll(&student, "C1").await.unwrap();
        assert!(matches!(
            env.engine.enroll(&student, "C1").await,
            Err(CourseError::AlreadyEnrolled { .. })
        ));
    }

    #[tokio::test]
    async fn test_inactive_course_rejects_enrollment() {
        let env = setup().await;
        let student = AccountId::from("alice");

        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        env.engine
            .set_course_active(&env.instructor, "C1", false)
            .await
            .unwrap();
        assert!(matches!(
            env.engine.enroll(&student, "C1").await,
            Err(CourseError::CourseInactive(_))
        ));
    }

    #[tokio::test]
    async fn test_priced_enrollment_debits_student() {
        let env = setup().await;
        let student = AccountId::from("alice");

        env.engine
            .create_course(&env.instructor, course("C1", 100, 40))
            .await
            .unwrap();
        env.ledger
            .mint(&env.admin, &student, Amount::new(50))
            .await
            .unwrap();

        env.engine.enroll(&student, "C1").await.unwrap();
        assert_eq!(env.ledger.balance_of(&student).await, Amount::new(10));
        assert_eq!(
            env.ledger.balance_of(env.ledger.treasury()).await,
            Amount::new(40)
        );
    }

    #[tokio::test]
    async fn test_priced_enrollment_is_atomic_on_insufficient_funds() {
        let env = setup().await;
        let student = AccountId::from("alice");

        env.engine
            .create_course(&env.instructor, course("C1", 100, 40))
            .await
            .unwrap();
        env.ledger
            .mint(&env.admin, &student, Amount::new(30))
            .await
            .unwrap();

        let result = env.engine.enroll(&student, "C1").await;
        assert!(matches!(
            result,
            Err(CourseError::Ledger(LedgerError::InsufficientBalance { .. }))
        ));
        // No record, no balance change.
        assert!(env.engine.get_enrollment(&student, "C1").await.is_none());
        assert_eq!(env.ledger.balance_of(&student).await, Amount::new(30));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let env = setup().await;
        let student = AccountId::from("alice");

        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        env.engine.enroll(&student, "C1").await.unwrap();

        let record = env
            .engine
            .update_progress(&env.instructor, &student, "C1", 60)
            .await
            .unwrap();
        assert_eq!(record.status, EnrollmentStatus::InProgress);

        assert!(matches!(
            env.engine
                .update_progress(&env.instructor, &student, "C1", 40)
                .await,
            Err(CourseError::InvalidProgress { current: 60, .. })
        ));
        assert!(matches!(
            env.engine
                .update_progress(&env.instructor, &student, "C1", 101)
                .await,
            Err(CourseError::InvalidProgress { .. })
        ));

        let record = env
            .engine
            .update_progress(&env.instructor, &student, "C1", 100)
            .await
            .unwrap();
        assert_eq!(record.status, EnrollmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_designated_grader_may_update_progress() {
        let env = setup().await;
        let student = AccountId::from("alice");
        let grader = AccountId::from("grader");

        let mut new_course = course("C1", 100, 0);
        new_course.grader = Some(grader.clone());
        env.engine
            .create_course(&env.instructor, new_course)
            .await
            .unwrap();
        env.engine.enroll(&student, "C1").await.unwrap();

        // The grader holds no role but is designated on the course.
        env.engine
            .update_progress(&grader, &student, "C1", 50)
            .await
            .unwrap();

        // A third party with neither standing is refused.
        assert!(matches!(
            env.engine
                .update_progress(&AccountId::from("rando"), &student, "C1", 60)
                .await,
            Err(CourseError::Access(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_pays_once() {
        let env = setup().await;
        let student = AccountId::from("alice");

        fund_treasury(&env, 1_000).await;
        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        env.engine.enroll(&student, "C1").await.unwrap();
        env.engine
            .update_progress(&env.instructor, &student, "C1", 100)
            .await
            .unwrap();

        let paid = env.engine.claim_reward(&student, "C1").await.unwrap();
        assert_eq!(paid, Amount::new(100));
        assert_eq!(env.ledger.balance_of(&student).await, Amount::new(100));

        // Second claim is refused and pays nothing.
        assert!(matches!(
            env.engine.claim_reward(&student, "C1").await,
            Err(CourseError::AlreadyClaimed { .. })
        ));
        assert_eq!(env.ledger.balance_of(&student).await, Amount::new(100));
    }

    #[tokio::test]
    async fn test_claim_requires_completion() {
        let env = setup().await;
        let student = AccountId::from("alice");

        fund_treasury(&env, 1_000).await;
        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        env.engine.enroll(&student, "C1").await.unwrap();
        env.engine
            .update_progress(&env.instructor, &student, "C1", 99)
            .await
            .unwrap();

        assert!(matches!(
            env.engine.claim_reward(&student, "C1").await,
            Err(CourseError::NotCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_payout_rolls_back_claim() {
        let env = setup().await;
        let student = AccountId::from("alice");

        // Treasury deliberately unfunded.
        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        env.engine.enroll(&student, "C1").await.unwrap();
        env.engine
            .update_progress(&env.instructor, &student, "C1", 100)
            .await
            .unwrap();

        let result = env.engine.claim_reward(&student, "C1").await;
        assert!(matches!(
            result,
            Err(CourseError::Ledger(LedgerError::InsufficientBalance { .. }))
        ));

        let record = env.engine.get_enrollment(&student, "C1").await.unwrap();
        assert!(!record.reward_claimed);
        assert_eq!(record.status, EnrollmentStatus::Completed);

        // Funding the treasury makes the retry succeed.
        fund_treasury(&env, 1_000).await;
        let paid = env.engine.claim_reward(&student, "C1").await.unwrap();
        assert_eq!(paid, Amount::new(100));
    }

    #[tokio::test]
    async fn test_deactivation_leaves_existing_enrollments_running() {
        let env = setup().await;
        let student = AccountId::from("alice");

        fund_treasury(&env, 1_000).await;
        env.engine
            .create_course(&env.instructor, course("C1", 100, 0))
            .await
            .unwrap();
        env.engine.enroll(&student, "C1").await.unwrap();
        env.engine
            .set_course_active(&env.instructor, "C1", false)
            .await
            .unwrap();

        env.engine
            .update_progress(&env.instructor, &student, "C1", 100)
            .await
            .unwrap();
        let paid = env.engine.claim_reward(&student, "C1").await.unwrap();
        assert_eq!(paid, Amount::new(100));
    }
}
