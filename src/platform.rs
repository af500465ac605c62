//! Wiring helper that assembles a full platform instance.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use merit_access::AccessControl;
use merit_core::{AccountId, EventSink};
use merit_courses::CourseEngine;
use merit_deployments::{DeploymentRegistry, RewardPolicy};
use merit_ledger::{Exchange, TokenLedger};

/// Accounts and parameters a platform instance is bootstrapped with
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Bootstrap admin; the only identity with any role at startup
    pub admin: AccountId,
    /// Reserved account funding reward payouts
    pub treasury: AccountId,
    /// Identity the course engine pays rewards under
    pub course_service: AccountId,
    /// Identity the deployment registry pays rewards under
    pub deployment_service: AccountId,
    /// Tokens minted per unit of native value deposited
    pub exchange_rate: u64,
    /// Deployment reward coefficients
    pub reward_policy: RewardPolicy,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            admin: AccountId::from("admin"),
            treasury: AccountId::from("treasury"),
            course_service: AccountId::from("course-service"),
            deployment_service: AccountId::from("deployment-service"),
            exchange_rate: 1_000,
            reward_policy: RewardPolicy::default(),
        }
    }
}

/// One fully wired platform: a single ledger/registry pair shared by every
/// engine.
pub struct Platform {
    pub access: Arc<AccessControl>,
    pub ledger: Arc<TokenLedger>,
    pub exchange: Arc<Exchange>,
    pub courses: Arc<CourseEngine>,
    pub deployments: Arc<DeploymentRegistry>,
}

impl Platform {
    /// Construct every component against one authorization registry and one
    /// ledger, then authorize the two service accounts to issue rewards.
    pub async fn bootstrap(
        config: PlatformConfig,
        events: Arc<dyn EventSink>,
    ) -> anyhow::Result<Self> {
        let access = Arc::new(AccessControl::new(config.admin.clone(), events.clone()));
        let ledger = Arc::new(TokenLedger::new(
            config.treasury.clone(),
            access.clone(),
            events.clone(),
        ));
        let exchange = Arc::new(
            Exchange::new(
                ledger.clone(),
                access.clone(),
                config.exchange_rate,
                events.clone(),
            )
            .context("creating exchange")?,
        );
        let courses = Arc::new(CourseEngine::new(
            config.course_service.clone(),
            access.clone(),
            ledger.clone(),
            events.clone(),
        ));
        let deployments = Arc::new(DeploymentRegistry::new(
            config.deployment_service.clone(),
            config.reward_policy,
            access.clone(),
            ledger.clone(),
            events,
        ));

        ledger
            .set_reward_issuer(&config.admin, &config.course_service, true)
            .await
            .context("authorizing course payouts")?;
        ledger
            .set_reward_issuer(&config.admin, &config.deployment_service, true)
            .await
            .context("authorizing deployment payouts")?;

        info!(
            admin = %config.admin,
            treasury = %config.treasury,
            exchange_rate = config.exchange_rate,
            "platform bootstrapped"
        );
        Ok(Self {
            access,
            ledger,
            exchange,
            courses,
            deployments,
        })
    }
}
