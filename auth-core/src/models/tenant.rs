//! Tenant model - root of the multi-tenancy hierarchy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Length of the trial granted to self-registered and provisioned tenants.
pub const TRIAL_DAYS: i64 = 14;

/// Client-capacity quota granted on signup.
pub const TRIAL_MAX_CLIENTS: i32 = 5;

/// Subscription state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Trial,
    Active,
    Cancelled,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Trial => "trial",
            SubscriptionState::Active => "active",
            SubscriptionState::Cancelled => "cancelled",
        }
    }
}

/// Tenant entity.
#[derive(Debug, Clone, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub business_name: String,
    pub owner_email: String,
    pub phone: Option<String>,
    pub subscription_plan_code: String,
    pub subscription_state_code: String,
    pub trial_ends_utc: Option<DateTime<Utc>>,
    pub max_clients: i32,
    pub created_utc: DateTime<Utc>,
}

impl Tenant {
    /// Create a new tenant on the free plan with a 14-day trial.
    pub fn new_trial(business_name: String, owner_email: String, phone: Option<String>) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            business_name,
            owner_email,
            phone,
            subscription_plan_code: "free".to_string(),
            subscription_state_code: SubscriptionState::Trial.as_str().to_string(),
            trial_ends_utc: Some(Utc::now() + Duration::days(TRIAL_DAYS)),
            max_clients: TRIAL_MAX_CLIENTS,
            created_utc: Utc::now(),
        }
    }

    /// Non-super-admin authentication is rejected for cancelled tenants.
    pub fn is_cancelled(&self) -> bool {
        self.subscription_state_code == SubscriptionState::Cancelled.as_str()
    }
}
