//! Checkout ledger rows.
//!
//! Amounts are stored as decimal strings so no precision is lost in SQLite.

use checkout_engine::{SubmissionResult, SubmitRequest};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ServiceError};

/// A completed checkout, ready to be stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCheckoutRecord {
    pub checkout_id: String,
    pub backing_id: String,
    pub project_id: String,
    pub reward_id: i64,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub requires_action: bool,
}

impl NewCheckoutRecord {
    pub fn from_submission(
        reward_id: u64,
        request: &SubmitRequest,
        result: &SubmissionResult,
    ) -> Result<Self> {
        let reward_id = i64::try_from(reward_id).map_err(|_| {
            ServiceError::InvalidRecord(format!("reward id {reward_id} does not fit the ledger"))
        })?;
        Ok(Self {
            checkout_id: result.checkout_id.clone(),
            backing_id: result.backing_id.clone(),
            project_id: request.project_id.clone(),
            reward_id,
            amount: request.amount.to_string(),
            currency: request.currency.clone(),
            status: result.status.as_str().to_string(),
            requires_action: !result.should_show_success,
        })
    }
}

/// A checkout record as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckoutRecord {
    pub id: i64,
    pub checkout_id: String,
    pub backing_id: String,
    pub project_id: String,
    pub reward_id: i64,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub requires_action: bool,
    pub created_at: i64,
}
