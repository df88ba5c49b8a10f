//! Seams to the backend: checkout mutations and shipping rule lookups.
//!
//! The engine only consumes these traits. The service crate provides the
//! GraphQL-backed implementations; tests provide in-memory fakes.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::ShippingRule;

/// Input to `create_payment_intent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentInput {
    pub project_id: String,
    pub checkout_id: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Backend verdict on a checkout about to be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutValidation {
    pub is_valid: bool,
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Payment status reported by `complete_on_session_checkout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Successful,
    RequiresAction,
    Processing,
    Failed,
    Unknown,
}

impl CheckoutStatus {
    /// Parse the status string returned by the backend.
    pub fn from_api(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "successful" | "succeeded" => Self::Successful,
            "requires_action" => Self::RequiresAction,
            "processing" | "pending" => Self::Processing,
            "failed" | "errored" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedCheckout {
    pub status: CheckoutStatus,
    pub requires_action: bool,
}

/// A payment card saved on the viewer's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCard {
    pub id: String,
    pub last_four: String,
    pub card_type: String,
    #[serde(default)]
    pub expiration_date: Option<String>,
}

#[async_trait]
pub trait CheckoutApi: Send + Sync {
    /// Returns the client secret of a new payment intent.
    async fn create_payment_intent(&self, input: &PaymentIntentInput) -> Result<String>;

    async fn validate_checkout(
        &self,
        checkout_id: &str,
        client_secret: &str,
        payment_source_id: &str,
    ) -> Result<CheckoutValidation>;

    async fn complete_on_session_checkout(
        &self,
        checkout_id: &str,
        client_secret: &str,
        payment_source_id: Option<&str>,
        reusable: bool,
    ) -> Result<CompletedCheckout>;

    /// Returns the client secret of a new setup intent, used to save a card.
    async fn create_setup_intent(&self, project_id: Option<&str>) -> Result<String>;

    async fn stored_cards(&self) -> Result<Vec<StoredCard>>;
}

#[async_trait]
pub trait ShippingRulesSource: Send + Sync {
    async fn fetch_shipping_rules(&self, project_id: &str, reward_id: u64)
        -> Result<Vec<ShippingRule>>;
}
