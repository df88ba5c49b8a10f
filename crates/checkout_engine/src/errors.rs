//! Checkout error types.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Reward not found: {0}")]
    RewardNotFound(u64),

    #[error("Reward {0} is no longer available")]
    RewardUnavailable(u64),

    #[error("No reward selected")]
    NoRewardSelected,

    #[error("Reward {0} does not offer add-ons")]
    AddOnsNotOffered(u64),

    #[error("Add-on not found: {0}")]
    AddOnNotFound(u64),

    #[error("Add-on {add_on_id}: quantity {quantity} exceeds the limit of {max}")]
    AddOnLimitExceeded {
        add_on_id: u64,
        quantity: u32,
        max: u32,
    },

    #[error("Shipping location not found: {0}")]
    ShippingRuleNotFound(u64),

    #[error("Reward {0} requires a shipping location")]
    ShippingRuleRequired(u64),

    #[error("Pledge amount {amount} must be between {min} and {max}")]
    AmountOutOfBounds {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Missing checkout id")]
    MissingCheckoutId,

    #[error("Missing backing reference")]
    MissingBacking,

    #[error("Missing payment source")]
    MissingPaymentSource,

    #[error("Checkout is not valid: {0}")]
    InvalidCheckout(String),

    #[error("Checkout API error: {0}")]
    Api(String),

    #[error("Pledge submission was cancelled before it finished")]
    Cancelled,

    #[error("A pledge submission is already in progress")]
    SubmissionInFlight,

    #[error("This checkout has already been completed")]
    AlreadyCompleted,
}

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad user input; shown as a warning, no external call made.
    Validation,
    /// Checkout could not be attempted at all.
    Precondition,
    /// An external call failed or rejected the checkout.
    Api,
    /// The submission state does not accept another attempt.
    Conflict,
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RewardNotFound(_)
            | Self::RewardUnavailable(_)
            | Self::NoRewardSelected
            | Self::AddOnsNotOffered(_)
            | Self::AddOnNotFound(_)
            | Self::AddOnLimitExceeded { .. }
            | Self::ShippingRuleNotFound(_)
            | Self::ShippingRuleRequired(_)
            | Self::AmountOutOfBounds { .. } => ErrorKind::Validation,
            Self::MissingCheckoutId | Self::MissingBacking | Self::MissingPaymentSource => {
                ErrorKind::Precondition
            }
            Self::InvalidCheckout(_) | Self::Api(_) | Self::Cancelled => ErrorKind::Api,
            Self::SubmissionInFlight | Self::AlreadyCompleted => ErrorKind::Conflict,
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
