//! # Checkout Engine
//!
//! The pledge checkout core of the crowdfunding client: which reward the
//! viewer backs, what the pledge adds up to, and how it is submitted.
//!
//! | Concern          | Entry point(s)                                         |
//! |------------------|--------------------------------------------------------|
//! | Reward selection | [`RewardSelectionState::select_reward`], `on_confirmation` |
//! | Totals           | [`PledgeTotalCalculator::compute`], stepper helpers    |
//! | Session store    | [`CheckoutSession`] actions + `subscribe`              |
//! | Submission       | [`CheckoutSubmissionFlow::submit`]                     |
//! | Backend seams    | [`CheckoutApi`], [`ShippingRulesSource`]               |
//!
//! ## Architecture
//!
//! [`CheckoutSession`] is the only mutable piece a screen talks to. It
//! delegates selection rules to [`rewards`] and arithmetic to [`calculator`],
//! and republishes a complete snapshot after every action. Submission is kept
//! separate so a slow network call never holds the session.

pub mod calculator;
pub mod errors;
pub mod interfaces;
pub mod money;
pub mod rewards;
pub mod session;
pub mod submission;
pub mod types;

#[cfg(test)]
mod test_selection;

pub use calculator::{
    CheckoutConfig, FormattedAmounts, PledgeInputs, PledgeSnapshot, PledgeTotalCalculator,
    StepperState,
};
pub use errors::{CheckoutError, ErrorKind, Result};
pub use interfaces::{
    CheckoutApi, CheckoutStatus, CheckoutValidation, CompletedCheckout, PaymentIntentInput,
    ShippingRulesSource, StoredCard,
};
pub use rewards::{
    FlowAdvance, FlowPage, RewardSelectionState, SelectionOutcome, SelectionPhase, SelectionView,
};
pub use session::{CheckoutSession, PledgeState};
pub use submission::{
    CheckoutSubmissionFlow, ErrorCallback, SubmissionResult, SubmissionState, SubmitRequest,
};
pub use types::{
    AddOnSelections, Backing, CountryBounds, Currency, Location, Project, Reward, SessionContext,
    ShippingRule, ShippingType, User, NO_REWARD_ID,
};
