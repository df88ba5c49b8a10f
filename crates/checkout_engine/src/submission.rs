//! # Pledge submission
//!
//! Drives the three backend calls that turn a confirmed pledge into a
//! completed checkout:
//!
//! 1. resolve a client secret (reuse the given one or create a payment intent),
//! 2. `validate_checkout`,
//! 3. `complete_on_session_checkout`.
//!
//! ```text
//! Idle ──submit──► Loading ──ok──► Success   (terminal)
//!                     └────err───► Idle      (error callback fired)
//! ```
//!
//! Only one submission may be in flight. Every failure, including a missing
//! checkout id caught before any call is made, goes through the error
//! callback exactly once and leaves the flow back in `Idle`. A submission
//! dropped before it settles counts as a failure too.

use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::{CheckoutError, Result};
use crate::interfaces::{CheckoutApi, CheckoutStatus, CompletedCheckout, PaymentIntentInput};

/// Invoked once for every failed submission attempt.
pub type ErrorCallback = Arc<dyn Fn(&CheckoutError) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionResult {
    pub checkout_id: String,
    pub backing_id: String,
    pub status: CheckoutStatus,
    pub should_show_success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Loading,
    Success(SubmissionResult),
}

/// Amount and payment details of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub project_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_source_id: Option<String>,
    /// Secret of a payment intent created earlier, if any.
    pub client_secret: Option<String>,
    pub reusable: bool,
}

#[derive(Debug, Default)]
struct CheckoutRefs {
    checkout_id: Option<String>,
    backing_id: Option<String>,
}

pub struct CheckoutSubmissionFlow {
    api: Arc<dyn CheckoutApi>,
    refs: Mutex<CheckoutRefs>,
    on_error: ErrorCallback,
    state: watch::Sender<SubmissionState>,
}

impl CheckoutSubmissionFlow {
    pub fn new(api: Arc<dyn CheckoutApi>, on_error: ErrorCallback) -> Self {
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            api,
            refs: Mutex::new(CheckoutRefs::default()),
            on_error,
            state,
        }
    }

    /// Record the backend checkout this flow will complete. Either half may
    /// be missing; `submit` reports it through the error callback.
    pub fn provide_checkout(&self, checkout_id: Option<String>, backing_id: Option<String>) {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        refs.checkout_id = checkout_id;
        refs.backing_id = backing_id;
    }

    /// Report a failure found before `submit` could run, such as an
    /// incomplete pledge. The submission state is left untouched.
    pub fn reject(&self, error: CheckoutError) -> CheckoutError {
        self.report(error)
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmissionResult> {
        match self.state() {
            SubmissionState::Loading => return Err(CheckoutError::SubmissionInFlight),
            SubmissionState::Success(_) => return Err(CheckoutError::AlreadyCompleted),
            SubmissionState::Idle => {}
        }

        let (checkout_id, backing_id) = match self.preconditions(request) {
            Ok(refs) => refs,
            Err(e) => return Err(self.fail(e)),
        };

        if !self.begin() {
            return Err(CheckoutError::SubmissionInFlight);
        }
        let mut guard = InFlight {
            flow: self,
            settled: false,
        };
        debug!(%checkout_id, "Submitting pledge");

        let outcome = self.run(&checkout_id, request).await;
        guard.settled = true;
        match outcome {
            Ok(completed) => {
                let result = SubmissionResult {
                    checkout_id,
                    backing_id,
                    status: completed.status,
                    should_show_success: !completed.requires_action,
                };
                info!(
                    checkout_id = %result.checkout_id,
                    status = result.status.as_str(),
                    "Checkout completed"
                );
                self.state.send_replace(SubmissionState::Success(result.clone()));
                Ok(result)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn preconditions(&self, request: &SubmitRequest) -> Result<(String, String)> {
        let refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        let checkout_id = refs
            .checkout_id
            .clone()
            .ok_or(CheckoutError::MissingCheckoutId)?;
        let backing_id = refs
            .backing_id
            .clone()
            .ok_or(CheckoutError::MissingBacking)?;
        if request.payment_source_id.is_none() {
            return Err(CheckoutError::MissingPaymentSource);
        }
        Ok((checkout_id, backing_id))
    }

    async fn run(
        &self,
        checkout_id: &str,
        request: &SubmitRequest,
    ) -> Result<CompletedCheckout> {
        let source_id = request
            .payment_source_id
            .as_deref()
            .ok_or(CheckoutError::MissingPaymentSource)?;

        let client_secret = match &request.client_secret {
            Some(secret) => secret.clone(),
            None => {
                let input = PaymentIntentInput {
                    project_id: request.project_id.clone(),
                    checkout_id: checkout_id.to_string(),
                    amount: request.amount,
                    currency: request.currency.clone(),
                };
                self.api.create_payment_intent(&input).await?
            }
        };

        let validation = self
            .api
            .validate_checkout(checkout_id, &client_secret, source_id)
            .await?;
        if !validation.is_valid || !validation.messages.is_empty() {
            let message = if validation.messages.is_empty() {
                "rejected by backend".to_string()
            } else {
                validation.messages.join("; ")
            };
            return Err(CheckoutError::InvalidCheckout(message));
        }

        self.api
            .complete_on_session_checkout(
                checkout_id,
                &client_secret,
                Some(source_id),
                request.reusable,
            )
            .await
    }

    fn begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, SubmissionState::Idle) {
                *state = SubmissionState::Loading;
                true
            } else {
                false
            }
        })
    }

    fn fail(&self, error: CheckoutError) -> CheckoutError {
        self.state.send_if_modified(|state| {
            if matches!(state, SubmissionState::Loading) {
                *state = SubmissionState::Idle;
                true
            } else {
                false
            }
        });
        self.report(error)
    }

    fn report(&self, error: CheckoutError) -> CheckoutError {
        warn!(%error, "Pledge submission failed");
        (self.on_error)(&error);
        error
    }
}

/// Puts the flow back in `Idle` when a submission is dropped mid-call.
struct InFlight<'a> {
    flow: &'a CheckoutSubmissionFlow,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.flow.fail(CheckoutError::Cancelled);
        }
    }
}
