//! # Checkout session
//!
//! The per-screen state store. It owns the [`PledgeState`], applies one user
//! action at a time and, after every action, recomputes the full
//! [`PledgeSnapshot`] and publishes it on a `watch` channel.
//!
//! The published value is `None` whenever no complete snapshot exists: no
//! reward is selected yet, or the reward ships and no shipping rule is chosen.
//!
//! ## Reward changes
//!
//! Committing a different reward resets add-ons, bonus and the pledge amount
//! (to the new minimum, or to the backed amounts when returning to the backed
//! reward). The shipping list is dropped because costs are per reward; the
//! previously chosen location is remembered and re-selected when the new
//! list contains it.

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::debug;

use crate::calculator::{CheckoutConfig, PledgeInputs, PledgeSnapshot, PledgeTotalCalculator};
use crate::errors::{CheckoutError, Result};
use crate::rewards::{RewardSelectionState, SelectionOutcome, SelectionView};
use crate::submission::SubmitRequest;
use crate::types::{AddOnSelections, Backing, Project, Reward, SessionContext, ShippingRule};

/// Mutable per-session pledge values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PledgeState {
    pub reward: Option<Reward>,
    pub add_ons: AddOnSelections,
    pub shipping_rule: Option<ShippingRule>,
    pub pledge_amount: Decimal,
    pub bonus_amount: Decimal,
    pub is_loading: bool,
    pub last_error: Option<CheckoutError>,
}

impl PledgeState {
    fn empty() -> Self {
        Self {
            reward: None,
            add_ons: AddOnSelections::new(),
            shipping_rule: None,
            pledge_amount: Decimal::ZERO,
            bonus_amount: Decimal::ZERO,
            is_loading: false,
            last_error: None,
        }
    }

    fn from_backing(backing: &Backing) -> Self {
        Self {
            reward: Some(backing.reward.clone()),
            add_ons: backing.add_ons.clone(),
            pledge_amount: backing.amount,
            bonus_amount: backing.bonus_amount.max(Decimal::ZERO),
            ..Self::empty()
        }
    }
}

pub struct CheckoutSession {
    project: Project,
    context: SessionContext,
    calculator: PledgeTotalCalculator,
    selection: RewardSelectionState,
    add_on_catalog: Vec<Reward>,
    shipping_rules: Vec<ShippingRule>,
    preferred_location: Option<u64>,
    state: PledgeState,
    snapshots: watch::Sender<Option<PledgeSnapshot>>,
}

impl CheckoutSession {
    pub fn new(
        project: Project,
        rewards: Vec<Reward>,
        add_on_catalog: Vec<Reward>,
        backing: Option<Backing>,
        context: SessionContext,
        config: CheckoutConfig,
    ) -> Self {
        let display_currency = context.display_currency(&project).clone();
        let calculator = PledgeTotalCalculator::new(project.clone(), display_currency, config);
        let state = backing
            .as_ref()
            .map(PledgeState::from_backing)
            .unwrap_or_else(PledgeState::empty);
        let preferred_location = backing
            .as_ref()
            .and_then(|b| b.location_id)
            .or_else(|| context.user_location_id());
        let (snapshots, _) = watch::channel(None);

        let session = Self {
            project,
            context,
            calculator,
            selection: RewardSelectionState::new(rewards, backing),
            add_on_catalog,
            shipping_rules: Vec::new(),
            preferred_location,
            state,
            snapshots,
        };
        session.publish();
        session
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config(&self) -> &CheckoutConfig {
        self.calculator.config()
    }

    pub fn pledge_state(&self) -> &PledgeState {
        &self.state
    }

    pub fn selection(&self) -> SelectionView {
        self.selection.view()
    }

    pub fn shipping_rules(&self) -> &[ShippingRule] {
        &self.shipping_rules
    }

    pub fn add_on_catalog(&self) -> &[Reward] {
        &self.add_on_catalog
    }

    /// Reward whose shipping rules must be loaded, if any.
    pub fn reward_needing_shipping(&self) -> Option<&Reward> {
        self.state.reward.as_ref().filter(|r| r.requires_shipping())
    }

    pub fn snapshot(&self) -> Option<PledgeSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PledgeSnapshot>> {
        self.snapshots.subscribe()
    }

    // ─────────────────────────────────────────────────────────
    // Reward selection
    // ─────────────────────────────────────────────────────────

    pub fn select_reward(&mut self, reward_id: u64) -> Result<SelectionOutcome> {
        let outcome = self.selection.select_reward(reward_id, self.context.now)?;
        self.apply_outcome(&outcome);
        Ok(outcome)
    }

    pub fn confirm_selection(&mut self, was_positive: bool) -> SelectionOutcome {
        let outcome = self.selection.on_confirmation(was_positive);
        self.apply_outcome(&outcome);
        outcome
    }

    fn apply_outcome(&mut self, outcome: &SelectionOutcome) {
        if let SelectionOutcome::Advanced { reward_id, .. } = outcome {
            self.apply_reward(*reward_id);
        }
        self.publish();
    }

    fn apply_reward(&mut self, reward_id: u64) {
        if self.state.reward.as_ref().map(|r| r.id) == Some(reward_id) {
            return;
        }
        let Some(reward) = self.selection.selected_reward().cloned() else {
            return;
        };

        if let Some(rule) = &self.state.shipping_rule {
            self.preferred_location = Some(rule.location_id());
        }

        let restored = self
            .selection
            .backing()
            .filter(|b| b.reward_id() == reward_id)
            .map(PledgeState::from_backing);
        let state = restored.unwrap_or_else(|| PledgeState {
            pledge_amount: self.calculator.minimum_for(&reward),
            reward: Some(reward),
            ..PledgeState::empty()
        });

        debug!(reward_id, "Pledge state reset for new reward");
        self.state = state;
        self.shipping_rules.clear();
    }

    // ─────────────────────────────────────────────────────────
    // Add-ons and shipping
    // ─────────────────────────────────────────────────────────

    pub fn set_add_on_quantity(&mut self, add_on_id: u64, quantity: u32) -> Result<()> {
        let reward = self
            .state
            .reward
            .as_ref()
            .ok_or(CheckoutError::NoRewardSelected)?;
        if !reward.has_add_ons {
            return Err(CheckoutError::AddOnsNotOffered(reward.id));
        }
        let add_on = self
            .add_on_catalog
            .iter()
            .find(|a| a.id == add_on_id)
            .ok_or(CheckoutError::AddOnNotFound(add_on_id))?;
        if let Some(max) = add_on.max_quantity() {
            if quantity > max {
                return Err(CheckoutError::AddOnLimitExceeded {
                    add_on_id,
                    quantity,
                    max,
                });
            }
        }

        self.state.add_ons.set(add_on_id, quantity);
        self.publish();
        Ok(())
    }

    /// Replace the shipping rules available for the selected reward.
    ///
    /// The current location is kept when still offered (at its new cost);
    /// otherwise the remembered location is picked, else nothing.
    pub fn set_shipping_rules(&mut self, rules: Vec<ShippingRule>) {
        let wanted = self
            .state
            .shipping_rule
            .as_ref()
            .map(ShippingRule::location_id)
            .or(self.preferred_location);

        self.state.shipping_rule = if self.reward_needing_shipping().is_some() {
            wanted.and_then(|id| rules.iter().find(|r| r.location_id() == id).cloned())
        } else {
            None
        };
        self.shipping_rules = rules;
        self.publish();
    }

    pub fn select_shipping_rule(&mut self, location_id: u64) -> Result<()> {
        if self.reward_needing_shipping().is_none() {
            return Err(CheckoutError::ShippingRuleNotFound(location_id));
        }
        let rule = self
            .shipping_rules
            .iter()
            .find(|r| r.location_id() == location_id)
            .cloned()
            .ok_or(CheckoutError::ShippingRuleNotFound(location_id))?;

        self.preferred_location = Some(location_id);
        self.state.shipping_rule = Some(rule);
        self.publish();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Amounts
    // ─────────────────────────────────────────────────────────

    pub fn increase_pledge(&mut self) -> Result<()> {
        let reward = self.selected_reward()?;
        self.state.pledge_amount = self.calculator.increase(&reward, self.state.pledge_amount);
        self.publish();
        Ok(())
    }

    pub fn decrease_pledge(&mut self) -> Result<()> {
        let reward = self.selected_reward()?;
        self.state.pledge_amount = self.calculator.decrease(&reward, self.state.pledge_amount);
        self.publish();
        Ok(())
    }

    /// Direct numeric input. Out-of-range amounts are accepted and flagged
    /// through `is_above_minimum`; negatives and amounts past the input
    /// ceiling are rejected.
    pub fn set_pledge_amount(&mut self, amount: Decimal) -> Result<()> {
        let reward = self.selected_reward()?;
        if amount.is_sign_negative() || amount > self.calculator.input_ceiling() {
            return Err(CheckoutError::AmountOutOfBounds {
                amount,
                min: self.calculator.minimum_for(&reward),
                max: self.calculator.maximum(),
            });
        }
        self.state.pledge_amount = amount;
        self.publish();
        Ok(())
    }

    pub fn increase_bonus(&mut self) {
        let raised = self
            .state
            .bonus_amount
            .saturating_add(self.calculator.config().bonus_step);
        self.state.bonus_amount = raised.min(self.calculator.input_ceiling());
        self.publish();
    }

    pub fn decrease_bonus(&mut self) {
        let lowered = self
            .state
            .bonus_amount
            .saturating_sub(self.calculator.config().bonus_step);
        self.state.bonus_amount = lowered.max(Decimal::ZERO);
        self.publish();
    }

    // ─────────────────────────────────────────────────────────
    // Submission bookkeeping
    // ─────────────────────────────────────────────────────────

    pub fn set_loading(&mut self, is_loading: bool) {
        self.state.is_loading = is_loading;
    }

    pub fn record_error(&mut self, error: Option<CheckoutError>) {
        self.state.last_error = error;
    }

    /// Build the submission for the current snapshot, refusing anything the
    /// viewer could not submit from the confirm-details step.
    pub fn submit_request(
        &self,
        payment_source_id: Option<String>,
        client_secret: Option<String>,
        reusable: bool,
    ) -> Result<SubmitRequest> {
        let reward = self.selected_reward()?;
        let snapshot = self
            .snapshot()
            .ok_or(CheckoutError::ShippingRuleRequired(reward.id))?;
        if !snapshot.is_submittable() {
            return Err(CheckoutError::AmountOutOfBounds {
                amount: snapshot.pledge_amount,
                min: snapshot.minimum_amount,
                max: snapshot.maximum_amount,
            });
        }

        Ok(SubmitRequest {
            project_id: self.project.id.clone(),
            amount: snapshot.total_amount,
            currency: snapshot.currency,
            payment_source_id,
            client_secret,
            reusable,
        })
    }

    fn selected_reward(&self) -> Result<Reward> {
        self.state
            .reward
            .clone()
            .ok_or(CheckoutError::NoRewardSelected)
    }

    fn compute(&self) -> Option<PledgeSnapshot> {
        let reward = self.state.reward.as_ref()?;
        let add_ons = self
            .state
            .add_ons
            .iter()
            .filter_map(|(id, quantity)| {
                self.add_on_catalog
                    .iter()
                    .find(|a| a.id == id)
                    .map(|add_on| (add_on, quantity))
            })
            .collect();

        let inputs = PledgeInputs {
            reward,
            pledge_amount: self.state.pledge_amount,
            add_ons,
            shipping_rule: self.state.shipping_rule.as_ref(),
            bonus_amount: self.state.bonus_amount,
        };
        match self.calculator.compute(&inputs) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(reward_id = reward.id, "No snapshot: {e}");
                None
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.compute();
        self.snapshots.send_replace(snapshot);
    }
}
