//! # Pledge totals
//!
//! Pure computation of the amounts shown on the confirm-details step:
//!
//! ```text
//! total = pledge + Σ(add-on minimum × quantity) + shipping + bonus
//! ```
//!
//! `pledge` defaults to the reward minimum and is edited through the
//! stepper or by direct input. Shipping only counts when the reward ships;
//! a shippable reward without a chosen rule yields no snapshot at all.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{CheckoutError, Result};
use crate::money;
use crate::types::{Currency, Project, Reward, ShippingRule};

/// Direct input may exceed the country maximum by at most this factor.
const INPUT_CEILING_FACTOR: u32 = 100;

/// Tunable amounts of the checkout flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Stepper increment for the pledge amount.
    pub pledge_step: Decimal,
    /// Stepper increment for bonus support.
    pub bonus_step: Decimal,
    /// Minimum of the "no reward" tier.
    pub no_reward_minimum: Decimal,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            pledge_step: Decimal::ONE,
            bonus_step: Decimal::ONE,
            no_reward_minimum: Decimal::ONE,
        }
    }
}

/// Everything the calculator needs for one recomputation.
#[derive(Debug, Clone)]
pub struct PledgeInputs<'a> {
    pub reward: &'a Reward,
    pub pledge_amount: Decimal,
    /// Selected add-ons paired with their quantity.
    pub add_ons: Vec<(&'a Reward, u32)>,
    pub shipping_rule: Option<&'a ShippingRule>,
    pub bonus_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepperState {
    pub increase_enabled: bool,
    pub decrease_enabled: bool,
}

/// Display strings, all in project currency except `converted_total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedAmounts {
    pub pledge: String,
    pub additional: Option<String>,
    pub add_ons: Option<String>,
    pub shipping: Option<String>,
    pub bonus: Option<String>,
    pub total: String,
    pub converted_total: Option<String>,
}

/// A complete, self-consistent set of amounts ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PledgeSnapshot {
    pub reward_id: u64,
    pub currency: String,
    pub minimum_amount: Decimal,
    pub maximum_amount: Decimal,
    pub pledge_amount: Decimal,
    /// Pledge beyond the reward minimum; `None` when there is none.
    pub additional_amount: Option<Decimal>,
    pub add_ons_amount: Decimal,
    pub shipping_amount: Option<Decimal>,
    pub bonus_amount: Decimal,
    pub total_amount: Decimal,
    pub is_above_minimum: bool,
    pub stepper: StepperState,
    pub formatted: FormattedAmounts,
}

impl PledgeSnapshot {
    pub fn is_submittable(&self) -> bool {
        self.is_above_minimum
    }
}

#[derive(Debug, Clone)]
pub struct PledgeTotalCalculator {
    project: Project,
    display_currency: Currency,
    config: CheckoutConfig,
}

impl PledgeTotalCalculator {
    pub fn new(project: Project, display_currency: Currency, config: CheckoutConfig) -> Self {
        Self {
            project,
            display_currency,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Lowest pledge the stepper allows for `reward`: its own minimum, never
    /// below the country minimum.
    pub fn minimum_for(&self, reward: &Reward) -> Decimal {
        reward.minimum.max(self.project.country.min_pledge)
    }

    pub fn maximum(&self) -> Decimal {
        self.project.country.max_pledge
    }

    /// Largest amount taken from direct input or the bonus stepper.
    pub fn input_ceiling(&self) -> Decimal {
        self.maximum()
            .checked_mul(Decimal::from(INPUT_CEILING_FACTOR))
            .unwrap_or(Decimal::MAX)
    }

    pub fn increase(&self, reward: &Reward, pledge_amount: Decimal) -> Decimal {
        let raised = pledge_amount.saturating_add(self.config.pledge_step);
        raised.min(self.maximum()).max(self.minimum_for(reward))
    }

    pub fn decrease(&self, reward: &Reward, pledge_amount: Decimal) -> Decimal {
        let lowered = pledge_amount.saturating_sub(self.config.pledge_step);
        lowered.max(self.minimum_for(reward)).min(self.maximum())
    }

    pub fn stepper(&self, reward: &Reward, pledge_amount: Decimal) -> StepperState {
        StepperState {
            increase_enabled: pledge_amount < self.maximum(),
            decrease_enabled: pledge_amount > self.minimum_for(reward),
        }
    }

    pub fn compute(&self, inputs: &PledgeInputs<'_>) -> Result<PledgeSnapshot> {
        let reward = inputs.reward;
        let minimum = self.minimum_for(reward);
        let maximum = self.maximum();

        let shipping_amount = if reward.requires_shipping() {
            let rule = inputs
                .shipping_rule
                .ok_or(CheckoutError::ShippingRuleRequired(reward.id))?;
            Some(rule.cost)
        } else {
            None
        };

        let pledge_amount = inputs.pledge_amount;
        let overflow = || CheckoutError::AmountOutOfBounds {
            amount: pledge_amount,
            min: minimum,
            max: maximum,
        };

        let add_ons_amount = inputs
            .add_ons
            .iter()
            .try_fold(Decimal::ZERO, |sum, (add_on, quantity)| {
                add_on
                    .minimum
                    .checked_mul(Decimal::from(*quantity))
                    .and_then(|line| sum.checked_add(line))
            })
            .ok_or_else(overflow)?;

        let additional_amount = Some(pledge_amount - minimum).filter(|extra| *extra > Decimal::ZERO);
        let bonus_amount = inputs.bonus_amount.max(Decimal::ZERO);

        let total_amount = [
            add_ons_amount,
            shipping_amount.unwrap_or(Decimal::ZERO),
            bonus_amount,
        ]
        .into_iter()
        .try_fold(pledge_amount, Decimal::checked_add)
        .ok_or_else(overflow)?;

        let currency = &self.project.currency;
        let fmt = |amount: Decimal| money::format_amount(amount, currency);
        let formatted = FormattedAmounts {
            pledge: fmt(pledge_amount),
            additional: additional_amount.map(fmt),
            add_ons: Some(add_ons_amount).filter(|a| !a.is_zero()).map(fmt),
            shipping: shipping_amount.map(fmt),
            bonus: Some(bonus_amount).filter(|b| !b.is_zero()).map(fmt),
            total: fmt(total_amount),
            converted_total: money::converted_text(
                total_amount,
                currency,
                &self.display_currency,
                self.project.fx_rate,
            ),
        };

        Ok(PledgeSnapshot {
            reward_id: reward.id,
            currency: currency.code.clone(),
            minimum_amount: minimum,
            maximum_amount: maximum,
            pledge_amount,
            additional_amount,
            add_ons_amount,
            shipping_amount,
            bonus_amount,
            total_amount,
            is_above_minimum: pledge_amount >= minimum && pledge_amount <= maximum,
            stepper: self.stepper(reward, pledge_amount),
            formatted,
        })
    }
}
