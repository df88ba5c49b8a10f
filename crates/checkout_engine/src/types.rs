//! # Types
//!
//! Value objects shared by every part of the checkout engine.
//!
//! All of them are immutable once built. Changes go through the `with_*`
//! helpers, which consume the value and hand back a modified copy:
//!
//! ```text
//! Reward::new(7, "Hardcover", Decimal::from(20))
//!     .with_shipping_type(ShippingType::Anywhere)
//!     .with_add_ons(true)
//! ```
//!
//! Money is always a [`Decimal`] expressed in the project's currency.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier reserved for the "pledge without a reward" tier.
pub const NO_REWARD_ID: u64 = 0;

/// How (and whether) a reward is shipped to the backer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingType {
    /// Digital or otherwise unshippable.
    #[default]
    NoShipping,
    /// Ships to one location only.
    SingleLocation,
    /// Ships to a list of locations.
    MultipleLocations,
    /// Ships worldwide.
    Anywhere,
}

impl ShippingType {
    pub fn requires_shipping(self) -> bool {
        !matches!(self, Self::NoShipping)
    }
}

/// An ISO 4217 currency together with its display symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub symbol: String,
    /// Number of minor-unit digits used when rounding for display.
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    2
}

impl Currency {
    pub fn new(code: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            symbol: symbol.into(),
            decimals: default_decimals(),
        }
    }

    pub fn usd() -> Self {
        Self::new("USD", "$")
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }
}

/// A pledge tier (or an add-on) offered by a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: u64,
    pub title: String,
    /// Minimum pledge for this tier, in project currency.
    pub minimum: Decimal,
    #[serde(default)]
    pub shipping_type: ShippingType,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Total number of backers allowed, if capped.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Slots still available, if capped.
    #[serde(default)]
    pub remaining: Option<u32>,
    #[serde(default)]
    pub has_add_ons: bool,
}

impl Reward {
    pub fn new(id: u64, title: impl Into<String>, minimum: Decimal) -> Self {
        Self {
            id,
            title: title.into(),
            minimum,
            shipping_type: ShippingType::NoShipping,
            ends_at: None,
            limit: None,
            remaining: None,
            has_add_ons: false,
        }
    }

    /// The "no reward" tier, backing the project with `minimum` and nothing shipped.
    pub fn no_reward(minimum: Decimal) -> Self {
        Self::new(NO_REWARD_ID, "Pledge without a reward", minimum)
    }

    pub fn with_shipping_type(mut self, shipping_type: ShippingType) -> Self {
        self.shipping_type = shipping_type;
        self
    }

    pub fn with_add_ons(mut self, has_add_ons: bool) -> Self {
        self.has_add_ons = has_add_ons;
        self
    }

    pub fn with_ends_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.ends_at = Some(ends_at);
        self
    }

    pub fn with_limit(mut self, limit: u32, remaining: u32) -> Self {
        self.limit = Some(limit);
        self.remaining = Some(remaining);
        self
    }

    pub fn is_no_reward(&self) -> bool {
        self.id == NO_REWARD_ID
    }

    pub fn requires_shipping(&self) -> bool {
        !self.is_no_reward() && self.shipping_type.requires_shipping()
    }

    /// `false` once the reward has ended or sold out.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        let not_ended = self.ends_at.map_or(true, |ends_at| ends_at > now);
        let not_sold_out = self.remaining.map_or(true, |remaining| remaining > 0);
        not_ended && not_sold_out
    }

    /// Largest quantity a backer may pick, when the reward is capped.
    pub fn max_quantity(&self) -> Option<u32> {
        match (self.limit, self.remaining) {
            (Some(limit), Some(remaining)) => Some(limit.min(remaining)),
            (Some(limit), None) => Some(limit),
            (None, Some(remaining)) => Some(remaining),
            (None, None) => None,
        }
    }
}

/// Add-on quantities keyed by add-on reward id.
///
/// A zero quantity is never stored, so an entry set to zero is
/// indistinguishable from one that was never set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddOnSelections(BTreeMap<u64, u32>);

impl AddOnSelections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, add_on_id: u64, quantity: u32) -> Self {
        self.set(add_on_id, quantity);
        self
    }

    pub fn set(&mut self, add_on_id: u64, quantity: u32) {
        if quantity == 0 {
            self.0.remove(&add_on_id);
        } else {
            self.0.insert(add_on_id, quantity);
        }
    }

    pub fn quantity(&self, add_on_id: u64) -> u32 {
        self.0.get(&add_on_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|quantity| *quantity == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.0
            .iter()
            .filter(|(_, quantity)| **quantity > 0)
            .map(|(id, quantity)| (*id, *quantity))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// A shipping destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: u64,
    pub name: String,
}

/// Shipping cost of the selected reward to one location, in project currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRule {
    pub location: Location,
    pub cost: Decimal,
}

impl ShippingRule {
    pub fn new(location_id: u64, name: impl Into<String>, cost: Decimal) -> Self {
        Self {
            location: Location {
                id: location_id,
                name: name.into(),
            },
            cost,
        }
    }

    pub fn location_id(&self) -> u64 {
        self.location.id
    }
}

/// A pledge the viewer already committed to this project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backing {
    /// Backend reference of the backing.
    pub id: String,
    pub reward: Reward,
    #[serde(default)]
    pub add_ons: AddOnSelections,
    #[serde(default)]
    pub location_id: Option<u64>,
    /// Pledge toward the reward itself, excluding add-ons, shipping and bonus.
    pub amount: Decimal,
    #[serde(default)]
    pub bonus_amount: Decimal,
}

impl Backing {
    pub fn new(id: impl Into<String>, reward: Reward) -> Self {
        let amount = reward.minimum;
        Self {
            id: id.into(),
            reward,
            add_ons: AddOnSelections::new(),
            location_id: None,
            amount,
            bonus_amount: Decimal::ZERO,
        }
    }

    pub fn with_add_ons(mut self, add_ons: AddOnSelections) -> Self {
        self.add_ons = add_ons;
        self
    }

    pub fn with_location(mut self, location_id: u64) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_bonus_amount(mut self, bonus_amount: Decimal) -> Self {
        self.bonus_amount = bonus_amount;
        self
    }

    pub fn reward_id(&self) -> u64 {
        self.reward.id
    }
}

/// Pledge bounds of the project's country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryBounds {
    pub min_pledge: Decimal,
    pub max_pledge: Decimal,
}

/// The project being pledged to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub currency: Currency,
    pub country: CountryBounds,
    /// Rate from project currency to the viewer's chosen currency.
    #[serde(default = "unit_rate")]
    pub fx_rate: Decimal,
}

fn unit_rate() -> Decimal {
    Decimal::ONE
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, currency: Currency) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            currency,
            country: CountryBounds {
                min_pledge: Decimal::ONE,
                max_pledge: Decimal::from(10_000),
            },
            fx_rate: Decimal::ONE,
        }
    }

    pub fn with_country_bounds(mut self, min_pledge: Decimal, max_pledge: Decimal) -> Self {
        self.country = CountryBounds {
            min_pledge,
            max_pledge,
        };
        self
    }

    pub fn with_fx_rate(mut self, fx_rate: Decimal) -> Self {
        self.fx_rate = fx_rate;
        self
    }
}

/// The signed-in viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub location_id: Option<u64>,
    #[serde(default)]
    pub chosen_currency: Option<Currency>,
}

/// Per-session context handed to the engine instead of any global
/// current-user state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user: Option<User>,
    /// Clock reading used for reward availability checks.
    pub now: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(user: Option<User>) -> Self {
        Self {
            user,
            now: Utc::now(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// The currency amounts are converted to for display.
    pub fn display_currency<'a>(&'a self, project: &'a Project) -> &'a Currency {
        self.user
            .as_ref()
            .and_then(|user| user.chosen_currency.as_ref())
            .unwrap_or(&project.currency)
    }

    pub fn user_location_id(&self) -> Option<u64> {
        self.user.as_ref().and_then(|user| user.location_id)
    }
}
