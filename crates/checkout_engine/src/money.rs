//! Rounding, conversion and display formatting of money amounts.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::Currency;

/// Round to `decimals` places, ties away from zero.
pub fn round_half_up(amount: Decimal, decimals: u32) -> Decimal {
    amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a project-currency amount into `target` using `fx_rate`.
pub fn convert(amount: Decimal, fx_rate: Decimal, target: &Currency) -> Decimal {
    round_half_up(amount.saturating_mul(fx_rate), target.decimals)
}

/// Render `amount` with the currency symbol. Whole amounts drop the minor units.
pub fn format_amount(amount: Decimal, currency: &Currency) -> String {
    let rounded = round_half_up(amount, currency.decimals);
    if rounded.fract().is_zero() {
        format!("{}{}", currency.symbol, rounded.trunc().normalize())
    } else {
        format!(
            "{}{:.*}",
            currency.symbol,
            currency.decimals as usize,
            rounded
        )
    }
}

/// The secondary "about" text, present only when the viewer's currency differs.
pub fn converted_text(
    amount: Decimal,
    project_currency: &Currency,
    display_currency: &Currency,
    fx_rate: Decimal,
) -> Option<String> {
    if project_currency.code == display_currency.code {
        return None;
    }
    let converted = convert(amount, fx_rate, display_currency);
    Some(format!("About {}", format_amount(converted, display_currency)))
}
