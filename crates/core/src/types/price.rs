//! Type-safe price representation using decimal arithmetic.

use core::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::Quantity;

/// A price with currency information.
///
/// Amounts are decimal (never floating point) so line totals and cart
/// subtotals add up exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: Quantity) -> Self {
        Self::new(
            self.amount * Decimal::from(quantity.get()),
            self.currency_code,
        )
    }

    /// Amount rounded to cents, halves away from zero.
    #[must_use]
    pub fn rounded(&self) -> Decimal {
        self.amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Amount in the currency's minor unit (cents), as payment gateways expect.
    ///
    /// Rounds the same way as [`Price::display`], so the charged amount
    /// matches the shown total. Returns `None` if the amount does not fit in
    /// an `i64`.
    #[must_use]
    pub fn minor_units(&self) -> Option<i64> {
        self.rounded()
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
    }

    /// Format for display (e.g., "$19.99").
    #[must_use]
    pub fn display(&self) -> String {
        format!(
            "{}{:.2}",
            self.currency_code.symbol(),
            self.rounded()
        )
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    BDT,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::BDT => "৳",
        }
    }

    /// Lowercase ISO code, as Stripe expects it.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
            Self::BDT => "bdt",
        }
    }
}
