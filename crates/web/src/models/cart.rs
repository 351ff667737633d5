//! Locally mirrored cart.
//!
//! The backend owns the cart; this is the copy held in the optimistic cache.
//! Quantity adjustments here are the speculative half of a cart mutation.

use rust_decimal::Decimal;

use market_pulse_core::{CartLineId, Quantity};

use crate::api::types::CartLine;

/// A user's cart as last seen (or speculatively updated) by this process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cart {
    /// Line items in backend order.
    pub lines: Vec<CartLine>,
}

impl From<Vec<CartLine>> for Cart {
    fn from(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }
}

impl Cart {
    /// Look up a line.
    #[must_use]
    pub fn line(&self, id: &CartLineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.id == id)
    }

    fn line_mut(&mut self, id: &CartLineId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|line| &line.id == id)
    }

    /// Add one to a line. Returns the new quantity, or `None` if the line is
    /// not in the cart.
    pub fn increment(&mut self, id: &CartLineId) -> Option<Quantity> {
        let line = self.line_mut(id)?;
        line.quantity = line.quantity.increment();
        Some(line.quantity)
    }

    /// Take one from a line. Returns the new quantity, or `None` if the line
    /// is not in the cart or is already at one (the cart is left unchanged).
    pub fn decrement(&mut self, id: &CartLineId) -> Option<Quantity> {
        let line = self.line_mut(id)?;
        line.quantity = line.quantity.decrement()?;
        Some(line.quantity)
    }

    /// Remove a line. Returns whether it was present.
    pub fn remove(&mut self, id: &CartLineId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| &line.id != id);
        self.lines.len() != before
    }

    /// Sum of line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .map(|line| line.price_per_unit * Decimal::from(line.quantity.get()))
            .sum()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity.get()))
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
