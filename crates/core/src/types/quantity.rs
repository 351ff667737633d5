//! Cart line quantity.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Quantities start at one.
    #[error("quantity must be at least 1")]
    Zero,
}

/// A line-item quantity, always at least one.
///
/// Decrementing a quantity of one yields `None` instead of zero; removing a
/// line is a separate, explicit action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// A quantity of one.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::Zero`] for zero.
    pub const fn new(value: u32) -> Result<Self, QuantityError> {
        match NonZeroU32::new(value) {
            Some(n) => Ok(Self(n)),
            None => Err(QuantityError::Zero),
        }
    }

    /// The quantity as a plain integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// One more (saturating at `u32::MAX`).
    #[must_use]
    pub const fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// One fewer, or `None` when already at one.
    #[must_use]
    pub const fn decrement(self) -> Option<Self> {
        match NonZeroU32::new(self.0.get() - 1) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.get()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_rejected() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn test_increment() {
        assert_eq!(Quantity::new(2).unwrap().increment().get(), 3);
        assert_eq!(Quantity::new(u32::MAX).unwrap().increment().get(), u32::MAX);
    }

    #[test]
    fn test_decrement_stops_at_one() {
        assert_eq!(Quantity::new(2).unwrap().decrement(), Some(Quantity::ONE));
        assert_eq!(Quantity::ONE.decrement(), None);
    }

    #[test]
    fn test_serde_as_integer() {
        let quantity: Quantity = serde_json::from_str("4").unwrap();
        assert_eq!(quantity.get(), 4);
        assert_eq!(serde_json::to_string(&quantity).unwrap(), "4");
    }
}
