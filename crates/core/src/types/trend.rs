//! Price history and trend computation.
//!
//! Vendors record a product's market price each time they update it; the
//! product page summarises that history as a [`PriceTrend`].

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A dated price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Market day of the observation.
    pub date: NaiveDate,
    /// Unit price on that day.
    pub price: Decimal,
}

/// Movement of the latest price relative to the previous observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

/// Summary of a price history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTrend {
    /// Most recent observation.
    pub latest: PricePoint,
    /// Observation before the latest one, if any.
    pub previous: Option<PricePoint>,
    /// `latest - previous` (zero without a previous observation).
    pub change: Decimal,
    /// Change relative to the previous price, in percent, two decimal places.
    /// `None` without a previous observation or when the previous price is zero.
    pub change_percent: Option<Decimal>,
    pub direction: TrendDirection,
    /// Lowest observed price.
    pub low: Decimal,
    /// Highest observed price.
    pub high: Decimal,
}

impl PriceTrend {
    /// Summarise a history. Points may arrive in any order; returns `None`
    /// for an empty history.
    #[must_use]
    pub fn from_history(history: &[PricePoint]) -> Option<Self> {
        let mut points = history.to_vec();
        points.sort_by_key(|point| point.date);

        let (&latest, rest) = points.split_last()?;
        let previous = rest.last().copied();

        let change = previous.map_or(Decimal::ZERO, |prev| latest.price - prev.price);
        let change_percent = previous
            .filter(|prev| !prev.price.is_zero())
            .map(|prev| {
                (change / prev.price * Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            });
        let direction = match change.cmp(&Decimal::ZERO) {
            core::cmp::Ordering::Greater => TrendDirection::Up,
            core::cmp::Ordering::Less => TrendDirection::Down,
            core::cmp::Ordering::Equal => TrendDirection::Flat,
        };

        let low = points.iter().map(|p| p.price).min().unwrap_or(latest.price);
        let high = points.iter().map(|p| p.price).max().unwrap_or(latest.price);

        Some(Self {
            latest,
            previous,
            change,
            change_percent,
            direction,
            low,
            high,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn point(day: u32, cents: i64) -> PricePoint {
        PricePoint {
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            price: Decimal::new(cents, 2),
        }
    }

    #[test]
    fn test_empty_history_has_no_trend() {
        assert_eq!(PriceTrend::from_history(&[]), None);
    }

    #[test]
    fn test_single_point_is_flat() {
        let trend = PriceTrend::from_history(&[point(1, 4000)]).unwrap();
        assert_eq!(trend.direction, TrendDirection::Flat);
        assert_eq!(trend.previous, None);
        assert_eq!(trend.change, Decimal::ZERO);
        assert_eq!(trend.change_percent, None);
        assert_eq!(trend.low, trend.high);
    }

    #[test]
    fn test_trend_uses_chronological_order() {
        // Out of order on purpose: latest is day 9, previous is day 5.
        let history = [point(9, 5000), point(1, 3000), point(5, 4000)];
        let trend = PriceTrend::from_history(&history).unwrap();

        assert_eq!(trend.latest, point(9, 5000));
        assert_eq!(trend.previous, Some(point(5, 4000)));
        assert_eq!(trend.change, Decimal::new(1000, 2));
        assert_eq!(trend.change_percent, Some(Decimal::new(2500, 2)));
        assert_eq!(trend.direction, TrendDirection::Up);
        assert_eq!(trend.low, Decimal::new(3000, 2));
        assert_eq!(trend.high, Decimal::new(5000, 2));
    }

    #[test]
    fn test_price_drop() {
        let trend = PriceTrend::from_history(&[point(1, 3000), point(2, 2000)]).unwrap();
        assert_eq!(trend.direction, TrendDirection::Down);
        assert_eq!(trend.change_percent, Some(Decimal::new(-3333, 2)));
    }

    #[test]
    fn test_previous_zero_price_has_no_percentage() {
        let trend = PriceTrend::from_history(&[point(1, 0), point(2, 100)]).unwrap();
        assert_eq!(trend.direction, TrendDirection::Up);
        assert_eq!(trend.change_percent, None);
    }
}
