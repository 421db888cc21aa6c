//! Numeric helpers shared by the engines.
//!
//! All arithmetic is exact `Decimal`; only the square root in the
//! standard deviation is approximated.

use mandi_core::{round2, Price};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Coefficient of variation (percent) above which prices are `high` volatility.
pub const HIGH_VOLATILITY_COV: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

/// Coefficient of variation (percent) above which prices are `moderate` volatility.
pub const MODERATE_VOLATILITY_COV: Decimal = Decimal::from_parts(8, 0, 0, false, 0);

/// Direction label attached to price entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
    /// First price ever seen for a commodity in a market.
    NewEntry,
    /// No observation to compare against.
    NoData,
}

impl Trend {
    /// Direction by sign of a difference.
    pub fn of(diff: Decimal) -> Self {
        if diff > Decimal::ZERO {
            Self::Up
        } else if diff < Decimal::ZERO {
            Self::Down
        } else {
            Self::Stable
        }
    }
}

/// Difference between two prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceMove {
    pub change: Decimal,
    /// Percent against the older price, rounded to 2dp. Zero when the older price is zero.
    pub change_percent: Decimal,
    pub trend: Trend,
}

impl PriceMove {
    pub fn between(newer: Price, older: Price) -> Self {
        let change = (newer - older).inner();
        Self {
            change,
            change_percent: newer.change_pct(older),
            trend: Trend::of(change),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityLevel {
    Stable,
    Moderate,
    High,
}

impl VolatilityLevel {
    /// Classify an unrounded coefficient of variation. Both thresholds are exclusive.
    pub fn classify(cov: Decimal) -> Self {
        if cov > HIGH_VOLATILITY_COV {
            Self::High
        } else if cov > MODERATE_VOLATILITY_COV {
            Self::Moderate
        } else {
            Self::Stable
        }
    }

    pub fn interpretation(&self) -> &'static str {
        match self {
            Self::Stable => "Low volatility - prices are stable",
            Self::Moderate => "Moderate volatility - prices fluctuate moderately",
            Self::High => "High volatility - prices are highly unstable",
        }
    }
}

/// Arithmetic mean, unrounded. `None` when empty or the sum overflows.
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    sum.checked_div(Decimal::from(values.len()))
}

/// Mean rounded to 2dp.
pub fn mean2(values: &[Decimal]) -> Option<Decimal> {
    mean(values).map(round2)
}

/// Population standard deviation, unrounded. `None` when empty or on overflow.
pub fn std_dev(values: &[Decimal]) -> Option<Decimal> {
    let avg = mean(values)?;
    let squares = values
        .iter()
        .map(|v| {
            let diff = v.checked_sub(avg)?;
            diff.checked_mul(diff)
        })
        .try_fold(Decimal::ZERO, |acc, sq| acc.checked_add(sq?))?;
    squares.checked_div(Decimal::from(values.len()))?.sqrt()
}

/// `std_dev / mean * 100`, zero for a zero mean or on overflow.
pub fn coefficient_of_variation(std_dev: Decimal, mean: Decimal) -> Decimal {
    if mean.is_zero() {
        return Decimal::ZERO;
    }
    std_dev
        .checked_div(mean)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

pub fn max(values: &[Decimal]) -> Option<Decimal> {
    values.iter().copied().max()
}

pub fn min(values: &[Decimal]) -> Option<Decimal> {
    values.iter().copied().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_volatility_thresholds_are_exclusive() {
        assert_eq!(VolatilityLevel::classify(dec!(15.00)), VolatilityLevel::Moderate);
        assert_eq!(VolatilityLevel::classify(dec!(15.01)), VolatilityLevel::High);
        assert_eq!(VolatilityLevel::classify(dec!(8.00)), VolatilityLevel::Stable);
        assert_eq!(VolatilityLevel::classify(dec!(8.001)), VolatilityLevel::Moderate);
        assert_eq!(VolatilityLevel::classify(Decimal::ZERO), VolatilityLevel::Stable);
    }

    #[test]
    fn test_std_dev_population() {
        let values = [dec!(2), dec!(4), dec!(4), dec!(4), dec!(5), dec!(5), dec!(7), dec!(9)];
        assert_eq!(mean(&values), Some(dec!(5)));
        assert_eq!(round2(std_dev(&values).unwrap()), dec!(2.00));
        assert_eq!(std_dev(&[]), None);
        assert_eq!(std_dev(&[dec!(100)]), Some(Decimal::ZERO));
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(dec!(150), dec!(1000)), dec!(15));
        assert_eq!(coefficient_of_variation(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_price_move() {
        let up = PriceMove::between(Price::new(dec!(2100)), Price::new(dec!(2000)));
        assert_eq!(up.change, dec!(100));
        assert_eq!(up.change_percent, dec!(5.00));
        assert_eq!(up.trend, Trend::Up);

        let from_zero = PriceMove::between(Price::new(dec!(50)), Price::ZERO);
        assert_eq!(from_zero.change_percent, Decimal::ZERO);
        assert_eq!(from_zero.trend, Trend::Up);

        assert_eq!(Trend::of(Decimal::ZERO), Trend::Stable);
    }

    #[test]
    fn test_overflow_degrades_to_no_data() {
        let values = [Decimal::MAX, Decimal::MAX];
        assert_eq!(mean(&values), None);
        assert_eq!(std_dev(&values), None);
        assert_eq!(std_dev(&[Decimal::MAX, Decimal::ZERO]), None);
        assert_eq!(coefficient_of_variation(Decimal::MAX, dec!(0.001)), Decimal::ZERO);
    }

    #[test]
    fn test_mean2_rounds() {
        assert_eq!(mean2(&[dec!(1), dec!(2), dec!(2)]), Some(dec!(1.67)));
    }
}
