//! Value object trait: equality by value, not identity.

use serde::{Deserialize, Serialize};

/// Marker trait for value objects.
///
/// Value objects have **no identity**; they are immutable and compared by
/// value. To "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Monetary amount in the smallest currency unit (cents).
///
/// Prices are captured per order line at order time, so later catalog price
/// changes never alter an existing order total.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Price of `quantity` units, saturating instead of wrapping.
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(u64::from(quantity)))
    }

    pub fn saturating_add(self, other: Money) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Parse a user-entered price such as `12.5`, `$3` or `0.99`.
    pub fn parse(input: &str) -> Option<Self> {
        let cleaned = input.trim().trim_start_matches(['$', '€']);
        let (whole, frac) = match cleaned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (cleaned, ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return None;
        }
        let whole: u64 = whole.parse().ok()?;
        let frac: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().ok()? * 10,
            _ => frac.parse().ok()?,
        };
        whole.checked_mul(100)?.checked_add(frac).map(Self)
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Money::saturating_add)
    }
}

/// Renders `$12.5`, `$3`, `$0.99`: two decimals with trailing zeros trimmed.
impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        match frac {
            0 => write!(f, "${whole}"),
            n if n % 10 == 0 => write!(f, "${whole}.{}", n / 10),
            n => write!(f, "${whole}.{n:02}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(Money::from_cents(1250).to_string(), "$12.5");
        assert_eq!(Money::from_cents(300).to_string(), "$3");
        assert_eq!(Money::from_cents(99).to_string(), "$0.99");
        assert_eq!(Money::from_cents(105).to_string(), "$1.05");
    }

    #[test]
    fn parse_accepts_common_forms() {
        assert_eq!(Money::parse("12.5"), Some(Money::from_cents(1250)));
        assert_eq!(Money::parse("$3"), Some(Money::from_cents(300)));
        assert_eq!(Money::parse("0.99"), Some(Money::from_cents(99)));
        assert_eq!(Money::parse("1.999"), None);
        assert_eq!(Money::parse("abc"), None);
        assert_eq!(Money::parse(".5"), None);
    }

    #[test]
    fn sum_and_times() {
        let total: Money = [Money::from_cents(150).times(2), Money::from_cents(25)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_cents(325));
    }
}
