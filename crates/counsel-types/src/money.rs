//! Exact currency arithmetic for wallet balances and billing charges.
//!
//! All monetary values are integer cents. Floating point never touches the
//! money path: the conservation invariant (sum of committed cycle charges
//! equals the finalized session amount) requires exact arithmetic.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A monetary amount in integer cents.
///
/// Balances are non-negative by construction: the only mutation path for
/// session billing is the wallet's atomic conditional debit, which refuses
/// to commit when the balance would go below zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Construct from integer cents.
    pub const fn from_cents(cents: u64) -> Self {
        Amount(cents)
    }

    /// Construct from whole currency units (e.g. dollars).
    pub const fn from_units(units: u64) -> Self {
        Amount(units * 100)
    }

    /// The raw value in cents.
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Checked subtraction; `None` when the result would be negative.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Saturating addition. Wallet balances stay far below `u64::MAX`, so
    /// saturation only guards against pathological inputs.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Multiply a per-minute rate by a whole number of minutes.
    pub fn times_minutes(self, minutes: u32) -> Amount {
        Amount(self.0.saturating_mul(u64::from(minutes)))
    }

    /// Whether this amount covers `charge` (balance >= charge).
    pub fn covers(self, charge: Amount) -> bool {
        self.0 >= charge.0
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Amount {
    type Output = Amount;

    /// Saturating at zero. Use `checked_sub` where going negative must be
    /// detected rather than clamped.
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_units_is_cents_times_100() {
        assert_eq!(Amount::from_units(3), Amount::from_cents(300));
    }

    #[test]
    fn test_display_renders_dollars_and_cents() {
        assert_eq!(Amount::from_cents(400).to_string(), "$4.00");
        assert_eq!(Amount::from_cents(205).to_string(), "$2.05");
        assert_eq!(Amount::ZERO.to_string(), "$0.00");
    }

    #[test]
    fn test_times_minutes() {
        // $2/min for 2 minutes = $4
        let rate = Amount::from_units(2);
        assert_eq!(rate.times_minutes(2), Amount::from_units(4));
        assert_eq!(rate.times_minutes(0), Amount::ZERO);
    }

    #[test]
    fn test_covers() {
        let balance = Amount::from_units(5);
        assert!(balance.covers(Amount::from_units(4)));
        assert!(balance.covers(Amount::from_units(5)));
        assert!(!balance.covers(Amount::from_units(6)));
    }

    #[test]
    fn test_checked_sub_refuses_negative() {
        let balance = Amount::from_units(1);
        assert_eq!(
            balance.checked_sub(Amount::from_cents(50)),
            Some(Amount::from_cents(50))
        );
        assert_eq!(balance.checked_sub(Amount::from_units(6)), None);
    }

    #[test]
    fn test_serde_transparent() {
        let amount = Amount::from_cents(400);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "400");
        let parsed: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, amount);
    }
}
