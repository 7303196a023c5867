//! Fixed-precision money.
//!
//! Every amount that takes part in a threshold check or a match predicate is
//! held as whole euro cents, so comparisons and tie-breaks are exact integer
//! arithmetic and re-runs are bit-for-bit reproducible.

use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;

use serde::{Deserialize, Serialize};

/// A non-negative amount in euro cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole euros, for literals in tables and tests.
    pub const fn from_whole_euros(euros: i64) -> Self {
        Self(euros * 100)
    }

    /// Convert a euro amount, rounding to the nearest cent.
    ///
    /// Negative and non-finite values are rejected.
    pub fn from_euros(euros: f64) -> Option<Self> {
        if !euros.is_finite() || euros < 0.0 {
            return None;
        }
        let cents = (euros * 100.0).round();
        if cents > i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub fn as_euros(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: Cents) -> Cents {
        Cents(self.0.saturating_add(other.0))
    }

    /// Strip VAT from a VAT-inclusive amount: `self / (1 + rate)`.
    pub fn net_of_vat(self, rate: f64) -> Cents {
        if !rate.is_finite() || rate <= 0.0 {
            return self;
        }
        Cents((self.0 as f64 / (1.0 + rate)).round() as i64)
    }

    /// Absolute difference relative to `self` as the base amount.
    pub fn delta_to(self, other: Cents) -> AmountDelta {
        AmountDelta {
            diff: (other.0 - self.0).abs(),
            base: self.0,
        }
    }

    /// Inclusive `[low, high]` window of amounts within `tolerance` of `self`.
    pub fn window(self, tolerance: Tolerance) -> (Cents, Cents) {
        let slack = (self.0 as i128 * tolerance.basis_points() as i128 / 10_000) as i64;
        (Cents((self.0 - slack).max(0)), Cents(self.0.saturating_add(slack)))
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl TryFrom<f64> for Cents {
    type Error = String;

    fn try_from(euros: f64) -> Result<Self, Self::Error> {
        Cents::from_euros(euros).ok_or_else(|| format!("invalid amount: {euros}"))
    }
}

impl From<Cents> for f64 {
    fn from(c: Cents) -> f64 {
        c.as_euros()
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Self {
        iter.fold(Cents::ZERO, Cents::saturating_add)
    }
}

/// A relative tolerance, stored in basis points (1 bp = 0.01 %).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tolerance(i64);

impl Tolerance {
    pub const fn from_basis_points(bp: i64) -> Self {
        Self(bp)
    }

    /// `0.10` → 10 %.
    pub fn from_fraction(fraction: f64) -> Self {
        if !fraction.is_finite() || fraction <= 0.0 {
            return Self(0);
        }
        Self((fraction * 10_000.0).round() as i64)
    }

    pub const fn basis_points(self) -> i64 {
        self.0
    }

    pub fn as_fraction(self) -> f64 {
        self.0 as f64 / 10_000.0
    }
}

/// Relative amount difference `diff / base`, ordered exactly.
///
/// Two deltas are compared by cross-multiplication so that candidates against
/// different base amounts rank without floating-point rounding.
#[derive(Debug, Clone, Copy)]
pub struct AmountDelta {
    diff: i64,
    base: i64,
}

impl AmountDelta {
    pub fn diff(&self) -> Cents {
        Cents(self.diff)
    }

    /// Whether `diff <= tolerance × base`.
    pub fn within(&self, tolerance: Tolerance) -> bool {
        self.diff as i128 * 10_000 <= tolerance.basis_points() as i128 * self.base as i128
    }

    /// Delta as a percentage of the base, for reporting.
    pub fn percent(&self) -> f64 {
        if self.base == 0 {
            return if self.diff == 0 { 0.0 } else { f64::INFINITY };
        }
        self.diff as f64 / self.base as f64 * 100.0
    }
}

impl PartialEq for AmountDelta {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AmountDelta {}

impl PartialOrd for AmountDelta {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AmountDelta {
    fn cmp(&self, other: &Self) -> Ordering {
        // A zero base is an unbounded delta unless the diff is zero too.
        match (self.base == 0, other.base == 0) {
            (true, true) => return self.diff.cmp(&other.diff),
            (true, false) => {
                return if self.diff == 0 { Ordering::Less } else { Ordering::Greater };
            }
            (false, true) => {
                return if other.diff == 0 { Ordering::Greater } else { Ordering::Less };
            }
            (false, false) => {}
        }
        let lhs = self.diff as i128 * other.base as i128;
        let rhs = other.diff as i128 * self.base as i128;
        lhs.cmp(&rhs)
    }
}
