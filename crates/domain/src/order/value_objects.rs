//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::UserId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// An amount of money in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Price times a line quantity, or `None` on overflow.
    pub fn checked_mul(&self, quantity: i32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }

    /// Running total plus `other`, or `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Generates a human-facing order number.
///
/// Layout: `YYYYMMDDHHMMSS` of `now` in UTC, the user id zero-padded to eight
/// digits, then four random digits. For user ids below 10^8 the result is
/// exactly 26 characters.
pub fn generate_order_sn(user_id: UserId, now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "{}{:08}{:04}",
        now.format("%Y%m%d%H%M%S"),
        user_id.get(),
        suffix
    )
}
