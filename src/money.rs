//! Monetary values as fixed two-decimal-place decimals.
//!
//! Amounts enter and leave the crate as plain strings ("1234.50") and are
//! stored in TEXT columns. They never pass through a float on the way to
//! storage.

use std::{
    fmt,
    ops::{Add, Neg, Sub},
    str::FromStr,
};

use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// A monetary value with exactly two decimal places.
///
/// To create a `Money`, use [Money::parse] for already-rounded input (such as
/// a request field or a stored column) or [Money::from_decimal] for the
/// result of arithmetic that may carry more precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Money(Decimal);

impl Money {
    /// Zero, rendered as `0.00`.
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Parse a decimal string with at most two fractional digits.
    ///
    /// # Errors
    /// Returns [Error::InvalidAmount] if the text is not a decimal number or
    /// carries more than two fractional digits.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let value =
            Decimal::from_str(text).map_err(|_| Error::InvalidAmount(text.to_owned()))?;

        if value.scale() > 2 {
            return Err(Error::InvalidAmount(text.to_owned()));
        }

        Ok(Money(value))
    }

    /// Parse a non-negative magnitude, e.g. a transaction amount whose sign
    /// is carried by the transaction type instead of the number itself.
    ///
    /// # Errors
    /// Returns [Error::InvalidAmount] if the text is not a decimal number,
    /// carries more than two fractional digits, or is negative.
    pub fn magnitude(text: &str) -> Result<Self, Error> {
        let money = Self::parse(text)?;

        if money.0.is_sign_negative() && !money.0.is_zero() {
            return Err(Error::InvalidAmount(text.to_owned()));
        }

        Ok(money)
    }

    /// Round an arbitrary-precision decimal to two places, midpoints away
    /// from zero.
    pub fn from_decimal(value: Decimal) -> Self {
        Money(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// The underlying decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the value is below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// A lossy float approximation, for SQL range comparisons only. Never
    /// used for stored values.
    pub(crate) fn approx_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Scale is at most 2 by construction, so rescaling cannot lose digits.
        let mut value = self.0;
        value.rescale(2);
        write!(f, "{value}")
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Money::parse(text).map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Money::parse(&text).map_err(serde::de::Error::custom)
    }
}
