//! The exchange rate seam: TRM, the COP-per-USD reference rate.

use rust_decimal::Decimal;
use time::Date;

use crate::Error;

/// A point-in-time reference exchange rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Trm {
    /// How many COP one USD buys.
    pub rate: Decimal,
    /// The day the rate took effect.
    pub date: Date,
    /// A provenance label for the rate, e.g. the upstream API name.
    pub source: String,
}

/// A provider of the current reference exchange rate.
///
/// Implementations (HTTP clients, caches) live in the host application; the
/// ledger's only contract with the source is that it may be unavailable,
/// which cross-currency transfers must handle.
pub trait RateSource: Send + Sync {
    /// The current COP-per-USD rate.
    ///
    /// # Errors
    /// Returns an error when no rate can be produced. The transfer
    /// orchestrator reports this to callers as
    /// [Error::ExchangeRateUnavailable].
    fn current_rate(&self) -> Result<Trm, Error>;
}

/// A rate source that always returns the same rate.
///
/// Useful for hosts that pin a rate and for tests.
#[derive(Debug, Clone)]
pub struct FixedRateSource {
    rate: Decimal,
    date: Date,
}

impl FixedRateSource {
    /// Create a source that always reports `rate`, effective from `date`.
    pub fn new(rate: Decimal, date: Date) -> Self {
        Self { rate, date }
    }
}

impl RateSource for FixedRateSource {
    fn current_rate(&self) -> Result<Trm, Error> {
        Ok(Trm {
            rate: self.rate,
            date: self.date,
            source: "fixed".to_owned(),
        })
    }
}
