//! Defines the crate level error type.

use crate::product::Currency;

/// The errors that may occur in the ledger.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested product or transaction was not found.
    ///
    /// A row that exists but belongs to a different user produces the same
    /// error as a row that does not exist, so callers cannot probe for other
    /// users' data.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A mutation would drive a non-negative-balance product below zero.
    ///
    /// Unlike the other validation errors this one is computed from persisted
    /// state, so callers may want to surface it against the amount field.
    #[error("insufficient balance for this operation")]
    InsufficientBalance,

    /// A transfer named the same product as both source and destination.
    #[error("source and destination products must be different")]
    SelfTransfer,

    /// A string could not be read as a monetary amount.
    ///
    /// Amounts are decimal strings with at most two fractional digits.
    #[error("\"{0}\" is not a valid monetary amount")]
    InvalidAmount(String),

    /// A pagination cursor token could not be decoded.
    #[error("the pagination cursor could not be decoded")]
    InvalidCursor,

    /// No conversion is defined between this pair of currencies.
    #[error("no conversion is defined from {0} to {1}")]
    UnsupportedConversion(Currency, Currency),

    /// The exchange rate source failed and the caller supplied no rate.
    ///
    /// Only cross-currency transfers can produce this error; same-currency
    /// transfers never consult the rate source.
    #[error("the exchange rate source is unavailable")]
    ExchangeRateUnavailable,

    /// A value could not be serialized as JSON.
    #[error("could not serialize as JSON: {0}")]
    JsonSerialization(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}
