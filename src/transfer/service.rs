//! The transfer orchestrator: atomic two-sided movements between products.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;
use uuid::Uuid;

use crate::{
    Error,
    database_id::ProductId,
    db::with_transaction,
    money::Money,
    product::{Currency, get_product, recalculate_balance, validate_balance_constraint},
    transaction::{Transaction, TransactionType, insert_transaction},
    trm::RateSource,
};

/// The fields needed to create a transfer between two of the caller's
/// products.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransfer {
    /// The product the money leaves.
    pub source_product_id: ProductId,
    /// The product the money arrives at.
    pub destination_product_id: ProductId,
    /// The amount debited from the source, in the source's currency.
    pub amount: Money,
    /// The day of the movement.
    pub date: Date,
    /// Free-form notes, copied onto both legs.
    pub notes: Option<String>,
    /// A caller-pinned exchange rate (COP per USD). When absent and the
    /// products' currencies differ, the injected rate source is consulted.
    pub exchange_rate: Option<Decimal>,
}

/// The two legs of a completed transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    /// The id shared by both legs.
    pub transfer_id: String,
    /// The expense leg on the source product.
    pub source_transaction: Transaction,
    /// The income leg on the destination product.
    pub destination_transaction: Transaction,
    /// The rate that was applied, or `None` for a same-currency transfer.
    pub exchange_rate: Option<Decimal>,
}

/// Move money between two of the caller's products.
///
/// Creates a linked pair of transactions sharing a freshly generated
/// transfer id: an expense on the source named after the destination, and
/// an income on the destination named after the source, both excluded from
/// reporting and uncategorised. Across a currency boundary the destination
/// amount is converted with the caller-pinned rate, or the injected
/// source's current rate. Both legs and both balance recalculations commit
/// in one database transaction; on any failure no leg is persisted.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if either product is missing or not owned by
///   `user_id` (the two cases are indistinguishable),
/// - [Error::SelfTransfer] if both ids name the same product,
/// - [Error::InvalidAmount] if the amount is zero or the rate is not
///   positive,
/// - [Error::ExchangeRateUnavailable] if the currencies differ, no rate was
///   supplied, and the rate source failed,
/// - or [Error::InsufficientBalance] if debiting the source would overdraw
///   a balance-restricted product.
pub fn create_transfer(
    user_id: &str,
    transfer: NewTransfer,
    rate_source: &dyn RateSource,
    connection: &Connection,
) -> Result<TransferReceipt, Error> {
    let source = get_product(transfer.source_product_id, user_id, connection)?;
    let destination = get_product(transfer.destination_product_id, user_id, connection)?;

    if source.id == destination.id {
        return Err(Error::SelfTransfer);
    }

    if transfer.amount <= Money::ZERO {
        return Err(Error::InvalidAmount(transfer.amount.to_string()));
    }

    let (destination_amount, exchange_rate) = if source.currency == destination.currency {
        (transfer.amount, None)
    } else {
        let rate = match transfer.exchange_rate {
            Some(rate) => rate,
            None => {
                rate_source
                    .current_rate()
                    .map_err(|_| Error::ExchangeRateUnavailable)?
                    .rate
            }
        };
        if rate <= Decimal::ZERO {
            return Err(Error::InvalidAmount(rate.to_string()));
        }

        let converted = convert(transfer.amount, source.currency, destination.currency, rate)?;
        (converted, Some(rate))
    };

    let transfer_id = Uuid::new_v4().to_string();

    let (source_transaction, destination_transaction) = with_transaction(connection, |tx| {
        // A transfer always debits the source as an expense.
        validate_balance_constraint(source.id, -transfer.amount.as_decimal(), tx)?;

        let source_transaction = insert_transaction(
            Transaction::build(
                source.id,
                TransactionType::Expense,
                &format!("Transfer to {}", destination.name),
                transfer.amount,
                source.currency,
                transfer.date,
            )
            .excluded(true)
            .notes(transfer.notes.clone())
            .transfer_id(Some(transfer_id.clone())),
            tx,
        )?;

        let destination_transaction = insert_transaction(
            Transaction::build(
                destination.id,
                TransactionType::Income,
                &format!("Transfer from {}", source.name),
                destination_amount,
                destination.currency,
                transfer.date,
            )
            .excluded(true)
            .notes(transfer.notes.clone())
            .transfer_id(Some(transfer_id.clone())),
            tx,
        )?;

        recalculate_balance(source.id, tx)?;
        recalculate_balance(destination.id, tx)?;

        Ok((source_transaction, destination_transaction))
    })?;

    tracing::debug!(
        %transfer_id,
        source = source.id,
        destination = destination.id,
        "created transfer"
    );

    Ok(TransferReceipt {
        transfer_id,
        source_transaction,
        destination_transaction,
        exchange_rate,
    })
}

/// Convert an amount across a currency boundary with a COP-per-USD rate:
/// COP to USD divides, USD to COP multiplies. Any pair without a defined
/// direction is rejected rather than guessed at.
fn convert(amount: Money, from: Currency, to: Currency, rate: Decimal) -> Result<Money, Error> {
    match (from, to) {
        (Currency::Cop, Currency::Usd) => Ok(Money::from_decimal(amount.as_decimal() / rate)),
        (Currency::Usd, Currency::Cop) => Ok(Money::from_decimal(amount.as_decimal() * rate)),
        (from, to) => Err(Error::UnsupportedConversion(from, to)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
