//! The transaction ledger operations.
//!
//! Every operation is scoped to the requesting user: a transaction on a
//! product the caller does not own behaves exactly like one that does not
//! exist. Every mutation runs inside a single database transaction spanning
//! the balance constraint check, the row writes, and the balance
//! recalculation, so the cached balance is never observable in a state
//! inconsistent with the rows.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{Connection, params_from_iter, types::Value};
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    database_id::{DatabaseId, ProductId, TransactionId},
    db::with_transaction,
    money::Money,
    product::{
        Currency, ProductType, get_product, recalculate_balance, validate_balance_constraint,
    },
};

use super::{
    core::{
        TRANSACTION_COLUMNS, TRANSACTION_COLUMNS_QUALIFIED, Transaction, TransactionBuilder,
        TransactionType, delete_transaction_rows, find_transfer_counterpart,
        get_transaction_for_user, insert_transaction, map_transaction_row, update_transaction_row,
    },
    cursor::Cursor,
    query::TransactionQuery,
};

/// One page of a transaction listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionPage {
    /// The rows of this page, ordered by `(date DESC, id DESC)`.
    pub transactions: Vec<Transaction>,
    /// The token for the next page, or `None` when this page is the last.
    pub next_cursor: Option<String>,
}

/// A transaction together with the product it belongs to, for listings that
/// span products.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductTransaction {
    /// The transaction itself.
    pub transaction: Transaction,
    /// The display name of the owning product.
    pub product_name: String,
    /// The type of the owning product.
    pub product_type: ProductType,
}

/// One page of a cross-product transaction listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductTransactionPage {
    /// The rows of this page, ordered by `(date DESC, id DESC)`.
    pub transactions: Vec<ProductTransaction>,
    /// The token for the next page, or `None` when this page is the last.
    pub next_cursor: Option<String>,
}

/// A partial update to a transaction. Fields left as `None` keep their
/// previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    /// Move the transaction to this category.
    pub category_id: Option<DatabaseId>,
    /// Change the direction of the movement.
    pub transaction_type: Option<TransactionType>,
    /// Rename the transaction.
    pub name: Option<String>,
    /// Change the merchant.
    pub merchant: Option<String>,
    /// Include or exclude the transaction from reporting aggregates.
    pub excluded: Option<bool>,
    /// Change the amount magnitude.
    pub amount: Option<Money>,
    /// Change the currency.
    pub currency: Option<Currency>,
    /// Change the transaction date.
    pub date: Option<Date>,
    /// Change the notes.
    pub notes: Option<String>,
}

impl TransactionUpdate {
    fn apply(self, existing: &Transaction) -> Transaction {
        let mut updated = existing.clone();

        if let Some(category_id) = self.category_id {
            updated.category_id = Some(category_id);
        }
        if let Some(transaction_type) = self.transaction_type {
            updated.transaction_type = transaction_type;
        }
        if let Some(name) = self.name {
            updated.name = name;
        }
        if let Some(merchant) = self.merchant {
            updated.merchant = Some(merchant);
        }
        if let Some(excluded) = self.excluded {
            updated.excluded = excluded;
        }
        if let Some(amount) = self.amount {
            updated.amount = amount;
        }
        if let Some(currency) = self.currency {
            updated.currency = currency;
        }
        if let Some(date) = self.date {
            updated.date = date;
        }
        if let Some(notes) = self.notes {
            updated.notes = Some(notes);
        }

        updated.updated_at = OffsetDateTime::now_utc();
        updated
    }
}

/// The result of a bulk delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkDeleteOutcome {
    /// How many rows were deleted, counting transfer counterparts that were
    /// pulled in beyond the requested ids.
    pub deleted: usize,
    /// Requested ids that did not refer to a transaction the caller owns.
    pub not_found: Vec<TransactionId>,
}

/// One step of a running balance history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalancePoint {
    /// When the contributing transaction was recorded.
    pub timestamp: OffsetDateTime,
    /// The cumulative balance after it.
    pub balance: Money,
}

/// List a product's transactions, filtered and keyset-paginated.
///
/// Rows are ordered by `(date DESC, id DESC)`; the id tie-break makes the
/// order total, so paging never skips or repeats a row even when many
/// transactions share a date. One extra row beyond the page size is fetched
/// to decide whether a next page exists without another round trip.
///
/// # Errors
/// Returns an [Error::NotFound] if `product_id` does not refer to a product
/// owned by `user_id`, or an [Error::SqlError] if there is an SQL error.
pub fn list_transactions(
    user_id: &str,
    product_id: ProductId,
    query: &TransactionQuery,
    connection: &Connection,
) -> Result<TransactionPage, Error> {
    get_product(product_id, user_id, connection)?;

    let mut clauses = vec!["product_id = ?1".to_owned()];
    let mut parameters = vec![Value::Integer(product_id)];
    query.push_clauses("", &mut clauses, &mut parameters);

    let page_size = query.page_size();
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM ledger_transaction
         WHERE {} ORDER BY date DESC, id DESC LIMIT {}",
        clauses.join(" AND "),
        u64::from(page_size) + 1,
    );

    let rows = connection
        .prepare(&sql)?
        .query_map(params_from_iter(parameters.iter()), map_transaction_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let (transactions, next_cursor) = paginate(rows, page_size, |transaction| Cursor {
        date: transaction.date,
        id: transaction.id,
    });

    Ok(TransactionPage {
        transactions,
        next_cursor,
    })
}

/// List transactions across all of the caller's products in one stream,
/// optionally restricted to a set of products.
///
/// Same ordering, filters, and pagination as [list_transactions]; each row
/// additionally carries the owning product's name and type.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn list_all_transactions(
    user_id: &str,
    product_ids: &[ProductId],
    query: &TransactionQuery,
    connection: &Connection,
) -> Result<ProductTransactionPage, Error> {
    let mut clauses = vec!["p.user_id = ?1".to_owned()];
    let mut parameters = vec![Value::Text(user_id.to_owned())];

    if !product_ids.is_empty() {
        let placeholders = (1..=product_ids.len())
            .map(|position| format!("?{}", parameters.len() + position))
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!("t.product_id IN ({placeholders})"));
        for product_id in product_ids {
            parameters.push(Value::Integer(*product_id));
        }
    }

    query.push_clauses("t.", &mut clauses, &mut parameters);

    let page_size = query.page_size();
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS_QUALIFIED}, p.name, p.type FROM ledger_transaction t
         INNER JOIN financial_product p ON t.product_id = p.id
         WHERE {} ORDER BY t.date DESC, t.id DESC LIMIT {}",
        clauses.join(" AND "),
        u64::from(page_size) + 1,
    );

    let rows = connection
        .prepare(&sql)?
        .query_map(params_from_iter(parameters.iter()), |row| {
            Ok(ProductTransaction {
                transaction: map_transaction_row(row)?,
                product_name: row.get(14)?,
                product_type: row.get(15)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let (transactions, next_cursor) = paginate(rows, page_size, |row| Cursor {
        date: row.transaction.date,
        id: row.transaction.id,
    });

    Ok(ProductTransactionPage {
        transactions,
        next_cursor,
    })
}

/// Retrieve one transaction by id.
///
/// # Errors
/// Returns an [Error::NotFound] if `transaction_id` does not refer to a
/// transaction on one of `user_id`'s products.
pub fn get_transaction(
    user_id: &str,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    get_transaction_for_user(transaction_id, user_id, connection)
}

/// Create a transaction and bring its product's balance up to date.
///
/// # Errors
/// Returns an [Error::NotFound] if the product is missing or not owned by
/// `user_id`, or an [Error::InsufficientBalance] if the product is
/// balance-restricted and the movement would take it below zero. On any
/// error no row is inserted.
pub fn create_transaction(
    user_id: &str,
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    with_transaction(connection, |tx| {
        get_product(builder.product_id, user_id, tx)?;

        let delta = builder.transaction_type.signed_contribution(builder.amount);
        validate_balance_constraint(builder.product_id, delta, tx)?;

        let transaction = insert_transaction(builder, tx)?;
        recalculate_balance(transaction.product_id, tx)?;

        Ok(transaction)
    })
}

/// Apply a partial update to a transaction and bring its product's balance
/// up to date.
///
/// The balance constraint is checked against the difference between the
/// transaction's new and old contributions, computed before anything is
/// written.
///
/// # Errors
/// Returns an [Error::NotFound] if the transaction is missing or not owned
/// by `user_id`, or an [Error::InsufficientBalance] if the edit would take a
/// balance-restricted product below zero. On any error the row is unchanged.
pub fn update_transaction(
    user_id: &str,
    transaction_id: TransactionId,
    update: TransactionUpdate,
    connection: &Connection,
) -> Result<Transaction, Error> {
    with_transaction(connection, |tx| {
        let existing = get_transaction_for_user(transaction_id, user_id, tx)?;

        let old_delta = existing
            .transaction_type
            .signed_contribution(existing.amount);
        let updated = update.apply(&existing);
        let new_delta = updated.transaction_type.signed_contribution(updated.amount);

        validate_balance_constraint(existing.product_id, new_delta - old_delta, tx)?;

        update_transaction_row(&updated, tx)?;
        recalculate_balance(existing.product_id, tx)?;

        Ok(updated)
    })
}

/// Delete a transaction and bring its product's balance up to date.
///
/// A transfer is deleted as a pair, never as a single leg: when the
/// transaction carries a transfer id, the counterpart is deleted too and
/// its product's balance is also recalculated, no matter which leg the
/// caller targeted.
///
/// # Errors
/// Returns an [Error::NotFound] if the transaction is missing or not owned
/// by `user_id`, or an [Error::InsufficientBalance] if removing either leg
/// would take a balance-restricted product below zero. On any error nothing
/// is deleted.
pub fn delete_transaction(
    user_id: &str,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    with_transaction(connection, |tx| {
        let existing = get_transaction_for_user(transaction_id, user_id, tx)?;

        let reversal = -existing
            .transaction_type
            .signed_contribution(existing.amount);
        validate_balance_constraint(existing.product_id, reversal, tx)?;

        let counterpart = match &existing.transfer_id {
            Some(transfer_id) => find_transfer_counterpart(transfer_id, existing.id, tx)?,
            None => None,
        };

        if let Some(counterpart) = &counterpart {
            let counterpart_reversal = -counterpart
                .transaction_type
                .signed_contribution(counterpart.amount);
            validate_balance_constraint(counterpart.product_id, counterpart_reversal, tx)?;
        }

        let mut ids = vec![existing.id];
        if let Some(counterpart) = &counterpart {
            ids.push(counterpart.id);
        }
        delete_transaction_rows(&ids, tx)?;

        recalculate_balance(existing.product_id, tx)?;
        if let Some(counterpart) = &counterpart {
            recalculate_balance(counterpart.product_id, tx)?;
        }

        Ok(existing)
    })
}

/// Delete a set of transactions in one atomic operation.
///
/// The requested set is first expanded with every transfer counterpart, so
/// a bulk delete naming only one leg of a transfer still removes both legs
/// and reports a correspondingly larger deleted count. Every affected
/// product's aggregate reversal is constraint-checked before anything is
/// deleted; a single violation rejects the whole operation.
///
/// # Errors
/// Returns an [Error::InsufficientBalance] if any affected
/// balance-restricted product would go below zero. On any error nothing is
/// deleted.
pub fn delete_transactions(
    user_id: &str,
    ids: &[TransactionId],
    connection: &Connection,
) -> Result<BulkDeleteOutcome, Error> {
    let requested: BTreeSet<TransactionId> = ids.iter().copied().collect();
    if requested.is_empty() {
        return Ok(BulkDeleteOutcome::default());
    }

    with_transaction(connection, |tx| {
        let mut rows = select_owned_by_ids(user_id, &requested, tx)?;
        let found: BTreeSet<TransactionId> = rows.iter().map(|row| row.id).collect();
        let not_found: Vec<TransactionId> = requested
            .iter()
            .copied()
            .filter(|id| !found.contains(id))
            .collect();

        let transfer_ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.transfer_id.clone())
            .collect();
        if !transfer_ids.is_empty() {
            for counterpart in select_transfer_counterparts(user_id, &transfer_ids, tx)? {
                if !found.contains(&counterpart.id) {
                    rows.push(counterpart);
                }
            }
        }

        let mut deltas: BTreeMap<ProductId, Decimal> = BTreeMap::new();
        for transaction in &rows {
            *deltas.entry(transaction.product_id).or_default() -= transaction
                .transaction_type
                .signed_contribution(transaction.amount);
        }
        for (&product_id, &delta) in &deltas {
            validate_balance_constraint(product_id, delta, tx)?;
        }

        let all_ids: Vec<TransactionId> = rows.iter().map(|row| row.id).collect();
        let deleted = delete_transaction_rows(&all_ids, tx)?;
        for &product_id in deltas.keys() {
            recalculate_balance(product_id, tx)?;
        }

        tracing::debug!(deleted, "bulk deleted transactions");

        Ok(BulkDeleteOutcome { deleted, not_found })
    })
}

/// The running balance over the caller's non-excluded transactions in one
/// currency, ordered by date and creation time.
///
/// Transfer legs are excluded from reporting, so moving money between two
/// products never shows up as a change in this history.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn balance_history(
    user_id: &str,
    currency: Currency,
    connection: &Connection,
) -> Result<Vec<BalancePoint>, Error> {
    let mut statement = connection.prepare(
        "SELECT t.type, t.amount, t.created_at FROM ledger_transaction t
         INNER JOIN financial_product p ON t.product_id = p.id
         WHERE p.user_id = ?1 AND t.currency = ?2 AND t.excluded = 0
         ORDER BY t.date, t.created_at",
    )?;
    let rows = statement.query_map((user_id, currency), |row| {
        Ok((
            row.get::<_, TransactionType>(0)?,
            row.get::<_, Money>(1)?,
            row.get::<_, OffsetDateTime>(2)?,
        ))
    })?;

    let mut cumulative = Decimal::ZERO;
    let mut history = Vec::new();
    for row in rows {
        let (transaction_type, amount, created_at) = row?;
        cumulative += transaction_type.signed_contribution(amount);
        history.push(BalancePoint {
            timestamp: created_at,
            balance: Money::from_decimal(cumulative),
        });
    }

    Ok(history)
}

/// Keep `page_size` rows; if the probe row beyond them exists, derive the
/// continuation cursor from the last row kept.
fn paginate<T>(
    mut rows: Vec<T>,
    page_size: u32,
    cursor_of: impl Fn(&T) -> Cursor,
) -> (Vec<T>, Option<String>) {
    let has_more = rows.len() > page_size as usize;

    let next_cursor = if has_more {
        rows.truncate(page_size as usize);
        rows.last().map(|row| cursor_of(row).encode())
    } else {
        None
    };

    (rows, next_cursor)
}

fn select_owned_by_ids(
    user_id: &str,
    ids: &BTreeSet<TransactionId>,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut parameters: Vec<Value> = vec![Value::Text(user_id.to_owned())];
    let placeholders = (1..=ids.len())
        .map(|position| format!("?{}", parameters.len() + position))
        .collect::<Vec<_>>()
        .join(", ");
    for id in ids {
        parameters.push(Value::Integer(*id));
    }

    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS_QUALIFIED} FROM ledger_transaction t
             INNER JOIN financial_product p ON t.product_id = p.id
             WHERE p.user_id = ?1 AND t.id IN ({placeholders})"
        ))?
        .query_map(params_from_iter(parameters.iter()), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

fn select_transfer_counterparts(
    user_id: &str,
    transfer_ids: &[String],
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut parameters: Vec<Value> = vec![Value::Text(user_id.to_owned())];
    let placeholders = (1..=transfer_ids.len())
        .map(|position| format!("?{}", parameters.len() + position))
        .collect::<Vec<_>>()
        .join(", ");
    for transfer_id in transfer_ids {
        parameters.push(Value::Text(transfer_id.clone()));
    }

    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS_QUALIFIED} FROM ledger_transaction t
             INNER JOIN financial_product p ON t.product_id = p.id
             WHERE p.user_id = ?1 AND t.transfer_id IN ({placeholders})"
        ))?
        .query_map(params_from_iter(parameters.iter()), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
