//! Defines the core data model and row-level database queries for ledger
//! transactions.

use std::str::FromStr;

use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    database_id::{DatabaseId, ProductId, TransactionId},
    money::Money,
    product::Currency,
};

// ============================================================================
// MODELS
// ============================================================================

/// The direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money entering the product.
    Income,
    /// Money leaving the product.
    Expense,
    /// A movement between products; the legs themselves are stored as
    /// income/expense pairs, so this type never contributes to a balance.
    Transfer,
}

impl TransactionType {
    /// The stored representation of the transaction type.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
            TransactionType::Transfer => "transfer",
        }
    }

    /// The signed balance contribution of a transaction of this type with
    /// the given amount: income counts positive, expense negative.
    pub fn signed_contribution(&self, amount: Money) -> Decimal {
        match self {
            TransactionType::Income => amount.as_decimal(),
            TransactionType::Expense => -amount.as_decimal(),
            TransactionType::Transfer => Decimal::ZERO,
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("unknown transaction type \"{other}\"")),
        }
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

/// A single monetary movement against one financial product.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The product the transaction moves money in or out of.
    pub product_id: ProductId,
    /// The category the transaction belongs to, if any.
    pub category_id: Option<DatabaseId>,
    /// The transfer pair this transaction is one leg of, if any.
    pub transfer_id: Option<String>,
    /// The direction of the movement.
    pub transaction_type: TransactionType,
    /// A short description of the transaction.
    pub name: String,
    /// The merchant the money went to or came from.
    pub merchant: Option<String>,
    /// Whether the transaction is excluded from reporting aggregates.
    ///
    /// Excluded transactions still affect the product balance; transfer
    /// legs are always excluded so a transfer never shows up as spending.
    pub excluded: bool,
    /// The non-negative magnitude of the movement; the sign is implied by
    /// the transaction type.
    pub amount: Money,
    /// The currency of the amount.
    pub currency: Currency,
    /// The day the transaction happened.
    pub date: Date,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the row was created.
    pub created_at: OffsetDateTime,
    /// When the row was last written.
    pub updated_at: OffsetDateTime,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        product_id: ProductId,
        transaction_type: TransactionType,
        name: &str,
        amount: Money,
        currency: Currency,
        date: Date,
    ) -> TransactionBuilder {
        TransactionBuilder {
            product_id,
            transaction_type,
            name: name.to_owned(),
            amount,
            currency,
            date,
            category_id: None,
            merchant: None,
            excluded: false,
            notes: None,
            transfer_id: None,
        }
    }
}

/// A builder for creating [Transaction] instances, providing defaults for
/// the optional fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionBuilder {
    /// The product the transaction belongs to.
    pub product_id: ProductId,
    /// The direction of the movement.
    pub transaction_type: TransactionType,
    /// A short description of the transaction.
    pub name: String,
    /// The non-negative magnitude of the movement.
    pub amount: Money,
    /// The currency of the amount.
    pub currency: Currency,
    /// The day the transaction happened.
    pub date: Date,
    /// The category the transaction belongs to. Defaults to none.
    pub category_id: Option<DatabaseId>,
    /// The merchant involved. Defaults to none.
    pub merchant: Option<String>,
    /// Whether to exclude the transaction from reporting aggregates.
    /// Defaults to false.
    pub excluded: bool,
    /// Free-form notes. Defaults to none.
    pub notes: Option<String>,
    /// The transfer pair this transaction is one leg of. Defaults to none;
    /// set only by the transfer orchestrator.
    pub transfer_id: Option<String>,
}

impl TransactionBuilder {
    /// Set the category for the transaction.
    pub fn category_id(mut self, category_id: Option<DatabaseId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Set the merchant for the transaction.
    pub fn merchant(mut self, merchant: Option<String>) -> Self {
        self.merchant = merchant;
        self
    }

    /// Exclude or include the transaction in reporting aggregates.
    pub fn excluded(mut self, excluded: bool) -> Self {
        self.excluded = excluded;
        self
    }

    /// Set the notes for the transaction.
    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Mark the transaction as one leg of a transfer pair.
    pub fn transfer_id(mut self, transfer_id: Option<String>) -> Self {
        self.transfer_id = transfer_id;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub(crate) const TRANSACTION_COLUMNS: &str = "id, product_id, category_id, transfer_id, type, \
     name, merchant, excluded, amount, currency, date, notes, created_at, updated_at";

pub(crate) const TRANSACTION_COLUMNS_QUALIFIED: &str =
    "t.id, t.product_id, t.category_id, t.transfer_id, t.type, t.name, t.merchant, t.excluded, \
     t.amount, t.currency, t.date, t.notes, t.created_at, t.updated_at";

/// Create the ledger transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS ledger_transaction (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id INTEGER NOT NULL,
                category_id INTEGER,
                transfer_id TEXT,
                type TEXT NOT NULL,
                name TEXT NOT NULL,
                merchant TEXT,
                excluded INTEGER NOT NULL DEFAULT 0,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                date TEXT NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(product_id) REFERENCES financial_product(id) ON DELETE CASCADE
                )",
        (),
    )?;

    // Covers the keyset listing order.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_transaction_product_date
         ON ledger_transaction(product_id, date DESC, id DESC)",
        (),
    )?;

    // Covers transfer counterpart lookups.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_transaction_transfer
         ON ledger_transaction(transfer_id)",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        product_id: row.get(1)?,
        category_id: row.get(2)?,
        transfer_id: row.get(3)?,
        transaction_type: row.get(4)?,
        name: row.get(5)?,
        merchant: row.get(6)?,
        excluded: row.get(7)?,
        amount: row.get(8)?,
        currency: row.get(9)?,
        date: row.get(10)?,
        notes: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Insert a new transaction row from a builder.
///
/// Callers are responsible for ownership and balance checks; this function
/// only writes the row.
///
/// # Errors
/// Returns an [Error::NotFound] if the builder's product does not exist, or
/// an [Error::SqlError] if there is some other SQL error.
pub fn insert_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();

    let transaction = connection
        .prepare(&format!(
            "INSERT INTO ledger_transaction
                 (product_id, category_id, transfer_id, type, name, merchant, excluded,
                  amount, currency, date, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                builder.product_id,
                builder.category_id,
                builder.transfer_id,
                builder.transaction_type,
                builder.name,
                builder.merchant,
                builder.excluded,
                builder.amount,
                builder.currency,
                builder.date,
                builder.notes,
                now,
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            // The only foreign key is the product, so the row was aimed at a
            // product that does not exist.
            rusqlite::Error::SqliteFailure(error, Some(_)) if error.extended_code == 787 => {
                Error::NotFound
            }
            error => error.into(),
        })?;

    Ok(transaction)
}

/// Retrieve a transaction by its `id`, scoped to the products `user_id`
/// owns.
///
/// # Errors
/// Returns an [Error::NotFound] if `id` does not refer to a transaction on
/// one of `user_id`'s products; a transaction owned by someone else is
/// reported exactly like a missing one.
pub fn get_transaction_for_user(
    id: TransactionId,
    user_id: &str,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS_QUALIFIED} FROM ledger_transaction t
             INNER JOIN financial_product p ON t.product_id = p.id
             WHERE t.id = ?1 AND p.user_id = ?2"
        ))?
        .query_row((id, user_id), map_transaction_row)?;

    Ok(transaction)
}

/// Write every mutable column of `transaction` back to its row.
///
/// # Errors
/// Returns an [Error::NotFound] if the row no longer exists, or an
/// [Error::SqlError] if there is an SQL error.
pub(crate) fn update_transaction_row(
    transaction: &Transaction,
    connection: &Connection,
) -> Result<(), Error> {
    let updated = connection.execute(
        "UPDATE ledger_transaction
         SET category_id = ?1, type = ?2, name = ?3, merchant = ?4, excluded = ?5,
             amount = ?6, currency = ?7, date = ?8, notes = ?9, updated_at = ?10
         WHERE id = ?11",
        (
            transaction.category_id,
            transaction.transaction_type,
            &transaction.name,
            &transaction.merchant,
            transaction.excluded,
            transaction.amount,
            transaction.currency,
            transaction.date,
            &transaction.notes,
            transaction.updated_at,
            transaction.id,
        ),
    )?;

    if updated == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Delete the rows with the given ids, returning how many were deleted.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub(crate) fn delete_transaction_rows(
    ids: &[TransactionId],
    connection: &Connection,
) -> Result<usize, Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = (1..=ids.len())
        .map(|position| format!("?{position}"))
        .collect::<Vec<_>>()
        .join(", ");

    let deleted = connection.execute(
        &format!("DELETE FROM ledger_transaction WHERE id IN ({placeholders})"),
        params_from_iter(ids.iter()),
    )?;

    Ok(deleted)
}

/// Find the other leg of a transfer pair, if it still exists.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub(crate) fn find_transfer_counterpart(
    transfer_id: &str,
    excluding_id: TransactionId,
    connection: &Connection,
) -> Result<Option<Transaction>, Error> {
    let counterpart = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transaction
             WHERE transfer_id = ?1 AND id != ?2"
        ))?
        .query_row((transfer_id, excluding_id), map_transaction_row)
        .optional()?;

    Ok(counterpart)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        money::Money,
        product::{Currency, NewProduct, ProductType, create_product},
    };

    use super::{
        Transaction, TransactionType, delete_transaction_rows, find_transfer_counterpart,
        get_transaction_for_user, insert_transaction,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn create_test_product(conn: &Connection, user_id: &str) -> i64 {
        create_product(
            NewProduct {
                user_id: user_id.to_owned(),
                name: "Savings".to_owned(),
                product_type: ProductType::Savings,
                currency: Currency::Cop,
                metadata: serde_json::Map::new(),
            },
            conn,
        )
        .unwrap()
        .id
    }

    fn amount(text: &str) -> Money {
        Money::parse(text).unwrap()
    }

    #[test]
    fn insert_succeeds() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, "user-1");

        let transaction = insert_transaction(
            Transaction::build(
                product_id,
                TransactionType::Expense,
                "Groceries",
                amount("54000.00"),
                Currency::Cop,
                date!(2026 - 02 - 01),
            )
            .merchant(Some("Exito".to_owned())),
            &conn,
        )
        .expect("Could not insert transaction");

        assert!(transaction.id > 0);
        assert_eq!(transaction.amount.to_string(), "54000.00");
        assert_eq!(transaction.merchant.as_deref(), Some("Exito"));
        assert_eq!(transaction.transfer_id, None);
        assert!(!transaction.excluded);
    }

    #[test]
    fn insert_fails_on_missing_product() {
        let conn = get_test_connection();

        let result = insert_transaction(
            Transaction::build(
                1337,
                TransactionType::Income,
                "Ghost",
                amount("1.00"),
                Currency::Cop,
                date!(2026 - 02 - 01),
            ),
            &conn,
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn get_for_user_succeeds() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, "user-1");
        let inserted = insert_transaction(
            Transaction::build(
                product_id,
                TransactionType::Income,
                "Salary",
                amount("3000000.00"),
                Currency::Cop,
                date!(2026 - 02 - 01),
            ),
            &conn,
        )
        .unwrap();

        let selected = get_transaction_for_user(inserted.id, "user-1", &conn).unwrap();

        assert_eq!(inserted, selected);
    }

    #[test]
    fn get_for_user_hides_other_users_transactions() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, "user-1");
        let inserted = insert_transaction(
            Transaction::build(
                product_id,
                TransactionType::Income,
                "Salary",
                amount("100.00"),
                Currency::Cop,
                date!(2026 - 02 - 01),
            ),
            &conn,
        )
        .unwrap();

        let result = get_transaction_for_user(inserted.id, "user-2", &conn);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn delete_rows_reports_count() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, "user-1");
        let mut ids = Vec::new();
        for i in 1..=3 {
            let transaction = insert_transaction(
                Transaction::build(
                    product_id,
                    TransactionType::Income,
                    &format!("transaction #{i}"),
                    amount("10.00"),
                    Currency::Cop,
                    date!(2026 - 02 - 01),
                ),
                &conn,
            )
            .unwrap();
            ids.push(transaction.id);
        }

        let deleted = delete_transaction_rows(&ids[..2], &conn).unwrap();

        assert_eq!(deleted, 2);
        assert!(get_transaction_for_user(ids[2], "user-1", &conn).is_ok());
    }

    #[test]
    fn finds_transfer_counterpart() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, "user-1");
        let other_product_id = create_test_product(&conn, "user-1");
        let transfer_id = "4a0e5191-9f20-4cf6-a745-0a44ec7b5f6e";

        let source = insert_transaction(
            Transaction::build(
                product_id,
                TransactionType::Expense,
                "Transfer out",
                amount("100.00"),
                Currency::Cop,
                date!(2026 - 02 - 01),
            )
            .excluded(true)
            .transfer_id(Some(transfer_id.to_owned())),
            &conn,
        )
        .unwrap();
        let destination = insert_transaction(
            Transaction::build(
                other_product_id,
                TransactionType::Income,
                "Transfer in",
                amount("100.00"),
                Currency::Cop,
                date!(2026 - 02 - 01),
            )
            .excluded(true)
            .transfer_id(Some(transfer_id.to_owned())),
            &conn,
        )
        .unwrap();

        let counterpart = find_transfer_counterpart(transfer_id, source.id, &conn).unwrap();

        assert_eq!(counterpart, Some(destination));
    }

    #[test]
    fn counterpart_is_none_without_pair() {
        let conn = get_test_connection();

        let counterpart = find_transfer_counterpart("no-such-transfer", 1, &conn).unwrap();

        assert_eq!(counterpart, None);
    }
}
