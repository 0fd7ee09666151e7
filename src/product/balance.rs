//! Keeps each product's cached balance consistent with its transactions.

use rusqlite::Connection;
use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::ProductId,
    money::Money,
    transaction::TransactionType,
};

use super::core::ProductType;

/// Recompute a product's cached balance from its transaction set.
///
/// The balance is the sum of income amounts minus the sum of expense
/// amounts over every transaction currently referencing the product,
/// rounded to two decimal places; an empty transaction set yields `0.00`.
/// The new value is persisted together with a fresh `updated_at`.
///
/// Idempotent, and the only code path that writes the balance column. Must
/// run inside the same database transaction as the mutation it follows:
/// downstream consumers read the cached value and never re-derive it, so a
/// balance that does not match the rows is a correctness bug.
///
/// # Errors
/// Returns an [Error::NotFound] if `product_id` does not refer to a product,
/// or an [Error::SqlError] if there is an SQL error.
pub fn recalculate_balance(
    product_id: ProductId,
    connection: &Connection,
) -> Result<Money, Error> {
    let mut statement =
        connection.prepare("SELECT type, amount FROM ledger_transaction WHERE product_id = ?1")?;
    let rows = statement.query_map([product_id], |row| {
        Ok((
            row.get::<_, TransactionType>(0)?,
            row.get::<_, Money>(1)?,
        ))
    })?;

    let mut total = Decimal::ZERO;
    for row in rows {
        let (transaction_type, amount) = row?;
        total += transaction_type.signed_contribution(amount);
    }

    let balance = Money::from_decimal(total);

    let updated = connection.execute(
        "UPDATE financial_product SET balance = ?1, updated_at = ?2 WHERE id = ?3",
        (balance, OffsetDateTime::now_utc(), product_id),
    )?;

    if updated == 0 {
        return Err(Error::NotFound);
    }

    Ok(balance)
}

/// Check that applying `delta` to a product's balance would not violate its
/// non-negative-balance restriction.
///
/// Products whose type is outside the restricted set pass unconditionally.
/// Must run before the mutating write that would realise the delta, so an
/// invalid mutation never lands in storage, even transiently.
///
/// # Errors
/// Returns an [Error::InsufficientBalance] if the product is restricted and
/// `current + delta` is negative, or an [Error::NotFound] if `product_id`
/// does not refer to a product.
pub fn validate_balance_constraint(
    product_id: ProductId,
    delta: Decimal,
    connection: &Connection,
) -> Result<(), Error> {
    let (product_type, balance) = connection
        .prepare("SELECT type, balance FROM financial_product WHERE id = ?1")?
        .query_row([product_id], |row| {
            Ok((row.get::<_, ProductType>(0)?, row.get::<_, Money>(1)?))
        })?;

    if !product_type.requires_non_negative_balance() {
        return Ok(());
    }

    if balance.as_decimal() + delta < Decimal::ZERO {
        return Err(Error::InsufficientBalance);
    }

    Ok(())
}

#[cfg(test)]
mod recalculate_balance_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        money::Money,
        product::{Currency, NewProduct, ProductType, create_product, get_product},
        transaction::{Transaction, TransactionType, insert_transaction},
    };

    use super::recalculate_balance;

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn create_test_product(conn: &Connection, product_type: ProductType) -> i64 {
        create_product(
            NewProduct {
                user_id: "user-1".to_owned(),
                name: "Test".to_owned(),
                product_type,
                currency: Currency::Cop,
                metadata: serde_json::Map::new(),
            },
            conn,
        )
        .unwrap()
        .id
    }

    fn insert(conn: &Connection, product_id: i64, transaction_type: TransactionType, amount: &str) {
        insert_transaction(
            Transaction::build(
                product_id,
                transaction_type,
                "Test",
                Money::parse(amount).unwrap(),
                Currency::Cop,
                date!(2026 - 01 - 15),
            ),
            conn,
        )
        .unwrap();
    }

    #[test]
    fn empty_transaction_set_yields_zero() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, ProductType::Savings);

        let balance = recalculate_balance(product_id, &conn).unwrap();

        assert_eq!(balance.to_string(), "0.00");
    }

    #[test]
    fn sums_income_minus_expense() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, ProductType::Savings);
        insert(&conn, product_id, TransactionType::Income, "1000.00");
        insert(&conn, product_id, TransactionType::Income, "250.50");
        insert(&conn, product_id, TransactionType::Expense, "300.00");

        let balance = recalculate_balance(product_id, &conn).unwrap();

        assert_eq!(balance.to_string(), "950.50");
        let product = get_product(product_id, "user-1", &conn).unwrap();
        assert_eq!(product.balance, balance);
    }

    #[test]
    fn is_idempotent() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, ProductType::Savings);
        insert(&conn, product_id, TransactionType::Income, "42.00");

        let first = recalculate_balance(product_id, &conn).unwrap();
        let second = recalculate_balance(product_id, &conn).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn ignores_other_products_transactions() {
        let conn = get_test_connection();
        let product_id = create_test_product(&conn, ProductType::Savings);
        let other_id = create_test_product(&conn, ProductType::Savings);
        insert(&conn, other_id, TransactionType::Income, "999.99");

        let balance = recalculate_balance(product_id, &conn).unwrap();

        assert_eq!(balance, Money::ZERO);
    }

    #[test]
    fn fails_on_missing_product() {
        let conn = get_test_connection();

        let result = recalculate_balance(1337, &conn);

        assert_eq!(result, Err(Error::NotFound));
    }
}
