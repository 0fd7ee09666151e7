//! Defines the core data models and database queries for financial products.

use std::{fmt, str::FromStr};

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{Error, database_id::ProductId, money::Money};

// ============================================================================
// MODELS
// ============================================================================

/// The kind of financial product an account represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    /// A savings account.
    Savings,
    /// A checking account.
    Checking,
    /// A credit card.
    CreditCard,
    /// A free-investment loan.
    LoanFreeInvestment,
    /// A mortgage.
    LoanMortgage,
    /// A certificate of deposit (CDT).
    InvestmentCdt,
    /// An investment fund.
    InvestmentFund,
    /// A stock holding.
    InvestmentStock,
    /// Physical cash.
    Cash,
}

impl ProductType {
    /// The stored representation of the product type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Savings => "savings",
            ProductType::Checking => "checking",
            ProductType::CreditCard => "credit_card",
            ProductType::LoanFreeInvestment => "loan_free_investment",
            ProductType::LoanMortgage => "loan_mortgage",
            ProductType::InvestmentCdt => "investment_cdt",
            ProductType::InvestmentFund => "investment_fund",
            ProductType::InvestmentStock => "investment_stock",
            ProductType::Cash => "cash",
        }
    }

    /// Whether the product's balance must never go below zero.
    ///
    /// Debt-style products (credit cards, loans) are expected to go
    /// negative; only cash holdings are restricted.
    pub fn requires_non_negative_balance(&self) -> bool {
        matches!(self, ProductType::Cash)
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "savings" => Ok(ProductType::Savings),
            "checking" => Ok(ProductType::Checking),
            "credit_card" => Ok(ProductType::CreditCard),
            "loan_free_investment" => Ok(ProductType::LoanFreeInvestment),
            "loan_mortgage" => Ok(ProductType::LoanMortgage),
            "investment_cdt" => Ok(ProductType::InvestmentCdt),
            "investment_fund" => Ok(ProductType::InvestmentFund),
            "investment_stock" => Ok(ProductType::InvestmentStock),
            "cash" => Ok(ProductType::Cash),
            other => Err(format!("unknown product type \"{other}\"")),
        }
    }
}

impl ToSql for ProductType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ProductType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

/// The currency a product or transaction is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Colombian pesos.
    Cop,
    /// United States dollars.
    Usd,
}

impl Currency {
    /// The stored representation of the currency.
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Cop => "COP",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "COP" => Ok(Currency::Cop),
            "USD" => Ok(Currency::Usd),
            other => Err(format!("unknown currency \"{other}\"")),
        }
    }
}

impl ToSql for Currency {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Currency {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

/// A user-owned financial account: bank account, card, loan, investment, or
/// cash holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialProduct {
    /// The ID of the product.
    pub id: ProductId,
    /// The identity of the owning user, as resolved by the auth layer.
    pub user_id: String,
    /// The kind of account.
    pub product_type: ProductType,
    /// The display name, also embedded in generated transfer leg names.
    pub name: String,
    /// The cached balance.
    ///
    /// Always equals the signed sum of the product's transactions. Written
    /// only by [recalculate_balance](crate::product::recalculate_balance),
    /// never directly by callers.
    pub balance: Money,
    /// The currency the product is denominated in.
    pub currency: Currency,
    /// Free-form metadata attached by the host application.
    pub metadata: Map<String, Value>,
    /// When the product was created.
    pub created_at: OffsetDateTime,
    /// When the product (including its cached balance) was last written.
    pub updated_at: OffsetDateTime,
}

/// The fields needed to create a [FinancialProduct].
///
/// The balance is not among them: every product starts at `0.00` and is only
/// ever moved by transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    /// The identity of the owning user.
    pub user_id: String,
    /// The display name.
    pub name: String,
    /// The kind of account.
    pub product_type: ProductType,
    /// The currency the product is denominated in.
    pub currency: Currency,
    /// Free-form metadata attached by the host application.
    pub metadata: Map<String, Value>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the financial product table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_product_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS financial_product (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                type TEXT NOT NULL,
                name TEXT NOT NULL,
                balance TEXT NOT NULL DEFAULT '0.00',
                currency TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_financial_product_user ON financial_product(user_id)",
        (),
    )?;

    Ok(())
}

/// Map a database row to a FinancialProduct.
pub fn map_product_row(row: &Row) -> Result<FinancialProduct, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = row.get(1)?;
    let product_type = row.get(2)?;
    let name = row.get(3)?;
    let balance = row.get(4)?;
    let currency = row.get(5)?;

    let metadata_text: String = row.get(6)?;
    let metadata = serde_json::from_str(&metadata_text).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(error))
    })?;

    let created_at = row.get(7)?;
    let updated_at = row.get(8)?;

    Ok(FinancialProduct {
        id,
        user_id,
        product_type,
        name,
        balance,
        currency,
        metadata,
        created_at,
        updated_at,
    })
}

const PRODUCT_COLUMNS: &str =
    "id, user_id, type, name, balance, currency, metadata, created_at, updated_at";

/// Create a new financial product with a zero balance.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn create_product(
    new_product: NewProduct,
    connection: &Connection,
) -> Result<FinancialProduct, Error> {
    let metadata_text = serde_json::to_string(&new_product.metadata)
        .map_err(|error| Error::JsonSerialization(error.to_string()))?;
    let now = OffsetDateTime::now_utc();

    let product = connection
        .prepare(&format!(
            "INSERT INTO financial_product (user_id, type, name, balance, currency, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, '0.00', ?4, ?5, ?6, ?6)
             RETURNING {PRODUCT_COLUMNS}"
        ))?
        .query_row(
            (
                &new_product.user_id,
                new_product.product_type,
                &new_product.name,
                new_product.currency,
                metadata_text,
                now,
            ),
            map_product_row,
        )?;

    Ok(product)
}

/// Retrieve a product by its `id`, scoped to the products `user_id` owns.
///
/// # Errors
/// Returns an [Error::NotFound] if `id` does not refer to a product owned by
/// `user_id`; a product owned by someone else is reported exactly like a
/// missing one.
pub fn get_product(
    id: ProductId,
    user_id: &str,
    connection: &Connection,
) -> Result<FinancialProduct, Error> {
    let product = connection
        .prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM financial_product WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_row((id, user_id), map_product_row)?;

    Ok(product)
}

/// Retrieve all products owned by `user_id`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn list_products(
    user_id: &str,
    connection: &Connection,
) -> Result<Vec<FinancialProduct>, Error> {
    connection
        .prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM financial_product WHERE user_id = ?1 ORDER BY id"
        ))?
        .query_map([user_id], map_product_row)?
        .map(|maybe_product| maybe_product.map_err(Error::from))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;

    use crate::{Error, db::initialize};

    use super::{Currency, NewProduct, ProductType, create_product, get_product, list_products};

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn build_product(user_id: &str, name: &str) -> NewProduct {
        NewProduct {
            user_id: user_id.to_owned(),
            name: name.to_owned(),
            product_type: ProductType::Savings,
            currency: Currency::Cop,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn create_starts_with_zero_balance() {
        let conn = get_test_connection();

        let product = create_product(build_product("user-1", "Savings"), &conn)
            .expect("Could not create product");

        assert!(product.id > 0);
        assert_eq!(product.balance.to_string(), "0.00");
        assert_eq!(product.currency, Currency::Cop);
    }

    #[test]
    fn create_round_trips_metadata() {
        let conn = get_test_connection();
        let mut metadata = serde_json::Map::new();
        metadata.insert("institution".to_owned(), serde_json::json!("Bancolombia"));

        let created = create_product(
            NewProduct {
                metadata: metadata.clone(),
                ..build_product("user-1", "Savings")
            },
            &conn,
        )
        .expect("Could not create product");

        let selected = get_product(created.id, "user-1", &conn).expect("Could not get product");

        assert_eq!(selected.metadata, metadata);
        assert_eq!(selected, created);
    }

    #[test]
    fn get_fails_on_invalid_id() {
        let conn = get_test_connection();

        let result = get_product(1337, "user-1", &conn);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn get_hides_other_users_products() {
        let conn = get_test_connection();
        let product = create_product(build_product("user-1", "Savings"), &conn).unwrap();

        let result = get_product(product.id, "user-2", &conn);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn list_returns_only_own_products() {
        let conn = get_test_connection();
        let own = create_product(build_product("user-1", "Savings"), &conn).unwrap();
        create_product(build_product("user-2", "Other"), &conn).unwrap();

        let products = list_products("user-1", &conn).unwrap();

        assert_eq!(products, vec![own]);
    }
}
