//! Database initialisation and the scoped transaction helper.

use rusqlite::Connection;

use crate::{Error, product, transaction};

/// Create the application tables in the database.
///
/// # Errors
/// Returns an error if a table cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    // The cascade from product to transaction relies on SQLite enforcing
    // foreign keys, which is off unless requested per connection.
    connection.execute_batch("PRAGMA foreign_keys = ON")?;

    product::create_product_table(connection)?;
    transaction::create_transaction_table(connection)?;

    Ok(())
}

/// Run `operation` inside a database transaction.
///
/// The transaction commits when `operation` returns `Ok` and rolls back on
/// any `Err` path, so a constraint check, a row mutation, and the balance
/// recalculation that follows it are observed together or not at all.
///
/// # Errors
/// Returns the error from `operation`, or an [Error::SqlError] if the
/// transaction could not be started or committed.
pub fn with_transaction<T>(
    connection: &Connection,
    operation: impl FnOnce(&Connection) -> Result<T, Error>,
) -> Result<T, Error> {
    let tx = connection.unchecked_transaction()?;
    let value = operation(&tx)?;
    tx.commit()?;

    Ok(value)
}

#[cfg(test)]
mod initialize_tests {
    use rusqlite::Connection;

    use super::initialize;

    #[test]
    fn sql_is_valid() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        assert_eq!(Ok(()), initialize(&connection));
    }
}
