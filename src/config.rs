//! Shared state handed to the ledger by the host application.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::trm::RateSource;

/// The resources every ledger operation is given: the database handle and
/// the injected exchange rate source.
///
/// The HTTP layer resolves the authenticated user separately and passes the
/// user id into each operation alongside a locked connection.
#[derive(Clone)]
pub struct AppConfig {
    db_connection: Arc<Mutex<Connection>>,
    rate_source: Arc<dyn RateSource>,
}

impl AppConfig {
    /// Wrap a database connection and a rate source for shared use.
    pub fn new(db_connection: Connection, rate_source: Arc<dyn RateSource>) -> AppConfig {
        AppConfig {
            db_connection: Arc::new(Mutex::new(db_connection)),
            rate_source,
        }
    }

    /// The shared database connection.
    pub fn db_connection(&self) -> &Mutex<Connection> {
        &self.db_connection
    }

    /// The injected exchange rate source.
    pub fn rate_source(&self) -> &dyn RateSource {
        self.rate_source.as_ref()
    }
}
