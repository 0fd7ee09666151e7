//! The transaction ledger: models, queries, pagination, and the service
//! operations built on them.

mod core;
mod cursor;
mod query;
mod service;

pub use core::{
    Transaction, TransactionBuilder, TransactionType, create_transaction_table,
    get_transaction_for_user, insert_transaction, map_transaction_row,
};
pub use cursor::Cursor;
pub use query::{DEFAULT_PAGE_SIZE, TransactionQuery};
pub use service::{
    BalancePoint, BulkDeleteOutcome, ProductTransaction, ProductTransactionPage, TransactionPage,
    TransactionUpdate, balance_history, create_transaction, delete_transaction,
    delete_transactions, get_transaction, list_all_transactions, list_transactions,
    update_transaction,
};
