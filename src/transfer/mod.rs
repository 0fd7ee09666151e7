//! Transfers: linked transaction pairs moving money between products.

mod service;

pub use service::{NewTransfer, TransferReceipt, create_transfer};
