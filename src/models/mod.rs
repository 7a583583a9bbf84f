//! Records exchanged between the store, the extraction client and the HTTP API.

mod customer;
mod extracted;
mod processed;
mod transaction;

pub use customer::{Customer, CustomerUpdate};
pub use extracted::ExtractedFields;
pub use processed::{ProcessedFileRecord, ProcessedKey, ProcessedStatus};
pub use transaction::{Device, NewTransaction, Plan, Transaction, TransactionStatus};
