//! Domain models for cod-service.

mod summary;
mod transaction;

pub use summary::{DriverCodSummary, PendingReconciliation, ReconciliationStatus};
pub use transaction::{CodTransaction, CollectionStatus, OverallStatus, TransferMethod};
