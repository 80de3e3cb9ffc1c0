//! Service layer for cod-service.

pub mod dashboard;
pub mod database;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod orders;
pub mod reconciliation;
pub mod store;

pub use dashboard::{Dashboard, DashboardView};
pub use database::Database;
pub use ledger::CodLedger;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use orders::{HttpOrderDirectory, OrderAssignment, OrderDirectory, UnconfiguredOrderDirectory};
pub use reconciliation::{ReconcileAllOutcome, ReconciliationEngine};
pub use store::{CodStore, DashboardTotals, DriverDayActivity, DriverRollup};
