//! Storage seam for the COD ledger.
//!
//! The trait is deliberately narrow: referential lookups, version-guarded
//! single-row writes, one atomic multi-row write for submission batches,
//! and the aggregate queries reconciliation and the dashboard read. All
//! business rules live above this seam; implementations only enforce
//! field-level and referential constraints.

use crate::error::CodError;
use crate::models::{CodTransaction, CollectionStatus, DriverCodSummary, PendingReconciliation};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Snapshot of one driver's COD activity on one date, read by the
/// reconciliation engine. Concurrent activity may make it slightly stale;
/// drift surfaces as variance rather than being prevented.
#[derive(Debug, Clone, Default)]
pub struct DriverDayActivity {
    pub company_id: Option<Uuid>,
    pub collected_total: Decimal,
    pub submitted_total: Decimal,
    pub collected_count: i64,
    pub submitted_count: i64,
}

impl DriverDayActivity {
    pub fn has_activity(&self) -> bool {
        self.collected_count > 0 || self.submitted_count > 0
    }

    /// Fold one transaction into the day's totals. Shared by every store
    /// implementation so their reconciliation arithmetic cannot diverge.
    pub fn absorb(&mut self, tx: &CodTransaction, date: NaiveDate) {
        if tx.collected_at.map(|ts| ts.date_naive()) == Some(date) {
            self.collected_total += tx.cod_amount;
            self.collected_count += 1;
            self.company_id.get_or_insert(tx.company_id);
        }
        if tx.submitted_at.map(|ts| ts.date_naive()) == Some(date) {
            self.submitted_total += tx.submitted_amount.unwrap_or(tx.cod_amount);
            self.submitted_count += 1;
            self.company_id.get_or_insert(tx.company_id);
        }
    }
}

/// Company-wide (or global) totals for the dashboard.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct DashboardTotals {
    /// Sum of cod_amount still awaiting collection.
    pub total_pending_collection: Decimal,
    /// Collected by drivers, not yet submitted to the company.
    pub total_collected: Decimal,
    /// Submitted to the company, not yet transferred to senders.
    pub total_submitted: Decimal,
    /// Transferred out to senders (gross, before fees).
    pub total_transferred: Decimal,
    /// Company fees retained on transferred transactions.
    pub total_fees: Decimal,
    pub pending_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
}

/// Per-driver rollup for the dashboard.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DriverRollup {
    pub driver_id: Uuid,
    pub company_id: Uuid,
    pub pending_collection: Decimal,
    pub collected_unsubmitted: Decimal,
    pub submitted: Decimal,
    pub transferred: Decimal,
    pub transaction_count: i64,
}

#[async_trait]
pub trait CodStore: Send + Sync {
    /// Insert a new transaction. At most one COD transaction may exist per
    /// order; a duplicate order id fails with `InvalidState`.
    async fn insert(&self, tx: CodTransaction) -> Result<CodTransaction, CodError>;

    async fn get(&self, transaction_id: Uuid) -> Result<Option<CodTransaction>, CodError>;

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<CodTransaction>, CodError>;

    /// Transactions assigned to or collected by the driver, newest first,
    /// optionally filtered by collection status.
    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<CollectionStatus>,
    ) -> Result<Vec<CodTransaction>, CodError>;

    /// Pending collections for a driver, oldest first to bias toward
    /// clearing backlog.
    async fn list_pending_collections(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<CodTransaction>, CodError>;

    /// Cash currently in the driver's hands: collected but not submitted.
    async fn driver_pending_amount(&self, driver_id: Uuid) -> Result<Decimal, CodError>;

    /// Write all mutable fields of `tx`, guarded on `expected_version`.
    /// Returns false when the row was concurrently modified (or deleted);
    /// on success the stored version becomes `expected_version + 1`.
    async fn update_guarded(
        &self,
        tx: &CodTransaction,
        expected_version: i64,
    ) -> Result<bool, CodError>;

    /// Atomically persist a submission batch: every row is written with its
    /// version guard inside one store transaction; if any guard fails the
    /// whole batch is rolled back and false is returned. Each element
    /// carries its pre-write version in `.1`.
    async fn submit_batch(&self, txs: &[(CodTransaction, i64)]) -> Result<bool, CodError>;

    async fn driver_activity_on(
        &self,
        driver_id: Uuid,
        date: NaiveDate,
    ) -> Result<DriverDayActivity, CodError>;

    /// Drivers with collection or submission activity on `date`, scoped to
    /// a company.
    async fn drivers_with_activity(
        &self,
        date: NaiveDate,
        company_id: Uuid,
    ) -> Result<Vec<Uuid>, CodError>;

    /// (driver, date) pairs with activity and no reconciled summary.
    async fn list_unreconciled(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<Vec<PendingReconciliation>, CodError>;

    async fn get_summary(
        &self,
        driver_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DriverCodSummary>, CodError>;

    /// Insert or replace the summary row for (driver, date).
    async fn upsert_summary(&self, summary: DriverCodSummary) -> Result<(), CodError>;

    async fn dashboard_totals(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<DashboardTotals, CodError>;

    async fn driver_rollups(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<Vec<DriverRollup>, CodError>;
}
