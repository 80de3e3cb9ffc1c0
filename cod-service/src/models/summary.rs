//! Per-driver, per-date reconciliation summary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Closing state of one (driver, date) period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Pending,
    Reconciled,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reconciled => "reconciled",
        }
    }
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row per (driver, date), written only by the reconciliation engine.
/// `variance` is collected minus submitted at close time; a non-zero value
/// is surfaced, never silently corrected.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DriverCodSummary {
    pub summary_id: Uuid,
    pub driver_id: Uuid,
    pub company_id: Uuid,
    pub summary_date: NaiveDate,
    pub total_collected: Decimal,
    pub total_submitted: Decimal,
    pub pending_amount: Decimal,
    pub variance: Decimal,
    pub status: ReconciliationStatus,
    pub reconciled_by: Option<Uuid>,
    pub reconciled_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// A (driver, date) with COD activity and no closed summary yet. Drives the
/// operational reconciliation queue.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PendingReconciliation {
    pub driver_id: Uuid,
    pub company_id: Uuid,
    pub summary_date: NaiveDate,
    pub total_collected: Decimal,
    pub total_submitted: Decimal,
}
