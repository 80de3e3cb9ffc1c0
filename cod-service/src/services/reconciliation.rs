//! Driver-day reconciliation.
//!
//! Closing a (driver, date) period snapshots collected and submitted totals
//! into a summary row. A variance (collected minus submitted) is recorded
//! and surfaced but never blocks the close; disputes are handled through
//! explicit adjustments on the affected transactions.

use crate::error::CodError;
use crate::models::{CodTransaction, DriverCodSummary, PendingReconciliation, ReconciliationStatus};
use crate::services::metrics::{ERRORS_TOTAL, RECONCILIATIONS_TOTAL};
use crate::services::store::CodStore;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of a company-wide reconciliation sweep. Per-driver failures do
/// not abort the sweep.
#[derive(Debug, Serialize)]
pub struct ReconcileAllOutcome {
    pub reconciled: Vec<DriverCodSummary>,
    pub failures: Vec<ReconcileFailure>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileFailure {
    pub driver_id: Uuid,
    pub error: String,
}

pub struct ReconciliationEngine {
    store: Arc<dyn CodStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn CodStore>) -> Self {
        Self { store }
    }

    /// Close one driver's COD day. Fails when the driver had no activity on
    /// the date or the period is already reconciled.
    #[instrument(skip(self), fields(%driver_id, %date))]
    pub async fn reconcile_driver(
        &self,
        driver_id: Uuid,
        date: NaiveDate,
        reconciled_by: Uuid,
    ) -> Result<DriverCodSummary, CodError> {
        let activity = self.store.driver_activity_on(driver_id, date).await?;
        if !activity.has_activity() {
            ERRORS_TOTAL.with_label_values(&["not_found"]).inc();
            return Err(CodError::not_found("COD activity for driver", driver_id));
        }

        if let Some(existing) = self.store.get_summary(driver_id, date).await? {
            if existing.status == ReconciliationStatus::Reconciled {
                ERRORS_TOTAL.with_label_values(&["invalid_state"]).inc();
                RECONCILIATIONS_TOTAL.with_label_values(&["error"]).inc();
                return Err(CodError::invalid_state(
                    format!("driver {} is already reconciled for {}", driver_id, date),
                    vec![],
                ));
            }
        }

        let company_id = activity
            .company_id
            .ok_or_else(|| CodError::Storage(anyhow::anyhow!("activity without a company")))?;
        let pending_amount = self.store.driver_pending_amount(driver_id).await?;
        let variance = activity.collected_total - activity.submitted_total;

        let now = Utc::now();
        let summary = DriverCodSummary {
            summary_id: Uuid::new_v4(),
            driver_id,
            company_id,
            summary_date: date,
            total_collected: activity.collected_total,
            total_submitted: activity.submitted_total,
            pending_amount,
            variance,
            status: ReconciliationStatus::Reconciled,
            reconciled_by: Some(reconciled_by),
            reconciled_utc: Some(now),
            created_utc: now,
            updated_utc: now,
        };

        self.store.upsert_summary(summary.clone()).await?;

        if variance != Decimal::ZERO {
            warn!(%driver_id, %date, %variance, "Reconciliation closed with variance");
            RECONCILIATIONS_TOTAL.with_label_values(&["variance"]).inc();
        } else {
            RECONCILIATIONS_TOTAL.with_label_values(&["ok"]).inc();
        }
        info!(
            %driver_id, %date,
            collected = %summary.total_collected,
            submitted = %summary.total_submitted,
            "Driver day reconciled"
        );

        Ok(summary)
    }

    /// Reconcile every driver with activity on `date` for a company.
    /// Best-effort: a failing driver is reported and the sweep continues.
    #[instrument(skip(self), fields(%date, %company_id))]
    pub async fn reconcile_all(
        &self,
        date: NaiveDate,
        company_id: Uuid,
        reconciled_by: Uuid,
    ) -> Result<ReconcileAllOutcome, CodError> {
        let drivers = self.store.drivers_with_activity(date, company_id).await?;

        let mut outcome = ReconcileAllOutcome {
            reconciled: Vec::new(),
            failures: Vec::new(),
        };
        for driver_id in drivers {
            match self.reconcile_driver(driver_id, date, reconciled_by).await {
                Ok(summary) => outcome.reconciled.push(summary),
                Err(e) => {
                    warn!(%driver_id, %date, error = %e, "Driver reconciliation failed");
                    outcome.failures.push(ReconcileFailure {
                        driver_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            reconciled = outcome.reconciled.len(),
            failed = outcome.failures.len(),
            "Reconciliation sweep finished"
        );
        Ok(outcome)
    }

    /// (driver, date) periods with activity and no closed summary.
    pub async fn pending(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<Vec<PendingReconciliation>, CodError> {
        self.store.list_unreconciled(company_id).await
    }

    pub async fn get_summary(
        &self,
        driver_id: Uuid,
        date: NaiveDate,
    ) -> Result<DriverCodSummary, CodError> {
        self.store
            .get_summary(driver_id, date)
            .await?
            .ok_or_else(|| CodError::not_found("summary", driver_id))
    }

    /// Annotate a transaction with a dispute adjustment. `cod_amount` is
    /// never touched.
    #[instrument(skip(self, reason), fields(%transaction_id, %amount, %adjusted_by))]
    pub async fn record_adjustment(
        &self,
        transaction_id: Uuid,
        amount: Decimal,
        reason: String,
        adjusted_by: Uuid,
    ) -> Result<CodTransaction, CodError> {
        let mut tx = self
            .store
            .get(transaction_id)
            .await?
            .ok_or_else(|| CodError::not_found("transaction", transaction_id))?;

        let expected_version = tx.version;
        tx.record_adjustment(amount, reason, Utc::now());

        if !self.store.update_guarded(&tx, expected_version).await? {
            ERRORS_TOTAL.with_label_values(&["invalid_state"]).inc();
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} was concurrently modified, re-read and retry",
                    transaction_id
                ),
                vec![transaction_id],
            ));
        }
        tx.version = expected_version + 1;

        info!(%transaction_id, %amount, %adjusted_by, "Adjustment recorded");
        Ok(tx)
    }
}
