//! COD ledger operations: creation, collection, batch submission, receipt
//! confirmation and transfer to the sender.
//!
//! Every write goes through a version-guarded store update; a failed guard
//! means another request won the race and surfaces as `InvalidState`, never
//! as a silent retry.

use crate::error::CodError;
use crate::models::{CodTransaction, CollectionStatus, TransferMethod};
use crate::services::metrics::{COD_TRANSACTIONS_TOTAL, COD_TRANSITIONS_TOTAL, ERRORS_TOTAL};
use crate::services::orders::OrderDirectory;
use crate::services::store::CodStore;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct CodLedger {
    store: Arc<dyn CodStore>,
    orders: Arc<dyn OrderDirectory>,
}

impl CodLedger {
    pub fn new(store: Arc<dyn CodStore>, orders: Arc<dyn OrderDirectory>) -> Self {
        Self { store, orders }
    }

    /// Record a new COD obligation for an order. The amount is fixed here
    /// for the life of the transaction.
    #[instrument(skip(self), fields(%order_id, %cod_amount))]
    pub async fn create(
        &self,
        order_id: Uuid,
        company_id: Uuid,
        driver_id: Option<Uuid>,
        cod_amount: Decimal,
    ) -> Result<CodTransaction, CodError> {
        if cod_amount <= Decimal::ZERO {
            ERRORS_TOTAL.with_label_values(&["validation_error"]).inc();
            return Err(CodError::Validation(format!(
                "cod_amount must be positive, got {}",
                cod_amount
            )));
        }

        let tx = CodTransaction::new(order_id, company_id, driver_id, cod_amount);
        let inserted = self.store.insert(tx).await.inspect_err(|e| {
            COD_TRANSACTIONS_TOTAL.with_label_values(&["error"]).inc();
            ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
        })?;

        COD_TRANSACTIONS_TOTAL.with_label_values(&["ok"]).inc();
        Ok(inserted)
    }

    pub async fn get(&self, transaction_id: Uuid) -> Result<CodTransaction, CodError> {
        self.store
            .get(transaction_id)
            .await?
            .ok_or_else(|| CodError::not_found("transaction", transaction_id))
    }

    pub async fn get_by_order(&self, order_id: Uuid) -> Result<CodTransaction, CodError> {
        self.store
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| CodError::not_found("order", order_id))
    }

    pub async fn list_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<CollectionStatus>,
    ) -> Result<Vec<CodTransaction>, CodError> {
        self.store.list_by_driver(driver_id, status).await
    }

    pub async fn list_pending_collections(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<CodTransaction>, CodError> {
        self.store.list_pending_collections(driver_id).await
    }

    /// Cash the driver is currently holding: collected but not submitted.
    pub async fn driver_pending_amount(&self, driver_id: Uuid) -> Result<Decimal, CodError> {
        self.store.driver_pending_amount(driver_id).await
    }

    /// Tracking code for an order, when the order directory knows it.
    pub async fn tracking_code(&self, order_id: Uuid) -> Result<Option<String>, CodError> {
        Ok(self
            .orders
            .lookup(order_id)
            .await?
            .and_then(|assignment| assignment.tracking_code))
    }

    /// Driver records the cash as collected at delivery.
    #[instrument(skip(self, proof_url), fields(%transaction_id, %driver_id))]
    pub async fn collect(
        &self,
        transaction_id: Uuid,
        driver_id: Uuid,
        proof_url: Option<String>,
    ) -> Result<CodTransaction, CodError> {
        let mut tx = self.get(transaction_id).await?;

        self.check_assignment(&tx, driver_id).await?;

        let expected_version = tx.version;
        tx.mark_collected(driver_id, proof_url, Utc::now())
            .inspect_err(|e| self.record_transition("collect", e))?;

        self.persist_guarded(tx, expected_version, "collect").await
    }

    /// Collect keyed by order id, for callers that only know the order.
    pub async fn collect_by_order(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        proof_url: Option<String>,
    ) -> Result<CodTransaction, CodError> {
        let tx = self.get_by_order(order_id).await?;
        self.collect(tx.transaction_id, driver_id, proof_url).await
    }

    /// Driver hands a batch of collected transactions over to the company.
    /// `declared_total` is the amount the driver counted; it must equal the
    /// sum of the batch exactly. The batch applies atomically.
    #[instrument(skip(self, transaction_ids), fields(%driver_id, batch_size = transaction_ids.len(), %declared_total))]
    pub async fn submit(
        &self,
        driver_id: Uuid,
        transaction_ids: &[Uuid],
        declared_total: Decimal,
    ) -> Result<Vec<CodTransaction>, CodError> {
        if transaction_ids.is_empty() {
            ERRORS_TOTAL.with_label_values(&["validation_error"]).inc();
            return Err(CodError::Validation(
                "submission batch must not be empty".into(),
            ));
        }

        // The batch is a set of transactions; a repeated id would count the
        // same cash twice against the declared total.
        let mut seen = HashSet::with_capacity(transaction_ids.len());
        let duplicates: Vec<Uuid> = transaction_ids
            .iter()
            .filter(|id| !seen.insert(**id))
            .copied()
            .collect();
        if !duplicates.is_empty() {
            let err = CodError::invalid_state(
                "submission batch lists the same transaction more than once",
                duplicates,
            );
            self.record_transition("submit", &err);
            return Err(err);
        }

        // Check the whole batch before erroring so the caller gets every
        // offending transaction id at once.
        let mut batch = Vec::with_capacity(transaction_ids.len());
        let mut computed = Decimal::ZERO;
        let mut offenders: Vec<Uuid> = Vec::new();
        let mut reasons: Vec<String> = Vec::new();
        for id in transaction_ids {
            let tx = self.get(*id).await?;
            match tx.check_submittable(driver_id) {
                Ok(()) => {
                    computed += tx.cod_amount;
                    batch.push(tx);
                }
                Err(CodError::InvalidState {
                    reason,
                    mut transaction_ids,
                }) => {
                    reasons.push(reason);
                    offenders.append(&mut transaction_ids);
                }
                Err(e) => {
                    self.record_transition("submit", &e);
                    return Err(e);
                }
            }
        }
        if !offenders.is_empty() {
            let err = CodError::invalid_state(reasons.join("; "), offenders);
            self.record_transition("submit", &err);
            return Err(err);
        }

        if computed != declared_total {
            ERRORS_TOTAL.with_label_values(&["amount_mismatch"]).inc();
            COD_TRANSITIONS_TOTAL
                .with_label_values(&["submit", "error"])
                .inc();
            return Err(CodError::AmountMismatch {
                declared: declared_total,
                computed,
            });
        }

        let now = Utc::now();
        let guarded: Vec<(CodTransaction, i64)> = batch
            .into_iter()
            .map(|mut tx| {
                let expected = tx.version;
                tx.mark_submitted(now);
                tx.version = expected + 1;
                (tx, expected)
            })
            .collect();

        if !self.store.submit_batch(&guarded).await? {
            warn!(%driver_id, "Submission batch lost a version race, rolled back");
            ERRORS_TOTAL.with_label_values(&["invalid_state"]).inc();
            COD_TRANSITIONS_TOTAL
                .with_label_values(&["submit", "error"])
                .inc();
            return Err(CodError::invalid_state(
                "one or more transactions were concurrently modified; no part of the batch was applied",
                guarded.iter().map(|(tx, _)| tx.transaction_id).collect(),
            ));
        }

        COD_TRANSITIONS_TOTAL
            .with_label_values(&["submit", "ok"])
            .inc();
        info!(%driver_id, total = %declared_total, "Submission batch recorded");

        Ok(guarded.into_iter().map(|(tx, _)| tx).collect())
    }

    /// Company staff confirms physical receipt of submitted cash.
    #[instrument(skip(self), fields(%transaction_id, %received_by))]
    pub async fn confirm_receipt(
        &self,
        transaction_id: Uuid,
        received_by: Uuid,
    ) -> Result<CodTransaction, CodError> {
        let mut tx = self.get(transaction_id).await?;
        let expected_version = tx.version;
        tx.confirm_receipt(received_by, Utc::now())
            .inspect_err(|e| self.record_transition("confirm_receipt", e))?;
        self.persist_guarded(tx, expected_version, "confirm_receipt")
            .await
    }

    /// Company forwards the net proceeds to the original sender, retaining
    /// `fee`. This completes the transaction.
    #[instrument(skip(self, reference, proof_url), fields(%transaction_id, ?method, %fee))]
    pub async fn transfer_to_sender(
        &self,
        transaction_id: Uuid,
        method: TransferMethod,
        reference: Option<String>,
        proof_url: Option<String>,
        fee: Decimal,
    ) -> Result<CodTransaction, CodError> {
        let mut tx = self.get(transaction_id).await?;
        let expected_version = tx.version;
        tx.mark_transferred(method, reference, proof_url, fee, Utc::now())
            .inspect_err(|e| self.record_transition("transfer", e))?;
        self.persist_guarded(tx, expected_version, "transfer").await
    }

    /// Mark a transaction as failed (lost cash, undeliverable order).
    #[instrument(skip(self, reason), fields(%transaction_id))]
    pub async fn mark_failed(
        &self,
        transaction_id: Uuid,
        reason: String,
    ) -> Result<CodTransaction, CodError> {
        let mut tx = self.get(transaction_id).await?;
        let expected_version = tx.version;
        tx.mark_failed(reason, Utc::now())
            .inspect_err(|e| self.record_transition("fail", e))?;
        self.persist_guarded(tx, expected_version, "fail").await
    }

    /// Reject collection by a driver the order is not assigned to. The
    /// order service is authoritative when configured; otherwise the
    /// assignment recorded at creation time is trusted.
    async fn check_assignment(
        &self,
        tx: &CodTransaction,
        driver_id: Uuid,
    ) -> Result<(), CodError> {
        let assigned = match self.orders.lookup(tx.order_id).await? {
            Some(assignment) => assignment.assigned_driver_id,
            None => tx.driver_id,
        };

        match assigned {
            Some(expected) if expected != driver_id => {
                ERRORS_TOTAL.with_label_values(&["invalid_state"]).inc();
                COD_TRANSITIONS_TOTAL
                    .with_label_values(&["collect", "error"])
                    .inc();
                Err(CodError::invalid_state(
                    format!(
                        "order {} is assigned to driver {}, not {}",
                        tx.order_id, expected, driver_id
                    ),
                    vec![tx.transaction_id],
                ))
            }
            _ => Ok(()),
        }
    }

    async fn persist_guarded(
        &self,
        mut tx: CodTransaction,
        expected_version: i64,
        operation: &str,
    ) -> Result<CodTransaction, CodError> {
        if !self.store.update_guarded(&tx, expected_version).await? {
            warn!(transaction_id = %tx.transaction_id, operation, "Lost a version race");
            ERRORS_TOTAL.with_label_values(&["invalid_state"]).inc();
            COD_TRANSITIONS_TOTAL
                .with_label_values(&[operation, "error"])
                .inc();
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} was concurrently modified, re-read and retry",
                    tx.transaction_id
                ),
                vec![tx.transaction_id],
            ));
        }
        tx.version = expected_version + 1;
        COD_TRANSITIONS_TOTAL
            .with_label_values(&[operation, "ok"])
            .inc();
        Ok(tx)
    }

    fn record_transition(&self, operation: &str, e: &CodError) {
        ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
        COD_TRANSITIONS_TOTAL
            .with_label_values(&[operation, "error"])
            .inc();
    }
}
