//! In-memory `CodStore` used by the integration-test suite and local
//! development. Mirrors the Postgres implementation's guarantees: version
//! guards are checked-and-applied under one write lock, and a submission
//! batch either fully applies or leaves every row untouched.

use crate::error::CodError;
use crate::models::{
    CodTransaction, CollectionStatus, DriverCodSummary, PendingReconciliation,
    ReconciliationStatus,
};
use crate::services::store::{
    CodStore, DashboardTotals, DriverDayActivity, DriverRollup,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    transactions: HashMap<Uuid, CodTransaction>,
    by_order: HashMap<Uuid, Uuid>,
    summaries: HashMap<(Uuid, NaiveDate), DriverCodSummary>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn driver_owns(tx: &CodTransaction, driver_id: Uuid) -> bool {
    tx.driver_id == Some(driver_id) || tx.collected_by_driver_id == Some(driver_id)
}

#[async_trait]
impl CodStore for MemoryStore {
    async fn insert(&self, tx: CodTransaction) -> Result<CodTransaction, CodError> {
        let mut inner = self.inner.write().unwrap();
        if inner.by_order.contains_key(&tx.order_id) {
            return Err(CodError::invalid_state(
                format!("order {} already has a COD transaction", tx.order_id),
                vec![],
            ));
        }
        inner.by_order.insert(tx.order_id, tx.transaction_id);
        inner.transactions.insert(tx.transaction_id, tx.clone());
        Ok(tx)
    }

    async fn get(&self, transaction_id: Uuid) -> Result<Option<CodTransaction>, CodError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.transactions.get(&transaction_id).cloned())
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<CodTransaction>, CodError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .by_order
            .get(&order_id)
            .and_then(|id| inner.transactions.get(id))
            .cloned())
    }

    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<CollectionStatus>,
    ) -> Result<Vec<CodTransaction>, CodError> {
        let inner = self.inner.read().unwrap();
        let mut txs: Vec<_> = inner
            .transactions
            .values()
            .filter(|t| driver_owns(t, driver_id))
            .filter(|t| status.map_or(true, |s| t.collection_status == s))
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(txs)
    }

    async fn list_pending_collections(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<CodTransaction>, CodError> {
        let inner = self.inner.read().unwrap();
        let mut txs: Vec<_> = inner
            .transactions
            .values()
            .filter(|t| t.driver_id == Some(driver_id))
            .filter(|t| t.collection_status == CollectionStatus::Pending)
            .cloned()
            .collect();
        txs.sort_by(|a, b| a.created_utc.cmp(&b.created_utc));
        Ok(txs)
    }

    async fn driver_pending_amount(&self, driver_id: Uuid) -> Result<Decimal, CodError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .transactions
            .values()
            .filter(|t| t.collected_by_driver_id == Some(driver_id))
            .filter(|t| t.collection_status == CollectionStatus::Collected)
            .filter(|t| !t.submitted_to_company)
            .map(|t| t.cod_amount)
            .sum())
    }

    async fn update_guarded(
        &self,
        tx: &CodTransaction,
        expected_version: i64,
    ) -> Result<bool, CodError> {
        let mut inner = self.inner.write().unwrap();
        match inner.transactions.get_mut(&tx.transaction_id) {
            Some(existing) if existing.version == expected_version => {
                let mut updated = tx.clone();
                updated.version = expected_version + 1;
                *existing = updated;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn submit_batch(&self, txs: &[(CodTransaction, i64)]) -> Result<bool, CodError> {
        let mut inner = self.inner.write().unwrap();
        // Check all guards before touching anything.
        for (tx, expected) in txs {
            match inner.transactions.get(&tx.transaction_id) {
                Some(existing) if existing.version == *expected => {}
                _ => return Ok(false),
            }
        }
        for (tx, expected) in txs {
            let mut updated = tx.clone();
            updated.version = expected + 1;
            inner.transactions.insert(tx.transaction_id, updated);
        }
        Ok(true)
    }

    async fn driver_activity_on(
        &self,
        driver_id: Uuid,
        date: NaiveDate,
    ) -> Result<DriverDayActivity, CodError> {
        let inner = self.inner.read().unwrap();
        let mut activity = DriverDayActivity::default();
        for t in inner.transactions.values() {
            if t.collected_by_driver_id == Some(driver_id) {
                activity.absorb(t, date);
            }
        }
        Ok(activity)
    }

    async fn drivers_with_activity(
        &self,
        date: NaiveDate,
        company_id: Uuid,
    ) -> Result<Vec<Uuid>, CodError> {
        let inner = self.inner.read().unwrap();
        let mut drivers: Vec<Uuid> = inner
            .transactions
            .values()
            .filter(|t| t.company_id == company_id)
            .filter(|t| {
                t.collected_at.map(|ts| ts.date_naive()) == Some(date)
                    || t.submitted_at.map(|ts| ts.date_naive()) == Some(date)
            })
            .filter_map(|t| t.collected_by_driver_id)
            .collect();
        drivers.sort();
        drivers.dedup();
        Ok(drivers)
    }

    async fn list_unreconciled(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<Vec<PendingReconciliation>, CodError> {
        let inner = self.inner.read().unwrap();
        let mut pending: BTreeMap<(Uuid, NaiveDate), PendingReconciliation> = BTreeMap::new();

        for t in inner.transactions.values() {
            if let Some(c) = company_id {
                if t.company_id != c {
                    continue;
                }
            }
            let Some(driver) = t.collected_by_driver_id else {
                continue;
            };
            for (date, collected, submitted) in [
                t.collected_at
                    .map(|ts| (ts.date_naive(), t.cod_amount, Decimal::ZERO)),
                t.submitted_at.map(|ts| {
                    (
                        ts.date_naive(),
                        Decimal::ZERO,
                        t.submitted_amount.unwrap_or(t.cod_amount),
                    )
                }),
            ]
            .into_iter()
            .flatten()
            {
                let entry = pending
                    .entry((driver, date))
                    .or_insert_with(|| PendingReconciliation {
                        driver_id: driver,
                        company_id: t.company_id,
                        summary_date: date,
                        total_collected: Decimal::ZERO,
                        total_submitted: Decimal::ZERO,
                    });
                entry.total_collected += collected;
                entry.total_submitted += submitted;
            }
        }

        Ok(pending
            .into_values()
            .filter(|p| {
                inner
                    .summaries
                    .get(&(p.driver_id, p.summary_date))
                    .map_or(true, |s| s.status != ReconciliationStatus::Reconciled)
            })
            .collect())
    }

    async fn get_summary(
        &self,
        driver_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DriverCodSummary>, CodError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.summaries.get(&(driver_id, date)).cloned())
    }

    async fn upsert_summary(&self, summary: DriverCodSummary) -> Result<(), CodError> {
        let mut inner = self.inner.write().unwrap();
        inner
            .summaries
            .insert((summary.driver_id, summary.summary_date), summary);
        Ok(())
    }

    async fn dashboard_totals(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<DashboardTotals, CodError> {
        let inner = self.inner.read().unwrap();
        let mut totals = DashboardTotals::default();
        for t in inner.transactions.values() {
            if let Some(c) = company_id {
                if t.company_id != c {
                    continue;
                }
            }
            match t.collection_status {
                CollectionStatus::Failed => {
                    totals.failed_count += 1;
                    continue;
                }
                CollectionStatus::Pending => {
                    totals.total_pending_collection += t.cod_amount;
                    totals.pending_count += 1;
                    continue;
                }
                CollectionStatus::Collected => {}
            }
            if t.transferred_to_sender {
                totals.total_transferred += t.cod_amount;
                totals.total_fees += t.company_fee;
                totals.completed_count += 1;
            } else if t.submitted_to_company {
                totals.total_submitted += t.cod_amount;
                totals.pending_count += 1;
            } else {
                totals.total_collected += t.cod_amount;
                totals.pending_count += 1;
            }
        }
        Ok(totals)
    }

    async fn driver_rollups(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<Vec<DriverRollup>, CodError> {
        let inner = self.inner.read().unwrap();
        let mut rollups: BTreeMap<Uuid, DriverRollup> = BTreeMap::new();
        for t in inner.transactions.values() {
            if let Some(c) = company_id {
                if t.company_id != c {
                    continue;
                }
            }
            let Some(driver) = t.collected_by_driver_id.or(t.driver_id) else {
                continue;
            };
            let rollup = rollups.entry(driver).or_insert_with(|| DriverRollup {
                driver_id: driver,
                company_id: t.company_id,
                pending_collection: Decimal::ZERO,
                collected_unsubmitted: Decimal::ZERO,
                submitted: Decimal::ZERO,
                transferred: Decimal::ZERO,
                transaction_count: 0,
            });
            rollup.transaction_count += 1;
            match t.collection_status {
                CollectionStatus::Failed => {}
                CollectionStatus::Pending => rollup.pending_collection += t.cod_amount,
                CollectionStatus::Collected => {
                    if t.transferred_to_sender {
                        rollup.transferred += t.cod_amount;
                    } else if t.submitted_to_company {
                        rollup.submitted += t.cod_amount;
                    } else {
                        rollup.collected_unsubmitted += t.cod_amount;
                    }
                }
            }
        }
        Ok(rollups.into_values().collect())
    }
}
