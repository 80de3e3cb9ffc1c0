//! Postgres-backed `CodStore` for cod-service.

use crate::error::CodError;
use crate::models::{
    CodTransaction, CollectionStatus, DriverCodSummary, PendingReconciliation,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    CodStore, DashboardTotals, DriverDayActivity, DriverRollup,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const TX_COLUMNS: &str = "transaction_id, order_id, company_id, driver_id, cod_amount, \
     collection_status, collected_by_driver_id, collected_at, collection_proof_url, \
     submitted_to_company, submitted_at, submitted_amount, \
     company_received_by, receipt_confirmed_at, \
     transferred_to_sender, transferred_at, transfer_method, transfer_reference, \
     transfer_proof_url, company_fee, \
     adjustment_amount, adjustment_reason, failure_reason, \
     version, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "cod-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

/// Bind every mutable column of `tx` onto an UPDATE statement. The guarded
/// WHERE clause and the new version are bound by the caller.
macro_rules! bind_tx_fields {
    ($query:expr, $tx:expr) => {
        $query
            .bind($tx.collection_status)
            .bind($tx.collected_by_driver_id)
            .bind($tx.collected_at)
            .bind(&$tx.collection_proof_url)
            .bind($tx.submitted_to_company)
            .bind($tx.submitted_at)
            .bind($tx.submitted_amount)
            .bind($tx.company_received_by)
            .bind($tx.receipt_confirmed_at)
            .bind($tx.transferred_to_sender)
            .bind($tx.transferred_at)
            .bind($tx.transfer_method)
            .bind(&$tx.transfer_reference)
            .bind(&$tx.transfer_proof_url)
            .bind($tx.company_fee)
            .bind($tx.adjustment_amount)
            .bind(&$tx.adjustment_reason)
            .bind(&$tx.failure_reason)
            .bind($tx.updated_utc)
    };
}

const GUARDED_UPDATE: &str = "\
    UPDATE cod_transactions SET \
        collection_status = $1, collected_by_driver_id = $2, collected_at = $3, \
        collection_proof_url = $4, submitted_to_company = $5, submitted_at = $6, \
        submitted_amount = $7, company_received_by = $8, receipt_confirmed_at = $9, \
        transferred_to_sender = $10, transferred_at = $11, transfer_method = $12, \
        transfer_reference = $13, transfer_proof_url = $14, company_fee = $15, \
        adjustment_amount = $16, adjustment_reason = $17, failure_reason = $18, \
        updated_utc = $19, version = version + 1 \
    WHERE transaction_id = $20 AND version = $21";

#[async_trait]
impl CodStore for Database {
    #[instrument(skip(self, tx), fields(order_id = %tx.order_id))]
    async fn insert(&self, tx: CodTransaction) -> Result<CodTransaction, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_transaction"])
            .start_timer();

        let inserted = sqlx::query_as::<_, CodTransaction>(&format!(
            "INSERT INTO cod_transactions \
             (transaction_id, order_id, company_id, driver_id, cod_amount, collection_status, \
              company_fee, version, created_utc, updated_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {TX_COLUMNS}"
        ))
        .bind(tx.transaction_id)
        .bind(tx.order_id)
        .bind(tx.company_id)
        .bind(tx.driver_id)
        .bind(tx.cod_amount)
        .bind(tx.collection_status)
        .bind(tx.company_fee)
        .bind(tx.version)
        .bind(tx.created_utc)
        .bind(tx.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                CodError::invalid_state(
                    format!("order {} already has a COD transaction", tx.order_id),
                    vec![],
                )
            }
            _ => CodError::from(e),
        })?;

        timer.observe_duration();

        info!(
            transaction_id = %inserted.transaction_id,
            cod_amount = %inserted.cod_amount,
            "COD transaction created"
        );

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn get(&self, transaction_id: Uuid) -> Result<Option<CodTransaction>, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();

        let tx = sqlx::query_as::<_, CodTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM cod_transactions WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(tx)
    }

    #[instrument(skip(self))]
    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<CodTransaction>, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_by_order"])
            .start_timer();

        let tx = sqlx::query_as::<_, CodTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM cod_transactions WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(tx)
    }

    #[instrument(skip(self))]
    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<CollectionStatus>,
    ) -> Result<Vec<CodTransaction>, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_by_driver"])
            .start_timer();

        let txs = sqlx::query_as::<_, CodTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM cod_transactions \
             WHERE (driver_id = $1 OR collected_by_driver_id = $1) \
               AND ($2::varchar IS NULL OR collection_status = $2) \
             ORDER BY created_utc DESC"
        ))
        .bind(driver_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(txs)
    }

    #[instrument(skip(self))]
    async fn list_pending_collections(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<CodTransaction>, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_pending_collections"])
            .start_timer();

        // Oldest first, to bias toward clearing backlog.
        let txs = sqlx::query_as::<_, CodTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM cod_transactions \
             WHERE driver_id = $1 AND collection_status = 'pending' \
             ORDER BY created_utc ASC"
        ))
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(txs)
    }

    #[instrument(skip(self))]
    async fn driver_pending_amount(&self, driver_id: Uuid) -> Result<Decimal, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["driver_pending_amount"])
            .start_timer();

        let amount: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(cod_amount), 0) FROM cod_transactions \
             WHERE collected_by_driver_id = $1 \
               AND collection_status = 'collected' \
               AND NOT submitted_to_company",
        )
        .bind(driver_id)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(amount)
    }

    #[instrument(skip(self, tx), fields(transaction_id = %tx.transaction_id))]
    async fn update_guarded(
        &self,
        tx: &CodTransaction,
        expected_version: i64,
    ) -> Result<bool, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_guarded"])
            .start_timer();

        let result = bind_tx_fields!(sqlx::query(GUARDED_UPDATE), tx)
            .bind(tx.transaction_id)
            .bind(expected_version)
            .execute(&self.pool)
            .await?;

        timer.observe_duration();
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, txs), fields(batch_size = txs.len()))]
    async fn submit_batch(&self, txs: &[(CodTransaction, i64)]) -> Result<bool, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["submit_batch"])
            .start_timer();

        let mut db_tx = self.pool.begin().await?;

        for (tx, expected_version) in txs {
            let result = bind_tx_fields!(sqlx::query(GUARDED_UPDATE), tx)
                .bind(tx.transaction_id)
                .bind(expected_version)
                .execute(&mut *db_tx)
                .await?;

            if result.rows_affected() != 1 {
                // A row was concurrently modified; no torn state may be
                // left visible, so the whole batch rolls back.
                db_tx.rollback().await.ok();
                timer.observe_duration();
                return Ok(false);
            }
        }

        db_tx.commit().await?;
        timer.observe_duration();
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn driver_activity_on(
        &self,
        driver_id: Uuid,
        date: NaiveDate,
    ) -> Result<DriverDayActivity, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["driver_activity_on"])
            .start_timer();

        // Day bucketing is UTC regardless of the session TimeZone.
        let txs = sqlx::query_as::<_, CodTransaction>(&format!(
            "SELECT {TX_COLUMNS} FROM cod_transactions \
             WHERE collected_by_driver_id = $1 \
               AND ((collected_at AT TIME ZONE 'UTC')::date = $2 \
                    OR (submitted_at AT TIME ZONE 'UTC')::date = $2)"
        ))
        .bind(driver_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        let mut activity = DriverDayActivity::default();
        for tx in &txs {
            activity.absorb(tx, date);
        }

        timer.observe_duration();
        Ok(activity)
    }

    #[instrument(skip(self))]
    async fn drivers_with_activity(
        &self,
        date: NaiveDate,
        company_id: Uuid,
    ) -> Result<Vec<Uuid>, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["drivers_with_activity"])
            .start_timer();

        let drivers: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT collected_by_driver_id FROM cod_transactions \
             WHERE company_id = $1 \
               AND collected_by_driver_id IS NOT NULL \
               AND ((collected_at AT TIME ZONE 'UTC')::date = $2 \
                    OR (submitted_at AT TIME ZONE 'UTC')::date = $2) \
             ORDER BY collected_by_driver_id",
        )
        .bind(company_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(drivers)
    }

    #[instrument(skip(self))]
    async fn list_unreconciled(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<Vec<PendingReconciliation>, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unreconciled"])
            .start_timer();

        let pending = sqlx::query_as::<_, PendingReconciliation>(
            r#"
            WITH activity AS (
                SELECT collected_by_driver_id AS driver_id,
                       company_id,
                       (collected_at AT TIME ZONE 'UTC')::date AS summary_date,
                       cod_amount AS collected,
                       NULL::numeric AS submitted
                FROM cod_transactions
                WHERE collected_by_driver_id IS NOT NULL AND collected_at IS NOT NULL
                UNION ALL
                SELECT collected_by_driver_id,
                       company_id,
                       (submitted_at AT TIME ZONE 'UTC')::date,
                       NULL::numeric,
                       COALESCE(submitted_amount, cod_amount)
                FROM cod_transactions
                WHERE collected_by_driver_id IS NOT NULL AND submitted_at IS NOT NULL
            )
            SELECT a.driver_id,
                   a.company_id,
                   a.summary_date,
                   COALESCE(SUM(a.collected), 0) AS total_collected,
                   COALESCE(SUM(a.submitted), 0) AS total_submitted
            FROM activity a
            LEFT JOIN driver_cod_summaries s
              ON s.driver_id = a.driver_id
             AND s.summary_date = a.summary_date
             AND s.status = 'reconciled'
            WHERE s.summary_id IS NULL
              AND ($1::uuid IS NULL OR a.company_id = $1)
            GROUP BY a.driver_id, a.company_id, a.summary_date
            ORDER BY a.summary_date, a.driver_id
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(pending)
    }

    #[instrument(skip(self))]
    async fn get_summary(
        &self,
        driver_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DriverCodSummary>, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_summary"])
            .start_timer();

        let summary = sqlx::query_as::<_, DriverCodSummary>(
            "SELECT summary_id, driver_id, company_id, summary_date, total_collected, \
                    total_submitted, pending_amount, variance, status, reconciled_by, \
                    reconciled_utc, created_utc, updated_utc \
             FROM driver_cod_summaries \
             WHERE driver_id = $1 AND summary_date = $2",
        )
        .bind(driver_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(summary)
    }

    #[instrument(skip(self, summary), fields(driver_id = %summary.driver_id, summary_date = %summary.summary_date))]
    async fn upsert_summary(&self, summary: DriverCodSummary) -> Result<(), CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_summary"])
            .start_timer();

        sqlx::query(
            "INSERT INTO driver_cod_summaries \
             (summary_id, driver_id, company_id, summary_date, total_collected, total_submitted, \
              pending_amount, variance, status, reconciled_by, reconciled_utc, created_utc, updated_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (driver_id, summary_date) DO UPDATE SET \
                total_collected = EXCLUDED.total_collected, \
                total_submitted = EXCLUDED.total_submitted, \
                pending_amount = EXCLUDED.pending_amount, \
                variance = EXCLUDED.variance, \
                status = EXCLUDED.status, \
                reconciled_by = EXCLUDED.reconciled_by, \
                reconciled_utc = EXCLUDED.reconciled_utc, \
                updated_utc = EXCLUDED.updated_utc",
        )
        .bind(summary.summary_id)
        .bind(summary.driver_id)
        .bind(summary.company_id)
        .bind(summary.summary_date)
        .bind(summary.total_collected)
        .bind(summary.total_submitted)
        .bind(summary.pending_amount)
        .bind(summary.variance)
        .bind(summary.status)
        .bind(summary.reconciled_by)
        .bind(summary.reconciled_utc)
        .bind(summary.created_utc)
        .bind(summary.updated_utc)
        .execute(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn dashboard_totals(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<DashboardTotals, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["dashboard_totals"])
            .start_timer();

        let totals = sqlx::query_as::<_, DashboardTotals>(
            "SELECT \
                COALESCE(SUM(cod_amount) FILTER (WHERE collection_status = 'pending'), 0) AS total_pending_collection, \
                COALESCE(SUM(cod_amount) FILTER (WHERE collection_status = 'collected' AND NOT submitted_to_company), 0) AS total_collected, \
                COALESCE(SUM(cod_amount) FILTER (WHERE collection_status = 'collected' AND submitted_to_company AND NOT transferred_to_sender), 0) AS total_submitted, \
                COALESCE(SUM(cod_amount) FILTER (WHERE collection_status = 'collected' AND transferred_to_sender), 0) AS total_transferred, \
                COALESCE(SUM(company_fee) FILTER (WHERE collection_status = 'collected' AND transferred_to_sender), 0) AS total_fees, \
                COUNT(*) FILTER (WHERE collection_status <> 'failed' AND NOT (collection_status = 'collected' AND transferred_to_sender)) AS pending_count, \
                COUNT(*) FILTER (WHERE collection_status = 'collected' AND transferred_to_sender) AS completed_count, \
                COUNT(*) FILTER (WHERE collection_status = 'failed') AS failed_count \
             FROM cod_transactions \
             WHERE $1::uuid IS NULL OR company_id = $1",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(totals)
    }

    #[instrument(skip(self))]
    async fn driver_rollups(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<Vec<DriverRollup>, CodError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["driver_rollups"])
            .start_timer();

        let rollups = sqlx::query_as::<_, DriverRollup>(
            "SELECT COALESCE(collected_by_driver_id, driver_id) AS driver_id, \
                    company_id, \
                    COALESCE(SUM(cod_amount) FILTER (WHERE collection_status = 'pending'), 0) AS pending_collection, \
                    COALESCE(SUM(cod_amount) FILTER (WHERE collection_status = 'collected' AND NOT submitted_to_company), 0) AS collected_unsubmitted, \
                    COALESCE(SUM(cod_amount) FILTER (WHERE collection_status = 'collected' AND submitted_to_company AND NOT transferred_to_sender), 0) AS submitted, \
                    COALESCE(SUM(cod_amount) FILTER (WHERE collection_status = 'collected' AND transferred_to_sender), 0) AS transferred, \
                    COUNT(*) AS transaction_count \
             FROM cod_transactions \
             WHERE COALESCE(collected_by_driver_id, driver_id) IS NOT NULL \
               AND ($1::uuid IS NULL OR company_id = $1) \
             GROUP BY COALESCE(collected_by_driver_id, driver_id), company_id \
             ORDER BY COALESCE(collected_by_driver_id, driver_id)",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(rollups)
    }
}
