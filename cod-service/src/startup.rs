//! Application startup and lifecycle management.

use crate::config::CodConfig;
use crate::handlers;
use crate::services::{
    get_metrics, init_metrics, CodLedger, CodStore, Dashboard, Database, HttpOrderDirectory,
    OrderDirectory, ReconciliationEngine, UnconfiguredOrderDirectory,
};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: CodConfig,
    pub ledger: Arc<CodLedger>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub dashboard: Arc<Dashboard>,
    /// Present only when backed by Postgres; health falls back to OK for
    /// in-memory deployments.
    pub db: Option<Arc<Database>>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_health = match &state.db {
        Some(db) => db.health_check().await,
        None => Ok(()),
    };

    match db_health {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "cod-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "cod-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_health = match &state.db {
        Some(db) => db.health_check().await,
        None => Ok(()),
    };

    match db_health {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: CodConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: CodConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: CodConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let store: Arc<dyn CodStore> = db.clone();
        Self::assemble(config, store, Some(db)).await
    }

    /// Build the application on an externally provided store. Used by the
    /// integration-test harness; skips Postgres entirely.
    pub async fn build_with_store(
        config: CodConfig,
        store: Arc<dyn CodStore>,
    ) -> Result<Self, AppError> {
        init_metrics();
        Self::assemble(config, store, None).await
    }

    async fn assemble(
        config: CodConfig,
        store: Arc<dyn CodStore>,
        db: Option<Arc<Database>>,
    ) -> Result<Self, AppError> {
        let orders: Arc<dyn OrderDirectory> = if config.order_service.url.is_empty() {
            tracing::info!("Order service URL not configured - assignment checks use stored driver");
            Arc::new(UnconfiguredOrderDirectory)
        } else {
            tracing::info!(endpoint = %config.order_service.url, "Using order service for assignment checks");
            Arc::new(HttpOrderDirectory::new(config.order_service.url.clone()))
        };

        let ledger = Arc::new(CodLedger::new(store.clone(), orders));
        let reconciliation = Arc::new(ReconciliationEngine::new(store.clone()));
        let dashboard = Arc::new(Dashboard::new(store));

        let state = AppState {
            config: config.clone(),
            ledger,
            reconciliation,
            dashboard,
            db,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "COD service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state.clone());

        tracing::info!(
            service = "cod-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Transactions
        .route(
            "/api/cod/transactions",
            post(handlers::transactions::create_transaction),
        )
        .route(
            "/api/cod/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/api/cod/orders/:order_id",
            get(handlers::transactions::get_by_order),
        )
        .route(
            "/api/cod/drivers/:driver_id/transactions",
            get(handlers::transactions::list_driver_transactions),
        )
        .route(
            "/api/cod/drivers/:driver_id/pending-collections",
            get(handlers::transactions::list_pending_collections),
        )
        .route(
            "/api/cod/drivers/:driver_id/pending-amount",
            get(handlers::transactions::driver_pending_amount),
        )
        // Custody transitions
        .route(
            "/api/cod/transactions/:id/collect",
            post(handlers::transactions::collect),
        )
        .route(
            "/api/cod/orders/:order_id/collect",
            post(handlers::transactions::collect_by_order),
        )
        .route(
            "/api/cod/submissions",
            post(handlers::transactions::submit_batch),
        )
        .route(
            "/api/cod/transactions/:id/confirm-receipt",
            post(handlers::transactions::confirm_receipt),
        )
        .route(
            "/api/cod/transactions/:id/transfer",
            post(handlers::transactions::transfer_to_sender),
        )
        .route(
            "/api/cod/transactions/:id/fail",
            post(handlers::transactions::mark_failed),
        )
        .route(
            "/api/cod/transactions/:id/adjustment",
            post(handlers::reconciliation::record_adjustment),
        )
        // Reconciliation
        .route(
            "/api/cod/reconciliation/drivers/:driver_id",
            post(handlers::reconciliation::reconcile_driver),
        )
        .route(
            "/api/cod/reconciliation/run",
            post(handlers::reconciliation::reconcile_all),
        )
        .route(
            "/api/cod/reconciliation/pending",
            get(handlers::reconciliation::pending_reconciliations),
        )
        .route(
            "/api/cod/reconciliation/drivers/:driver_id/:date",
            get(handlers::reconciliation::get_summary),
        )
        // Dashboard
        .route("/api/cod/dashboard", get(handlers::dashboard::dashboard))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
