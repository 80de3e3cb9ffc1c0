//! Reconciliation handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        AdjustmentRequest, CodTransactionResponse, CompanyQuery, ReconcileAllRequest,
        ReconcileDriverRequest,
    },
    error::CodError,
    models::{DriverCodSummary, PendingReconciliation},
    services::ReconcileAllOutcome,
    startup::AppState,
};

pub async fn reconcile_driver(
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
    Json(payload): Json<ReconcileDriverRequest>,
) -> Result<Json<DriverCodSummary>, CodError> {
    tracing::info!(%driver_id, date = %payload.date, "Reconciling driver day");
    let summary = state
        .reconciliation
        .reconcile_driver(driver_id, payload.date, payload.reconciled_by)
        .await?;
    Ok(Json(summary))
}

pub async fn reconcile_all(
    State(state): State<AppState>,
    Json(payload): Json<ReconcileAllRequest>,
) -> Result<Json<ReconcileAllOutcome>, CodError> {
    tracing::info!(
        date = %payload.date,
        company_id = %payload.company_id,
        "Running reconciliation sweep"
    );
    let outcome = state
        .reconciliation
        .reconcile_all(payload.date, payload.company_id, payload.reconciled_by)
        .await?;
    Ok(Json(outcome))
}

pub async fn pending_reconciliations(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Vec<PendingReconciliation>>, CodError> {
    let pending = state.reconciliation.pending(query.company_id).await?;
    Ok(Json(pending))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path((driver_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<DriverCodSummary>, CodError> {
    let summary = state.reconciliation.get_summary(driver_id, date).await?;
    Ok(Json(summary))
}

pub async fn record_adjustment(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<AdjustmentRequest>,
) -> Result<Json<CodTransactionResponse>, CodError> {
    payload
        .validate()
        .map_err(|e| CodError::Validation(e.to_string()))?;

    tracing::info!(%transaction_id, amount = %payload.amount, "Recording adjustment");
    let tx = state
        .reconciliation
        .record_adjustment(
            transaction_id,
            payload.amount,
            payload.reason,
            payload.adjusted_by,
        )
        .await?;
    Ok(Json(tx.into()))
}
