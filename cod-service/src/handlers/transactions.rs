//! COD transaction handlers: creation, lookups and custody transitions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CodTransactionResponse, CollectRequest, ConfirmReceiptRequest, CreateCodRequest,
        DriverListQuery, FailRequest, PendingAmountResponse, SubmitBatchRequest, TransferRequest,
    },
    error::CodError,
    startup::AppState,
};

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreateCodRequest>,
) -> Result<(StatusCode, Json<CodTransactionResponse>), CodError> {
    tracing::info!(
        order_id = %payload.order_id,
        company_id = %payload.company_id,
        cod_amount = %payload.cod_amount,
        "Creating COD transaction"
    );

    let tx = state
        .ledger
        .create(
            payload.order_id,
            payload.company_id,
            payload.driver_id,
            payload.cod_amount,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(tx.into())))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<CodTransactionResponse>, CodError> {
    let tx = state.ledger.get(transaction_id).await?;
    let tracking_code = lookup_tracking_code(&state, tx.order_id).await;
    Ok(Json(CodTransactionResponse::from(tx).with_tracking_code(tracking_code)))
}

pub async fn get_by_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<CodTransactionResponse>, CodError> {
    let tx = state.ledger.get_by_order(order_id).await?;
    let tracking_code = lookup_tracking_code(&state, order_id).await;
    Ok(Json(CodTransactionResponse::from(tx).with_tracking_code(tracking_code)))
}

/// Best effort: a directory outage must not break reads.
async fn lookup_tracking_code(state: &AppState, order_id: Uuid) -> Option<String> {
    match state.ledger.tracking_code(order_id).await {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(%order_id, error = %e, "Tracking code lookup failed");
            None
        }
    }
}

pub async fn list_driver_transactions(
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
    Query(query): Query<DriverListQuery>,
) -> Result<Json<Vec<CodTransactionResponse>>, CodError> {
    let txs = state.ledger.list_by_driver(driver_id, query.status).await?;
    Ok(Json(txs.into_iter().map(Into::into).collect()))
}

pub async fn list_pending_collections(
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<Vec<CodTransactionResponse>>, CodError> {
    let txs = state.ledger.list_pending_collections(driver_id).await?;
    Ok(Json(txs.into_iter().map(Into::into).collect()))
}

pub async fn driver_pending_amount(
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<PendingAmountResponse>, CodError> {
    let pending_amount = state.ledger.driver_pending_amount(driver_id).await?;
    Ok(Json(PendingAmountResponse {
        driver_id,
        pending_amount,
    }))
}

pub async fn collect(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<CollectRequest>,
) -> Result<Json<CodTransactionResponse>, CodError> {
    payload
        .validate()
        .map_err(|e| CodError::Validation(e.to_string()))?;

    tracing::info!(
        %transaction_id,
        driver_id = %payload.driver_id,
        "Recording COD collection"
    );

    let tx = state
        .ledger
        .collect(transaction_id, payload.driver_id, payload.proof_url)
        .await?;
    Ok(Json(tx.into()))
}

pub async fn collect_by_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CollectRequest>,
) -> Result<Json<CodTransactionResponse>, CodError> {
    payload
        .validate()
        .map_err(|e| CodError::Validation(e.to_string()))?;

    let tx = state
        .ledger
        .collect_by_order(order_id, payload.driver_id, payload.proof_url)
        .await?;
    Ok(Json(tx.into()))
}

pub async fn submit_batch(
    State(state): State<AppState>,
    Json(payload): Json<SubmitBatchRequest>,
) -> Result<Json<Vec<CodTransactionResponse>>, CodError> {
    payload
        .validate()
        .map_err(|e| CodError::Validation(e.to_string()))?;

    tracing::info!(
        driver_id = %payload.driver_id,
        batch_size = payload.transaction_ids.len(),
        declared_total = %payload.declared_total,
        "Recording COD submission batch"
    );

    let txs = state
        .ledger
        .submit(
            payload.driver_id,
            &payload.transaction_ids,
            payload.declared_total,
        )
        .await?;
    Ok(Json(txs.into_iter().map(Into::into).collect()))
}

pub async fn confirm_receipt(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<ConfirmReceiptRequest>,
) -> Result<Json<CodTransactionResponse>, CodError> {
    let tx = state
        .ledger
        .confirm_receipt(transaction_id, payload.received_by)
        .await?;
    Ok(Json(tx.into()))
}

pub async fn transfer_to_sender(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<CodTransactionResponse>, CodError> {
    payload
        .validate()
        .map_err(|e| CodError::Validation(e.to_string()))?;

    tracing::info!(
        %transaction_id,
        method = %payload.method,
        fee = %payload.fee,
        "Recording transfer to sender"
    );

    let tx = state
        .ledger
        .transfer_to_sender(
            transaction_id,
            payload.method,
            payload.reference,
            payload.proof_url,
            payload.fee,
        )
        .await?;
    Ok(Json(tx.into()))
}

pub async fn mark_failed(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<FailRequest>,
) -> Result<Json<CodTransactionResponse>, CodError> {
    payload
        .validate()
        .map_err(|e| CodError::Validation(e.to_string()))?;

    tracing::warn!(%transaction_id, reason = %payload.reason, "Marking COD transaction failed");
    let tx = state.ledger.mark_failed(transaction_id, payload.reason).await?;
    Ok(Json(tx.into()))
}
