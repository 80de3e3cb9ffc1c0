//! Request and response payloads for the HTTP API.

use crate::models::{CodTransaction, CollectionStatus, OverallStatus, TransferMethod};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct CreateCodRequest {
    pub order_id: Uuid,
    pub company_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub cod_amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CollectRequest {
    pub driver_id: Uuid,
    #[validate(url)]
    pub proof_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitBatchRequest {
    pub driver_id: Uuid,
    #[validate(length(min = 1))]
    pub transaction_ids: Vec<Uuid>,
    /// The amount the driver counted when handing the cash over.
    pub declared_total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmReceiptRequest {
    pub received_by: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransferRequest {
    pub method: TransferMethod,
    pub reference: Option<String>,
    #[validate(url)]
    pub proof_url: Option<String>,
    #[serde(default)]
    pub fee: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FailRequest {
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustmentRequest {
    pub amount: Decimal,
    #[validate(length(min = 1))]
    pub reason: String,
    pub adjusted_by: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileDriverRequest {
    pub date: NaiveDate,
    pub reconciled_by: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileAllRequest {
    pub date: NaiveDate,
    pub company_id: Uuid,
    pub reconciled_by: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DriverListQuery {
    pub status: Option<CollectionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CompanyQuery {
    pub company_id: Option<Uuid>,
}

/// Transaction plus its derived fields. The derived values never hit the
/// database; they are computed per response.
#[derive(Debug, Serialize)]
pub struct CodTransactionResponse {
    #[serde(flatten)]
    pub transaction: CodTransaction,
    pub overall_status: OverallStatus,
    pub net_amount: Decimal,
    /// Carrier tracking code from the order directory, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_tracking_code: Option<String>,
}

impl CodTransactionResponse {
    pub fn with_tracking_code(mut self, tracking_code: Option<String>) -> Self {
        self.order_tracking_code = tracking_code;
        self
    }
}

impl From<CodTransaction> for CodTransactionResponse {
    fn from(transaction: CodTransaction) -> Self {
        let overall_status = transaction.overall_status();
        let net_amount = transaction.net_amount();
        Self {
            transaction,
            overall_status,
            net_amount,
            order_tracking_code: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PendingAmountResponse {
    pub driver_id: Uuid,
    pub pending_amount: Decimal,
}
