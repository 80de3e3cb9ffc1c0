//! COD transaction model and custody state machine.
//!
//! A `CodTransaction` tracks cash collected by a driver at delivery time
//! through the custody chain: driver collects, driver submits to the
//! company, company confirms receipt, company transfers net proceeds back
//! to the sender. All transitions are forward-only; `cod_amount` is fixed
//! at creation and only ever annotated via the adjustment fields.

use crate::error::CodError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Custody state of the physical cash at the driver level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Pending,
    Collected,
    Failed,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Collected => "collected",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the company forwarded the net proceeds to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    Cash,
    BankTransfer,
    EWallet,
}

impl TransferMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::EWallet => "e_wallet",
        }
    }
}

impl std::fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status derived from the authoritative custody fields.
///
/// Never stored: recomputed on every read so it can not drift from the
/// booleans and timestamps it is a function of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    PendingCollection,
    Collected,
    SubmittedToCompany,
    Completed,
    Failed,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingCollection => "pending_collection",
            Self::Collected => "collected",
            Self::SubmittedToCompany => "submitted_to_company",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One COD transaction per order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CodTransaction {
    pub transaction_id: Uuid,
    pub order_id: Uuid,
    pub company_id: Uuid,
    /// Driver the order was assigned to at creation time. Authoritative
    /// assignment lives with the order service; this is the fallback used
    /// when no order service is configured.
    pub driver_id: Option<Uuid>,
    pub cod_amount: Decimal,

    pub collection_status: CollectionStatus,
    pub collected_by_driver_id: Option<Uuid>,
    pub collected_at: Option<DateTime<Utc>>,
    pub collection_proof_url: Option<String>,

    pub submitted_to_company: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submitted_amount: Option<Decimal>,

    pub company_received_by: Option<Uuid>,
    pub receipt_confirmed_at: Option<DateTime<Utc>>,

    pub transferred_to_sender: bool,
    pub transferred_at: Option<DateTime<Utc>>,
    pub transfer_method: Option<TransferMethod>,
    pub transfer_reference: Option<String>,
    pub transfer_proof_url: Option<String>,
    pub company_fee: Decimal,

    pub adjustment_amount: Option<Decimal>,
    pub adjustment_reason: Option<String>,
    pub failure_reason: Option<String>,

    /// Optimistic concurrency token; bumped on every successful write.
    pub version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl CodTransaction {
    pub fn new(
        order_id: Uuid,
        company_id: Uuid,
        driver_id: Option<Uuid>,
        cod_amount: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: Uuid::new_v4(),
            order_id,
            company_id,
            driver_id,
            cod_amount,
            collection_status: CollectionStatus::Pending,
            collected_by_driver_id: None,
            collected_at: None,
            collection_proof_url: None,
            submitted_to_company: false,
            submitted_at: None,
            submitted_amount: None,
            company_received_by: None,
            receipt_confirmed_at: None,
            transferred_to_sender: false,
            transferred_at: None,
            transfer_method: None,
            transfer_reference: None,
            transfer_proof_url: None,
            company_fee: Decimal::ZERO,
            adjustment_amount: None,
            adjustment_reason: None,
            failure_reason: None,
            version: 1,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Derive the lifecycle status from the custody fields.
    pub fn overall_status(&self) -> OverallStatus {
        if self.collection_status == CollectionStatus::Failed {
            OverallStatus::Failed
        } else if self.transferred_to_sender {
            OverallStatus::Completed
        } else if self.submitted_to_company {
            OverallStatus::SubmittedToCompany
        } else if self.collection_status == CollectionStatus::Collected {
            OverallStatus::Collected
        } else {
            OverallStatus::PendingCollection
        }
    }

    /// Amount conceptually forwarded to the sender. Derived, never stored.
    pub fn net_amount(&self) -> Decimal {
        self.cod_amount - self.company_fee
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.overall_status(),
            OverallStatus::Completed | OverallStatus::Failed
        )
    }

    /// Driver marks the cash as physically collected at delivery.
    ///
    /// Double collection is a reportable bug, not a retry-safe no-op: it
    /// would corrupt the driver's pending-amount total.
    pub fn mark_collected(
        &mut self,
        driver_id: Uuid,
        proof_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), CodError> {
        if self.collection_status != CollectionStatus::Pending {
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} is {}, expected pending collection",
                    self.transaction_id, self.collection_status
                ),
                vec![self.transaction_id],
            ));
        }
        self.collection_status = CollectionStatus::Collected;
        self.collected_by_driver_id = Some(driver_id);
        self.collected_at = Some(now);
        self.collection_proof_url = proof_url;
        self.updated_utc = now;
        Ok(())
    }

    /// Check that this transaction can be part of a driver's submission
    /// batch. Returns the offending condition without mutating anything.
    pub fn check_submittable(&self, driver_id: Uuid) -> Result<(), CodError> {
        if self.collected_by_driver_id != Some(driver_id) {
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} was not collected by driver {}",
                    self.transaction_id, driver_id
                ),
                vec![self.transaction_id],
            ));
        }
        if self.collection_status != CollectionStatus::Collected {
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} is {}, expected collected",
                    self.transaction_id, self.collection_status
                ),
                vec![self.transaction_id],
            ));
        }
        if self.submitted_to_company {
            return Err(CodError::invalid_state(
                format!("transaction {} is already submitted", self.transaction_id),
                vec![self.transaction_id],
            ));
        }
        Ok(())
    }

    /// Record this transaction as part of a submission batch. The caller
    /// (the batcher) has already validated the batch with
    /// [`check_submittable`] and the declared-total match.
    pub fn mark_submitted(&mut self, now: DateTime<Utc>) {
        self.submitted_to_company = true;
        self.submitted_at = Some(now);
        self.submitted_amount = Some(self.cod_amount);
        self.updated_utc = now;
    }

    /// Company staff acknowledges physical receipt of the submitted cash.
    /// Evidentiary only: the derived status stays `submitted_to_company`.
    pub fn confirm_receipt(
        &mut self,
        received_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), CodError> {
        if !self.submitted_to_company {
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} has not been submitted to the company",
                    self.transaction_id
                ),
                vec![self.transaction_id],
            ));
        }
        if self.receipt_confirmed_at.is_some() {
            return Err(CodError::invalid_state(
                format!(
                    "receipt for transaction {} is already confirmed",
                    self.transaction_id
                ),
                vec![self.transaction_id],
            ));
        }
        self.company_received_by = Some(received_by);
        self.receipt_confirmed_at = Some(now);
        self.updated_utc = now;
        Ok(())
    }

    /// Company forwards net proceeds to the original sender. Receipt
    /// confirmation is advisory, not a hard gate; submission is.
    pub fn mark_transferred(
        &mut self,
        method: TransferMethod,
        reference: Option<String>,
        proof_url: Option<String>,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), CodError> {
        if !self.submitted_to_company {
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} has not been submitted to the company",
                    self.transaction_id
                ),
                vec![self.transaction_id],
            ));
        }
        if self.transferred_to_sender {
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} is already transferred to the sender",
                    self.transaction_id
                ),
                vec![self.transaction_id],
            ));
        }
        if fee < Decimal::ZERO || fee > self.cod_amount {
            return Err(CodError::Validation(format!(
                "company fee {} must be within [0, {}]",
                fee, self.cod_amount
            )));
        }
        self.transferred_to_sender = true;
        self.transferred_at = Some(now);
        self.transfer_method = Some(method);
        self.transfer_reference = reference;
        self.transfer_proof_url = proof_url;
        self.company_fee = fee;
        self.updated_utc = now;
        Ok(())
    }

    /// Mark the collection as failed (lost or undeliverable COD).
    /// Reachable from any non-terminal state, never reversible.
    pub fn mark_failed(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), CodError> {
        if self.is_terminal() {
            return Err(CodError::invalid_state(
                format!(
                    "transaction {} is terminal ({})",
                    self.transaction_id,
                    self.overall_status()
                ),
                vec![self.transaction_id],
            ));
        }
        self.collection_status = CollectionStatus::Failed;
        self.failure_reason = Some(reason);
        self.updated_utc = now;
        Ok(())
    }

    /// Record a reconciliation adjustment. Annotates the declared-vs-expected
    /// variance; never touches `cod_amount`.
    pub fn record_adjustment(&mut self, amount: Decimal, reason: String, now: DateTime<Utc>) {
        self.adjustment_amount = Some(amount);
        self.adjustment_reason = Some(reason);
        self.updated_utc = now;
    }
}
