//! Error taxonomy for the COD ledger.
//!
//! Every failure is a distinguishable kind so API layers can render
//! "order not found" vs "already collected" vs "amounts don't match"
//! distinctly instead of matching on message strings.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CodError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation attempted against a transaction not in the required
    /// precondition state. Carries the offending transaction ids so the
    /// caller can correct its request; retrying unchanged will fail again.
    #[error("invalid state: {reason}")]
    InvalidState {
        reason: String,
        transaction_ids: Vec<Uuid>,
    },

    /// Declared submission total does not equal the sum of the batch.
    /// Never auto-corrected; the caller must recompute and resubmit.
    #[error("declared total {declared} does not match computed total {computed}")]
    AmountMismatch { declared: Decimal, computed: Decimal },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl CodError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>, transaction_ids: Vec<Uuid>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
            transaction_ids,
        }
    }

    /// Stable machine-readable kind, used in HTTP bodies and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for CodError {
    fn from(err: sqlx::Error) -> Self {
        CodError::Storage(anyhow::Error::new(err))
    }
}

impl IntoResponse for CodError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            message: String,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            transaction_ids: Vec<Uuid>,
            #[serde(skip_serializing_if = "Option::is_none")]
            declared_total: Option<Decimal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            computed_total: Option<Decimal>,
        }

        let kind = self.kind();
        let (status, message, transaction_ids, declared, computed) = match self {
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string(), vec![], None, None),
            Self::InvalidState {
                ref transaction_ids,
                ..
            } => (
                StatusCode::CONFLICT,
                self.to_string(),
                transaction_ids.clone(),
                None,
                None,
            ),
            Self::AmountMismatch { declared, computed } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                self.to_string(),
                vec![],
                Some(declared),
                Some(computed),
            ),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string(), vec![], None, None),
            Self::Storage(ref err) => {
                tracing::error!(error = %err, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                    vec![],
                    None,
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: kind,
                message,
                transaction_ids,
                declared_total: declared,
                computed_total: computed,
            }),
        )
            .into_response()
    }
}
