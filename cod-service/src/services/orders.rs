//! Order-service lookups.
//!
//! The order service owns driver assignment. When no order service is
//! configured (local development, tests), lookups fall back to the driver
//! recorded on the COD transaction at creation time.

use crate::error::CodError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Assignment facts about an order, as the order service reports them.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAssignment {
    pub order_id: Uuid,
    pub company_id: Uuid,
    pub assigned_driver_id: Option<Uuid>,
    #[serde(default)]
    pub tracking_code: Option<String>,
}

#[async_trait]
pub trait OrderDirectory: Send + Sync {
    /// Look up the order's current assignment, or `None` when the order is
    /// unknown to the directory.
    async fn lookup(&self, order_id: Uuid) -> Result<Option<OrderAssignment>, CodError>;
}

/// HTTP client against the order service.
pub struct HttpOrderDirectory {
    client: Client,
    base_url: String,
}

impl HttpOrderDirectory {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }
}

#[async_trait]
impl OrderDirectory for HttpOrderDirectory {
    async fn lookup(&self, order_id: Uuid) -> Result<Option<OrderAssignment>, CodError> {
        let url = format!("{}/api/orders/{}", self.base_url, order_id);

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(%order_id, error = %e, "Order service lookup failed");
            CodError::Storage(anyhow::anyhow!("order service unavailable: {}", e))
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let assignment = response
            .error_for_status()
            .map_err(|e| CodError::Storage(anyhow::anyhow!("order service error: {}", e)))?
            .json::<OrderAssignment>()
            .await
            .map_err(|e| CodError::Storage(anyhow::anyhow!("order service response: {}", e)))?;

        Ok(Some(assignment))
    }
}

/// Directory used when ORDER_SERVICE_URL is not configured. Reports every
/// order as unknown, which makes the ledger trust its own stored
/// assignment.
pub struct UnconfiguredOrderDirectory;

#[async_trait]
impl OrderDirectory for UnconfiguredOrderDirectory {
    async fn lookup(&self, _order_id: Uuid) -> Result<Option<OrderAssignment>, CodError> {
        Ok(None)
    }
}
