//! Company-facing COD dashboard reads.

use crate::error::CodError;
use crate::services::store::{CodStore, DashboardTotals, DriverRollup};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Aggregate view served to the dashboard: money in each custody stage plus
/// a per-driver breakdown. Derived on every read, never stored.
#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub totals: DashboardTotals,
    pub drivers: Vec<DriverRollup>,
}

pub struct Dashboard {
    store: Arc<dyn CodStore>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn CodStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn view(&self, company_id: Option<Uuid>) -> Result<DashboardView, CodError> {
        let totals = self.store.dashboard_totals(company_id).await?;
        let drivers = self.store.driver_rollups(company_id).await?;
        Ok(DashboardView { totals, drivers })
    }
}
