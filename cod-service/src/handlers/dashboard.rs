//! Dashboard handler.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{dtos::CompanyQuery, error::CodError, services::DashboardView, startup::AppState};

pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<DashboardView>, CodError> {
    let view = state.dashboard.view(query.company_id).await?;
    Ok(Json(view))
}
