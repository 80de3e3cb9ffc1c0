//! HTTP handlers for cod-service.

pub mod dashboard;
pub mod reconciliation;
pub mod transactions;
