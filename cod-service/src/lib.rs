//! Cash-on-delivery ledger and settlement service.
//!
//! Tracks COD cash from driver collection through company submission,
//! receipt confirmation and transfer back to the sender, with per-driver
//! daily reconciliation and a company dashboard.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
