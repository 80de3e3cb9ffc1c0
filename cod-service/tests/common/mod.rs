//! Common test utilities for cod-service integration tests.
//!
//! Tests run against the in-memory store, so no external services are
//! required.

#![allow(dead_code)]

use cod_service::config::{CodConfig, DatabaseConfig, OrderServiceConfig};
use cod_service::services::{
    CodLedger, CodStore, Dashboard, MemoryStore, ReconciliationEngine, UnconfiguredOrderDirectory,
};
use cod_service::startup::Application;
use rust_decimal::Decimal;
use serde_json::Value;
use service_core::config::Config as CommonConfig;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,cod_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config() -> CodConfig {
    CodConfig {
        common: CommonConfig { port: 0 },
        service_name: "cod-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: String::new(), // Unused: tests run on the in-memory store
            max_connections: 2,
            min_connections: 1,
        },
        order_service: OrderServiceConfig {
            url: String::new(), // Empty = trust the stored driver assignment
        },
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// Spawn a test application over a fresh in-memory store.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let as_store: Arc<dyn CodStore> = store.clone();
    let app = Application::build_with_store(test_config(), as_store)
        .await
        .expect("Failed to build application");

    let address = format!("http://127.0.0.1:{}", app.port());

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        store,
    }
}

/// Service-layer fixture: ledger, reconciliation engine and dashboard over
/// one shared in-memory store.
pub struct Services {
    pub store: Arc<MemoryStore>,
    pub ledger: CodLedger,
    pub reconciliation: ReconciliationEngine,
    pub dashboard: Dashboard,
}

pub fn services() -> Services {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let as_store: Arc<dyn CodStore> = store.clone();
    Services {
        store,
        ledger: CodLedger::new(as_store.clone(), Arc::new(UnconfiguredOrderDirectory)),
        reconciliation: ReconciliationEngine::new(as_store.clone()),
        dashboard: Dashboard::new(as_store),
    }
}

/// Create a transaction, collect it and return (transaction_id, driver_id).
pub async fn collected_transaction(
    services: &Services,
    company_id: Uuid,
    amount: Decimal,
) -> (Uuid, Uuid) {
    let driver_id = Uuid::new_v4();
    let tx = services
        .ledger
        .create(Uuid::new_v4(), company_id, Some(driver_id), amount)
        .await
        .expect("create failed");
    services
        .ledger
        .collect(tx.transaction_id, driver_id, None)
        .await
        .expect("collect failed");
    (tx.transaction_id, driver_id)
}
