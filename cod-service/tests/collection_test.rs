//! Creation and collection behavior.

mod common;

use cod_service::error::CodError;
use cod_service::models::{CollectionStatus, OverallStatus};
use cod_service::services::{CodLedger, CodStore, MemoryStore, OrderAssignment, OrderDirectory};
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn create_then_collect_moves_cash_into_driver_custody() {
    let svc = common::services();
    let company = Uuid::new_v4();
    let driver = Uuid::new_v4();

    let tx = svc
        .ledger
        .create(Uuid::new_v4(), company, Some(driver), dec!(250000))
        .await
        .unwrap();
    assert_eq!(tx.overall_status(), OverallStatus::PendingCollection);

    let tx = svc
        .ledger
        .collect(tx.transaction_id, driver, Some("https://cdn/p.jpg".into()))
        .await
        .unwrap();
    assert_eq!(tx.collection_status, CollectionStatus::Collected);
    assert_eq!(tx.collected_by_driver_id, Some(driver));
    assert_eq!(tx.version, 2);

    let pending = svc.ledger.driver_pending_amount(driver).await.unwrap();
    assert_eq!(pending, dec!(250000));
}

#[tokio::test]
async fn create_rejects_non_positive_amounts() {
    let svc = common::services();
    for amount in [dec!(0), dec!(-10)] {
        let err = svc
            .ledger
            .create(Uuid::new_v4(), Uuid::new_v4(), None, amount)
            .await
            .unwrap_err();
        assert!(matches!(err, CodError::Validation(_)));
    }
}

#[tokio::test]
async fn duplicate_order_is_rejected() {
    let svc = common::services();
    let order = Uuid::new_v4();
    svc.ledger
        .create(order, Uuid::new_v4(), None, dec!(100))
        .await
        .unwrap();
    let err = svc
        .ledger
        .create(order, Uuid::new_v4(), None, dec!(200))
        .await
        .unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));
}

#[tokio::test]
async fn collect_by_unassigned_driver_is_rejected() {
    let svc = common::services();
    let assigned = Uuid::new_v4();
    let tx = svc
        .ledger
        .create(Uuid::new_v4(), Uuid::new_v4(), Some(assigned), dec!(100))
        .await
        .unwrap();

    let err = svc
        .ledger
        .collect(tx.transaction_id, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));

    // The assigned driver still can collect afterwards.
    svc.ledger.collect(tx.transaction_id, assigned, None).await.unwrap();
}

#[tokio::test]
async fn collect_without_assignment_accepts_any_driver() {
    let svc = common::services();
    let tx = svc
        .ledger
        .create(Uuid::new_v4(), Uuid::new_v4(), None, dec!(100))
        .await
        .unwrap();
    let driver = Uuid::new_v4();
    let tx = svc.ledger.collect(tx.transaction_id, driver, None).await.unwrap();
    assert_eq!(tx.collected_by_driver_id, Some(driver));
}

/// Directory stub serving a single known order.
struct PinnedDirectory {
    assignment: OrderAssignment,
}

#[async_trait::async_trait]
impl OrderDirectory for PinnedDirectory {
    async fn lookup(&self, order_id: Uuid) -> Result<Option<OrderAssignment>, CodError> {
        Ok((order_id == self.assignment.order_id).then(|| self.assignment.clone()))
    }
}

#[tokio::test]
async fn order_directory_overrides_stored_driver_and_serves_tracking_code() {
    common::init_tracing();
    let order = Uuid::new_v4();
    let company = Uuid::new_v4();
    let stored = Uuid::new_v4();
    let assigned = Uuid::new_v4();

    let store: Arc<dyn CodStore> = Arc::new(MemoryStore::new());
    let ledger = CodLedger::new(
        store,
        Arc::new(PinnedDirectory {
            assignment: OrderAssignment {
                order_id: order,
                company_id: company,
                assigned_driver_id: Some(assigned),
                tracking_code: Some("TRK-0042".into()),
            },
        }),
    );

    let tx = ledger
        .create(order, company, Some(stored), dec!(100))
        .await
        .unwrap();

    // The directory, not the stored assignment, decides who may collect.
    let err = ledger.collect(tx.transaction_id, stored, None).await.unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));
    ledger.collect(tx.transaction_id, assigned, None).await.unwrap();

    assert_eq!(
        ledger.tracking_code(order).await.unwrap().as_deref(),
        Some("TRK-0042")
    );
    assert_eq!(ledger.tracking_code(Uuid::new_v4()).await.unwrap(), None);
}

#[tokio::test]
async fn double_collect_is_rejected_without_corrupting_totals() {
    let svc = common::services();
    let (tx_id, driver) = common::collected_transaction(&svc, Uuid::new_v4(), dec!(300)).await;

    let err = svc.ledger.collect(tx_id, driver, None).await.unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));

    assert_eq!(
        svc.ledger.driver_pending_amount(driver).await.unwrap(),
        dec!(300)
    );
}

#[tokio::test]
async fn lookup_by_unknown_ids_is_not_found() {
    let svc = common::services();
    assert!(matches!(
        svc.ledger.get(Uuid::new_v4()).await.unwrap_err(),
        CodError::NotFound { .. }
    ));
    assert!(matches!(
        svc.ledger.get_by_order(Uuid::new_v4()).await.unwrap_err(),
        CodError::NotFound { .. }
    ));
}

#[tokio::test]
async fn pending_collections_are_listed_oldest_first() {
    let svc = common::services();
    let driver = Uuid::new_v4();
    let company = Uuid::new_v4();

    let first = svc
        .ledger
        .create(Uuid::new_v4(), company, Some(driver), dec!(10))
        .await
        .unwrap();
    let second = svc
        .ledger
        .create(Uuid::new_v4(), company, Some(driver), dec!(20))
        .await
        .unwrap();

    let pending = svc.ledger.list_pending_collections(driver).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].transaction_id, first.transaction_id);
    assert_eq!(pending[1].transaction_id, second.transaction_id);

    // Collecting removes the transaction from the pending list.
    svc.ledger.collect(first.transaction_id, driver, None).await.unwrap();
    let pending = svc.ledger.list_pending_collections(driver).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].transaction_id, second.transaction_id);
}

#[tokio::test]
async fn mark_failed_from_pending_and_collected() {
    let svc = common::services();
    let tx = svc
        .ledger
        .create(Uuid::new_v4(), Uuid::new_v4(), None, dec!(50))
        .await
        .unwrap();
    let failed = svc
        .ledger
        .mark_failed(tx.transaction_id, "receiver refused".into())
        .await
        .unwrap();
    assert_eq!(failed.overall_status(), OverallStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("receiver refused"));

    let (tx_id, _) = common::collected_transaction(&svc, Uuid::new_v4(), dec!(60)).await;
    let failed = svc
        .ledger
        .mark_failed(tx_id, "cash lost".into())
        .await
        .unwrap();
    assert_eq!(failed.overall_status(), OverallStatus::Failed);

    // Terminal: cannot fail twice.
    assert!(svc.ledger.mark_failed(tx_id, "again".into()).await.is_err());
}
