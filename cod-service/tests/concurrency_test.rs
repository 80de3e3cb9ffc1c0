//! Concurrent writes must resolve to exactly one winner.

mod common;

use cod_service::error::CodError;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_collects_produce_exactly_one_winner() {
    let svc = Arc::new(common::services());
    let driver = Uuid::new_v4();
    let tx = svc
        .ledger
        .create(Uuid::new_v4(), Uuid::new_v4(), Some(driver), dec!(100))
        .await
        .unwrap();

    let a = {
        let svc = svc.clone();
        let id = tx.transaction_id;
        tokio::spawn(async move { svc.ledger.collect(id, driver, None).await })
    };
    let b = {
        let svc = svc.clone();
        let id = tx.transaction_id;
        tokio::spawn(async move { svc.ledger.collect(id, driver, None).await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one collect must win: {a:?} / {b:?}");
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser.unwrap_err(), CodError::InvalidState { .. }));

    // Custody totals stay consistent.
    assert_eq!(
        svc.ledger.driver_pending_amount(driver).await.unwrap(),
        dec!(100)
    );
    let stored = svc.ledger.get(tx.transaction_id).await.unwrap();
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn submission_loses_to_a_concurrent_write_and_rolls_back() {
    let svc = common::services();
    let driver = Uuid::new_v4();

    let mut ids = Vec::new();
    for amount in [dec!(100), dec!(200)] {
        let tx = svc
            .ledger
            .create(Uuid::new_v4(), Uuid::new_v4(), Some(driver), amount)
            .await
            .unwrap();
        svc.ledger.collect(tx.transaction_id, driver, None).await.unwrap();
        ids.push(tx.transaction_id);
    }

    // Another actor fails one transaction between the driver's read and
    // submit: the version guard makes the whole batch lose.
    svc.ledger.mark_failed(ids[1], "cash lost".into()).await.unwrap();

    let err = svc.ledger.submit(driver, &ids, dec!(300)).await.unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));
    assert!(!svc.ledger.get(ids[0]).await.unwrap().submitted_to_company);
}

#[tokio::test]
async fn concurrent_transfers_produce_exactly_one_completion() {
    use cod_service::models::TransferMethod;

    let svc = Arc::new(common::services());
    let (tx_id, driver) = common::collected_transaction(&svc, Uuid::new_v4(), dec!(500)).await;
    svc.ledger.submit(driver, &[tx_id], dec!(500)).await.unwrap();

    let spawn_transfer = |svc: Arc<common::Services>| {
        tokio::spawn(async move {
            svc.ledger
                .transfer_to_sender(tx_id, TransferMethod::Cash, None, None, dec!(10))
                .await
        })
    };
    let a = spawn_transfer(svc.clone()).await.unwrap();
    let b = spawn_transfer(svc.clone()).await.unwrap();

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    let stored = svc.ledger.get(tx_id).await.unwrap();
    assert!(stored.transferred_to_sender);
    assert_eq!(stored.company_fee, dec!(10));
}
