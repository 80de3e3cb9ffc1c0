//! Batch submission behavior: declared-total matching and atomicity.

mod common;

use cod_service::error::CodError;
use cod_service::models::OverallStatus;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn collected_batch(
    svc: &common::Services,
    driver: Uuid,
    amounts: &[Decimal],
) -> Vec<Uuid> {
    let company = Uuid::new_v4();
    let mut ids = Vec::new();
    for amount in amounts {
        let tx = svc
            .ledger
            .create(Uuid::new_v4(), company, Some(driver), *amount)
            .await
            .unwrap();
        svc.ledger.collect(tx.transaction_id, driver, None).await.unwrap();
        ids.push(tx.transaction_id);
    }
    ids
}

#[tokio::test]
async fn submit_marks_the_whole_batch_and_clears_pending_amount() {
    let svc = common::services();
    let driver = Uuid::new_v4();
    let ids = collected_batch(&svc, driver, &[dec!(100), dec!(250), dec!(50)]).await;

    assert_eq!(
        svc.ledger.driver_pending_amount(driver).await.unwrap(),
        dec!(400)
    );

    let submitted = svc.ledger.submit(driver, &ids, dec!(400)).await.unwrap();
    assert_eq!(submitted.len(), 3);
    for tx in &submitted {
        assert!(tx.submitted_to_company);
        assert_eq!(tx.submitted_amount, Some(tx.cod_amount));
        assert_eq!(tx.overall_status(), OverallStatus::SubmittedToCompany);
    }

    assert_eq!(
        svc.ledger.driver_pending_amount(driver).await.unwrap(),
        Decimal::ZERO
    );
}

#[tokio::test]
async fn declared_total_mismatch_rejects_the_batch_untouched() {
    let svc = common::services();
    let driver = Uuid::new_v4();
    let ids = collected_batch(&svc, driver, &[dec!(100), dec!(200)]).await;

    let err = svc.ledger.submit(driver, &ids, dec!(250)).await.unwrap_err();
    match err {
        CodError::AmountMismatch { declared, computed } => {
            assert_eq!(declared, dec!(250));
            assert_eq!(computed, dec!(300));
        }
        other => panic!("expected AmountMismatch, got {other:?}"),
    }

    // Nothing was applied.
    for id in &ids {
        let tx = svc.ledger.get(*id).await.unwrap();
        assert!(!tx.submitted_to_company);
    }
    assert_eq!(
        svc.ledger.driver_pending_amount(driver).await.unwrap(),
        dec!(300)
    );
}

#[tokio::test]
async fn batch_with_foreign_transaction_is_rejected_whole() {
    let svc = common::services();
    let driver = Uuid::new_v4();
    let mut ids = collected_batch(&svc, driver, &[dec!(100)]).await;

    // A transaction collected by a different driver poisons the batch.
    let (foreign, _) = common::collected_transaction(&svc, Uuid::new_v4(), dec!(70)).await;
    ids.push(foreign);

    let err = svc.ledger.submit(driver, &ids, dec!(170)).await.unwrap_err();
    match err {
        CodError::InvalidState {
            transaction_ids, ..
        } => assert_eq!(transaction_ids, vec![foreign]),
        other => panic!("expected InvalidState, got {other:?}"),
    }

    for id in &ids {
        assert!(!svc.ledger.get(*id).await.unwrap().submitted_to_company);
    }
}

#[tokio::test]
async fn repeated_id_in_a_batch_is_rejected_without_double_counting() {
    let svc = common::services();
    let driver = Uuid::new_v4();
    let ids = collected_batch(&svc, driver, &[dec!(100)]).await;
    let id = ids[0];

    // Listing the same transaction twice must not let 100 of real cash
    // satisfy a declared total of 200.
    let err = svc
        .ledger
        .submit(driver, &[id, id], dec!(200))
        .await
        .unwrap_err();
    match err {
        CodError::InvalidState {
            transaction_ids, ..
        } => assert_eq!(transaction_ids, vec![id]),
        other => panic!("expected InvalidState, got {other:?}"),
    }

    assert!(!svc.ledger.get(id).await.unwrap().submitted_to_company);
    assert_eq!(
        svc.ledger.driver_pending_amount(driver).await.unwrap(),
        dec!(100)
    );
}

#[tokio::test]
async fn every_offending_transaction_is_reported_together() {
    let svc = common::services();
    let driver = Uuid::new_v4();
    let mut ids = collected_batch(&svc, driver, &[dec!(100)]).await;

    let (foreign_a, _) = common::collected_transaction(&svc, Uuid::new_v4(), dec!(50)).await;
    let (foreign_b, _) = common::collected_transaction(&svc, Uuid::new_v4(), dec!(70)).await;
    ids.extend([foreign_a, foreign_b]);

    let err = svc.ledger.submit(driver, &ids, dec!(220)).await.unwrap_err();
    match err {
        CodError::InvalidState {
            transaction_ids, ..
        } => assert_eq!(transaction_ids, vec![foreign_a, foreign_b]),
        other => panic!("expected InvalidState, got {other:?}"),
    }

    for id in &ids {
        assert!(!svc.ledger.get(*id).await.unwrap().submitted_to_company);
    }
}

#[tokio::test]
async fn already_submitted_transaction_cannot_be_resubmitted() {
    let svc = common::services();
    let driver = Uuid::new_v4();
    let ids = collected_batch(&svc, driver, &[dec!(100)]).await;

    svc.ledger.submit(driver, &ids, dec!(100)).await.unwrap();
    let err = svc.ledger.submit(driver, &ids, dec!(100)).await.unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));
}

#[tokio::test]
async fn uncollected_transaction_cannot_be_submitted() {
    let svc = common::services();
    let driver = Uuid::new_v4();
    let tx = svc
        .ledger
        .create(Uuid::new_v4(), Uuid::new_v4(), Some(driver), dec!(100))
        .await
        .unwrap();

    let err = svc
        .ledger
        .submit(driver, &[tx.transaction_id], dec!(100))
        .await
        .unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));
}

#[tokio::test]
async fn empty_batch_is_a_validation_error() {
    let svc = common::services();
    let err = svc
        .ledger
        .submit(Uuid::new_v4(), &[], Decimal::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, CodError::Validation(_)));
}
