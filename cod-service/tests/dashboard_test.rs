//! Dashboard aggregation behavior.

mod common;

use cod_service::models::TransferMethod;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn totals_track_money_through_every_custody_stage() {
    let svc = common::services();
    let company = Uuid::new_v4();

    // One pending, one collected, one submitted, one transferred, one failed.
    svc.ledger
        .create(Uuid::new_v4(), company, None, dec!(100))
        .await
        .unwrap();

    common::collected_transaction(&svc, company, dec!(200)).await;

    let (submitted_id, driver) = common::collected_transaction(&svc, company, dec!(300)).await;
    svc.ledger.submit(driver, &[submitted_id], dec!(300)).await.unwrap();

    let (transferred_id, driver) = common::collected_transaction(&svc, company, dec!(400)).await;
    svc.ledger.submit(driver, &[transferred_id], dec!(400)).await.unwrap();
    svc.ledger
        .transfer_to_sender(transferred_id, TransferMethod::Cash, None, None, dec!(40))
        .await
        .unwrap();

    let failed = svc
        .ledger
        .create(Uuid::new_v4(), company, None, dec!(500))
        .await
        .unwrap();
    svc.ledger
        .mark_failed(failed.transaction_id, "undeliverable".into())
        .await
        .unwrap();

    let view = svc.dashboard.view(Some(company)).await.unwrap();
    assert_eq!(view.totals.total_pending_collection, dec!(100));
    assert_eq!(view.totals.total_collected, dec!(200));
    assert_eq!(view.totals.total_submitted, dec!(300));
    assert_eq!(view.totals.total_transferred, dec!(400));
    assert_eq!(view.totals.total_fees, dec!(40));
    assert_eq!(view.totals.pending_count, 3);
    assert_eq!(view.totals.completed_count, 1);
    assert_eq!(view.totals.failed_count, 1);
}

#[tokio::test]
async fn company_scope_excludes_other_companies() {
    let svc = common::services();
    let company = Uuid::new_v4();

    common::collected_transaction(&svc, company, dec!(100)).await;
    common::collected_transaction(&svc, Uuid::new_v4(), dec!(999)).await;

    let view = svc.dashboard.view(Some(company)).await.unwrap();
    assert_eq!(view.totals.total_collected, dec!(100));
    assert_eq!(view.drivers.len(), 1);

    // Unscoped view sees both.
    let view = svc.dashboard.view(None).await.unwrap();
    assert_eq!(view.totals.total_collected, dec!(1099));
    assert_eq!(view.drivers.len(), 2);
}

#[tokio::test]
async fn driver_rollups_split_amounts_by_stage() {
    let svc = common::services();
    let company = Uuid::new_v4();
    let driver = Uuid::new_v4();

    svc.ledger
        .create(Uuid::new_v4(), company, Some(driver), dec!(50))
        .await
        .unwrap();

    let held = svc
        .ledger
        .create(Uuid::new_v4(), company, Some(driver), dec!(70))
        .await
        .unwrap();
    svc.ledger.collect(held.transaction_id, driver, None).await.unwrap();

    let submitted = svc
        .ledger
        .create(Uuid::new_v4(), company, Some(driver), dec!(90))
        .await
        .unwrap();
    svc.ledger.collect(submitted.transaction_id, driver, None).await.unwrap();
    svc.ledger
        .submit(driver, &[submitted.transaction_id], dec!(90))
        .await
        .unwrap();

    let view = svc.dashboard.view(Some(company)).await.unwrap();
    assert_eq!(view.drivers.len(), 1);
    let rollup = &view.drivers[0];
    assert_eq!(rollup.driver_id, driver);
    assert_eq!(rollup.pending_collection, dec!(50));
    assert_eq!(rollup.collected_unsubmitted, dec!(70));
    assert_eq!(rollup.submitted, dec!(90));
    assert_eq!(rollup.transferred, Decimal::ZERO);
    assert_eq!(rollup.transaction_count, 3);
}

#[tokio::test]
async fn empty_store_renders_zeroed_dashboard() {
    let svc = common::services();
    let view = svc.dashboard.view(None).await.unwrap();
    assert_eq!(view.totals.total_pending_collection, Decimal::ZERO);
    assert_eq!(view.totals.pending_count, 0);
    assert!(view.drivers.is_empty());
}
