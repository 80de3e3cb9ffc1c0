//! Receipt confirmation and transfer-to-sender behavior.

mod common;

use cod_service::error::CodError;
use cod_service::models::{OverallStatus, TransferMethod};
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn submitted_transaction(svc: &common::Services) -> Uuid {
    let (tx_id, driver) = common::collected_transaction(svc, Uuid::new_v4(), dec!(500)).await;
    svc.ledger.submit(driver, &[tx_id], dec!(500)).await.unwrap();
    tx_id
}

#[tokio::test]
async fn confirm_receipt_is_evidentiary_only() {
    let svc = common::services();
    let tx_id = submitted_transaction(&svc).await;
    let staff = Uuid::new_v4();

    let tx = svc.ledger.confirm_receipt(tx_id, staff).await.unwrap();
    assert_eq!(tx.company_received_by, Some(staff));
    assert!(tx.receipt_confirmed_at.is_some());
    assert_eq!(tx.overall_status(), OverallStatus::SubmittedToCompany);

    // Second confirmation is rejected.
    assert!(svc.ledger.confirm_receipt(tx_id, staff).await.is_err());
}

#[tokio::test]
async fn confirm_receipt_before_submission_is_rejected() {
    let svc = common::services();
    let (tx_id, _) = common::collected_transaction(&svc, Uuid::new_v4(), dec!(100)).await;
    let err = svc
        .ledger
        .confirm_receipt(tx_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));
}

#[tokio::test]
async fn transfer_completes_the_transaction_with_fee_retained() {
    let svc = common::services();
    let tx_id = submitted_transaction(&svc).await;

    let tx = svc
        .ledger
        .transfer_to_sender(
            tx_id,
            TransferMethod::BankTransfer,
            Some("TRX-9913".into()),
            Some("https://cdn/slip.pdf".into()),
            dec!(25),
        )
        .await
        .unwrap();

    assert_eq!(tx.overall_status(), OverallStatus::Completed);
    assert_eq!(tx.transfer_method, Some(TransferMethod::BankTransfer));
    assert_eq!(tx.company_fee, dec!(25));
    assert_eq!(tx.net_amount(), dec!(475));
    assert_eq!(tx.cod_amount, dec!(500));
    assert!(tx.is_terminal());
}

#[tokio::test]
async fn transfer_does_not_require_receipt_confirmation() {
    let svc = common::services();
    let tx_id = submitted_transaction(&svc).await;

    let tx = svc
        .ledger
        .transfer_to_sender(tx_id, TransferMethod::Cash, None, None, dec!(0))
        .await
        .unwrap();
    assert!(tx.receipt_confirmed_at.is_none());
    assert_eq!(tx.overall_status(), OverallStatus::Completed);
}

#[tokio::test]
async fn transfer_without_submission_is_rejected() {
    let svc = common::services();
    let (tx_id, _) = common::collected_transaction(&svc, Uuid::new_v4(), dec!(100)).await;

    let err = svc
        .ledger
        .transfer_to_sender(tx_id, TransferMethod::Cash, None, None, dec!(0))
        .await
        .unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));
}

#[tokio::test]
async fn transfer_cannot_be_repeated() {
    let svc = common::services();
    let tx_id = submitted_transaction(&svc).await;

    svc.ledger
        .transfer_to_sender(tx_id, TransferMethod::EWallet, None, None, dec!(0))
        .await
        .unwrap();
    let err = svc
        .ledger
        .transfer_to_sender(tx_id, TransferMethod::Cash, None, None, dec!(0))
        .await
        .unwrap_err();
    assert!(matches!(err, CodError::InvalidState { .. }));
}

#[tokio::test]
async fn out_of_range_fee_is_rejected() {
    let svc = common::services();
    let tx_id = submitted_transaction(&svc).await;

    for fee in [dec!(-1), dec!(501)] {
        let err = svc
            .ledger
            .transfer_to_sender(tx_id, TransferMethod::Cash, None, None, fee)
            .await
            .unwrap_err();
        assert!(matches!(err, CodError::Validation(_)));
    }

    let tx = svc.ledger.get(tx_id).await.unwrap();
    assert!(!tx.transferred_to_sender);
}
