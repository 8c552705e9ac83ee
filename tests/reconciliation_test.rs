mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use storefront_api::entities::invoice::InvoiceStatus;
use storefront_api::errors::ServiceError;
use storefront_api::gateways::{GatewayKind, GatewayOutcome, GatewayResult};
use uuid::Uuid;

fn settled(transaction_id: &str, amount: rust_decimal::Decimal) -> GatewayResult {
    GatewayResult {
        outcome: GatewayOutcome::Settled,
        gateway_order_id: Some("GW-1".to_string()),
        transaction_id: Some(transaction_id.to_string()),
        paid_at: Some(Utc::now()),
        amount: Some(amount),
        metadata: None,
    }
}

#[tokio::test]
async fn settlement_marks_invoice_paid() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    let invoice = svc
        .invoices
        .create_invoice(order_id, dec!(49.99), "USD", GatewayKind::Capture)
        .await
        .unwrap();
    assert_eq!(invoice.status_enum(), Some(InvoiceStatus::Draft));
    assert!(invoice.invoice_number.starts_with("INV-"));

    let status = svc
        .invoices
        .reconcile(order_id, &settled("TXN-100", dec!(49.99)))
        .await
        .unwrap();
    assert_eq!(status, InvoiceStatus::Paid);

    let invoice = svc.invoices.get_by_order(order_id).await.unwrap();
    assert_eq!(invoice.status_enum(), Some(InvoiceStatus::Paid));
    assert_eq!(invoice.transaction_id.as_deref(), Some("TXN-100"));
    assert!(invoice.paid_at.is_some());
}

#[tokio::test]
async fn duplicate_settlement_is_a_no_op_preserving_the_original() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    svc.invoices
        .create_invoice(order_id, dec!(20.00), "USD", GatewayKind::Redirect)
        .await
        .unwrap();

    let first = settled("TXN-FIRST", dec!(20.00));
    svc.invoices.reconcile(order_id, &first).await.unwrap();
    let after_first = svc.invoices.get_by_order(order_id).await.unwrap();

    // The gateway redelivers with a different transaction id and a later
    // timestamp; nothing of the first settlement may change.
    let mut second = settled("TXN-SECOND", dec!(20.00));
    second.paid_at = Some(Utc::now() + Duration::minutes(5));
    let status = svc.invoices.reconcile(order_id, &second).await.unwrap();
    assert_eq!(status, InvoiceStatus::Paid);

    let after_second = svc.invoices.get_by_order(order_id).await.unwrap();
    assert_eq!(after_second.transaction_id.as_deref(), Some("TXN-FIRST"));
    assert_eq!(after_second.paid_at, after_first.paid_at);
}

#[tokio::test]
async fn concurrent_duplicate_settlements_both_report_paid() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    svc.invoices
        .create_invoice(order_id, dec!(20.00), "USD", GatewayKind::Capture)
        .await
        .unwrap();

    // Both deliveries race from Draft; the loser of the conditional
    // update must still observe the winner's Paid, not an error.
    let first = settled("TXN-A", dec!(20.00));
    let second = settled("TXN-B", dec!(20.00));
    let (a, b) = tokio::join!(
        svc.invoices.reconcile(order_id, &first),
        svc.invoices.reconcile(order_id, &second),
    );
    assert_eq!(a.unwrap(), InvoiceStatus::Paid);
    assert_eq!(b.unwrap(), InvoiceStatus::Paid);

    let invoice = svc.invoices.get_by_order(order_id).await.unwrap();
    assert_eq!(invoice.status_enum(), Some(InvoiceStatus::Paid));
    // Exactly one of the two transaction ids stuck.
    let txn = invoice.transaction_id.as_deref().unwrap();
    assert!(txn == "TXN-A" || txn == "TXN-B");
}

#[tokio::test]
async fn settlement_after_cancellation_is_refused() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    svc.invoices
        .create_invoice(order_id, dec!(15.00), "USD", GatewayKind::Capture)
        .await
        .unwrap();
    svc.invoices.cancel(order_id, "customer abandoned").await.unwrap();

    let err = svc
        .invoices
        .reconcile(order_id, &settled("TXN-LATE", dec!(15.00)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));
}

#[tokio::test]
async fn duplicate_cancellation_is_a_no_op() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    svc.invoices
        .create_invoice(order_id, dec!(15.00), "USD", GatewayKind::Redirect)
        .await
        .unwrap();
    svc.invoices.cancel(order_id, "customer abandoned").await.unwrap();

    // The gateway redelivers the cancelled return; nothing changes.
    let status = svc
        .invoices
        .cancel(order_id, "customer abandoned")
        .await
        .unwrap();
    assert_eq!(status, InvoiceStatus::Cancelled);
}

#[tokio::test]
async fn failed_and_cancelled_outcomes_cancel_the_invoice() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    svc.invoices
        .create_invoice(order_id, dec!(30.00), "USD", GatewayKind::Redirect)
        .await
        .unwrap();

    let status = svc
        .invoices
        .reconcile(order_id, &GatewayResult::failed("card declined"))
        .await
        .unwrap();
    assert_eq!(status, InvoiceStatus::Cancelled);
}

#[tokio::test]
async fn settled_amount_must_match_the_invoice() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    svc.invoices
        .create_invoice(order_id, dec!(100.00), "USD", GatewayKind::Capture)
        .await
        .unwrap();

    let err = svc
        .invoices
        .reconcile(order_id, &settled("TXN-SHORT", dec!(99.00)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let invoice = svc.invoices.get_by_order(order_id).await.unwrap();
    assert_eq!(invoice.status_enum(), Some(InvoiceStatus::Draft));
}

#[tokio::test]
async fn refund_requires_a_paid_invoice() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    svc.invoices
        .create_invoice(order_id, dec!(75.00), "USD", GatewayKind::Capture)
        .await
        .unwrap();

    let err = svc
        .invoices
        .refund(order_id, dec!(75.00), "RF-1")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));

    svc.invoices
        .reconcile(order_id, &settled("TXN-200", dec!(75.00)))
        .await
        .unwrap();
    let status = svc.invoices.refund(order_id, dec!(75.00), "RF-1").await.unwrap();
    assert_eq!(status, InvoiceStatus::Refunded);

    let invoice = svc.invoices.get_by_order(order_id).await.unwrap();
    assert_eq!(invoice.refunded_amount, Some(dec!(75.00)));
    assert_eq!(invoice.refund_transaction_id.as_deref(), Some("RF-1"));

    // Refunded is terminal.
    let err = svc
        .invoices
        .refund(order_id, dec!(75.00), "RF-2")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));
}

#[tokio::test]
async fn refund_amount_cannot_exceed_the_invoice() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    svc.invoices
        .create_invoice(order_id, dec!(40.00), "USD", GatewayKind::Capture)
        .await
        .unwrap();
    svc.invoices
        .reconcile(order_id, &settled("TXN-300", dec!(40.00)))
        .await
        .unwrap();

    let err = svc
        .invoices
        .refund(order_id, dec!(40.01), "RF-X")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn duplicate_checkout_reuses_the_active_invoice() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    let first = svc
        .invoices
        .create_invoice(order_id, dec!(10.00), "USD", GatewayKind::Capture)
        .await
        .unwrap();
    let second = svc
        .invoices
        .create_invoice(order_id, dec!(10.00), "USD", GatewayKind::Capture)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn cancelled_invoice_allows_a_fresh_checkout_attempt() {
    let svc = common::test_services().await;
    let order_id = Uuid::new_v4();
    let first = svc
        .invoices
        .create_invoice(order_id, dec!(10.00), "USD", GatewayKind::Capture)
        .await
        .unwrap();
    svc.invoices.cancel(order_id, "timeout").await.unwrap();

    let second = svc
        .invoices
        .create_invoice(order_id, dec!(10.00), "USD", GatewayKind::Redirect)
        .await
        .unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.status_enum(), Some(InvoiceStatus::Draft));
}
