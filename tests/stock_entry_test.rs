mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use storefront_api::errors::ServiceError;
use storefront_api::entities::stock_transaction::TransactionType;
use storefront_api::services::stock_entries::CreateStockEntry;
use storefront_api::services::stock_ledger::{ApplyTransaction, Reference};
use uuid::Uuid;

fn receipt(sku: &str, quantity: i32) -> CreateStockEntry {
    CreateStockEntry {
        sku: sku.to_string(),
        supplier_id: Some(Uuid::new_v4()),
        quantity_received: quantity,
        unit_cost: Some(dec!(12.50)),
        batch_number: Some("BATCH-01".to_string()),
        received_by: "warehouse".to_string(),
    }
}

#[tokio::test]
async fn processing_an_entry_credits_stock_once() {
    let svc = common::test_services().await;
    let entry = svc.entries.create_entry(receipt("GADGET-1", 25)).await.unwrap();
    assert!(!entry.is_processed);

    // Creating the entry alone must not move stock.
    let unit = svc.ledger.get_unit_by_sku("GADGET-1").await.unwrap().unwrap();
    assert_eq!(unit.available_quantity, 0);

    svc.entries.process(entry.id, "operator").await.unwrap();

    let unit = svc.ledger.get_unit(unit.id).await.unwrap();
    assert_eq!(unit.available_quantity, 25);

    let processed = svc.entries.get_entry(entry.id).await.unwrap();
    assert!(processed.is_processed);
    assert_eq!(processed.processed_by.as_deref(), Some("operator"));
    assert!(processed.processed_at.is_some());
}

#[tokio::test]
async fn reprocessing_is_refused_without_double_crediting() {
    let svc = common::test_services().await;
    let entry = svc.entries.create_entry(receipt("GADGET-2", 10)).await.unwrap();
    svc.entries.process(entry.id, "operator").await.unwrap();

    let err = svc.entries.process(entry.id, "operator").await.unwrap_err();
    assert_matches!(err, ServiceError::AlreadyProcessed(_));

    let unit = svc.ledger.get_unit_by_sku("GADGET-2").await.unwrap().unwrap();
    assert_eq!(unit.available_quantity, 10);

    // Exactly one ledger row references the entry.
    let (history, total) = svc.ledger.history(unit.id, 1, 50).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(
        history[0].reference_id.as_deref(),
        Some(entry.id.to_string().as_str())
    );
}

#[tokio::test]
async fn interrupted_processing_resumes_without_double_crediting() {
    let svc = common::test_services().await;
    let entry = svc.entries.create_entry(receipt("GADGET-6", 12)).await.unwrap();
    let unit = svc.ledger.get_unit_by_sku("GADGET-6").await.unwrap().unwrap();

    // The ledger already carries the credit for this entry but the
    // processed flag never flipped, as after a crash mid-processing.
    svc.ledger
        .apply_transaction(ApplyTransaction {
            unit_id: unit.id,
            transaction_type: TransactionType::StockIn,
            quantity_change: 12,
            reason: "Stock entry receipt".to_string(),
            reference: Some(Reference::stock_entry(entry.id)),
            actor: "operator".to_string(),
        })
        .await
        .unwrap();

    svc.entries.process(entry.id, "operator").await.unwrap();

    let unit = svc.ledger.get_unit(unit.id).await.unwrap();
    assert_eq!(unit.available_quantity, 12);

    let processed = svc.entries.get_entry(entry.id).await.unwrap();
    assert!(processed.is_processed);

    let (history, total) = svc.ledger.history(unit.id, 1, 50).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(
        history[0].reference_id.as_deref(),
        Some(entry.id.to_string().as_str())
    );
}

#[tokio::test]
async fn non_positive_receipts_are_rejected() {
    let svc = common::test_services().await;
    let err = svc.entries.create_entry(receipt("GADGET-3", 0)).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    let err = svc.entries.create_entry(receipt("GADGET-3", -5)).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn pending_listing_excludes_processed_entries() {
    let svc = common::test_services().await;
    let first = svc.entries.create_entry(receipt("GADGET-4", 5)).await.unwrap();
    let second = svc.entries.create_entry(receipt("GADGET-5", 5)).await.unwrap();

    svc.entries.process(first.id, "operator").await.unwrap();

    let pending = svc.entries.list_pending(50).await.unwrap();
    let ids: Vec<Uuid> = pending.iter().map(|e| e.id).collect();
    assert!(!ids.contains(&first.id));
    assert!(ids.contains(&second.id));
}
