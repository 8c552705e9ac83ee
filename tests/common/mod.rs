#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use storefront_api::db::{self, DbConfig, DbPool};
use storefront_api::events::{self, EventSender};
use storefront_api::services::{
    InvoiceService, StockAuditService, StockEntryService, StockLedgerService,
};

/// An in-memory database with the full schema applied. A single
/// connection is forced so every handle sees the same database.
pub async fn test_db() -> Arc<DbPool> {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(600),
        acquire_timeout: Duration::from_secs(5),
    };
    let pool = db::establish_connection_with_config(&config)
        .await
        .expect("connect to in-memory sqlite");
    db::run_migrations(&pool).await.expect("apply migrations");
    Arc::new(pool)
}

pub fn test_events() -> EventSender {
    // Receiver dropped on purpose; senders treat delivery as best-effort.
    let (sender, receiver) = events::channel(64);
    drop(receiver);
    sender
}

pub struct TestServices {
    pub db: Arc<DbPool>,
    pub ledger: StockLedgerService,
    pub entries: StockEntryService,
    pub audit: StockAuditService,
    pub invoices: InvoiceService,
}

pub async fn test_services() -> TestServices {
    let db = test_db().await;
    let events = test_events();
    let ledger = StockLedgerService::new(db.clone(), events.clone());
    let entries = StockEntryService::new(db.clone(), ledger.clone(), events.clone());
    let audit = StockAuditService::new(ledger.clone(), events.clone());
    let invoices = InvoiceService::new(db.clone(), events);
    TestServices {
        db,
        ledger,
        entries,
        audit,
        invoices,
    }
}
