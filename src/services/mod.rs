pub mod invoices;
pub mod stock_audit;
pub mod stock_entries;
pub mod stock_ledger;

pub use invoices::InvoiceService;
pub use stock_audit::StockAuditService;
pub use stock_entries::StockEntryService;
pub use stock_ledger::StockLedgerService;
