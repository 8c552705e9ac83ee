pub mod invoice;
pub mod payment;
pub mod stock_entry;
pub mod stock_transaction;
pub mod stock_unit;
