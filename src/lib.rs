//! Storefront checkout core: an append-only stock ledger and a payment
//! reconciliation state machine behind a small HTTP API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateways;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::errors::ServiceError;
use crate::gateways::{CaptureGateway, RedirectGateway};
use crate::handlers::health::HealthHandlerState;
use crate::handlers::payments::PaymentHandlerState;
use crate::handlers::stock::StockHandlerState;
use crate::services::{InvoiceService, StockAuditService, StockEntryService, StockLedgerService};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub stock_ledger: StockLedgerService,
    pub stock_entries: StockEntryService,
    pub stock_audit: StockAuditService,
    pub invoices: InvoiceService,
    pub capture_gateway: Arc<CaptureGateway>,
    pub redirect_gateway: Arc<RedirectGateway>,
}

impl AppState {
    /// Wires services and gateway adapters over an established pool.
    pub fn build(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Result<Self, ServiceError> {
        let stock_ledger = StockLedgerService::new(db.clone(), event_sender.clone());
        let stock_entries =
            StockEntryService::new(db.clone(), stock_ledger.clone(), event_sender.clone());
        let stock_audit = StockAuditService::new(stock_ledger.clone(), event_sender.clone());
        let invoices = InvoiceService::new(db.clone(), event_sender.clone());
        let gateway_timeout = Duration::from_secs(config.gateway_timeout_secs);
        let capture_gateway = Arc::new(CaptureGateway::new(
            config.capture_gateway.clone(),
            gateway_timeout,
        )?);
        let redirect_gateway = Arc::new(RedirectGateway::new(config.redirect_gateway.clone()));

        Ok(Self {
            db,
            config,
            event_sender,
            stock_ledger,
            stock_entries,
            stock_audit,
            invoices,
            capture_gateway,
            redirect_gateway,
        })
    }
}

impl StockHandlerState for AppState {
    fn stock_ledger(&self) -> &StockLedgerService {
        &self.stock_ledger
    }

    fn stock_entries(&self) -> &StockEntryService {
        &self.stock_entries
    }

    fn stock_audit(&self) -> &StockAuditService {
        &self.stock_audit
    }
}

impl PaymentHandlerState for AppState {
    fn invoices(&self) -> &InvoiceService {
        &self.invoices
    }

    fn capture_gateway(&self) -> &Arc<CaptureGateway> {
        &self.capture_gateway
    }

    fn redirect_gateway(&self) -> &Arc<RedirectGateway> {
        &self.redirect_gateway
    }
}

impl HealthHandlerState for AppState {
    fn db_pool(&self) -> &Arc<db::DbPool> {
        &self.db
    }
}

/// Assembles the full application router.
pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/stock", handlers::stock::stock_router())
        .nest("/payments", handlers::payments::payments_router());

    Router::new()
        .merge(handlers::health::health_router())
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
