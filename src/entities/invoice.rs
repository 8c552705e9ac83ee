use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice lifecycle. Transitions are one-directional except
/// Paid -> Refunded; only the reconciliation service writes this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Paid,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            "refunded" => Some(InvoiceStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable financial record for one checkout attempt.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    /// Derived from order id and date; reproducible without a sequence
    pub invoice_number: String,
    /// Stored as string; convert with `InvoiceStatus::parse`
    pub status: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount: Decimal,
    pub currency: String,
    /// Which gateway adapter owns this checkout ("capture" | "redirect")
    pub gateway: String,
    pub gateway_order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub card_metadata: Option<Json>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub refunded_amount: Option<Decimal>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status_enum(&self) -> Option<InvoiceStatus> {
        InvoiceStatus::parse(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }
        active_model.updated_at = Set(Utc::now());
        Ok(active_model)
    }
}

/// Deterministic invoice number: date component plus the first segment of
/// the order id, uppercased. Reproducible for a given order and day.
pub fn derive_invoice_number(order_id: Uuid, date: DateTime<Utc>) -> String {
    let short = order_id.to_string();
    let short = short.split('-').next().unwrap_or("00000000").to_uppercase();
    format!("INV-{}-{}", date.format("%Y%m%d"), short)
}
