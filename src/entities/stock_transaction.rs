use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of quantity-affecting events in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    /// Supplier receipt; adds to available
    StockIn,
    /// Moves available into reserved
    Reservation,
    /// Moves reserved back into available
    Release,
    /// Subtracts from reserved; permanent
    Sale,
    /// Sets available to an explicit target, recording the signed delta
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::StockIn => "stock_in",
            TransactionType::Reservation => "reservation",
            TransactionType::Release => "release",
            TransactionType::Sale => "sale",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stock_in" => Some(TransactionType::StockIn),
            "reservation" => Some(TransactionType::Reservation),
            "release" => Some(TransactionType::Release),
            "sale" => Some(TransactionType::Sale),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only ledger row. Each row snapshots the unit before and after
/// the change; corrections are new Adjustment rows, never edits.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub unit_id: Uuid,
    /// Stored as string; convert with `TransactionType::parse`
    pub transaction_type: String,
    pub quantity_change: i32,
    pub available_before: i32,
    pub available_after: i32,
    pub reserved_before: i32,
    pub reserved_after: i32,
    pub reason: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub created_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_unit::Entity",
        from = "Column::UnitId",
        to = "super::stock_unit::Column::Id"
    )]
    StockUnit,
}

impl Related<super::stock_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockUnit.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.occurred_at {
            active_model.occurred_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
