use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per sellable variant. The live projection of the ledger:
/// mutated exclusively through `services::stock_ledger`, and always
/// reconstructible by replaying the unit's transactions.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_units")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub sku: String,
    pub available_quantity: i32,
    pub reserved_quantity: i32,
    /// Optimistic lock stamp; bumped on every recorded transaction.
    pub version: i32,
    pub last_updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Quantity reported as "in stock" for display.
    pub fn total_quantity(&self) -> i32 {
        self.available_quantity + self.reserved_quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_transaction::Entity")]
    StockTransactions,
    #[sea_orm(has_many = "super::stock_entry::Entity")]
    StockEntries,
}

impl Related<super::stock_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockTransactions.def()
    }
}

impl Related<super::stock_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockEntries.def()
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
