use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pending or processed supplier receipt. `is_processed` transitions
/// false to true exactly once; that transition is the only event allowed
/// to emit a StockIn for this entry.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub unit_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub quantity_received: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub unit_cost: Option<Decimal>,
    pub batch_number: Option<String>,
    pub is_processed: bool,
    pub received_by: String,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub entry_date: DateTime<Utc>,
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
        if let ActiveValue::NotSet = active_model.entry_date {
            active_model.entry_date = Set(Utc::now());
        }
        Ok(active_model)
    }
}
