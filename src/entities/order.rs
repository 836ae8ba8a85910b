use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OrderPriority, OrderStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub order_no: String,

    pub customer_name: String,
    pub customer_contact: Option<String>,
    pub product_name: String,
    pub sku: Option<String>,
    pub sub_type: Option<String>,
    pub quantity: i32,
    pub price_per_unit: Option<Decimal>,
    pub order_total: Option<Decimal>,
    pub shipping_address: Option<String>,
    pub order_notes: Option<String>,
    pub priority: OrderPriority,
    pub source: String,
    pub status: OrderStatus,
    pub delivery_date: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_stage::Entity")]
    Stages,
}

impl Related<super::order_stage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Stages.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            self.updated_at = sea_orm::ActiveValue::Set(Utc::now());
        }
        Ok(self)
    }
}
