use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tag stored in `orders.source` for orders keyed in by staff.
pub const SOURCE_MANUAL: &str = "manual";
/// Tag stored in `orders.source` for orders received from the WooCommerce webhook.
pub const SOURCE_WOOCOMMERCE: &str = "woocommerce";

/// Lifecycle status of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    #[strum(to_string = "pending")]
    Pending,
    #[sea_orm(string_value = "in_progress")]
    #[strum(to_string = "in_progress", serialize = "in-progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    #[strum(to_string = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    #[strum(to_string = "cancelled", serialize = "canceled")]
    Cancelled,
}

/// Production priority chosen when the order is taken.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OrderPriority {
    #[default]
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "express")]
    Express,
}
