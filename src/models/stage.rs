use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Upper bound for any estimated or recorded stage duration, in hours.
pub const MAX_STAGE_HOURS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Status of a single production stage.
///
/// The model carries three states. The checklist toggle only moves between
/// `Pending` and `Completed`; `InProgress` is entered through the detailed
/// stage update.
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum StageStatus {
    #[default]
    #[sea_orm(string_value = "pending")]
    #[strum(to_string = "pending")]
    Pending,
    #[sea_orm(string_value = "in_progress")]
    #[strum(to_string = "in_progress", serialize = "in-progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    #[strum(to_string = "completed")]
    Completed,
}

impl StageStatus {
    /// Status produced by the checklist toggle.
    pub fn toggled(self) -> StageStatus {
        match self {
            StageStatus::Completed => StageStatus::Pending,
            StageStatus::Pending | StageStatus::InProgress => StageStatus::Completed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }
}
