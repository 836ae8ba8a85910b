use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::custom_stage::{self, ActiveModel as StageActiveModel, Entity as CustomStage},
    errors::ServiceError,
    events::{Event, EventSender},
    models::MAX_STAGE_HOURS,
};

/// A stage offered out of the box.
#[derive(Debug, Clone, Copy)]
pub struct DefaultStage {
    pub name: &'static str,
    pub department: &'static str,
    pub estimated_minutes: i64,
}

impl DefaultStage {
    pub fn estimated_hours(&self) -> Decimal {
        Decimal::from(self.estimated_minutes) / Decimal::from(60)
    }
}

/// Stages seeded into `custom_stages` by the initial migration.
pub const DEFAULT_STAGE_CATALOG: [DefaultStage; 6] = [
    DefaultStage {
        name: "Design Approval",
        department: "design",
        estimated_minutes: 90,
    },
    DefaultStage {
        name: "Printing",
        department: "production",
        estimated_minutes: 240,
    },
    DefaultStage {
        name: "Lamination",
        department: "production",
        estimated_minutes: 120,
    },
    DefaultStage {
        name: "Finishing",
        department: "production",
        estimated_minutes: 120,
    },
    DefaultStage {
        name: "Quality Check",
        department: "qc",
        estimated_minutes: 60,
    },
    DefaultStage {
        name: "Packaging",
        department: "dispatch",
        estimated_minutes: 60,
    },
];

pub fn default_stage_names() -> Vec<String> {
    DEFAULT_STAGE_CATALOG
        .iter()
        .map(|stage| stage.name.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateStageRequest {
    #[validate(length(min = 1, max = 100, message = "Stage name is required"))]
    pub stage_name: String,
    pub department: Option<String>,
    pub estimated_hours: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateStageDefinitionRequest {
    #[validate(length(min = 1, max = 100, message = "Stage name must not be empty"))]
    pub stage_name: Option<String>,
    pub department: Option<String>,
    pub estimated_hours: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

fn check_hours(hours: Option<Decimal>) -> Result<(), ServiceError> {
    match hours {
        Some(h) if h <= Decimal::ZERO => Err(ServiceError::ValidationError(
            "Estimated hours must be greater than zero".to_string(),
        )),
        Some(h) if h > MAX_STAGE_HOURS => Err(ServiceError::ValidationError(format!(
            "Estimated hours must not exceed {}",
            MAX_STAGE_HOURS
        ))),
        _ => Ok(()),
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Manages the configurable list of production stages.
#[derive(Clone)]
pub struct StageCatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl StageCatalogService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn notify(&self, stage_id: Uuid) {
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StageCatalogChanged { stage_id })
                .await;
        }
    }

    async fn find(&self, stage_id: Uuid) -> Result<custom_stage::Model, ServiceError> {
        CustomStage::find_by_id(stage_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch catalog stage {}: {}", stage_id, e);
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Stage {} not found", stage_id)))
    }

    async fn ensure_unique_name(&self, name: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let existing = CustomStage::find()
            .filter(custom_stage::Column::StageName.eq(name))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to check catalog stage name '{}': {}", name, e);
                ServiceError::DatabaseError(e)
            })?;

        match existing {
            Some(stage) if Some(stage.id) != except => Err(ServiceError::Conflict(format!(
                "Stage '{}' already exists",
                name
            ))),
            _ => Ok(()),
        }
    }

    /// Catalog entries ordered by display order.
    #[instrument(skip(self))]
    pub async fn list_stages(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<custom_stage::Model>, ServiceError> {
        let mut query = CustomStage::find();
        if !include_inactive {
            query = query.filter(custom_stage::Column::IsActive.eq(true));
        }

        query
            .order_by_asc(custom_stage::Column::DisplayOrder)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to list catalog stages: {}", e);
                ServiceError::DatabaseError(e)
            })
    }

    /// Names offered when scheduling an order.
    pub async fn active_stage_names(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .list_stages(false)
            .await?
            .into_iter()
            .map(|stage| stage.stage_name)
            .collect())
    }

    #[instrument(skip(self, request), fields(stage_name = %request.stage_name))]
    pub async fn create_stage(
        &self,
        request: CreateStageRequest,
    ) -> Result<custom_stage::Model, ServiceError> {
        request.validate()?;
        check_hours(request.estimated_hours)?;

        let name = request.stage_name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Stage name is required".to_string(),
            ));
        }
        self.ensure_unique_name(&name, None).await?;

        let db = &*self.db_pool;
        let last = CustomStage::find()
            .order_by_desc(custom_stage::Column::DisplayOrder)
            .one(db)
            .await
            .map_err(|e| {
                error!("Failed to read catalog display order: {}", e);
                ServiceError::DatabaseError(e)
            })?;
        let display_order = last.map(|stage| stage.display_order + 1).unwrap_or(1);

        let now = Utc::now();
        let stage = StageActiveModel {
            id: Set(Uuid::new_v4()),
            stage_name: Set(name),
            display_order: Set(display_order),
            department: Set(blank_to_none(request.department)),
            estimated_hours: Set(request.estimated_hours.unwrap_or(Decimal::ONE)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!("Failed to create catalog stage: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        info!(stage_id = %stage.id, display_order, "Catalog stage created");
        self.notify(stage.id).await;
        Ok(stage)
    }

    #[instrument(skip(self, request), fields(stage_id = %stage_id))]
    pub async fn update_stage(
        &self,
        stage_id: Uuid,
        request: UpdateStageDefinitionRequest,
    ) -> Result<custom_stage::Model, ServiceError> {
        request.validate()?;
        check_hours(request.estimated_hours)?;

        let stage = self.find(stage_id).await?;
        let mut active: StageActiveModel = stage.into();

        if let Some(name) = request.stage_name.map(|n| n.trim().to_string()) {
            if name.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Stage name must not be empty".to_string(),
                ));
            }
            self.ensure_unique_name(&name, Some(stage_id)).await?;
            active.stage_name = Set(name);
        }
        if request.department.is_some() {
            active.department = Set(blank_to_none(request.department));
        }
        if let Some(hours) = request.estimated_hours {
            active.estimated_hours = Set(hours);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!("Failed to update catalog stage {}: {}", stage_id, e);
            ServiceError::DatabaseError(e)
        })?;

        self.notify(stage_id).await;
        Ok(updated)
    }

    /// Flips the active flag; inactive stages are hidden from scheduling.
    #[instrument(skip(self), fields(stage_id = %stage_id))]
    pub async fn toggle_active(&self, stage_id: Uuid) -> Result<custom_stage::Model, ServiceError> {
        let stage = self.find(stage_id).await?;
        let is_active = !stage.is_active;

        let mut active: StageActiveModel = stage.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!("Failed to toggle catalog stage {}: {}", stage_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(is_active, "Catalog stage toggled");
        self.notify(stage_id).await;
        Ok(updated)
    }

    /// Swaps display order with the neighbouring stage. Moving past either end
    /// leaves the catalog unchanged.
    #[instrument(skip(self), fields(stage_id = %stage_id, direction = %direction))]
    pub async fn move_stage(
        &self,
        stage_id: Uuid,
        direction: MoveDirection,
    ) -> Result<Vec<custom_stage::Model>, ServiceError> {
        let stages = self.list_stages(true).await?;
        let index = stages
            .iter()
            .position(|stage| stage.id == stage_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Stage {} not found", stage_id)))?;

        let neighbour = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|i| *i < stages.len()),
        };
        let Some(neighbour) = neighbour else {
            debug!("Stage already at the edge of the catalog");
            return Ok(stages);
        };

        let current = stages[index].clone();
        let other = stages[neighbour].clone();
        let now = Utc::now();

        self.db_pool
            .transaction::<_, (), ServiceError>(|txn| {
                Box::pin(async move {
                    let current_order = current.display_order;
                    let other_order = other.display_order;

                    let mut first: StageActiveModel = current.into();
                    first.display_order = Set(other_order);
                    first.updated_at = Set(now);
                    first.update(txn).await?;

                    let mut second: StageActiveModel = other.into();
                    second.display_order = Set(current_order);
                    second.updated_at = Set(now);
                    second.update(txn).await?;

                    Ok(())
                })
            })
            .await
            .map_err(|e| {
                error!("Failed to reorder catalog stage {}: {}", stage_id, e);
                ServiceError::from(e)
            })?;

        self.notify(stage_id).await;
        self.list_stages(true).await
    }
}
