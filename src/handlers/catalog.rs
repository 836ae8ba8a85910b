use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{Action, ActingUser},
    entities::custom_stage,
    errors::ServiceError,
    handlers::{ApiResponse, AppState},
    services::stage_catalog::{CreateStageRequest, MoveDirection, UpdateStageDefinitionRequest},
};

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveStageRequest {
    pub direction: MoveDirection,
}

// GET /api/v1/stage-catalog?include_inactive=
pub async fn list_stages(
    State(state): State<AppState>,
    user: ActingUser,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<ApiResponse<Vec<custom_stage::Model>>>, ServiceError> {
    user.require(Action::ViewOrders)?;
    let stages = state.catalog.list_stages(query.include_inactive).await?;
    Ok(Json(ApiResponse::success(stages)))
}

// POST /api/v1/stage-catalog
pub async fn create_stage(
    State(state): State<AppState>,
    user: ActingUser,
    Json(request): Json<CreateStageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<custom_stage::Model>>), ServiceError> {
    user.require(Action::ManageStages)?;
    let stage = state.catalog.create_stage(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(stage))))
}

// PATCH /api/v1/stage-catalog/:id
pub async fn update_stage(
    State(state): State<AppState>,
    user: ActingUser,
    Path(stage_id): Path<Uuid>,
    Json(request): Json<UpdateStageDefinitionRequest>,
) -> Result<Json<ApiResponse<custom_stage::Model>>, ServiceError> {
    user.require(Action::ManageStages)?;
    let stage = state.catalog.update_stage(stage_id, request).await?;
    Ok(Json(ApiResponse::success(stage)))
}

// POST /api/v1/stage-catalog/:id/toggle
pub async fn toggle_stage(
    State(state): State<AppState>,
    user: ActingUser,
    Path(stage_id): Path<Uuid>,
) -> Result<Json<ApiResponse<custom_stage::Model>>, ServiceError> {
    user.require(Action::ManageStages)?;
    let stage = state.catalog.toggle_active(stage_id).await?;
    Ok(Json(ApiResponse::success(stage)))
}

// POST /api/v1/stage-catalog/:id/move
pub async fn move_stage(
    State(state): State<AppState>,
    user: ActingUser,
    Path(stage_id): Path<Uuid>,
    Json(request): Json<MoveStageRequest>,
) -> Result<Json<ApiResponse<Vec<custom_stage::Model>>>, ServiceError> {
    user.require(Action::ManageStages)?;
    let stages = state.catalog.move_stage(stage_id, request.direction).await?;
    Ok(Json(ApiResponse::success(stages)))
}
