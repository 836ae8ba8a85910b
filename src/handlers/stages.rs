use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{Action, ActingUser},
    entities::order_stage,
    errors::ServiceError,
    handlers::{ApiResponse, AppState},
    models::StageStatus,
    services::order_lifecycle::UpdateStageRequest,
};

/// The status the client last saw; the stage flips away from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleStageRequest {
    pub current_status: StageStatus,
}

// POST /api/v1/stages/:id/toggle
pub async fn toggle_stage(
    State(state): State<AppState>,
    user: ActingUser,
    Path(stage_id): Path<Uuid>,
    Json(request): Json<ToggleStageRequest>,
) -> Result<Json<ApiResponse<order_stage::Model>>, ServiceError> {
    user.require(Action::UpdateStage)?;
    let stage = state
        .lifecycle
        .toggle_stage(stage_id, request.current_status)
        .await?;
    Ok(Json(ApiResponse::success(stage)))
}

// PATCH /api/v1/stages/:id
pub async fn update_stage(
    State(state): State<AppState>,
    user: ActingUser,
    Path(stage_id): Path<Uuid>,
    Json(request): Json<UpdateStageRequest>,
) -> Result<Json<ApiResponse<order_stage::Model>>, ServiceError> {
    user.require(Action::UpdateStage)?;
    let stage = state.lifecycle.update_stage(stage_id, request).await?;
    Ok(Json(ApiResponse::success(stage)))
}
