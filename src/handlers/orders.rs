use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{Action, ActingUser},
    documents::GeneratedDocument,
    entities::order,
    errors::ServiceError,
    handlers::{ApiResponse, AppState},
    services::order_lifecycle::{
        CompletionOutcome, CreateOrderRequest, EstimatedCompletion, OrderFilter, OrderStats,
        OrderWithStages, ScheduleOrderRequest, ScheduleOutcome, StageProgress,
    },
};

/// Progress bar and ETD of one order.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderProgressResponse {
    pub order_id: Uuid,
    pub order_no: String,
    pub progress: StageProgress,
    pub estimate: EstimatedCompletion,
}

// GET /api/v1/orders?status=&search=
pub async fn list_orders(
    State(state): State<AppState>,
    user: ActingUser,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<ApiResponse<Vec<order::Model>>>, ServiceError> {
    user.require(Action::ViewOrders)?;
    let orders = state.lifecycle.list_orders(filter).await?;
    Ok(Json(ApiResponse::success(orders)))
}

// GET /api/v1/orders/in-progress
pub async fn list_in_progress_orders(
    State(state): State<AppState>,
    user: ActingUser,
) -> Result<Json<ApiResponse<Vec<OrderWithStages>>>, ServiceError> {
    user.require(Action::ViewOrders)?;
    let orders = state.lifecycle.list_in_progress_orders().await?;
    Ok(Json(ApiResponse::success(orders)))
}

// GET /api/v1/orders/stats
pub async fn order_stats(
    State(state): State<AppState>,
    user: ActingUser,
) -> Result<Json<ApiResponse<OrderStats>>, ServiceError> {
    user.require(Action::ViewOrders)?;
    let stats = state.lifecycle.order_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

// POST /api/v1/orders
pub async fn create_order(
    State(state): State<AppState>,
    user: ActingUser,
    Json(mut request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<order::Model>>), ServiceError> {
    user.require(Action::CreateOrder)?;
    if request.created_by.is_none() {
        request.created_by = user.user_id.clone();
    }

    let order = state.lifecycle.create_order(request).await?;
    let message = format!("Order {} created", order.order_no);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(order, message)),
    ))
}

// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    user: ActingUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderWithStages>>, ServiceError> {
    user.require(Action::ViewOrders)?;
    let order = state.lifecycle.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

// GET /api/v1/orders/:id/progress
pub async fn order_progress(
    State(state): State<AppState>,
    user: ActingUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderProgressResponse>>, ServiceError> {
    user.require(Action::ViewOrders)?;
    let order = state.lifecycle.get_order(order_id).await?;
    let estimate = state.lifecycle.estimated_completion(order_id).await?;

    Ok(Json(ApiResponse::success(OrderProgressResponse {
        order_id,
        order_no: order.order.order_no,
        progress: order.progress,
        estimate,
    })))
}

// POST /api/v1/orders/:id/schedule
pub async fn schedule_order(
    State(state): State<AppState>,
    user: ActingUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ScheduleOrderRequest>,
) -> Result<Json<ApiResponse<ScheduleOutcome>>, ServiceError> {
    user.require(Action::ScheduleOrder)?;
    let outcome = state.lifecycle.schedule_order(order_id, request).await?;
    let message = format!("Order {} moved to In-Progress", outcome.order.order.order_no);
    Ok(Json(ApiResponse::with_message(outcome, message)))
}

// POST /api/v1/orders/:id/complete
pub async fn complete_order(
    State(state): State<AppState>,
    user: ActingUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CompletionOutcome>>, ServiceError> {
    user.require(Action::CompleteOrder)?;
    let outcome = state.lifecycle.complete_order_by_id(order_id).await?;
    let message = format!("Order {} completed", outcome.order.order_no);
    Ok(Json(ApiResponse::with_message(outcome, message)))
}

// POST /api/v1/orders/:id/delivery-challan
pub async fn regenerate_delivery_challan(
    State(state): State<AppState>,
    user: ActingUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<GeneratedDocument>>, ServiceError> {
    user.require(Action::GenerateDocuments)?;
    let document = state.lifecycle.regenerate_delivery_challan(order_id).await?;
    Ok(Json(ApiResponse::success(document)))
}
