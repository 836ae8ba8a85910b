//! Chhapai order lifecycle service
//!
//! Tracks print orders from intake through the production stages to
//! completion, producing the job card and delivery challan on the way.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod migrator;
pub mod models;
pub mod services;

use axum::{
    routing::{get, patch, post},
    Router,
};
use http::HeaderValue;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::AppConfig,
    db::DbPool,
    documents::DocumentGenerator,
    events::EventSender,
    services::{OrderLifecycleService, StageCatalogService},
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub event_sender: Arc<EventSender>,
    pub lifecycle: Arc<OrderLifecycleService>,
    pub catalog: Arc<StageCatalogService>,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        event_sender: Arc<EventSender>,
        documents: Arc<dyn DocumentGenerator>,
    ) -> Self {
        let lifecycle = Arc::new(OrderLifecycleService::new(
            db.clone(),
            documents,
            Some(event_sender.clone()),
            config.order_number_prefix.clone(),
        ));
        let catalog = Arc::new(StageCatalogService::new(
            db.clone(),
            Some(event_sender.clone()),
        ));

        Self {
            db,
            config,
            event_sender,
            lifecycle,
            catalog,
        }
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    let orders = Router::new()
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/orders/stats", get(handlers::orders::order_stats))
        .route(
            "/orders/in-progress",
            get(handlers::orders::list_in_progress_orders),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/progress", get(handlers::orders::order_progress))
        .route("/orders/:id/schedule", post(handlers::orders::schedule_order))
        .route("/orders/:id/complete", post(handlers::orders::complete_order))
        .route(
            "/orders/:id/delivery-challan",
            post(handlers::orders::regenerate_delivery_challan),
        );

    let stages = Router::new()
        .route("/stages/:id", patch(handlers::stages::update_stage))
        .route("/stages/:id/toggle", post(handlers::stages::toggle_stage));

    let catalog = Router::new()
        .route(
            "/stage-catalog",
            get(handlers::catalog::list_stages).post(handlers::catalog::create_stage),
        )
        .route("/stage-catalog/:id", patch(handlers::catalog::update_stage))
        .route(
            "/stage-catalog/:id/toggle",
            post(handlers::catalog::toggle_stage),
        )
        .route("/stage-catalog/:id/move", post(handlers::catalog::move_stage));

    orders.merge(stages).merge(catalog)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Full application router with tracing and CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics_handler))
        .route(
            "/api/webhook/woocommerce",
            post(handlers::webhooks::woocommerce_webhook),
        )
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
