//! Order lifecycle: intake, scheduling into production, stage tracking and
//! completion, with the job card and delivery challan generated on the way.
//!
//! ```text
//! pending --[schedule: requires delivery date]--> in_progress
//! in_progress --[all stages completed]--> completed
//! stage: pending <--> completed (toggle), in_progress via update_stage
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    documents::{DocumentGenerator, DocumentKind, DocumentRecord, GeneratedDocument},
    entities::{
        custom_stage,
        order::{self, ActiveModel as OrderActiveModel, Entity as Order},
        order_stage::{self, ActiveModel as StageActiveModel, Entity as OrderStage},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::{
        OrderPriority, OrderStatus, StageStatus, MAX_STAGE_HOURS, SOURCE_MANUAL,
        SOURCE_WOOCOMMERCE,
    },
};

/// Message returned when completion is attempted with open stages.
pub const STAGES_INCOMPLETE_MESSAGE: &str =
    "All stages must be completed before finishing the order";
/// Largest accepted unit price on a manual order.
pub const MAX_PRICE_PER_UNIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);
/// Message returned when scheduling without a delivery date.
pub const DELIVERY_DATE_REQUIRED_MESSAGE: &str =
    "Please set a delivery date before moving to In-Progress";

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Manual order intake.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Generated from the configured prefix when absent
    #[validate(length(min = 1, max = 50))]
    pub order_no: Option<String>,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    pub customer_contact: Option<String>,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub product_name: String,
    pub sku: Option<String>,
    pub sub_type: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub price_per_unit: Option<Decimal>,
    pub shipping_address: Option<String>,
    pub order_notes: Option<String>,
    pub priority: OrderPriority,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleOrderRequest {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub stage_names: Vec<String>,
}

/// Detailed stage update. Absent fields are left unchanged; blank strings clear
/// the text fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStageRequest {
    pub status: Option<StageStatus>,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
    pub quality_remarks: Option<String>,
    pub wastage_percentage: Option<Decimal>,
    pub time_taken_hours: Option<Decimal>,
    pub estimated_time_hours: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
}

/// Stage counts for one order. `percentage` is the display value,
/// `exact_percentage` the unrounded ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub percentage: u8,
    pub exact_percentage: f64,
}

impl StageProgress {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a StageStatus>) -> Self {
        let mut progress = StageProgress::default();
        for status in statuses {
            progress.total += 1;
            match status {
                StageStatus::Completed => progress.completed += 1,
                StageStatus::InProgress => progress.in_progress += 1,
                StageStatus::Pending => progress.pending += 1,
            }
        }
        progress.percentage = percentage(progress.completed, progress.total);
        progress.exact_percentage = exact_percentage(progress.completed, progress.total);
        progress
    }

    pub fn from_stages(stages: &[order_stage::Model]) -> Self {
        Self::from_statuses(stages.iter().map(|stage| &stage.status))
    }

    /// At least one stage and none left open.
    pub fn can_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }

    pub fn open(&self) -> usize {
        self.total - self.completed
    }
}

/// `completed / total * 100`, rounded half up; 0 for an empty set.
fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed * 200 + total) / (total * 2)) as u8
}

/// `completed / total * 100` without rounding; 0 for an empty set.
fn exact_percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}

/// Completion percentage of a stage set.
pub fn progress_percentage(statuses: &[StageStatus]) -> u8 {
    StageProgress::from_statuses(statuses).percentage
}

/// True when the stage set is non-empty and every stage is completed.
pub fn can_complete(statuses: &[StageStatus]) -> bool {
    StageProgress::from_statuses(statuses).can_complete()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWithStages {
    #[serde(flatten)]
    pub order: order::Model,
    pub stages: Vec<order_stage::Model>,
    pub progress: StageProgress,
}

impl OrderWithStages {
    fn new(order: order::Model, stages: Vec<order_stage::Model>) -> Self {
        let progress = StageProgress::from_stages(&stages);
        Self {
            order,
            stages,
            progress,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub order: OrderWithStages,
    /// `None` when the transition succeeded but the job card could not be produced
    pub job_card: Option<GeneratedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub order: order::Model,
    /// `None` when the transition succeeded but the challan could not be produced
    pub delivery_challan: Option<GeneratedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedCompletion {
    pub order_id: Uuid,
    pub open_stages: usize,
    pub remaining_hours: Decimal,
    pub estimated_completion: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WooCommerceBilling {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WooCommerceShipping {
    #[serde(default)]
    pub address_1: String,
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WooCommerceLineItem {
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub price: Option<Decimal>,
}

/// The subset of a WooCommerce `order.created` payload that is ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WooCommerceOrder {
    pub id: i64,
    #[serde(default)]
    pub billing: WooCommerceBilling,
    pub shipping: Option<WooCommerceShipping>,
    #[serde(default)]
    pub line_items: Vec<WooCommerceLineItem>,
    pub total: Option<Decimal>,
    pub customer_note: Option<String>,
}

impl WooCommerceOrder {
    pub fn order_no(&self) -> String {
        format!("WC-{}", self.id)
    }
}

/// Case-insensitive substring match on order number or customer name.
pub fn matches_search(order: &order::Model, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    term.is_empty()
        || order.order_no.to_lowercase().contains(&term)
        || order.customer_name.to_lowercase().contains(&term)
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn generate_order_no(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}{:06}", prefix, now.timestamp_millis().rem_euclid(1_000_000))
}

fn job_card_record(order: &order::Model, stages: &[order_stage::Model]) -> DocumentRecord {
    DocumentRecord::new(Some(format!("JC-{}", order.order_no)))
        .field("orderNo", &order.order_no)
        .field("customerName", &order.customer_name)
        .field("productName", &order.product_name)
        .field("quantity", order.quantity)
        .optional_field("deliveryDate", order.delivery_date)
        .field("priority", order.priority)
        .optional_field("orderTotal", order.order_total)
        .checklist(stages.iter().map(|s| s.stage_name.clone()).collect())
}

fn delivery_challan_record(order: &order::Model, today: NaiveDate) -> DocumentRecord {
    DocumentRecord::new(Some(format!("CH/DC/{}", order.order_no)))
        .field("customerName", &order.customer_name)
        .field("orderNo", &order.order_no)
        .field("productName", &order.product_name)
        .field("quantity", order.quantity)
        .optional_field("totalAmount", order.order_total)
        .optional_field("shippingAddress", order.shipping_address.clone())
        .field("deliveryDate", today)
}

enum CompletionCheck {
    Completed(order::Model),
    Blocked { open_stages: usize },
}

/// Service driving orders through the production lifecycle.
#[derive(Clone)]
pub struct OrderLifecycleService {
    db_pool: Arc<DbPool>,
    documents: Arc<dyn DocumentGenerator>,
    event_sender: Option<Arc<EventSender>>,
    order_number_prefix: String,
}

impl OrderLifecycleService {
    pub fn new(
        db_pool: Arc<DbPool>,
        documents: Arc<dyn DocumentGenerator>,
        event_sender: Option<Arc<EventSender>>,
        order_number_prefix: impl Into<String>,
    ) -> Self {
        Self {
            db_pool,
            documents,
            event_sender,
            order_number_prefix: order_number_prefix.into(),
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    async fn find_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch order {}: {}", order_id, e);
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn find_stage(&self, stage_id: Uuid) -> Result<order_stage::Model, ServiceError> {
        OrderStage::find_by_id(stage_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch stage {}: {}", stage_id, e);
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Stage {} not found", stage_id)))
    }

    /// Stages of an order in the order they were chosen.
    pub async fn stages_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_stage::Model>, ServiceError> {
        OrderStage::find()
            .filter(order_stage::Column::OrderId.eq(order_id))
            .order_by_asc(order_stage::Column::Position)
            .order_by_asc(order_stage::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch stages for order {}: {}", order_id, e);
                ServiceError::DatabaseError(e)
            })
    }

    async fn orders_with_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Order::find()
            .filter(order::Column::Status.eq(status))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch {} orders: {}", status, e);
                ServiceError::DatabaseError(e)
            })
    }

    /// Generates a document, logging instead of failing when generation breaks.
    async fn generate_document(
        &self,
        kind: DocumentKind,
        record: DocumentRecord,
    ) -> Option<GeneratedDocument> {
        match self.documents.generate(&kind, &record).await {
            Ok(document) => {
                metrics::record_document_generated(&kind);
                self.emit(Event::DocumentGenerated {
                    kind,
                    document_id: document.document_id.clone(),
                })
                .await;
                Some(document)
            }
            Err(e) => {
                metrics::record_document_failure(&kind);
                error!(kind = %kind, error = %e, "Document generation failed");
                None
            }
        }
    }

    /// Creates a manual order in `pending`.
    #[instrument(skip(self, request), fields(customer = %request.customer_name))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<order::Model, ServiceError> {
        request.validate()?;
        if request.customer_name.trim().is_empty() || request.product_name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer name and product name are required".to_string(),
            ));
        }
        if let Some(price) = request.price_per_unit {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Price per unit must not be negative".to_string(),
                ));
            }
            if price > MAX_PRICE_PER_UNIT {
                return Err(ServiceError::ValidationError(format!(
                    "Price per unit must not exceed {}",
                    MAX_PRICE_PER_UNIT
                )));
            }
        }

        let now = Utc::now();
        let order_no = blank_to_none(request.order_no)
            .unwrap_or_else(|| generate_order_no(&self.order_number_prefix, now));
        let order_total = request
            .price_per_unit
            .map(|price| {
                price
                    .checked_mul(Decimal::from(request.quantity))
                    .ok_or_else(|| {
                        ServiceError::ValidationError("Order total is too large".to_string())
                    })
            })
            .transpose()?;

        let model = OrderActiveModel {
            id: Set(Uuid::new_v4()),
            order_no: Set(order_no.clone()),
            customer_name: Set(request.customer_name.trim().to_string()),
            customer_contact: Set(blank_to_none(request.customer_contact)),
            product_name: Set(request.product_name.trim().to_string()),
            sku: Set(blank_to_none(request.sku)),
            sub_type: Set(blank_to_none(request.sub_type)),
            quantity: Set(request.quantity),
            price_per_unit: Set(request.price_per_unit),
            order_total: Set(order_total),
            shipping_address: Set(blank_to_none(request.shipping_address)),
            order_notes: Set(blank_to_none(request.order_notes)),
            priority: Set(request.priority),
            source: Set(SOURCE_MANUAL.to_string()),
            status: Set(OrderStatus::Pending),
            delivery_date: Set(None),
            created_by: Set(blank_to_none(request.created_by)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        self.insert_order(&order_no, model).await
    }

    /// Inserts the row; the unique index on `order_no` decides duplicates.
    async fn insert_order(
        &self,
        order_no: &str,
        model: OrderActiveModel,
    ) -> Result<order::Model, ServiceError> {
        let order = model.insert(&*self.db_pool).await.map_err(|e| {
            if is_unique_violation(&e) {
                info!(order_no, "Order number already taken");
                return ServiceError::Conflict(format!("Order number {} already exists", order_no));
            }
            error!("Failed to create order {}: {}", order_no, e);
            metrics::record_failure("create_order", "database_error");
            ServiceError::DatabaseError(e)
        })?;

        metrics::record_order_created(&order.source);
        info!(order_id = %order.id, order_no = %order.order_no, "Order created");
        self.emit(Event::OrderCreated {
            order_id: order.id,
            order_no: order.order_no.clone(),
            source: order.source.clone(),
        })
        .await;

        Ok(order)
    }

    /// Maps a WooCommerce order onto a pending order. Re-deliveries return the
    /// existing row; the boolean is true when a new order was created.
    #[instrument(skip(self, payload), fields(woocommerce_id = payload.id))]
    pub async fn ingest_woocommerce_order(
        &self,
        payload: WooCommerceOrder,
    ) -> Result<(order::Model, bool), ServiceError> {
        let order_no = payload.order_no();

        if let Some(order) = self.find_by_order_no(&order_no).await? {
            debug!(order_id = %order.id, "WooCommerce order already ingested");
            return Ok((order, false));
        }

        let item = payload.line_items.first().ok_or_else(|| {
            ServiceError::ValidationError(format!("WooCommerce order {} has no line items", payload.id))
        })?;
        let customer_name = format!(
            "{} {}",
            payload.billing.first_name.trim(),
            payload.billing.last_name.trim()
        )
        .trim()
        .to_string();
        if customer_name.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "WooCommerce order {} has no billing name",
                payload.id
            )));
        }

        let shipping_address = payload.shipping.as_ref().and_then(|shipping| {
            let parts: Vec<&str> = [shipping.address_1.trim(), shipping.city.trim()]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        });

        let now = Utc::now();
        let model = OrderActiveModel {
            id: Set(Uuid::new_v4()),
            order_no: Set(order_no.clone()),
            customer_name: Set(customer_name),
            customer_contact: Set(blank_to_none(payload.billing.email.clone())),
            product_name: Set(item.name.trim().to_string()),
            sku: Set(blank_to_none(item.sku.clone())),
            sub_type: Set(None),
            quantity: Set(item.quantity.max(1)),
            price_per_unit: Set(item.price),
            order_total: Set(payload.total),
            shipping_address: Set(shipping_address),
            order_notes: Set(blank_to_none(payload.customer_note.clone())),
            priority: Set(OrderPriority::Normal),
            source: Set(SOURCE_WOOCOMMERCE.to_string()),
            status: Set(OrderStatus::Pending),
            delivery_date: Set(None),
            created_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match self.insert_order(&order_no, model).await {
            Ok(order) => Ok((order, true)),
            // a concurrent delivery inserted it first
            Err(ServiceError::Conflict(_)) => {
                let order = self.find_by_order_no(&order_no).await?.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "{} conflicted on insert but cannot be read back",
                        order_no
                    ))
                })?;
                debug!(order_id = %order.id, "WooCommerce order ingested concurrently");
                Ok((order, false))
            }
            Err(e) => Err(e),
        }
    }

    async fn find_by_order_no(&self, order_no: &str) -> Result<Option<order::Model>, ServiceError> {
        Order::find()
            .filter(order::Column::OrderNo.eq(order_no))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to look up {}: {}", order_no, e);
                ServiceError::DatabaseError(e)
            })
    }

    /// Orders waiting to be scheduled, newest first.
    #[instrument(skip(self))]
    pub async fn list_pending_orders(&self) -> Result<Vec<order::Model>, ServiceError> {
        self.orders_with_status(OrderStatus::Pending).await
    }

    /// Orders in production with their stages and progress, newest first.
    #[instrument(skip(self))]
    pub async fn list_in_progress_orders(&self) -> Result<Vec<OrderWithStages>, ServiceError> {
        let orders = self.orders_with_status(OrderStatus::InProgress).await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();
        let stages = OrderStage::find()
            .filter(order_stage::Column::OrderId.is_in(ids))
            .order_by_asc(order_stage::Column::Position)
            .order_by_asc(order_stage::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch stages for in-progress orders: {}", e);
                ServiceError::DatabaseError(e)
            })?;

        let mut by_order: HashMap<Uuid, Vec<order_stage::Model>> = HashMap::new();
        for stage in stages {
            by_order.entry(stage.order_id).or_default().push(stage);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let stages = by_order.remove(&order.id).unwrap_or_default();
                OrderWithStages::new(order, stages)
            })
            .collect())
    }

    /// Completed orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_completed_orders(&self) -> Result<Vec<order::Model>, ServiceError> {
        self.orders_with_status(OrderStatus::Completed).await
    }

    /// Orders filtered by status and search term, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<order::Model>, ServiceError> {
        let mut query = Order::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to list orders: {}", e);
                ServiceError::DatabaseError(e)
            })?;

        Ok(match filter.search.as_deref() {
            Some(term) => orders
                .into_iter()
                .filter(|order| matches_search(order, term))
                .collect(),
            None => orders,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithStages, ServiceError> {
        let order = self.find_order(order_id).await?;
        let stages = self.stages_for_order(order_id).await?;
        Ok(OrderWithStages::new(order, stages))
    }

    /// Moves a pending order into production: sets the delivery date, creates
    /// one pending stage per name and produces the job card.
    ///
    /// The status change and the stage rows are written in one transaction.
    #[instrument(skip(self, request), fields(order_id = %order_id, stages = request.stage_names.len()))]
    pub async fn schedule_order(
        &self,
        order_id: Uuid,
        request: ScheduleOrderRequest,
    ) -> Result<ScheduleOutcome, ServiceError> {
        let delivery_date = request.delivery_date.ok_or_else(|| {
            ServiceError::ValidationError(DELIVERY_DATE_REQUIRED_MESSAGE.to_string())
        })?;
        let stage_names: Vec<String> = request
            .stage_names
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        if stage_names.iter().any(String::is_empty) {
            return Err(ServiceError::ValidationError(
                "Stage names must not be blank".to_string(),
            ));
        }
        if stage_names.is_empty() {
            warn!("Scheduling order without stages; it cannot be completed later");
        }

        let (order, stages) = self
            .db_pool
            .transaction::<_, (order::Model, Vec<order_stage::Model>), ServiceError>(|txn| {
                Box::pin(async move {
                    let order = Order::find_by_id(order_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Order {} not found", order_id))
                        })?;
                    if order.status != OrderStatus::Pending {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Order {} is {} and cannot be scheduled",
                            order.order_no, order.status
                        )));
                    }

                    let mut active: OrderActiveModel = order.into();
                    active.status = Set(OrderStatus::InProgress);
                    active.delivery_date = Set(Some(delivery_date));
                    let order = active.update(txn).await?;

                    if !stage_names.is_empty() {
                        let catalog: HashMap<String, Decimal> = custom_stage::Entity::find()
                            .filter(custom_stage::Column::StageName.is_in(stage_names.clone()))
                            .all(txn)
                            .await?
                            .into_iter()
                            .map(|entry| (entry.stage_name, entry.estimated_hours))
                            .collect();

                        let now = Utc::now();
                        let rows = stage_names.iter().enumerate().map(|(index, name)| {
                            StageActiveModel {
                                id: Set(Uuid::new_v4()),
                                order_id: Set(order_id),
                                stage_name: Set(name.clone()),
                                position: Set(index as i32 + 1),
                                status: Set(StageStatus::Pending),
                                assigned_to: Set(None),
                                start_time: Set(None),
                                end_time: Set(None),
                                estimated_time_hours: Set(catalog.get(name).copied()),
                                time_taken_hours: Set(None),
                                wastage_percentage: Set(None),
                                quality_remarks: Set(None),
                                notes: Set(None),
                                created_at: Set(now),
                                updated_at: Set(now),
                            }
                        });
                        OrderStage::insert_many(rows)
                            .exec_without_returning(txn)
                            .await?;
                    }

                    let stages = OrderStage::find()
                        .filter(order_stage::Column::OrderId.eq(order_id))
                        .order_by_asc(order_stage::Column::Position)
                        .all(txn)
                        .await?;

                    Ok((order, stages))
                })
            })
            .await
            .map_err(|e| {
                let e = ServiceError::from(e);
                if !e.is_user_facing() {
                    error!("Failed to schedule order {}: {}", order_id, e);
                    metrics::record_failure("schedule_order", "database_error");
                }
                e
            })?;

        metrics::record_order_scheduled();
        info!(order_no = %order.order_no, %delivery_date, stages = stages.len(), "Order moved to production");
        self.emit(Event::OrderScheduled {
            order_id,
            order_no: order.order_no.clone(),
            stage_count: stages.len(),
        })
        .await;

        let job_card = self
            .generate_document(DocumentKind::JobCard, job_card_record(&order, &stages))
            .await;

        Ok(ScheduleOutcome {
            order: OrderWithStages::new(order, stages),
            job_card,
        })
    }

    /// Checklist toggle: completed stages reopen, anything else completes.
    ///
    /// Completing stamps `end_time`; reopening clears both timestamps. The
    /// parent order's status is not consulted.
    #[instrument(skip(self), fields(stage_id = %stage_id, current = %current_status))]
    pub async fn toggle_stage(
        &self,
        stage_id: Uuid,
        current_status: StageStatus,
    ) -> Result<order_stage::Model, ServiceError> {
        let new_status = current_status.toggled();
        let stage = self.find_stage(stage_id).await?;
        if stage.status != current_status {
            debug!(stored = %stage.status, "Toggling from a stale stage status");
        }

        let order_id = stage.order_id;
        let old_status = stage.status;
        let mut active: StageActiveModel = stage.into();
        active.status = Set(new_status);
        match new_status {
            StageStatus::Completed => {
                active.end_time = Set(Some(Utc::now()));
            }
            _ => {
                active.start_time = Set(None);
                active.end_time = Set(None);
            }
        }

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!("Failed to toggle stage {}: {}", stage_id, e);
            metrics::record_failure("toggle_stage", "database_error");
            ServiceError::DatabaseError(e)
        })?;

        metrics::record_stage_transition(new_status);
        self.emit(Event::StageStatusChanged {
            stage_id,
            order_id,
            old_status,
            new_status,
        })
        .await;

        Ok(updated)
    }

    /// Detailed stage update used by the production floor.
    #[instrument(skip(self, request), fields(stage_id = %stage_id))]
    pub async fn update_stage(
        &self,
        stage_id: Uuid,
        request: UpdateStageRequest,
    ) -> Result<order_stage::Model, ServiceError> {
        if let Some(wastage) = request.wastage_percentage {
            if wastage < Decimal::ZERO || wastage > Decimal::ONE_HUNDRED {
                return Err(ServiceError::ValidationError(
                    "Wastage percentage must be between 0 and 100".to_string(),
                ));
            }
        }
        for hours in [request.time_taken_hours, request.estimated_time_hours]
            .into_iter()
            .flatten()
        {
            if hours < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Hours must not be negative".to_string(),
                ));
            }
            if hours > MAX_STAGE_HOURS {
                return Err(ServiceError::ValidationError(format!(
                    "Hours must not exceed {}",
                    MAX_STAGE_HOURS
                )));
            }
        }

        let stage = self.find_stage(stage_id).await?;
        let order_id = stage.order_id;
        let old_status = stage.status;
        let had_start = stage.start_time.is_some();

        let mut active: StageActiveModel = stage.into();
        let now = Utc::now();
        if let Some(status) = request.status {
            active.status = Set(status);
            match status {
                StageStatus::Pending => {
                    active.start_time = Set(None);
                    active.end_time = Set(None);
                }
                StageStatus::InProgress => {
                    if !had_start {
                        active.start_time = Set(Some(now));
                    }
                    active.end_time = Set(None);
                }
                StageStatus::Completed => {
                    if old_status != StageStatus::Completed {
                        active.end_time = Set(Some(now));
                    }
                }
            }
        }
        if request.assigned_to.is_some() {
            active.assigned_to = Set(blank_to_none(request.assigned_to));
        }
        if request.notes.is_some() {
            active.notes = Set(blank_to_none(request.notes));
        }
        if request.quality_remarks.is_some() {
            active.quality_remarks = Set(blank_to_none(request.quality_remarks));
        }
        if let Some(wastage) = request.wastage_percentage {
            active.wastage_percentage = Set(Some(wastage));
        }
        if let Some(hours) = request.time_taken_hours {
            active.time_taken_hours = Set(Some(hours));
        }
        if let Some(hours) = request.estimated_time_hours {
            active.estimated_time_hours = Set(Some(hours));
        }

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!("Failed to update stage {}: {}", stage_id, e);
            metrics::record_failure("update_stage", "database_error");
            ServiceError::DatabaseError(e)
        })?;

        if updated.status != old_status {
            metrics::record_stage_transition(updated.status);
            self.emit(Event::StageStatusChanged {
                stage_id,
                order_id,
                old_status,
                new_status: updated.status,
            })
            .await;
        }
        self.emit(Event::StageUpdated { stage_id, order_id }).await;

        Ok(updated)
    }

    async fn block_completion(&self, order_id: Uuid, open_stages: usize) -> ServiceError {
        metrics::record_completion_blocked();
        info!(%order_id, open_stages, "Order completion blocked");
        self.emit(Event::OrderCompletionBlocked {
            order_id,
            open_stages,
        })
        .await;
        ServiceError::InvalidOperation(STAGES_INCOMPLETE_MESSAGE.to_string())
    }

    /// Completes an in-progress order whose stages are all done and produces
    /// the delivery challan.
    ///
    /// `stages` is the caller's view and is checked first; the store is then
    /// re-checked in the same transaction as a conditional status update.
    #[instrument(skip(self, stages), fields(order_id = %order_id, stages = stages.len()))]
    pub async fn complete_order(
        &self,
        order_id: Uuid,
        stages: &[order_stage::Model],
    ) -> Result<CompletionOutcome, ServiceError> {
        let progress = StageProgress::from_stages(stages);
        if !progress.can_complete() {
            return Err(self.block_completion(order_id, progress.open()).await);
        }

        let check = self
            .db_pool
            .transaction::<_, CompletionCheck, ServiceError>(|txn| {
                Box::pin(async move {
                    let order = Order::find_by_id(order_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Order {} not found", order_id))
                        })?;
                    if order.status != OrderStatus::InProgress {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Order {} is {} and cannot be completed",
                            order.order_no, order.status
                        )));
                    }

                    let total = OrderStage::find()
                        .filter(order_stage::Column::OrderId.eq(order_id))
                        .count(txn)
                        .await?;
                    let open = OrderStage::find()
                        .filter(order_stage::Column::OrderId.eq(order_id))
                        .filter(order_stage::Column::Status.ne(StageStatus::Completed))
                        .count(txn)
                        .await?;
                    if total == 0 || open > 0 {
                        return Ok(CompletionCheck::Blocked {
                            open_stages: open as usize,
                        });
                    }

                    let result = Order::update_many()
                        .set(OrderActiveModel {
                            status: Set(OrderStatus::Completed),
                            updated_at: Set(Utc::now()),
                            ..Default::default()
                        })
                        .filter(order::Column::Id.eq(order_id))
                        .filter(order::Column::Status.eq(OrderStatus::InProgress))
                        .exec(txn)
                        .await?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::Conflict(format!(
                            "Order {} changed while completing",
                            order_id
                        )));
                    }

                    let order = Order::find_by_id(order_id).one(txn).await?.ok_or_else(|| {
                        ServiceError::NotFound(format!("Order {} not found", order_id))
                    })?;
                    Ok(CompletionCheck::Completed(order))
                })
            })
            .await
            .map_err(|e| {
                let e = ServiceError::from(e);
                if !e.is_user_facing() {
                    error!("Failed to complete order {}: {}", order_id, e);
                    metrics::record_failure("complete_order", "database_error");
                }
                e
            })?;

        let order = match check {
            CompletionCheck::Completed(order) => order,
            CompletionCheck::Blocked { open_stages } => {
                return Err(self.block_completion(order_id, open_stages).await);
            }
        };

        metrics::record_order_completed();
        info!(order_no = %order.order_no, "Order completed");
        self.emit(Event::OrderCompleted {
            order_id,
            order_no: order.order_no.clone(),
        })
        .await;

        let delivery_challan = self
            .generate_document(
                DocumentKind::DeliveryChallan,
                delivery_challan_record(&order, Utc::now().date_naive()),
            )
            .await;

        Ok(CompletionOutcome {
            order,
            delivery_challan,
        })
    }

    /// Reads the stored stages and completes the order with them.
    pub async fn complete_order_by_id(
        &self,
        order_id: Uuid,
    ) -> Result<CompletionOutcome, ServiceError> {
        let stages = self.stages_for_order(order_id).await?;
        self.complete_order(order_id, &stages).await
    }

    /// Re-issues the delivery challan of a completed order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn regenerate_delivery_challan(
        &self,
        order_id: Uuid,
    ) -> Result<GeneratedDocument, ServiceError> {
        let order = self.find_order(order_id).await?;
        if order.status != OrderStatus::Completed {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is {}; challans are issued for completed orders only",
                order.order_no, order.status
            )));
        }

        let kind = DocumentKind::DeliveryChallan;
        let record = delivery_challan_record(&order, order.updated_at.date_naive());
        let document = self.documents.generate(&kind, &record).await.map_err(|e| {
            metrics::record_document_failure(&kind);
            error!("Failed to regenerate challan for {}: {}", order.order_no, e);
            e
        })?;

        metrics::record_document_generated(&kind);
        self.emit(Event::DocumentGenerated {
            kind,
            document_id: document.document_id.clone(),
        })
        .await;
        Ok(document)
    }

    /// Now plus the estimated hours of every stage not yet completed.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn estimated_completion(
        &self,
        order_id: Uuid,
    ) -> Result<EstimatedCompletion, ServiceError> {
        self.find_order(order_id).await?;
        let stages = self.stages_for_order(order_id).await?;
        estimate(order_id, &stages, Utc::now())
    }

    /// Order counts per status and per priority.
    #[instrument(skip(self))]
    pub async fn order_stats(&self) -> Result<OrderStats, ServiceError> {
        let orders = Order::find().all(&*self.db_pool).await.map_err(|e| {
            error!("Failed to compute order stats: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let mut stats = OrderStats::default();
        for order in &orders {
            stats.total += 1;
            *stats.by_status.entry(order.status.to_string()).or_default() += 1;
            *stats
                .by_priority
                .entry(order.priority.to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn estimate(
    order_id: Uuid,
    stages: &[order_stage::Model],
    now: DateTime<Utc>,
) -> Result<EstimatedCompletion, ServiceError> {
    let out_of_range = || {
        warn!(%order_id, "Remaining stage hours exceed the representable date range");
        ServiceError::InvalidOperation(
            "Estimated stage hours are too large to project a completion date".to_string(),
        )
    };

    let open: Vec<&order_stage::Model> = stages
        .iter()
        .filter(|stage| !stage.status.is_completed())
        .collect();
    let remaining_hours = open
        .iter()
        .filter_map(|stage| stage.estimated_time_hours)
        .try_fold(Decimal::ZERO, |total, hours| total.checked_add(hours))
        .ok_or_else(out_of_range)?;
    let minutes = remaining_hours
        .checked_mul(Decimal::from(60))
        .and_then(|minutes| minutes.round().to_i64())
        .ok_or_else(out_of_range)?;
    let estimated_completion = Duration::try_minutes(minutes)
        .and_then(|remaining| now.checked_add_signed(remaining))
        .ok_or_else(out_of_range)?;

    Ok(EstimatedCompletion {
        order_id,
        open_stages: open.len(),
        remaining_hours,
        estimated_completion,
    })
}
