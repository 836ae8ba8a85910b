/*!
 * # Metrics Module
 *
 * Prometheus counters for the order lifecycle, exposed in the text
 * exposition format at `/metrics`.
 */

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::documents::DocumentKind;
use crate::models::StageStatus;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    static ref ORDERS_CREATED: IntCounterVec = IntCounterVec::new(
        Opts::new("orders_created_total", "Total number of orders created"),
        &["source"]
    )
    .expect("metric can be created");
    static ref ORDERS_SCHEDULED: IntCounter = IntCounter::new(
        "orders_scheduled_total",
        "Total number of orders moved into production"
    )
    .expect("metric can be created");
    static ref ORDERS_COMPLETED: IntCounter = IntCounter::new(
        "orders_completed_total",
        "Total number of orders completed"
    )
    .expect("metric can be created");
    static ref ORDER_COMPLETION_BLOCKED: IntCounter = IntCounter::new(
        "order_completion_blocked_total",
        "Completion attempts rejected because stages were still open"
    )
    .expect("metric can be created");
    static ref STAGE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("stage_transitions_total", "Stage status changes by target status"),
        &["status"]
    )
    .expect("metric can be created");
    static ref DOCUMENTS_GENERATED: IntCounterVec = IntCounterVec::new(
        Opts::new("documents_generated_total", "Documents generated by kind"),
        &["kind"]
    )
    .expect("metric can be created");
    static ref DOCUMENT_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("document_failures_total", "Document generation failures by kind"),
        &["kind"]
    )
    .expect("metric can be created");
    static ref LIFECYCLE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "order_lifecycle_failures_total",
            "Failed lifecycle operations by operation and error type"
        ),
        &["operation", "error_type"]
    )
    .expect("metric can be created");
}

/// Registers every collector with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ORDERS_CREATED.clone()),
        Box::new(ORDERS_SCHEDULED.clone()),
        Box::new(ORDERS_COMPLETED.clone()),
        Box::new(ORDER_COMPLETION_BLOCKED.clone()),
        Box::new(STAGE_TRANSITIONS.clone()),
        Box::new(DOCUMENTS_GENERATED.clone()),
        Box::new(DOCUMENT_FAILURES.clone()),
        Box::new(LIFECYCLE_FAILURES.clone()),
    ];
    for collector in collectors {
        // AlreadyReg on repeated calls
        let _ = REGISTRY.register(collector);
    }
}

pub fn record_order_created(source: &str) {
    ORDERS_CREATED.with_label_values(&[source]).inc();
}

pub fn record_order_scheduled() {
    ORDERS_SCHEDULED.inc();
}

pub fn record_order_completed() {
    ORDERS_COMPLETED.inc();
}

pub fn record_completion_blocked() {
    ORDER_COMPLETION_BLOCKED.inc();
}

pub fn record_stage_transition(status: StageStatus) {
    STAGE_TRANSITIONS
        .with_label_values(&[&status.to_string()])
        .inc();
}

pub fn record_document_generated(kind: &DocumentKind) {
    DOCUMENTS_GENERATED
        .with_label_values(&[&kind.to_string()])
        .inc();
}

pub fn record_document_failure(kind: &DocumentKind) {
    DOCUMENT_FAILURES.with_label_values(&[&kind.to_string()]).inc();
}

pub fn record_failure(operation: &str, error_type: &str) {
    LIFECYCLE_FAILURES
        .with_label_values(&[operation, error_type])
        .inc();
}

/// Renders all registered metrics in the Prometheus text format.
pub fn export_metrics() -> Result<String, MetricsError> {
    register_metrics();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| MetricsError::ExportError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MetricsError::ExportError(e.to_string()))
}
