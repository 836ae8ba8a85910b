#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chhapai_orders::{
    auth::{USER_ID_HEADER, USER_ROLE_HEADER},
    config::AppConfig,
    db,
    documents::{DocumentGenerator, DocumentKind, DocumentRecord, GeneratedDocument},
    entities::order,
    errors::ServiceError,
    events::{self, EventSender},
    models::OrderPriority,
    services::order_lifecycle::CreateOrderRequest,
    AppState,
};
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Document generator that remembers every request instead of writing files.
#[derive(Default)]
pub struct RecordingDocumentGenerator {
    calls: Mutex<Vec<(DocumentKind, DocumentRecord)>>,
    fail: bool,
}

impl RecordingDocumentGenerator {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<(DocumentKind, DocumentRecord)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: &DocumentKind) -> Vec<DocumentRecord> {
        self.calls()
            .into_iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, record)| record)
            .collect()
    }
}

#[async_trait]
impl DocumentGenerator for RecordingDocumentGenerator {
    async fn generate(
        &self,
        kind: &DocumentKind,
        record: &DocumentRecord,
    ) -> Result<GeneratedDocument, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((kind.clone(), record.clone()));
        if self.fail {
            return Err(ServiceError::DocumentError("printer on fire".to_string()));
        }

        let document_id = record.id().unwrap_or("generated").to_string();
        Ok(GeneratedDocument {
            kind: kind.clone(),
            file_name: format!("{}.txt", document_id),
            document_id,
            path: None,
            pages: 1,
            generated_at: Utc::now(),
        })
    }
}

/// Application state over a fresh SQLite file with migrations applied.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub documents: Arc<RecordingDocumentGenerator>,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(customize, RecordingDocumentGenerator::default()).await
    }

    pub async fn with_failing_documents() -> Self {
        Self::build(|_| {}, RecordingDocumentGenerator::failing()).await
    }

    async fn build(
        customize: impl FnOnce(&mut AppConfig),
        documents: RecordingDocumentGenerator,
    ) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut cfg = AppConfig {
            database_url: format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("chhapai_test.db").display()
            ),
            db_max_connections: 1,
            db_min_connections: 1,
            documents_dir: dir.path().join("documents"),
            ..AppConfig::default()
        };
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let documents = Arc::new(documents);
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            Arc::new(event_sender),
            documents.clone(),
        );
        let router = chhapai_orders::build_router(state.clone());

        Self {
            router,
            state,
            documents,
            _dir: dir,
            _event_task: event_task,
        }
    }

    /// Sends a request as a user with `role`.
    pub async fn request_as(
        &self,
        role: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, "test-user")
            .header(USER_ROLE_HEADER, role);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Inserts a pending manual order.
    pub async fn seed_order(&self, order_no: &str) -> order::Model {
        self.state
            .lifecycle
            .create_order(order_request(order_no))
            .await
            .expect("seed order for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn order_request(order_no: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        order_no: Some(order_no.to_string()),
        customer_name: "Asha Traders".to_string(),
        customer_contact: Some("asha@example.com".to_string()),
        product_name: "Visiting Cards".to_string(),
        sku: Some("VC-300".to_string()),
        sub_type: None,
        quantity: 500,
        price_per_unit: Some(rust_decimal_macros::dec!(1.50)),
        shipping_address: Some("12 MG Road, Pune".to_string()),
        order_notes: None,
        priority: OrderPriority::Normal,
        created_by: None,
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
