use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::documents::DocumentKind;
use crate::models::StageStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end for [`process_events`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping lifecycle event");
        }
    }
}

/// Lifecycle events emitted by the order and stage services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_no: String,
        source: String,
    },
    OrderScheduled {
        order_id: Uuid,
        order_no: String,
        stage_count: usize,
    },
    StageStatusChanged {
        stage_id: Uuid,
        order_id: Uuid,
        old_status: StageStatus,
        new_status: StageStatus,
    },
    StageUpdated {
        stage_id: Uuid,
        order_id: Uuid,
    },
    OrderCompleted {
        order_id: Uuid,
        order_no: String,
    },
    OrderCompletionBlocked {
        order_id: Uuid,
        open_stages: usize,
    },
    DocumentGenerated {
        kind: DocumentKind,
        document_id: String,
    },
    StageCatalogChanged {
        stage_id: Uuid,
    },
}

/// Drains the event channel, logging each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_no,
                source,
            } => info!(%order_id, %order_no, %source, "order created"),
            Event::OrderScheduled {
                order_id,
                order_no,
                stage_count,
            } => info!(%order_id, %order_no, stage_count, "order moved to production"),
            Event::StageStatusChanged {
                stage_id,
                order_id,
                old_status,
                new_status,
            } => info!(%stage_id, %order_id, %old_status, %new_status, "stage status changed"),
            Event::StageUpdated { stage_id, order_id } => {
                info!(%stage_id, %order_id, "stage details updated")
            }
            Event::OrderCompleted { order_id, order_no } => {
                info!(%order_id, %order_no, "order completed")
            }
            Event::OrderCompletionBlocked {
                order_id,
                open_stages,
            } => warn!(%order_id, open_stages, "order completion blocked by open stages"),
            Event::DocumentGenerated { kind, document_id } => {
                info!(%kind, %document_id, "document generated")
            }
            Event::StageCatalogChanged { stage_id } => {
                info!(%stage_id, "stage catalog changed")
            }
        }
    }

    info!("Event processing loop stopped");
}
