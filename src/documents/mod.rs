//! Document generation for job cards, delivery challans and the other
//! printable forms of the shop.
//!
//! Callers build a flat [`DocumentRecord`] and hand it to a
//! [`DocumentGenerator`] together with the [`DocumentKind`]. The bundled
//! [`TextDocumentGenerator`] renders paginated plain text into a directory.

pub mod layout;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, instrument};

use crate::errors::ServiceError;
use layout::Layout;

/// Kind of document, printed as the document title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentKind {
    JobCard,
    DeliveryChallan,
    ProformaInvoice,
    PurchaseOrder,
    RequisitionSlip,
    QualityCheck,
    MaterialReceived,
    Custom(String),
}

impl DocumentKind {
    pub fn label(&self) -> &str {
        match self {
            DocumentKind::JobCard => "Job Card",
            DocumentKind::DeliveryChallan => "Delivery Challan",
            DocumentKind::ProformaInvoice => "Proforma Invoice",
            DocumentKind::PurchaseOrder => "Purchase Order",
            DocumentKind::RequisitionSlip => "Requisition Slip",
            DocumentKind::QualityCheck => "Quality Check",
            DocumentKind::MaterialReceived => "Material Received",
            DocumentKind::Custom(label) => label,
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            DocumentKind::JobCard => Layout::Checklist,
            DocumentKind::DeliveryChallan | DocumentKind::ProformaInvoice => {
                Layout::SignatureBlock
            }
            _ => Layout::Generic,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for DocumentKind {
    fn from(label: String) -> Self {
        let known = [
            DocumentKind::JobCard,
            DocumentKind::DeliveryChallan,
            DocumentKind::ProformaInvoice,
            DocumentKind::PurchaseOrder,
            DocumentKind::RequisitionSlip,
            DocumentKind::QualityCheck,
            DocumentKind::MaterialReceived,
        ];
        known
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(label.trim()))
            .unwrap_or(DocumentKind::Custom(label))
    }
}

impl From<DocumentKind> for String {
    fn from(kind: DocumentKind) -> Self {
        kind.label().to_string()
    }
}

/// Flat, ordered key/value record rendered into a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    id: Option<String>,
    fields: Vec<(String, String)>,
    checklist: Vec<String>,
}

impl DocumentRecord {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn optional_field<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    pub fn checklist(mut self, items: Vec<String>) -> Self {
        self.checklist = items;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn checklist_items(&self) -> &[String] {
        &self.checklist
    }

    /// Value of the first field with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Result of a successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub kind: DocumentKind,
    pub document_id: String,
    pub file_name: String,
    pub path: Option<PathBuf>,
    pub pages: usize,
    pub generated_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(
        &self,
        kind: &DocumentKind,
        record: &DocumentRecord,
    ) -> Result<GeneratedDocument, ServiceError>;
}

/// `{Kind}_{id}` reduced to ASCII alphanumerics, `-` and `_`.
pub fn file_stem(kind: &DocumentKind, document_id: &str) -> String {
    format!("{}_{}", kind.label(), document_id)
        .chars()
        .map(|ch| match ch {
            ' ' => '_',
            ch if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' => ch,
            _ => '-',
        })
        .collect()
}

/// Renders documents as paginated plain text files.
#[derive(Debug, Clone)]
pub struct TextDocumentGenerator {
    output_dir: PathBuf,
    company_name: String,
}

impl TextDocumentGenerator {
    pub fn new(output_dir: impl Into<PathBuf>, company_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            company_name: company_name.into(),
        }
    }

    /// Renders the pages without touching the filesystem.
    pub fn render(
        &self,
        kind: &DocumentKind,
        record: &DocumentRecord,
        generated_at: DateTime<Utc>,
    ) -> Vec<String> {
        let body = layout::body_lines(kind.layout(), record);
        layout::paginate(&self.company_name, kind.label(), &body, generated_at)
    }
}

#[async_trait]
impl DocumentGenerator for TextDocumentGenerator {
    #[instrument(skip(self, record), fields(kind = %kind))]
    async fn generate(
        &self,
        kind: &DocumentKind,
        record: &DocumentRecord,
    ) -> Result<GeneratedDocument, ServiceError> {
        let generated_at = Utc::now();
        let document_id = record
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| generated_at.timestamp_millis().to_string());

        let pages = self.render(kind, record, generated_at);
        let file_name = format!("{}.txt", file_stem(kind, &document_id));
        let path = self.output_dir.join(&file_name);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                error!(dir = %self.output_dir.display(), error = %e, "Failed to create documents directory");
                ServiceError::DocumentError(format!("Failed to create output directory: {}", e))
            })?;
        tokio::fs::write(&path, pages.join("\u{c}"))
            .await
            .map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to write document");
                ServiceError::DocumentError(format!("Failed to write {}: {}", file_name, e))
            })?;

        debug!(path = %path.display(), pages = pages.len(), "Document written");

        Ok(GeneratedDocument {
            kind: kind.clone(),
            document_id,
            file_name,
            path: Some(path),
            pages: pages.len(),
            generated_at,
        })
    }
}
