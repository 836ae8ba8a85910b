//! HTTP handlers. Every handler extracts the [`ActingUser`](crate::auth::ActingUser),
//! checks the action it performs and delegates to the services on [`AppState`].

pub mod catalog;
pub mod health;
pub mod orders;
pub mod stages;
pub mod webhooks;

use serde::{Deserialize, Serialize};

pub use crate::AppState;

/// JSON envelope of every successful response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}
