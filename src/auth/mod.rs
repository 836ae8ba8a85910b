/*!
 * # Role Gating
 *
 * Authentication happens upstream; the proxy in front of this service forwards
 * the signed-in user as `x-user-id` and `x-user-role` headers. Handlers
 * extract an [`ActingUser`] and check the [`Action`] they perform against the
 * role before calling into the services.
 */

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Staff roles of the print shop.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UserRole {
    Admin,
    Designer,
    Production,
    Qc,
    Purchase,
    Accounts,
    Sales,
    Dispatch,
    Viewer,
}

/// Operations gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    ViewOrders,
    CreateOrder,
    ScheduleOrder,
    UpdateStage,
    CompleteOrder,
    ManageStages,
    GenerateDocuments,
}

impl UserRole {
    pub fn can(&self, action: Action) -> bool {
        use UserRole::*;

        match action {
            Action::ViewOrders => true,
            Action::CreateOrder => matches!(self, Admin | Sales),
            Action::ScheduleOrder => matches!(self, Admin | Sales | Production),
            Action::UpdateStage => matches!(self, Admin | Production | Designer | Qc),
            Action::CompleteOrder => matches!(self, Admin | Production | Dispatch),
            Action::ManageStages => matches!(self, Admin),
            Action::GenerateDocuments => matches!(self, Admin | Dispatch | Accounts | Sales),
        }
    }
}

/// The user on whose behalf a request is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub user_id: Option<String>,
    pub role: UserRole,
}

impl ActingUser {
    pub fn new(user_id: Option<String>, role: UserRole) -> Self {
        Self { user_id, role }
    }

    /// Fails with `Forbidden` when the role may not perform `action`.
    pub fn require(&self, action: Action) -> Result<(), ServiceError> {
        if self.role.can(action) {
            Ok(())
        } else {
            warn!(user_id = ?self.user_id, role = %self.role, %action, "Permission denied");
            Err(ServiceError::Forbidden(format!(
                "Role '{}' may not {}",
                self.role,
                action.to_string().replace('_', " ")
            )))
        }
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_role = header_value(parts, USER_ROLE_HEADER).ok_or_else(|| {
            ServiceError::Unauthorized(format!("Missing {} header", USER_ROLE_HEADER))
        })?;
        let role = UserRole::from_str(raw_role)
            .map_err(|_| ServiceError::Unauthorized(format!("Unknown role '{}'", raw_role)))?;
        let user_id = header_value(parts, USER_ID_HEADER).map(str::to_string);

        Ok(ActingUser { user_id, role })
    }
}
