//! Error taxonomy for the chat core.
//!
//! Every inbound event resolves to `Result<(), ChatError>`; the coordinator
//! turns an `Err` into a scoped `error` event for the originating connection
//! only. HTTP handlers map the same enum onto status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type ChatResult<T> = Result<T, ChatError>;

/// Why a permission check refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDenied {
    #[error("You are not a participant in this room")]
    NotParticipant,
    #[error("Owner has not accepted this enquiry yet")]
    OwnerNotAccepted,
    #[error("Tenant is not assigned to this property yet")]
    TenantNotAssigned,
    #[error("Your role is not allowed to perform this action")]
    RoleNotAllowed,
    #[error("User not joined to any room")]
    NotJoined,
}

impl PermissionDenied {
    pub fn code(&self) -> &'static str {
        match self {
            PermissionDenied::NotParticipant => "not_participant",
            PermissionDenied::OwnerNotAccepted => "owner_not_accepted",
            PermissionDenied::TenantNotAssigned => "tenant_not_assigned",
            PermissionDenied::RoleNotAllowed => "role_not_allowed",
            PermissionDenied::NotJoined => "not_joined",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Permission(#[from] PermissionDenied),
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("store did not respond within {0} ms")]
    Timeout(u64),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    pub fn room_not_found(room_id: &str) -> Self {
        ChatError::NotFound(format!("room {room_id}"))
    }

    /// Machine-readable code carried in the wire `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation_error",
            ChatError::Permission(denied) => denied.code(),
            ChatError::NotFound(_) => "not_found",
            ChatError::Storage(_) => "storage_error",
            ChatError::Timeout(_) => "timeout",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Permission(PermissionDenied::NotJoined) => StatusCode::CONFLICT,
            ChatError::Permission(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ChatError::NotFound("record".to_string()),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Storage details stay in the log, not in the response body.
        let message = match &self {
            ChatError::Storage(detail) => {
                tracing::error!(error = %detail, "storage failure while serving request");
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            success: false,
            error: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
