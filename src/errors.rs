use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type ApiFailure = (StatusCode, Json<MessageBody>);

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    DuplicateResource(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),

    #[error("AI service error: {message}")]
    AiError { status: StatusCode, message: String },

    #[error("Email delivery failed: {0}")]
    EmailError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(self, context: ErrorContext) -> ApiFailure {
        match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                let message = context
                    .user_friendly_message
                    .unwrap_or_else(|| self.to_string());
                (StatusCode::NOT_FOUND, Json(MessageBody::new(message)))
            }
            ApiError::ValidationError(_) | ApiError::DuplicateResource(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Rejected request"
                );
                (StatusCode::BAD_REQUEST, Json(MessageBody::new(self.to_string())))
            }
            ApiError::Unauthorized(_) => {
                warn!(
                    operation = %context.operation,
                    error = %self,
                    "Authentication failed"
                );
                (StatusCode::UNAUTHORIZED, Json(MessageBody::new(self.to_string())))
            }
            ApiError::Forbidden(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Access denied"
                );
                (StatusCode::FORBIDDEN, Json(MessageBody::new(self.to_string())))
            }
            ApiError::AiError { status, message } => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    status = %status,
                    error = %message,
                    "AI service error"
                );
                (*status, Json(MessageBody::new(message.clone())))
            }
            ApiError::EmailError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Email delivery failed"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageBody::new(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| "Could not send email. Please try again.".to_string()),
                    )),
                )
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageBody::new(
                        "Database operation failed. Please try again.",
                    )),
                )
            }
            ApiError::InternalError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Internal server error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageBody::new("Server error. Please try again.")),
                )
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        classify_database_error(&anyhow::Error::from(err))
    }
}

/// Helper function to detect error types from anyhow error messages
pub fn classify_database_error(error: &anyhow::Error) -> ApiError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("unique constraint") || error_str.contains("already exists") {
        if error_str.contains("users.email") {
            return ApiError::DuplicateResource("User already exists".to_string());
        }
        ApiError::DuplicateResource("Resource already exists".to_string())
    } else if error_str.contains("no rows") {
        ApiError::NotFound("Resource not found".to_string())
    } else if error_str.contains("foreign key constraint") {
        ApiError::ValidationError("Referenced resource does not exist".to_string())
    } else {
        ApiError::DatabaseError(anyhow::anyhow!("{}", error))
    }
}
