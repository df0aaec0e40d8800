//! Service layer error types
//!
//! Provides a unified error type for router and call registry operations.

use pulse_cache::RedisPoolError;
use pulse_common::AppError;
use pulse_core::{CallStatus, DomainError};
use std::fmt;

/// Call state machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("Call not found")]
    NotFound(String),

    #[error("Cannot {action} a {status} call")]
    InvalidTransition {
        call_id: String,
        status: CallStatus,
        action: &'static str,
    },

    #[error("Not a participant of this call")]
    NotParticipant(String),

    #[error("Missing required fields")]
    MissingField(&'static str),
}

impl CallError {
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::NotFound(id)
            | Self::NotParticipant(id)
            | Self::InvalidTransition { call_id: id, .. } => Some(id),
            Self::MissingField(_) => None,
        }
    }
}

/// Service layer error type
#[derive(Debug)]
pub enum ServiceError {
    /// Domain rule violation or collaborator failure
    Domain(DomainError),

    /// Call state machine error
    Call(CallError),

    /// Shared store unavailable
    Store(RedisPoolError),

    /// Resource not found
    NotFound { resource: &'static str, id: String },

    /// Validation error
    Validation(String),

    /// Internal error
    Internal(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(e) => write!(f, "{e}"),
            Self::Call(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "Store error: {e}"),
            Self::NotFound { resource, id } => write!(f, "{resource} not found: {id}"),
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Domain(e) => Some(e),
            Self::Call(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl ServiceError {
    /// Create a not found error
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the originating client caused the error
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Domain(e) => {
                if e.is_not_found() {
                    404
                } else if e.is_validation() {
                    400
                } else if e.is_unavailable() {
                    503
                } else {
                    500
                }
            }
            Self::Call(CallError::NotFound(_)) | Self::NotFound { .. } => 404,
            Self::Call(CallError::InvalidTransition { .. }) => 409,
            Self::Call(CallError::NotParticipant(_)) => 403,
            Self::Call(CallError::MissingField(_)) | Self::Validation(_) => 400,
            Self::Store(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code for client-facing errors
    pub fn error_code(&self) -> &str {
        match self {
            Self::Domain(e) => e.code(),
            Self::Call(CallError::NotFound(_)) => "UNKNOWN_CALL",
            Self::Call(CallError::InvalidTransition { .. }) => "INVALID_CALL_STATE",
            Self::Call(CallError::NotParticipant(_)) => "NOT_PARTICIPANT",
            Self::Call(CallError::MissingField(_)) => "MISSING_FIELD",
            Self::Store(_) => "STORE_UNAVAILABLE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<CallError> for ServiceError {
    fn from(err: CallError) -> Self {
        Self::Call(err)
    }
}

impl From<RedisPoolError> for ServiceError {
    fn from(err: RedisPoolError) -> Self {
        Self::Store(err)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Domain(e) => AppError::Domain(e),
            ServiceError::Call(CallError::NotFound(_)) => AppError::not_found("Call"),
            ServiceError::Call(e) => AppError::Validation(e.to_string()),
            ServiceError::Store(e) => AppError::Cache(e.to_string()),
            ServiceError::NotFound { resource, .. } => AppError::not_found(resource),
            ServiceError::Validation(msg) => AppError::Validation(msg),
            ServiceError::Internal(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = ServiceError::not_found("Chat", "123");
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(err.to_string().contains("Chat not found: 123"));
    }

    #[test]
    fn test_call_errors() {
        let err = ServiceError::from(CallError::NotFound("call_1".to_string()));
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Call not found");

        let err = CallError::InvalidTransition {
            call_id: "call_1".to_string(),
            status: CallStatus::Connected,
            action: "decline",
        };
        assert_eq!(err.to_string(), "Cannot decline a connected call");
        assert_eq!(err.call_id(), Some("call_1"));
        assert!(ServiceError::from(err).is_client_error());
    }

    #[test]
    fn test_store_error_is_unavailable() {
        let err = ServiceError::from(RedisPoolError::ConnectionNotAvailable);
        assert_eq!(err.status_code(), 503);
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_convert_to_app_error() {
        let app_err: AppError = ServiceError::from(CallError::NotFound("c".into())).into();
        assert_eq!(app_err.status_code(), 404);
        assert_eq!(app_err.to_string(), "Call not found");
    }
}
