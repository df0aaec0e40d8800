//! Handler error types

use crate::protocol::{CloseCode, Envelope};
use pulse_cache::RedisPoolError;
use pulse_core::DomainError;
use pulse_service::{CallError, ServiceError};
use serde_json::{json, Value};
use thiserror::Error;

/// Generic message for failures the client cannot act on
const UNAVAILABLE: &str = "Service unavailable";

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Payload did not match the event's shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Event name the gateway does not know
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Request refused with a client-facing reason
    #[error("{message}")]
    Rejected {
        message: String,
        extra: Option<(&'static str, Value)>,
    },

    /// Service error
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Domain error (from collaborators)
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] RedisPoolError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
            extra: None,
        }
    }

    pub fn missing_fields() -> Self {
        Self::rejected("Missing required fields")
    }

    /// Whether the originating client caused the error
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidPayload(_) | Self::UnknownEvent(_) | Self::Rejected { .. } => true,
            Self::Service(e) => e.is_client_error(),
            Self::Domain(e) => e.is_validation() || e.is_not_found(),
            Self::Store(_) | Self::Internal(_) => false,
        }
    }

    /// Convert to a close code (if applicable)
    ///
    /// Only unexpected failures close the connection; everything else is
    /// reported with `chatError` and the connection stays open.
    pub fn to_close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Internal(_) => Some(CloseCode::UnknownError),
            _ => None,
        }
    }

    /// `chatError` frame describing this error to the originator
    pub fn to_envelope(&self, event: &str) -> Envelope {
        match self {
            Self::InvalidPayload(_) => {
                Envelope::chat_error("Invalid payload", Some(("event", json!(event))))
            }
            Self::UnknownEvent(name) => {
                Envelope::chat_error("Unknown event", Some(("event", json!(name))))
            }
            Self::Rejected { message, extra } => Envelope::chat_error(message.clone(), extra.clone()),
            Self::Service(ServiceError::Call(e)) => {
                Envelope::chat_error(e.to_string(), call_extra(e))
            }
            Self::Service(e) if e.is_client_error() => Envelope::chat_error(e.to_string(), None),
            Self::Domain(e) if e.is_not_found() || e.is_validation() => {
                Envelope::chat_error(e.to_string(), None)
            }
            Self::Service(_) | Self::Domain(_) | Self::Store(_) => {
                Envelope::chat_error(UNAVAILABLE, None)
            }
            Self::Internal(_) => Envelope::chat_error("An unexpected error occurred", None),
        }
    }
}

fn call_extra(err: &CallError) -> Option<(&'static str, Value)> {
    err.call_id().map(|id| ("callId", json!(id)))
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
