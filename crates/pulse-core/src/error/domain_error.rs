//! Domain errors - error types for the domain layer

use thiserror::Error;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Not Found Errors
    // =========================================================================
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid user id")]
    InvalidUserId,

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// Get an error code string for client-facing error events
    pub fn code(&self) -> &'static str {
        match self {
            // Not Found
            Self::UserNotFound(_) => "UNKNOWN_USER",
            Self::ChatNotFound(_) => "UNKNOWN_CHAT",
            Self::MessageNotFound(_) => "UNKNOWN_MESSAGE",
            Self::CallNotFound(_) => "UNKNOWN_CALL",

            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidUserId => "INVALID_USER_ID",

            // Infrastructure
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::CacheError(_) => "CACHE_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_)
                | Self::ChatNotFound(_)
                | Self::MessageNotFound(_)
                | Self::CallNotFound(_)
        )
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_) | Self::MissingField(_) | Self::InvalidUserId
        )
    }

    /// Check if a backing store or collaborator failed
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::CacheError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = DomainError::UserNotFound("u1".to_string());
        assert_eq!(err.code(), "UNKNOWN_USER");

        let err = DomainError::MissingField("chatId");
        assert_eq!(err.code(), "MISSING_FIELD");
    }

    #[test]
    fn test_is_not_found() {
        assert!(DomainError::MessageNotFound("m".to_string()).is_not_found());
        assert!(DomainError::CallNotFound("c".to_string()).is_not_found());
        assert!(!DomainError::InvalidUserId.is_not_found());
    }

    #[test]
    fn test_classification() {
        assert!(DomainError::MissingField("receiverId").is_validation());
        assert!(DomainError::CacheError("down".to_string()).is_unavailable());
        assert!(!DomainError::InternalError("x".to_string()).is_unavailable());
    }

    #[test]
    fn test_error_display() {
        let err = DomainError::ChatNotFound("c9".to_string());
        assert_eq!(err.to_string(), "Chat not found: c9");

        let err = DomainError::MissingField("targetUserId");
        assert_eq!(err.to_string(), "Missing required field: targetUserId");
    }
}
