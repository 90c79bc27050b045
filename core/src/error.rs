//! Error taxonomy.
//!
//! Two layers:
//!
//! - [`StoreError`]: what a persistence backend can report. Unique
//!   violations carry the constraint name so callers can react to specific
//!   collisions (the order-id retry loop does).
//! - [`ArenaError`]: the domain taxonomy every service returns. The web
//!   layer maps each variant to exactly one HTTP status.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for domain services.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// Errors reported by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind (e.g. `"payment"`).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A unique constraint rejected the write.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// A guarded write found the row in another state (a cart no longer
    /// ACTIVE, a flag already closed). The message is client-safe.
    #[error("{0}")]
    Precondition(String),

    /// Connection, query or transaction failure.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Cart writes that require an ACTIVE cart.
    #[must_use]
    pub fn cart_not_active() -> Self {
        Self::Precondition("Your cart has already been checked out or has expired".to_string())
    }

    /// Returns `true` if this is a unique violation of `constraint`.
    #[must_use]
    pub fn is_unique_violation_of(&self, constraint: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint: c } if c == constraint)
    }
}

/// Domain error taxonomy.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Bad or missing input, or a business rule rejected the request.
    #[error("{0}")]
    Validation(String),

    /// No (valid) session.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed (wrong role or not the owner).
    #[error("{0}")]
    Forbidden(String),

    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The request conflicts with existing state.
    #[error("{0}")]
    Conflict(String),

    /// Unexpected failure. The message is safe to log; clients only see a
    /// generic message.
    #[error("{message}")]
    Internal {
        /// Description for logs.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ArenaError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates an internal error without a source.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

impl From<StoreError> for ArenaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::UniqueViolation { constraint } => {
                Self::Conflict(format!("Duplicate record ({constraint})"))
            }
            StoreError::Precondition(message) => Self::Validation(message),
            other => Self::Internal {
                message: "Storage operation failed".to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

/// A stored or submitted string did not name a known enum variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    /// Enum type name.
    pub kind: &'static str,
    /// Offending text.
    pub value: String,
}

impl From<ParseEnumError> for StoreError {
    fn from(err: ParseEnumError) -> Self {
        Self::Serialization(err.to_string())
    }
}
