//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// illegal transitions, conflicts). Infrastructure concerns belong elsewhere.
/// Every error is request-scoped and recoverable by the caller; nothing in the
/// domain layer is fatal at the process level.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed/missing input, incomplete
    /// mode-specific payment fields, etc.).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An illegal state change was requested (phases and statuses are
    /// one-directional).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A referenced entity does not exist (unknown SKU on a packing slip,
    /// missing credit memo, etc.).
    #[error("not found: {0}")]
    NotFound(String),

    /// A numeric or uniqueness conflict: overpayment, allocation overrun,
    /// insufficient stock, redeemed memo, locked order, exhausted allocator.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
