//! Service error model.
//!
//! Every failure surfaced by the engine is a `(kind, detail)` pair: a stable,
//! machine-checkable [`ErrorKind`] plus a human-readable detail string. The
//! surrounding request layer maps kinds to its own transport representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the engine.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Closed failure taxonomy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request, unknown customer, order not editable, insufficient stock.
    InvalidInput,
    /// Stock cannot satisfy the request. A sub-case of `InvalidInput`.
    InventoryNotAvailable,
    /// Referenced order, ingredient or menu item does not exist.
    NotFound,
    /// Uniqueness violation surfaced from the store.
    AlreadyExists,
    /// Unexpected store or collaborator fault.
    Internal,
    /// The caller's deadline expired or its cancellation token fired.
    Timeout,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::InventoryNotAvailable => "inventory not available",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Internal => "internal error",
            ErrorKind::Timeout => "timed out",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged failure: a kind from the closed taxonomy plus a detail message.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct ServiceError {
    kind: ErrorKind,
    detail: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, detail)
    }

    pub fn inventory_not_available(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InventoryNotAvailable, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn already_exists(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable detail, without the kind prefix.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// True for `InvalidInput` and its `InventoryNotAvailable` sub-case.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::InvalidInput | ErrorKind::InventoryNotAvailable
        )
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Internal | ErrorKind::Timeout)
    }

    /// Prefix the detail with context while keeping the kind.
    pub fn context(self, ctx: impl core::fmt::Display) -> Self {
        Self {
            kind: self.kind,
            detail: format!("{ctx}: {}", self.detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_shortage_is_a_kind_of_invalid_input() {
        let err = ServiceError::inventory_not_available("flour: need 7, have 6");
        assert!(err.is_invalid_input());
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::InventoryNotAvailable);
    }

    #[test]
    fn internal_and_timeout_are_retryable() {
        assert!(ServiceError::internal("db down").is_retryable());
        assert!(ServiceError::timeout("deadline exceeded").is_retryable());
        assert!(!ServiceError::not_found("order").is_retryable());
    }

    #[test]
    fn display_carries_kind_and_detail() {
        let err = ServiceError::invalid_input("order is not open");
        assert_eq!(err.to_string(), "invalid input: order is not open");
        assert_eq!(err.detail(), "order is not open");
    }

    #[test]
    fn context_keeps_kind() {
        let err = ServiceError::not_found("menu item 42").context("pricing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.detail(), "pricing: menu item 42");
    }
}
