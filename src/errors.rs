//! Error types for factab operations.

use thiserror::Error;

/// Errors raised by domain, table, and update operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes. All public APIs return
/// `Result<T, FactorError>` to avoid panics in library code. Mutating
/// operations that return an error leave the receiver unchanged.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FactorError {
    /// An index is outside the cardinality of its domain.
    #[error("domain error: {0}")]
    Domain(String),

    /// A joint index is outside the table's joint range.
    #[error("range error: joint index {index} out of bounds for size {size}")]
    Range { index: usize, size: usize },

    /// An element value is not a member of its domain.
    #[error("value error: {0}")]
    Value(String),

    /// An illegal mutation of a fixed sparse structure.
    #[error("structure error: {0}")]
    Structure(String),

    /// Normalization of an all-zero weight slice.
    #[error("degenerate table: {0}")]
    DegenerateTable(String),

    /// Edge, message, or tuple arity does not match the table's dimensions.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An update was requested before strategy derivation, or after the
    /// table's structure changed without a rebuild.
    #[error("update not ready: {0}")]
    NotReady(String),

    /// Invalid configuration or construction input.
    #[error("validation error: {0}")]
    Validation(String),
}
