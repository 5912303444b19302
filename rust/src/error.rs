//! Error handling and result types for tree and container operations.
//!
//! Every fallible operation returns one of the error kinds below; nothing is
//! logged or panicked from inside the library. `find`-style lookups report
//! absence through `Option` instead of an error.

use thiserror::Error;

/// Error type for B+ tree and document list operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Key not found in the tree.
    #[error("key not found in tree")]
    KeyNotFound,

    /// Insert of a key that is already present. The tree is unchanged.
    #[error("duplicate key rejected")]
    DuplicateKey,

    /// Order below the minimum at construction time.
    #[error("invalid order {order} (minimum required: {minimum})")]
    InvalidOrder { order: usize, minimum: usize },

    /// The node id space is exhausted. Retryable after removals free slots.
    #[error("node arena exhausted")]
    ArenaExhausted,

    /// Internal data structure integrity violation.
    #[error("tree corruption: {0}")]
    Corrupted(String),

    /// A dump could not be decoded: bad magic, version, checksum, or a
    /// truncated or malformed payload.
    #[error("corrupt dump: {0}")]
    CorruptDump(String),

    /// An I/O failure while writing or reading a dump.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeError {
    /// Create an `InvalidOrder` error against the crate minimum.
    pub(crate) fn invalid_order(order: usize) -> Self {
        Self::InvalidOrder {
            order,
            minimum: crate::types::MIN_ORDER,
        }
    }

    /// Create a `Corrupted` error with context.
    pub(crate) fn corrupted(context: &str, details: impl std::fmt::Display) -> Self {
        Self::Corrupted(format!("{}: {}", context, details))
    }

    /// Create a `CorruptDump` error with context.
    pub(crate) fn corrupt_dump(context: &str, details: impl std::fmt::Display) -> Self {
        Self::CorruptDump(format!("{}: {}", context, details))
    }

    /// Returns true if the operation may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ArenaExhausted)
    }
}

/// Public result type for tree operations that may fail.
pub type TreeResult<T> = Result<T, TreeError>;

/// Result type for key lookup operations.
pub type KeyResult<T> = Result<T, TreeError>;

/// Result type for tree modification operations.
pub type ModifyResult<T> = Result<T, TreeError>;

/// Result type for tree construction.
pub type InitResult<T> = Result<T, TreeError>;
