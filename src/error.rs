//! Construction-time error taxonomy for inventory snapshots.
//!
//! Every variant describes a deterministic data-shape problem. None of them
//! are retried: a snapshot that fails here is never rendered.

use thiserror::Error;

/// Errors raised while normalizing rows or assembling the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// A row did not decode into the fixed 7-field layout.
    #[error("malformed row: {0}")]
    MalformedRow(String),
    /// Two records share the same id.
    #[error("duplicate record id {0}")]
    DuplicateId(i64),
    /// A non-root record has no parent, or points at an id that does not exist.
    #[error("record {id} references missing parent {parent_id:?}")]
    DanglingParent { id: i64, parent_id: Option<i64> },
    /// No parentless record was found.
    #[error("no root record found")]
    MissingRoot,
    /// More than one parentless record was found.
    #[error("multiple root records found: {0:?}")]
    MultipleRoots(Vec<i64>),
    /// Parent links loop back on themselves.
    #[error("cycle detected at record {0}")]
    CycleDetected(i64),
}

/// A normalizer failure tagged with the 1-based line it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {source}")]
pub struct RowError {
    pub line: usize,
    #[source]
    pub source: InventoryError,
}

pub type Result<T, E = InventoryError> = std::result::Result<T, E>;
