//! Errors raised by the editing session and the persistence boundary.

use hatch_core::{ContainerId, GraphError};
use thiserror::Error;

/// Failure reported by a `ContainerStore`.
///
/// The in-memory graph is never touched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("container `{0}` is not in the store")]
    NotFound(ContainerId),

    #[error("store rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The record's `json` field does not hold a container token.
    #[error("record for `{id}` is unreadable: {source}")]
    Record {
        id: ContainerId,
        source: serde_json::Error,
    },

    #[error("no container is open")]
    NoActiveContainer,

    #[error("the clipboard is empty")]
    EmptyClipboard,
}
