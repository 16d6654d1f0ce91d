//! Error taxonomy for the review engine.
//!
//! Structural and lookup errors are local invariant violations: they are
//! logged and the operation aborts with no state change. Remote errors are
//! the only class a user may fix by trying again, and nothing here retries
//! on its own.

use thiserror::Error;

use crate::types::{CommentId, LineNumber};

/// Malformed markup handed to the reflow engine. Fatal for that file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("line {line}: closing tag </{tag}> with no open tag")]
    UnbalancedClose { tag: String, line: LineNumber },

    #[error("line {line}: closing tag </{found}> while <{expected}> is open")]
    MismatchedClose {
        expected: String,
        found: String,
        line: LineNumber,
    },

    #[error("line {line}: tag starting at column {column} is never terminated")]
    UnterminatedTag { line: LineNumber, column: usize },

    #[error("tags still open at end of input: {}", tags.join(", "))]
    Unclosed { tags: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("line {0} does not exist")]
    LineNotFound(LineNumber),

    #[error("comment {0} not found")]
    CommentNotFound(CommentId),

    #[error("comment {0} is already present")]
    DuplicateComment(CommentId),
}

/// Failure talking to the comment store.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("store rejected the request: {0}")]
    Rejected(String),

    #[error("local store error: {0}")]
    Store(String),
}

impl From<tokio_rusqlite::Error> for RemoteError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        RemoteError::Store(err.to_string())
    }
}

/// Errors from a user-initiated sync operation (create, delete, reassign).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("comment {0} already has a request in flight")]
    Busy(CommentId),

    #[error("not allowed to modify comment {0}")]
    Forbidden(CommentId),

    #[error("commenting is closed for this file")]
    CommentingClosed,

    #[error("empty comments are not allowed")]
    EmptyComment,
}
