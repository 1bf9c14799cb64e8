use crate::thunk::ThunkId;
use std::sync::Arc;

/// Raised when fetching a thunk that finished in the `errored` state.
///
/// `origin` and `origin_error` identify the thunk that actually raised;
/// `thunk` is whichever thunk this particular exception instance is attached
/// to (itself, or a downstream dependent it was propagated to). The error
/// message is captured once at the origin and cloned cheaply via `Arc` as it
/// fans out across `dependents`.
#[derive(Clone, Debug, thiserror::Error)]
#[error("thunk {thunk} failed (origin: thunk {origin}): {origin_error}")]
pub struct ThunkFailedException {
    pub thunk: ThunkId,
    pub origin: ThunkId,
    pub origin_error: Arc<str>,
}

impl ThunkFailedException {
    /// Build the exception for the thunk whose function actually raised.
    pub fn at_origin(thunk: ThunkId, error: &anyhow::Error) -> Self {
        let rendered: Arc<str> = Arc::from(format!("{error:#}"));
        ThunkFailedException {
            thunk,
            origin: thunk,
            origin_error: rendered,
        }
    }

    /// Re-attach this exception to a downstream thunk, keeping the origin.
    pub fn propagate_to(&self, thunk: ThunkId) -> Self {
        ThunkFailedException {
            thunk,
            origin: self.origin,
            origin_error: self.origin_error.clone(),
        }
    }
}
