//! Immutable value types describing a thunk graph.
//!
//! This crate knows nothing about processors, scheduling, or channels: it
//! only defines the shapes that flow between those layers. [`Thunk`] and
//! friends are interned and scheduled by `tg-sched`; they are dispatched onto
//! concrete compute resources described by `tg-proc`. Keeping those concerns
//! out of this crate is what lets a thunk body call back into the scheduler
//! (through [`ThunkContext`]) without `tg-dag` depending on `tg-sched`.
//!
//! ```
//! use tg_dag::{Thunk, ThunkInput, ThunkValue};
//! use std::sync::Arc;
//!
//! let a = Thunk::new(Arc::new(|_ctx: &dyn tg_dag::ThunkContext, _args: &[ThunkValue]| {
//!     Ok(ThunkValue::new(1u64))
//! }), vec![]);
//! assert!(a.inputs().is_empty());
//! let _consumer = ThunkInput::Thunk(a.id());
//! ```

mod context;
mod error;
mod future;
mod thunk;
mod value;

pub use context::{ThunkContext, ThunkFn};
pub use error::ThunkFailedException;
pub use future::{Future, FutureResult};
pub use thunk::{ProcList, ProcessorKind, Thunk, ThunkId, ThunkInput, ThunkOptions};
pub use value::{Chunk, ProcessorId, ThunkValue};
