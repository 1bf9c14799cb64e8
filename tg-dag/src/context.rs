use crate::future::Future;
use crate::thunk::{ThunkId, ThunkInput, ThunkOptions};
use crate::value::ThunkValue;
use std::collections::HashMap;
use std::sync::Arc;

/// The body of a thunk: takes the handle it was invoked with plus its
/// resolved arguments, and returns a result or an error.
///
/// The handle is passed explicitly rather than fetched from task-local
/// storage, so a thunk body can be moved to any processor or thread without
/// carrying implicit context along with it.
pub type ThunkFn =
    Arc<dyn Fn(&dyn ThunkContext, &[ThunkValue]) -> anyhow::Result<ThunkValue> + Send + Sync>;

/// What a running thunk can do to call back into the scheduler.
///
/// A worker-side invocation receives `&dyn ThunkContext` as its first
/// argument; `tg-sched`'s `SchHandle` is the concrete implementation. Kept as
/// a trait object here (rather than a concrete type) so this crate never
/// depends on the scheduler crate.
pub trait ThunkContext: Send + Sync {
    /// The id of the thunk currently executing against this handle.
    fn thunk_id(&self) -> ThunkId;

    /// Run `f` with `args` synchronously, through the control channel,
    /// exactly as if it had been submitted as a new thunk and waited on.
    fn exec(&self, f: ThunkFn, args: Vec<ThunkValue>) -> anyhow::Result<ThunkValue>;

    /// Block until `target` is finished or errored, and return its result.
    fn fetch(&self, target: ThunkId) -> anyhow::Result<ThunkValue>;

    /// Block until `target` is finished or errored, without fetching the
    /// result.
    fn wait(&self, target: ThunkId) -> anyhow::Result<()>;

    /// Register a future to be fulfilled when `target` completes. Fails with
    /// a dominator-violation error if `target` transitively depends on the
    /// calling thunk (that would deadlock).
    fn register_future(&self, target: ThunkId, future: Future) -> anyhow::Result<()>;

    /// Add a new thunk to the DAG, resolving `ThunkInput::Thunk` references
    /// against already-known ids, and return its id.
    fn add_thunk(&self, f: ThunkFn, inputs: Vec<ThunkInput>, options: ThunkOptions)
        -> anyhow::Result<ThunkId>;

    /// Snapshot of the DAG's direct-dependent edges, keyed by thunk id.
    fn get_dag_ids(&self) -> anyhow::Result<HashMap<ThunkId, Vec<ThunkId>>>;

    /// Request a cooperative, scheduler-wide halt.
    fn halt(&self) -> anyhow::Result<()>;
}
