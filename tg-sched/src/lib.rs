//! The scheduling kernel.
//!
//! Wires `tg-dag`'s value types and `tg-proc`'s processor abstraction into a
//! running scheduler: a state store (`SchedulerState`), a dispatch loop
//! (`Scheduler::compute`), and the dynamic control plane that lets a
//! thunk body call back in (`SchHandle`, reached only through
//! `&dyn tg_dag::ThunkContext`).
//!
//! ```
//! use std::sync::Arc;
//! use tg_dag::{Thunk, ThunkInput, ThunkValue};
//! use tg_proc::{ProcessProcessor, Processor};
//! use tg_sched::Scheduler;
//!
//! let scheduler = Scheduler::new(vec![ProcessProcessor::new(2) as Arc<dyn Processor>]);
//! let a = Thunk::new(Arc::new(|_ctx: &dyn tg_dag::ThunkContext, _a: &[ThunkValue]| {
//!     Ok(ThunkValue::new(1i64))
//! }), vec![]);
//! let a_id = scheduler.submit(a).unwrap();
//! let b = Thunk::new(Arc::new(|_ctx: &dyn tg_dag::ThunkContext, args: &[ThunkValue]| {
//!     Ok(ThunkValue::new(args[0].downcast_ref::<i64>().unwrap() + 1))
//! }), vec![ThunkInput::Thunk(a_id)]);
//! let b_id = scheduler.submit(b).unwrap();
//! let result = scheduler.compute(b_id).unwrap();
//! assert_eq!(*result.downcast_ref::<i64>().unwrap(), 2);
//! ```

mod config;
mod error;
mod handle;
mod scheduler;
mod state;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use handle::{ControlCommand, ControlReply, ControlValue, SchHandle};
pub use scheduler::{compute_single, Scheduler};
pub use state::{CacheEntry, SchedulerState, ThunkStatus};
