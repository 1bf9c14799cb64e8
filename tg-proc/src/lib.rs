//! Processor abstraction: a tree of compute resources a thunk can be
//! dispatched onto, plus the selection policy that picks one.
//!
//! A [`Processor`] is the capability table named in the design notes: rather
//! than open-set function overloading dispatched on the processor's type,
//! every concrete processor implements the same trait and the selector picks
//! among `Arc<dyn Processor>` instances. `ProcessProcessor` and
//! `ThreadProcessor` are the minimal built-ins; anything else plugs in by
//! implementing [`Processor`].

mod context;
mod error;
mod processors;
mod selector;

pub use context::Context;
pub use error::SelectionError;
pub use processors::{ProcessProcessor, Processor, ThreadProcessor};
pub use selector::ProcessorSelector;
pub use tg_dag::{ProcList, ProcessorId, ProcessorKind};
