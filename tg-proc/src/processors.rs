use std::fmt;
use std::sync::Arc;

use tg_dag::{ProcessorId, ProcessorKind, ThunkContext, ThunkFn, ThunkOptions, ThunkValue};
use uuid::Uuid;

/// The plug-in interface a compute resource implements to take part in
/// scheduling.
///
/// Default implementations of the compatibility checks return `false`: an
/// unknown processor opts out of everything until it says otherwise, the
/// same "unrecognized is incompatible" default the selector relies on to
/// safely skip processor kinds it has never heard of.
pub trait Processor: Send + Sync + fmt::Debug {
    fn id(&self) -> ProcessorId;

    fn kind(&self) -> &ProcessorKind;

    /// Is this processor able to run `f` at all (ignoring its arguments)?
    fn iscompatible_func(&self, _options: &ThunkOptions, _f: &ThunkFn) -> bool {
        false
    }

    /// Is this processor able to hold/consume this particular argument?
    fn iscompatible_arg(&self, _options: &ThunkOptions, _arg: &ThunkValue) -> bool {
        false
    }

    /// Whether this processor is considered without an explicit `proclist`.
    fn default_enabled(&self) -> bool {
        true
    }

    /// Run `f(ctx, args)` on this processor.
    fn execute(
        &self,
        f: &ThunkFn,
        ctx: &dyn ThunkContext,
        args: &[ThunkValue],
    ) -> anyhow::Result<ThunkValue> {
        f(ctx, args)
    }

    /// Move `value` so a thunk running on `self` can use it, given it was
    /// produced on `from`. The default assumes values are simply shareable
    /// (true for in-process processors); a processor backed by a remote
    /// resource would serialize/transfer here instead.
    fn move_value(&self, _from: &dyn Processor, value: &ThunkValue) -> anyhow::Result<ThunkValue> {
        Ok(value.clone())
    }

    /// Child processors, if any (e.g. a process's worker threads).
    fn get_processors(&self) -> Vec<Arc<dyn Processor>> {
        Vec::new()
    }

    fn get_parent(&self) -> Option<ProcessorId> {
        None
    }
}

/// The root processor for a worker: a process that owns a fixed pool of
/// [`ThreadProcessor`] children. Compatible with any thunk and any argument
/// by itself (its threads are where work actually lands); acting as the
/// entry in [`Context::procs`](crate::Context::procs).
pub struct ProcessProcessor {
    id: ProcessorId,
    kind: ProcessorKind,
    threads: Vec<Arc<ThreadProcessor>>,
}

impl ProcessProcessor {
    /// Create a process processor with `thread_count` worker threads.
    pub fn new(thread_count: usize) -> Arc<Self> {
        let id = Uuid::new_v4();
        let threads = (0..thread_count.max(1))
            .map(|_| Arc::new(ThreadProcessor::new(id)))
            .collect();
        Arc::new(ProcessProcessor {
            id,
            kind: ProcessorKind::new("process"),
            threads,
        })
    }
}

impl fmt::Debug for ProcessProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessProcessor")
            .field("id", &self.id)
            .field("threads", &self.threads.len())
            .finish()
    }
}

impl Processor for ProcessProcessor {
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn kind(&self) -> &ProcessorKind {
        &self.kind
    }

    fn default_enabled(&self) -> bool {
        // A process itself never runs work directly; only its threads do.
        false
    }

    fn get_processors(&self) -> Vec<Arc<dyn Processor>> {
        self.threads
            .iter()
            .cloned()
            .map(|t| t as Arc<dyn Processor>)
            .collect()
    }
}

/// A worker thread within a [`ProcessProcessor`]. Compatible with every
/// thunk and every argument: the minimal, always-usable leaf processor.
pub struct ThreadProcessor {
    id: ProcessorId,
    kind: ProcessorKind,
    parent: ProcessorId,
}

impl ThreadProcessor {
    pub fn new(parent: ProcessorId) -> Self {
        ThreadProcessor {
            id: Uuid::new_v4(),
            kind: ProcessorKind::new("thread"),
            parent,
        }
    }
}

impl fmt::Debug for ThreadProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadProcessor").field("id", &self.id).finish()
    }
}

impl Processor for ThreadProcessor {
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn kind(&self) -> &ProcessorKind {
        &self.kind
    }

    fn iscompatible_func(&self, _options: &ThunkOptions, _f: &ThunkFn) -> bool {
        true
    }

    fn iscompatible_arg(&self, _options: &ThunkOptions, _arg: &ThunkValue) -> bool {
        true
    }

    fn get_parent(&self) -> Option<ProcessorId> {
        Some(self.parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_processor_exposes_its_threads() {
        let proc = ProcessProcessor::new(4);
        assert_eq!(proc.get_processors().len(), 4);
        assert!(!proc.default_enabled());
    }

    #[test]
    fn thread_processor_is_universally_compatible() {
        let proc = ProcessProcessor::new(1);
        let thread = &proc.get_processors()[0];
        assert_eq!(thread.get_parent(), Some(proc.id()));
    }
}
