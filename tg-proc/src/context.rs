use std::sync::{Arc, Mutex, MutexGuard};

use log::info;

use crate::processors::Processor;

/// The mutable set of processors available for a run.
///
/// Mirrors the source's `Context`: a thin, lock-guarded registry that the
/// scheduler and the processor selector both read, and that `addprocs!`/
/// `rmprocs!` mutate while a run is in progress.
pub struct Context {
    procs: Mutex<Vec<Arc<dyn Processor>>>,
}

impl Context {
    pub fn new(procs: Vec<Arc<dyn Processor>>) -> Self {
        Context {
            procs: Mutex::new(procs),
        }
    }

    /// Snapshot of the top-level (root) processors currently registered.
    pub fn procs(&self) -> Vec<Arc<dyn Processor>> {
        self.procs.lock().unwrap().clone()
    }

    /// Run `body` while holding the context lock, mirroring
    /// `Context::lock` in the source interface (`§6`).
    pub fn lock<R>(&self, body: impl FnOnce(MutexGuard<'_, Vec<Arc<dyn Processor>>>) -> R) -> R {
        let guard = self.procs.lock().unwrap();
        body(guard)
    }

    pub fn addprocs(&self, procs: impl IntoIterator<Item = Arc<dyn Processor>>) {
        let mut guard = self.procs.lock().unwrap();
        guard.extend(procs);
    }

    /// Remove root-level processors by id. Unlike [`Self::find`] this does
    /// not descend into children: removing a leaf requires removing its
    /// parent.
    pub fn rmprocs(&self, ids: &[crate::ProcessorId]) {
        let mut guard = self.procs.lock().unwrap();
        guard.retain(|p| !ids.contains(&p.id()));
    }

    /// Depth-first search for a processor (root or descendant) by id.
    pub fn find(&self, id: crate::ProcessorId) -> Option<Arc<dyn Processor>> {
        fn search(procs: &[Arc<dyn Processor>], id: crate::ProcessorId) -> Option<Arc<dyn Processor>> {
            for proc in procs {
                if proc.id() == id {
                    return Some(proc.clone());
                }
                if let Some(found) = search(&proc.get_processors(), id) {
                    return Some(found);
                }
            }
            None
        }
        search(&self.procs(), id)
    }

    /// Emit a structured log event about the run. The source leaves the
    /// sink unspecified (out of scope per the spec); this just routes
    /// through the `log` facade like the rest of the workspace.
    pub fn write_event(&self, event: &str) {
        info!(target: "tg_proc::context", "{event}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::ProcessProcessor;

    #[test]
    fn addprocs_and_rmprocs_mutate_the_registry() {
        let ctx = Context::new(vec![]);
        assert!(ctx.procs().is_empty());

        let proc = ProcessProcessor::new(1) as Arc<dyn Processor>;
        let id = proc.id();
        ctx.addprocs(vec![proc]);
        assert_eq!(ctx.procs().len(), 1);

        ctx.rmprocs(&[id]);
        assert!(ctx.procs().is_empty());
    }

    #[test]
    fn rmprocs_does_not_descend_into_children() {
        let process = ProcessProcessor::new(2);
        let thread_id = process.get_processors()[0].id();
        let ctx = Context::new(vec![process as Arc<dyn Processor>]);

        ctx.rmprocs(&[thread_id]);
        assert_eq!(ctx.procs().len(), 1, "only root-level entries are removable");
    }

    #[test]
    fn find_descends_into_child_processors() {
        let process = ProcessProcessor::new(2);
        let thread_id = process.get_processors()[0].id();
        let ctx = Context::new(vec![process as Arc<dyn Processor>]);

        assert!(ctx.find(thread_id).is_some());
        assert!(ctx.find(uuid::Uuid::new_v4()).is_none());
    }

    #[test]
    fn lock_exposes_the_same_processors_as_procs() {
        let proc = ProcessProcessor::new(1) as Arc<dyn Processor>;
        let ctx = Context::new(vec![proc]);
        let count = ctx.lock(|procs| procs.len());
        assert_eq!(count, ctx.procs().len());
    }

    #[test]
    fn write_event_does_not_panic() {
        let ctx = Context::new(vec![]);
        ctx.write_event("test event");
    }
}
