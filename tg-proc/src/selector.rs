use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tg_dag::{ProcList, ProcessorId, ThunkFn, ThunkOptions, ThunkValue};

use crate::context::Context;
use crate::error::SelectionError;
use crate::processors::Processor;

fn is_compatible(proc: &dyn Processor, options: &ThunkOptions, f: &ThunkFn, args: &[ThunkValue]) -> bool {
    proc.iscompatible_func(options, f) && args.iter().all(|a| proc.iscompatible_arg(options, a))
}

fn flatten_leaves(procs: &[Arc<dyn Processor>]) -> Vec<Arc<dyn Processor>> {
    let mut leaves = Vec::new();
    for proc in procs {
        let children = proc.get_processors();
        if children.is_empty() {
            leaves.push(proc.clone());
        } else {
            leaves.extend(flatten_leaves(&children));
        }
    }
    leaves
}

/// Picks a processor for a thunk among a [`Context`]'s leaf processors, and
/// gates dispatch on the pool's execution capacity: each leaf processor
/// holds at most one reservation at a time (`§4.2` step 2, "while `ready` is
/// non-empty and there is capacity").
///
/// Maintains a rotating queue so repeated selections spread work evenly
/// (fairness is reset only when the topology changes, via [`Self::refresh`]).
pub struct ProcessorSelector {
    queue: Mutex<VecDeque<Arc<dyn Processor>>>,
    busy: Mutex<HashSet<ProcessorId>>,
}

impl ProcessorSelector {
    pub fn new(ctx: &Context) -> Self {
        let selector = ProcessorSelector {
            queue: Mutex::new(VecDeque::new()),
            busy: Mutex::new(HashSet::new()),
        };
        selector.refresh(ctx);
        selector
    }

    /// Re-flatten the context's processor tree into the round-robin queue.
    /// Call after `addprocs!`/`rmprocs!`.
    pub fn refresh(&self, ctx: &Context) {
        let leaves = ctx.lock(|procs| flatten_leaves(&procs));
        *self.queue.lock().unwrap() = leaves.into_iter().collect();
    }

    /// Reserve a processor compatible with `f`/`args`, honoring `options`.
    ///
    /// `Ok(None)` means at least one eligible processor exists but every one
    /// of them already holds a reservation: the caller should treat this as
    /// "wait for capacity", not as an unschedulable thunk. Call
    /// [`Self::release`] once the dispatched invocation finishes so the slot
    /// can be reused.
    pub fn select(
        &self,
        options: &ThunkOptions,
        f: &ThunkFn,
        args: &[ThunkValue],
    ) -> Result<Option<Arc<dyn Processor>>, SelectionError> {
        let mut queue = self.queue.lock().unwrap();
        let mut busy = self.busy.lock().unwrap();

        if let Some(target) = options.single {
            return match queue.iter().find(|p| p.id() == target) {
                Some(p) if is_compatible(p.as_ref(), options, f, args) => {
                    if busy.contains(&target) {
                        Ok(None)
                    } else {
                        busy.insert(target);
                        Ok(Some(p.clone()))
                    }
                }
                _ => Err(SelectionError {
                    surveyed: queue.iter().map(|p| p.kind().clone()).collect(),
                }),
            };
        }

        let rounds = queue.len();
        let mut surveyed = Vec::with_capacity(rounds);
        let mut any_eligible = false;
        for _ in 0..rounds {
            let candidate = match queue.pop_front() {
                Some(c) => c,
                None => break,
            };
            queue.push_back(candidate.clone());
            surveyed.push(candidate.kind().clone());

            if !is_compatible(candidate.as_ref(), options, f, args) {
                continue;
            }

            let eligible = match &options.proclist {
                ProcList::Any => candidate.default_enabled(),
                ProcList::Predicate(pred) => pred(candidate.kind()),
                ProcList::Kinds(kinds) => kinds.contains(candidate.kind()),
            };
            if !eligible {
                continue;
            }
            any_eligible = true;

            if !busy.contains(&candidate.id()) {
                busy.insert(candidate.id());
                return Ok(Some(candidate));
            }
        }

        if any_eligible {
            Ok(None)
        } else {
            Err(SelectionError { surveyed })
        }
    }

    /// Release a processor reserved by a previous [`Self::select`] call,
    /// freeing its slot for the next dispatch.
    pub fn release(&self, id: ProcessorId) {
        self.busy.lock().unwrap().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::ProcessProcessor;
    use std::sync::Arc as StdArc;
    use tg_dag::{ProcessorKind, ThunkContext};

    fn identity_fn() -> ThunkFn {
        StdArc::new(|_ctx: &dyn ThunkContext, args: &[ThunkValue]| Ok(args[0].clone()))
    }

    #[test]
    fn selects_a_compatible_thread() {
        let process = ProcessProcessor::new(2);
        let ctx = Context::new(vec![process as Arc<dyn Processor>]);
        let selector = ProcessorSelector::new(&ctx);
        let options = ThunkOptions::new();
        let picked = selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap()
            .unwrap();
        assert_eq!(picked.kind(), &ProcessorKind::new("thread"));
    }

    #[test]
    fn round_robins_across_selections() {
        let process = ProcessProcessor::new(2);
        let ctx = Context::new(vec![process as Arc<dyn Processor>]);
        let selector = ProcessorSelector::new(&ctx);
        let options = ThunkOptions::new();
        let first = selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap()
            .unwrap();
        let second = selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap()
            .unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn exhaustion_reports_surveyed_kinds() {
        let process = ProcessProcessor::new(1);
        let ctx = Context::new(vec![process as Arc<dyn Processor>]);
        let selector = ProcessorSelector::new(&ctx);
        let options =
            ThunkOptions::new().proclist(ProcList::Kinds(vec![ProcessorKind::new("gpu")]));
        let err = selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap_err();
        assert_eq!(err.surveyed, vec![ProcessorKind::new("thread")]);
    }

    #[test]
    fn reservation_exhausts_capacity_then_frees_on_release() {
        let process = ProcessProcessor::new(1);
        let ctx = Context::new(vec![process as Arc<dyn Processor>]);
        let selector = ProcessorSelector::new(&ctx);
        let options = ThunkOptions::new();

        let picked = selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap()
            .expect("sole thread is free");

        // The only thread is now reserved: an eligible processor exists but
        // none are free, so this is "wait for capacity", not an error.
        let at_capacity = selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap();
        assert!(at_capacity.is_none());

        selector.release(picked.id());
        let reselected = selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap();
        assert!(reselected.is_some());
    }

    #[test]
    fn pinned_selection_respects_capacity() {
        let process = ProcessProcessor::new(1);
        let thread_id = process.get_processors()[0].id();
        let ctx = Context::new(vec![process as Arc<dyn Processor>]);
        let selector = ProcessorSelector::new(&ctx);
        let options = ThunkOptions::new().single(thread_id);

        selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap()
            .expect("pinned thread is free");
        let at_capacity = selector
            .select(&options, &identity_fn(), &[ThunkValue::new(1u64)])
            .unwrap();
        assert!(at_capacity.is_none(), "pinned thread is already reserved");
    }
}
