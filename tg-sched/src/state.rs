use std::collections::{HashMap, HashSet, VecDeque};
use std::time::SystemTime;

use log::{debug, trace};
use tg_dag::{Chunk, Future, FutureResult, Thunk, ThunkFailedException, ThunkId, ThunkInput, ThunkValue};

/// What a finished or errored thunk left behind in the cache.
#[derive(Clone)]
pub enum CacheEntry {
    Value(ThunkValue),
    Chunk(Chunk),
    Error(ThunkFailedException),
}

impl CacheEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, CacheEntry::Error(_))
    }

    /// The value a consumer should see, resolving a `Chunk` to its inline
    /// value (processor-to-processor movement happens at dispatch time, not
    /// here).
    pub fn as_value(&self) -> Result<ThunkValue, ThunkFailedException> {
        match self {
            CacheEntry::Value(v) => Ok(v.clone()),
            CacheEntry::Chunk(c) => Ok(c.value().clone()),
            CacheEntry::Error(e) => Err(e.clone()),
        }
    }
}

/// All mutable scheduler bookkeeping, guarded by a single lock (`§5`).
///
/// Grounded on `ExecutorData`'s collection of `ready_execs` / `missing_deps`
/// / `dependents` / `file_store`, generalized from "files are ready" to "a
/// thunk's full input set is resolved", and carrying the extra collections
/// (`waiting_data`, `futures`, `errored`) the source's richer failure and
/// future semantics require.
#[derive(Default)]
pub struct SchedulerState {
    pub thunk_dict: HashMap<ThunkId, Thunk>,
    pub waiting: HashMap<ThunkId, HashSet<ThunkId>>,
    pub waiting_data: HashMap<ThunkId, HashSet<ThunkId>>,
    pub dependents: HashMap<ThunkId, HashSet<ThunkId>>,
    pub ready: VecDeque<ThunkId>,
    pub running: HashSet<ThunkId>,
    pub finished: HashSet<ThunkId>,
    pub errored: HashSet<ThunkId>,
    pub cache: HashMap<ThunkId, CacheEntry>,
    pub futures: HashMap<ThunkId, Vec<Future>>,
    pub halt: bool,
    /// Wall-clock dispatch/finish timestamps, for status reporting only
    /// (`§10`'s supplement mirroring `ExecutorStatus`); nothing in `§3`-`§5`
    /// reads these to make a scheduling decision.
    pub dispatched_at: HashMap<ThunkId, SystemTime>,
    pub finished_at: HashMap<ThunkId, SystemTime>,
}

/// A point-in-time status snapshot for one thunk, for external reporting.
#[derive(Debug, Clone)]
pub struct ThunkStatus {
    pub id: ThunkId,
    pub description: String,
    pub dispatched_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `id`'s description and recorded timestamps, if known.
    pub fn status(&self, id: ThunkId) -> Option<ThunkStatus> {
        let thunk = self.thunk_dict.get(&id)?;
        Some(ThunkStatus {
            id,
            description: thunk.description().to_string(),
            dispatched_at: self.dispatched_at.get(&id).copied(),
            finished_at: self.finished_at.get(&id).copied(),
        })
    }

    /// Intern a thunk and resolve its inputs (`§4.1`). Returns an error if
    /// an input references a thunk id this state has never seen.
    pub fn submit(&mut self, thunk: Thunk) -> anyhow::Result<ThunkId> {
        let id = thunk.id();
        for input in thunk.inputs() {
            if let ThunkInput::Thunk(dep) = input {
                if !self.thunk_dict.contains_key(dep) {
                    anyhow::bail!("thunk {id} references unknown input thunk {dep}");
                }
            }
        }
        self.thunk_dict.insert(id, thunk);
        self.reschedule_inputs(id);
        Ok(id)
    }

    /// Recompute `id`'s `waiting` set against the current state of its
    /// inputs, promoting it to `ready` if nothing remains unresolved and
    /// propagating failure if an input already errored.
    ///
    /// Per the source's assertion-based semantics, the first errored input
    /// found stops the traversal: the consumer is marked errored against
    /// that input's origin and the remaining inputs are not examined.
    pub fn reschedule_inputs(&mut self, id: ThunkId) -> bool {
        if self.finished.contains(&id) || self.errored.contains(&id) {
            return false;
        }

        let inputs: Vec<ThunkId> = self.thunk_dict[&id]
            .inputs()
            .iter()
            .filter_map(|i| match i {
                ThunkInput::Thunk(dep) => Some(*dep),
                ThunkInput::Value(_) => None,
            })
            .collect();

        let mut waiting = HashSet::new();
        for dep in &inputs {
            // Recorded unconditionally: `dependents` must outlive the
            // producer's resolution (it is a superset of `waiting_data`, per
            // `§3`), so `get_dag_ids` still reports this edge for a consumer
            // added after its input already finished or errored.
            self.dependents.entry(*dep).or_default().insert(id);

            if let Some(entry) = self.cache.get(dep) {
                if let CacheEntry::Error(e) = entry {
                    trace!("thunk {id} failing: input {dep} already errored");
                    let origin = e.origin;
                    let rendered = e.origin_error.clone();
                    self.mark_errored(id, origin, rendered);
                    return true;
                }
                continue; // resolved, not waiting
            }
            waiting.insert(*dep);
            self.waiting_data.entry(*dep).or_default().insert(id);
        }

        let became_ready = waiting.is_empty();
        self.waiting.insert(id, waiting);
        if became_ready && !self.running.contains(&id) && !self.ready.contains(&id) {
            debug!("thunk {id} ready");
            self.ready.push_back(id);
        }
        became_ready
    }

    /// Record a successful completion, promote consumers, fulfil futures.
    pub fn mark_finished(&mut self, id: ThunkId, value: ThunkValue) {
        if self.finished.contains(&id) || self.errored.contains(&id) {
            return; // idempotent: a stray duplicate completion is a no-op
        }
        self.running.remove(&id);
        self.finished.insert(id);
        self.finished_at.insert(id, SystemTime::now());
        self.cache.insert(id, CacheEntry::Value(value.clone()));

        for future in self.futures.remove(&id).unwrap_or_default() {
            future.put(FutureResult::Value(value.clone()));
        }

        let consumers: Vec<ThunkId> = self.waiting_data.remove(&id).into_iter().flatten().collect();
        for consumer in consumers {
            if let Some(set) = self.waiting.get_mut(&consumer) {
                set.remove(&id);
            }
            if self.waiting.get(&consumer).is_some_and(|s| s.is_empty()) {
                self.reschedule_inputs(consumer);
            }
        }
    }

    /// Mark `id` errored with the given origin, then walk `dependents`
    /// transitively marking every downstream thunk errored too (`I4`/`§4.5`).
    pub fn mark_errored(&mut self, id: ThunkId, origin: ThunkId, origin_error: std::sync::Arc<str>) {
        if self.errored.contains(&id) {
            return;
        }
        self.running.remove(&id);
        self.ready.retain(|t| *t != id);
        self.errored.insert(id);
        self.finished_at.insert(id, SystemTime::now());
        let exception = ThunkFailedException {
            thunk: id,
            origin,
            origin_error,
        };
        self.cache.insert(id, CacheEntry::Error(exception.clone()));

        for future in self.futures.remove(&id).unwrap_or_default() {
            future.put(FutureResult::Error(exception.clone()));
        }

        let mut queue: VecDeque<ThunkId> = self.dependents.get(&id).cloned().unwrap_or_default().into_iter().collect();
        while let Some(dependent) = queue.pop_front() {
            if self.errored.contains(&dependent) {
                continue;
            }
            self.running.remove(&dependent);
            self.ready.retain(|t| *t != dependent);
            self.errored.insert(dependent);
            self.finished_at.insert(dependent, SystemTime::now());
            let propagated = exception.propagate_to(dependent);
            self.cache.insert(dependent, CacheEntry::Error(propagated.clone()));
            for future in self.futures.remove(&dependent).unwrap_or_default() {
                future.put(FutureResult::Error(propagated.clone()));
            }
            if let Some(further) = self.dependents.get(&dependent) {
                queue.extend(further.iter().copied());
            }
        }
    }

    /// True if `target` transitively depends on `requester` (walking
    /// `waiting`/input edges), i.e. registering a future the other way
    /// round would deadlock.
    pub fn is_dominator(&self, requester: ThunkId, target: ThunkId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![target];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if current == requester {
                return true;
            }
            if let Some(thunk) = self.thunk_dict.get(&current) {
                for input in thunk.inputs() {
                    if let ThunkInput::Thunk(dep) = input {
                        stack.push(*dep);
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tg_dag::{ThunkContext, ThunkFn, ThunkOptions};

    fn constant(v: u64) -> ThunkFn {
        Arc::new(move |_ctx: &dyn ThunkContext, _args: &[ThunkValue]| Ok(ThunkValue::new(v)))
    }

    #[test]
    fn linear_submit_marks_ready_and_waiting() {
        let mut state = SchedulerState::new();
        let a = Thunk::new(constant(1), vec![]);
        let a_id = a.id();
        state.submit(a).unwrap();
        assert!(state.ready.contains(&a_id));

        let b = Thunk::new(constant(0), vec![ThunkInput::Thunk(a_id)]);
        let b_id = b.id();
        state.submit(b).unwrap();
        assert!(!state.ready.contains(&b_id));
        assert!(state.waiting[&b_id].contains(&a_id));
    }

    #[test]
    fn finishing_a_producer_promotes_its_consumer() {
        let mut state = SchedulerState::new();
        let a = Thunk::new(constant(1), vec![]);
        let a_id = a.id();
        state.submit(a).unwrap();
        let b = Thunk::new(constant(0), vec![ThunkInput::Thunk(a_id)]);
        let b_id = b.id();
        state.submit(b).unwrap();

        state.mark_finished(a_id, ThunkValue::new(1u64));
        assert!(state.ready.contains(&b_id));
    }

    #[test]
    fn failure_propagates_to_all_dependents() {
        let mut state = SchedulerState::new();
        let a = Thunk::new(constant(0), vec![]);
        let a_id = a.id();
        state.submit(a).unwrap();
        let b = Thunk::new(constant(0), vec![ThunkInput::Thunk(a_id)]);
        let b_id = b.id();
        state.submit(b).unwrap();
        let c = Thunk::new(constant(0), vec![ThunkInput::Thunk(b_id)]);
        let c_id = c.id();
        state.submit(c).unwrap();

        state.mark_errored(a_id, a_id, Arc::from("boom"));
        assert!(state.errored.contains(&a_id));
        assert!(state.errored.contains(&b_id));
        assert!(state.errored.contains(&c_id));
        match &state.cache[&c_id] {
            CacheEntry::Error(e) => assert_eq!(e.origin, a_id),
            _ => panic!("expected error entry"),
        }
    }

    #[test]
    fn duplicate_completion_is_idempotent() {
        let mut state = SchedulerState::new();
        let a = Thunk::new(constant(1), vec![]);
        let a_id = a.id();
        state.submit(a).unwrap();
        state.mark_finished(a_id, ThunkValue::new(1u64));
        state.mark_finished(a_id, ThunkValue::new(2u64));
        match &state.cache[&a_id] {
            CacheEntry::Value(v) => assert_eq!(*v.downcast_ref::<u64>().unwrap(), 1),
            _ => panic!("expected value entry"),
        }
    }

    #[test]
    fn dependents_recorded_even_for_an_already_finished_producer() {
        let mut state = SchedulerState::new();
        let a = Thunk::new(constant(1), vec![]);
        let a_id = a.id();
        state.submit(a).unwrap();
        state.mark_finished(a_id, ThunkValue::new(1u64));

        // b is submitted after a already finished: the consumer edge must
        // still show up in `dependents` for get_dag_ids, even though b goes
        // straight to ready and never touches `waiting_data`.
        let b = Thunk::new(constant(0), vec![ThunkInput::Thunk(a_id)]);
        let b_id = b.id();
        state.submit(b).unwrap();

        assert!(state.ready.contains(&b_id));
        assert!(!state.waiting_data.contains_key(&a_id));
        assert!(state.dependents[&a_id].contains(&b_id));
    }

    #[test]
    fn dependents_recorded_even_for_an_already_errored_producer() {
        let mut state = SchedulerState::new();
        let a = Thunk::new(constant(0), vec![]);
        let a_id = a.id();
        state.submit(a).unwrap();
        state.mark_errored(a_id, a_id, Arc::from("boom"));

        let b = Thunk::new(constant(0), vec![ThunkInput::Thunk(a_id)]);
        let b_id = b.id();
        state.submit(b).unwrap();

        assert!(state.errored.contains(&b_id));
        assert!(state.dependents[&a_id].contains(&b_id));
    }

    #[test]
    fn status_reports_description_and_timestamps() {
        let mut state = SchedulerState::new();
        let options = ThunkOptions::new().description("answer");
        let a = Thunk::with_options(constant(1), vec![], options);
        let a_id = a.id();
        state.submit(a).unwrap();

        let before = state.status(a_id).unwrap();
        assert_eq!(before.description, "answer");
        assert!(before.dispatched_at.is_none());
        assert!(before.finished_at.is_none());

        state.dispatched_at.insert(a_id, SystemTime::now());
        state.mark_finished(a_id, ThunkValue::new(1u64));

        let after = state.status(a_id).unwrap();
        assert!(after.dispatched_at.is_some());
        assert!(after.finished_at.is_some());
    }

    #[test]
    fn dominator_detection() {
        let mut state = SchedulerState::new();
        let a = Thunk::new(constant(1), vec![]);
        let a_id = a.id();
        state.submit(a).unwrap();
        let b = Thunk::new(constant(0), vec![ThunkInput::Thunk(a_id)]);
        let b_id = b.id();
        state.submit(b).unwrap();

        assert!(state.is_dominator(a_id, b_id));
        assert!(!state.is_dominator(b_id, a_id));
    }
}
