use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, trace, warn};
use tg_dag::{FutureResult, Thunk, ThunkFn, ThunkId, ThunkInput, ThunkValue};
use tg_proc::{Context, Processor, ProcessorId, ProcessorSelector};

use crate::error::SchedulerError;
use crate::handle::{ControlCommand, ControlReply, ControlValue, SchHandle};
use crate::state::{CacheEntry, SchedulerState, ThunkStatus};

enum CompletionKind {
    Finished {
        thunk_id: ThunkId,
        /// `None` when the thunk never held a reservation at all (e.g.
        /// selection was exhausted before one was made).
        processor_id: Option<ProcessorId>,
        outcome: Result<ThunkValue, anyhow::Error>,
    },
    /// Wakes the `compute` loop when it is blocked in `recv` so a halt
    /// requested from inside a running thunk is noticed promptly.
    HaltRequested,
}

/// What `dispatch_ready` decided to do with the current head of `ready`,
/// produced while still holding the state lock so the pop/select/requeue
/// (`§4.2` step 2) stays atomic.
enum DispatchStep {
    Spawn {
        thunk_id: ThunkId,
        description: String,
        f: ThunkFn,
        args: Vec<ThunkValue>,
        processor: Arc<dyn Processor>,
    },
    Failed {
        thunk_id: ThunkId,
        error: SchedulerError,
    },
}

struct Inner {
    state: std::sync::Mutex<SchedulerState>,
    proc_ctx: Context,
    selector: ProcessorSelector,
    completion_tx: Sender<CompletionKind>,
    completion_rx: Receiver<CompletionKind>,
}

/// The scheduling kernel: owns the state store, the processor registry, and
/// the dispatch loop. Grounded on `Scheduler`/`ExecutorData` in
/// `task-maker-exec`, generalized from "build and run files" to "resolve
/// and run arbitrary thunks".
#[derive(Clone)]
pub struct Scheduler(Arc<Inner>);

impl Scheduler {
    pub fn new(procs: Vec<Arc<dyn Processor>>) -> Self {
        let proc_ctx = Context::new(procs);
        let selector = ProcessorSelector::new(&proc_ctx);
        let (completion_tx, completion_rx) = unbounded();
        Scheduler(Arc::new(Inner {
            state: std::sync::Mutex::new(SchedulerState::new()),
            proc_ctx,
            selector,
            completion_tx,
            completion_rx,
        }))
    }

    pub fn processors(&self) -> &Context {
        &self.0.proc_ctx
    }

    /// Register additional processors mid-run (`§6`'s `addprocs!`),
    /// refreshing the selector's round-robin queue so the new processors
    /// are immediately selectable instead of going stale until a rebuild.
    pub fn add_processors(&self, procs: impl IntoIterator<Item = Arc<dyn Processor>>) {
        self.0.proc_ctx.addprocs(procs);
        self.0.selector.refresh(&self.0.proc_ctx);
        self.0.proc_ctx.write_event("processors added");
    }

    /// Unregister root-level processors mid-run (`§6`'s `rmprocs!`),
    /// refreshing the selector's round-robin queue to match.
    pub fn remove_processors(&self, ids: &[ProcessorId]) {
        self.0.proc_ctx.rmprocs(ids);
        self.0.selector.refresh(&self.0.proc_ctx);
        self.0.proc_ctx.write_event("processors removed");
    }

    /// Look up a registered processor, root or descendant, by id (`§6`'s
    /// `Context::find`).
    pub fn find_processor(&self, id: ProcessorId) -> Option<Arc<dyn Processor>> {
        self.0.proc_ctx.find(id)
    }

    /// A status snapshot (description, dispatch/finish timestamps) for a
    /// known thunk, for external reporting (`§10`'s `ExecutorStatus`-alike
    /// supplement).
    pub fn status(&self, id: ThunkId) -> Option<ThunkStatus> {
        self.0.state.lock().unwrap().status(id)
    }

    /// Intern a thunk into the DAG ahead of computing anything (the static
    /// half of the graph; thunks added dynamically go through
    /// `add_thunk!` on a handle instead).
    pub fn submit(&self, thunk: Thunk) -> anyhow::Result<ThunkId> {
        let mut state = self.0.state.lock().unwrap();
        state.submit(thunk)
    }

    /// Run the dispatch loop until `root` finishes, errors, or the
    /// scheduler is halted.
    pub fn compute(&self, root: ThunkId) -> Result<ThunkValue, SchedulerError> {
        loop {
            {
                let state = self.0.state.lock().unwrap();
                if let Some(entry) = state.cache.get(&root) {
                    return match entry {
                        CacheEntry::Error(e) => Err(SchedulerError::ThunkFailed(e.clone())),
                        _ => Ok(entry.as_value().expect("non-error cache entry")),
                    };
                }
                if state.halt {
                    return Err(SchedulerError::Halted);
                }
            }

            self.dispatch_ready();

            let idle = {
                let state = self.0.state.lock().unwrap();
                state.ready.is_empty() && state.running.is_empty()
            };
            if idle {
                return Err(SchedulerError::UnknownThunk(root));
            }

            match self.0.completion_rx.recv() {
                Ok(CompletionKind::Finished { thunk_id, processor_id, outcome }) => {
                    self.admit(thunk_id, processor_id, outcome)
                }
                Ok(CompletionKind::HaltRequested) => {
                    self.0.state.lock().unwrap().halt = true;
                }
                Err(_) => return Err(SchedulerError::Halted),
            }
        }
    }

    fn admit(&self, thunk_id: ThunkId, processor_id: Option<ProcessorId>, outcome: Result<ThunkValue, anyhow::Error>) {
        if let Some(id) = processor_id {
            self.0.selector.release(id);
        }

        let mut state = self.0.state.lock().unwrap();
        let description = state
            .thunk_dict
            .get(&thunk_id)
            .map(|t| t.description().to_string())
            .unwrap_or_default();
        match outcome {
            Ok(value) => {
                info!("thunk {thunk_id} ({description}) finished");
                state.mark_finished(thunk_id, value);
            }
            Err(e) => {
                warn!("thunk {thunk_id} ({description}) failed: {e:#}");
                let rendered: Arc<str> = Arc::from(format!("{e:#}"));
                state.mark_errored(thunk_id, thunk_id, rendered);
            }
        }
    }

    /// Pop and dispatch from `ready` while there is processor capacity
    /// (`§4.2` step 2). Called both from the main loop and right after a
    /// dynamic `add_thunk!`. Stops without error the moment an eligible
    /// processor exists but all of them are reserved, leaving the thunk at
    /// the front of `ready` for the next call to retry.
    fn dispatch_ready(&self) {
        loop {
            let step = {
                let mut state = self.0.state.lock().unwrap();
                if state.halt {
                    break;
                }
                let thunk_id = match state.ready.front().copied() {
                    Some(id) => id,
                    None => break,
                };

                let (f, inputs, options, description) = {
                    let thunk = &state.thunk_dict[&thunk_id];
                    (
                        thunk.f().clone(),
                        thunk.inputs().to_vec(),
                        thunk.options().clone(),
                        thunk.description().to_string(),
                    )
                };
                let args: Vec<ThunkValue> = inputs
                    .iter()
                    .map(|input| match input {
                        ThunkInput::Value(v) => v.clone(),
                        ThunkInput::Thunk(dep) => state.cache[dep]
                            .as_value()
                            .expect("reschedule_inputs only promotes thunks whose deps finished"),
                    })
                    .collect();

                match self.0.selector.select(&options, &f, &args) {
                    Ok(Some(processor)) => {
                        state.ready.pop_front();
                        state.running.insert(thunk_id);
                        state.dispatched_at.insert(thunk_id, SystemTime::now());
                        DispatchStep::Spawn { thunk_id, description, f, args, processor }
                    }
                    Ok(None) => {
                        trace!("thunk {thunk_id} ({description}) waiting for processor capacity");
                        break;
                    }
                    Err(selection_error) => {
                        state.ready.pop_front();
                        state.running.insert(thunk_id);
                        DispatchStep::Failed {
                            thunk_id,
                            error: SchedulerError::SelectionExhausted {
                                thunk: thunk_id,
                                source: selection_error,
                            },
                        }
                    }
                }
            };

            match step {
                DispatchStep::Spawn { thunk_id, description, f, args, processor } => {
                    self.spawn_worker(thunk_id, description, f, args, processor)
                }
                DispatchStep::Failed { thunk_id, error } => {
                    trace!("thunk {thunk_id} selection exhausted");
                    self.0
                        .completion_tx
                        .send(CompletionKind::Finished {
                            thunk_id,
                            processor_id: None,
                            outcome: Err(anyhow::Error::new(error)),
                        })
                        .ok();
                }
            }
        }
    }

    fn spawn_worker(&self, thunk_id: ThunkId, description: String, f: ThunkFn, args: Vec<ThunkValue>, processor: Arc<dyn Processor>) {
        debug!("dispatching thunk {thunk_id} ({description}) to processor {}", processor.kind());

        let (cmd_tx, cmd_rx) = unbounded::<ControlCommand>();
        let (reply_tx, reply_rx) = unbounded::<ControlReply>();

        let listener_sched = self.clone();
        std::thread::spawn(move || {
            listener_sched.run_listener(thunk_id, cmd_rx, reply_tx);
        });

        let completion_tx = self.0.completion_tx.clone();
        let processor_id = processor.id();
        std::thread::spawn(move || {
            let handle = SchHandle::new(thunk_id, cmd_tx, reply_rx);

            // If `execute` panics instead of returning, this still reports a
            // completion so `compute` doesn't block forever on a thunk stuck
            // in `running`; the normal path below defuses it.
            let panic_tx = completion_tx.clone();
            let report_panic = scopeguard::guard((), move |_| {
                panic_tx
                    .send(CompletionKind::Finished {
                        thunk_id,
                        processor_id: Some(processor_id),
                        outcome: Err(anyhow::anyhow!("thunk {thunk_id} panicked")),
                    })
                    .ok();
            });

            let outcome = processor.execute(&f, &handle, &args);
            scopeguard::ScopeGuard::into_inner(report_panic);
            completion_tx
                .send(CompletionKind::Finished {
                    thunk_id,
                    processor_id: Some(processor_id),
                    outcome,
                })
                .ok();
            // dropping `handle` here drops its `cmd_tx`, closing the
            // channel the listener thread is blocked reading from.
        });
    }

    fn run_listener(&self, thunk_id: ThunkId, cmd_rx: Receiver<ControlCommand>, reply_tx: Sender<ControlReply>) {
        while let Ok(cmd) = cmd_rx.recv() {
            let reply = self.handle_control(thunk_id, cmd);
            if reply_tx.send(reply).is_err() {
                break;
            }
        }
    }

    /// Step 2 of the protocol (`§4.4`): handle one control message under
    /// the state lock and produce the reply.
    fn handle_control(&self, requester: ThunkId, cmd: ControlCommand) -> ControlReply {
        match cmd {
            ControlCommand::RegisterFuture { target, future } => {
                let mut state = self.0.state.lock().unwrap();
                if state.is_dominator(requester, target) {
                    return Err(SchedulerError::DominatorViolation { requester, target }.to_string());
                }
                match state.cache.get(&target) {
                    Some(CacheEntry::Error(e)) => future.put(FutureResult::Error(e.clone())),
                    Some(entry) => future.put(FutureResult::Value(
                        entry.as_value().expect("checked for Error above"),
                    )),
                    None => {
                        state.futures.entry(target).or_default().push(future);
                    }
                }
                Ok(ControlValue::Unit)
            }
            ControlCommand::AddThunk { f, inputs, options } => {
                let thunk = Thunk::with_options(f, inputs, options);
                let id = thunk.id();
                {
                    let mut state = self.0.state.lock().unwrap();
                    if let Err(e) = state.submit(thunk) {
                        return Err(e.to_string());
                    }
                }
                self.dispatch_ready();
                Ok(ControlValue::ThunkId(id))
            }
            ControlCommand::GetDagIds => {
                let state = self.0.state.lock().unwrap();
                let map: HashMap<ThunkId, Vec<ThunkId>> = state
                    .dependents
                    .iter()
                    .map(|(k, v)| (*k, v.iter().copied().collect()))
                    .collect();
                Ok(ControlValue::DagIds(map))
            }
            ControlCommand::Halt => {
                self.0.state.lock().unwrap().halt = true;
                self.0.completion_tx.send(CompletionKind::HaltRequested).ok();
                Ok(ControlValue::Unit)
            }
        }
    }
}

/// Convenience for the demo binary / tests: build and run a one-shot thunk
/// that is its own root, without having to thread a [`Scheduler`] through.
pub fn compute_single(
    procs: Vec<Arc<dyn Processor>>,
    thunk: Thunk,
) -> Result<ThunkValue, SchedulerError> {
    let scheduler = Scheduler::new(procs);
    let root = scheduler.submit(thunk).map_err(SchedulerError::ControlHandler)?;
    scheduler.compute(root)
}
