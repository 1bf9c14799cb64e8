use crate::context::ThunkFn;
use crate::value::{ProcessorId, ThunkValue};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique, monotonically increasing thunk identifier.
///
/// Cheap to copy and to send across the control channel in place of the
/// thunk itself (mirrors the role `ExecutionUuid` plays for `Execution` in
/// the execution-graph world this crate draws on, except it is a plain
/// counter rather than a `Uuid` since the source only requires process-local
/// uniqueness).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ThunkId(u64);

impl ThunkId {
    fn next() -> Self {
        ThunkId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ThunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThunkId({})", self.0)
    }
}

impl fmt::Display for ThunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A processor kind tag, as named in a [`ProcList`] restriction. Concrete
/// processors in `tg-proc` each report one; this crate only needs to compare
/// them.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ProcessorKind(pub String);

impl ProcessorKind {
    pub fn new(name: impl Into<String>) -> Self {
        ProcessorKind(name.into())
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The `proclist` thunk option: which processors are eligible to run a
/// thunk.
#[derive(Clone)]
pub enum ProcList {
    /// Unset: any processor with `default_enabled() == true` is eligible.
    Any,
    /// Restrict to processors satisfying a predicate over their kind.
    Predicate(Arc<dyn Fn(&ProcessorKind) -> bool + Send + Sync>),
    /// Restrict to one of the named kinds.
    Kinds(Vec<ProcessorKind>),
}

impl Default for ProcList {
    fn default() -> Self {
        ProcList::Any
    }
}

impl fmt::Debug for ProcList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcList::Any => write!(f, "ProcList::Any"),
            ProcList::Predicate(_) => write!(f, "ProcList::Predicate(..)"),
            ProcList::Kinds(kinds) => write!(f, "ProcList::Kinds({kinds:?})"),
        }
    }
}

/// One of a thunk's input arguments: either a value known up front, or a
/// reference to another thunk whose result will be substituted once it
/// finishes.
#[derive(Clone, Debug)]
pub enum ThunkInput {
    Value(ThunkValue),
    Thunk(ThunkId),
}

/// Per-thunk scheduling options (the keyword options of `compute`/`add_thunk!`
/// in the external interface).
#[derive(Clone, Debug, Default)]
pub struct ThunkOptions {
    pub single: Option<ProcessorId>,
    pub proclist: ProcList,
    pub get_result: bool,
    pub meta: bool,
    pub persist: bool,
    pub cache: bool,
    pub description: Option<String>,
}

impl ThunkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(mut self, proc: ProcessorId) -> Self {
        self.single = Some(proc);
        self
    }

    pub fn proclist(mut self, proclist: ProcList) -> Self {
        self.proclist = proclist;
        self
    }

    pub fn get_result(mut self, value: bool) -> Self {
        self.get_result = value;
        self
    }

    pub fn meta(mut self, value: bool) -> Self {
        self.meta = value;
        self
    }

    pub fn persist(mut self, value: bool) -> Self {
        self.persist = value;
        self
    }

    pub fn cache(mut self, value: bool) -> Self {
        self.cache = value;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An immutable descriptor of a unit of work: a function, its inputs, and the
/// options that govern where and how it runs.
///
/// A `Thunk` never changes after construction; all mutable bookkeeping about
/// it (which state it is in, who is waiting on it, its cached result) lives
/// in the scheduler's state store, keyed by [`ThunkId`].
#[derive(Clone)]
pub struct Thunk {
    id: ThunkId,
    f: ThunkFn,
    inputs: Vec<ThunkInput>,
    options: ThunkOptions,
}

impl Thunk {
    /// Create a thunk with default options and assign it a fresh id.
    pub fn new(f: ThunkFn, inputs: Vec<ThunkInput>) -> Self {
        Thunk {
            id: ThunkId::next(),
            f,
            inputs,
            options: ThunkOptions::new(),
        }
    }

    pub fn with_options(f: ThunkFn, inputs: Vec<ThunkInput>, options: ThunkOptions) -> Self {
        Thunk {
            id: ThunkId::next(),
            f,
            inputs,
            options,
        }
    }

    pub fn id(&self) -> ThunkId {
        self.id
    }

    pub fn f(&self) -> &ThunkFn {
        &self.f
    }

    pub fn inputs(&self) -> &[ThunkInput] {
        &self.inputs
    }

    pub fn options(&self) -> &ThunkOptions {
        &self.options
    }

    pub fn description(&self) -> &str {
        self.options
            .description
            .as_deref()
            .unwrap_or("<unnamed thunk>")
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("id", &self.id)
            .field("inputs", &self.inputs.len())
            .field("description", &self.options.description)
            .finish()
    }
}

impl PartialEq for Thunk {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Thunk {}

impl std::hash::Hash for Thunk {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
