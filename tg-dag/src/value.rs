use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Identifies a processor across the cluster. Opaque to this crate; `tg-proc`
/// mints and interprets these.
pub type ProcessorId = uuid::Uuid;

/// A thunk result or argument, boxed so it can move between workers without
/// this crate knowing its concrete type. `exec!`-invoked functions pass and
/// return these.
#[derive(Clone)]
pub struct ThunkValue(Arc<dyn Any + Send + Sync>);

impl ThunkValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        ThunkValue(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for ThunkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThunkValue").field(&"..").finish()
    }
}

/// An opaque reference to a value already materialized on some processor.
///
/// Cache entries for finished thunks are either inline [`ThunkValue`]s or a
/// `Chunk` pointing at a value that still lives where it was produced;
/// `Processor::move_value` is how a consumer on a different processor gets
/// at it.
#[derive(Clone, Debug)]
pub struct Chunk {
    value: ThunkValue,
    processor: ProcessorId,
}

impl Chunk {
    pub fn new(value: ThunkValue, processor: ProcessorId) -> Self {
        Chunk { value, processor }
    }

    pub fn value(&self) -> &ThunkValue {
        &self.value
    }

    pub fn processor(&self) -> ProcessorId {
        self.processor
    }

    pub fn into_value(self) -> ThunkValue {
        self.value
    }
}
