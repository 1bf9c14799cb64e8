use crate::error::ThunkFailedException;
use crate::value::ThunkValue;
use std::sync::{Arc, Condvar, Mutex};

/// The payload delivered to a [`Future`].
#[derive(Clone, Debug)]
pub enum FutureResult {
    Value(ThunkValue),
    Error(ThunkFailedException),
}

struct Inner {
    result: Mutex<Option<FutureResult>>,
    ready: Condvar,
}

/// A one-shot delivery slot for a thunk's result.
///
/// Cloning a `Future` shares the same slot (cheap, `Arc`-backed): the
/// scheduler hands out clones to every registrant waiting on the same
/// thunk, and the first (and only) `put` fulfils all of them. `fetch` blocks
/// the calling worker thread until a value is delivered.
#[derive(Clone)]
pub struct Future {
    inner: Arc<Inner>,
}

impl Future {
    pub fn new() -> Self {
        Future {
            inner: Arc::new(Inner {
                result: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// Deliver a result. A second `put` on an already-fulfilled future is a
    /// no-op: delivery is idempotent.
    pub fn put(&self, result: FutureResult) {
        let mut slot = self.inner.result.lock().unwrap();
        if slot.is_none() {
            *slot = Some(result);
            self.inner.ready.notify_all();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.result.lock().unwrap().is_some()
    }

    /// Block until a result is delivered, then return it (raising the
    /// embedded exception if delivery was an error).
    pub fn fetch(&self) -> Result<ThunkValue, ThunkFailedException> {
        let mut slot = self.inner.result.lock().unwrap();
        while slot.is_none() {
            slot = self.inner.ready.wait(slot).unwrap();
        }
        match slot.clone().expect("checked above") {
            FutureResult::Value(v) => Ok(v),
            FutureResult::Error(e) => Err(e),
        }
    }
}

impl Default for Future {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fetch_blocks_until_put() {
        let future = Future::new();
        let putter = future.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            putter.put(FutureResult::Value(ThunkValue::new(42u64)));
        });
        let value = future.fetch().unwrap();
        assert_eq!(*value.downcast_ref::<u64>().unwrap(), 42);
        handle.join().unwrap();
    }

    #[test]
    fn second_put_is_ignored() {
        let future = Future::new();
        future.put(FutureResult::Value(ThunkValue::new(1u64)));
        future.put(FutureResult::Value(ThunkValue::new(2u64)));
        let value = future.fetch().unwrap();
        assert_eq!(*value.downcast_ref::<u64>().unwrap(), 1);
    }

    #[test]
    fn fan_out_to_clones() {
        let future = Future::new();
        let a = future.clone();
        let b = future.clone();
        future.put(FutureResult::Value(ThunkValue::new(7u64)));
        assert!(a.is_ready());
        assert!(b.is_ready());
    }
}
