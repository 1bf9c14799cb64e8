use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use tg_dag::{Future, ThunkContext, ThunkFn, ThunkId, ThunkInput, ThunkOptions, ThunkValue};

/// A message a running thunk sends back to the scheduler. These are exactly
/// the built-in commands of `§4.4`; an ad hoc `exec!`/`fetch`/`wait` on the
/// handle is client-side sugar built from `RegisterFuture` plus a local,
/// off-channel wait on the returned [`Future`] rather than a wire primitive
/// of its own.
pub enum ControlCommand {
    RegisterFuture { target: ThunkId, future: Future },
    AddThunk {
        f: ThunkFn,
        inputs: Vec<ThunkInput>,
        options: ThunkOptions,
    },
    GetDagIds,
    Halt,
}

/// The non-error payload of a [`ControlReply`].
pub enum ControlValue {
    Unit,
    ThunkId(ThunkId),
    DagIds(HashMap<ThunkId, Vec<ThunkId>>),
}

/// `(false, result)` / `(true, captured_error)` from `§4.4` step 2, modeled
/// as a `Result` since that is what it is.
pub type ControlReply = Result<ControlValue, String>;

/// The handle bound to one executing thunk. Implements [`ThunkContext`] so
/// thunk bodies receive it as `&dyn ThunkContext` (`§9`'s explicit handle
/// propagation) without this crate exposing its concrete type outside
/// `tg-sched`.
pub struct SchHandle {
    thunk_id: ThunkId,
    cmd_tx: Sender<ControlCommand>,
    reply_rx: Receiver<ControlReply>,
}

impl SchHandle {
    pub fn new(thunk_id: ThunkId, cmd_tx: Sender<ControlCommand>, reply_rx: Receiver<ControlReply>) -> Self {
        SchHandle {
            thunk_id,
            cmd_tx,
            reply_rx,
        }
    }

    fn roundtrip(&self, cmd: ControlCommand) -> anyhow::Result<ControlValue> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow::anyhow!("scheduler control channel closed"))?;
        self.reply_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("scheduler control channel closed"))?
            .map_err(|e| anyhow::anyhow!(e))
    }
}

impl ThunkContext for SchHandle {
    fn thunk_id(&self) -> ThunkId {
        self.thunk_id
    }

    fn exec(&self, f: ThunkFn, args: Vec<ThunkValue>) -> anyhow::Result<ThunkValue> {
        let inputs = args.into_iter().map(ThunkInput::Value).collect();
        let target = self.add_thunk(f, inputs, ThunkOptions::new())?;
        self.fetch(target)
    }

    fn fetch(&self, target: ThunkId) -> anyhow::Result<ThunkValue> {
        let future = Future::new();
        self.register_future(target, future.clone())?;
        future.fetch().map_err(|e| anyhow::anyhow!(e))
    }

    fn wait(&self, target: ThunkId) -> anyhow::Result<()> {
        self.fetch(target).map(|_| ())
    }

    fn register_future(&self, target: ThunkId, future: Future) -> anyhow::Result<()> {
        match self.roundtrip(ControlCommand::RegisterFuture { target, future })? {
            ControlValue::Unit => Ok(()),
            _ => anyhow::bail!("unexpected reply to register_future"),
        }
    }

    fn add_thunk(
        &self,
        f: ThunkFn,
        inputs: Vec<ThunkInput>,
        options: ThunkOptions,
    ) -> anyhow::Result<ThunkId> {
        match self.roundtrip(ControlCommand::AddThunk { f, inputs, options })? {
            ControlValue::ThunkId(id) => Ok(id),
            _ => anyhow::bail!("unexpected reply to add_thunk"),
        }
    }

    fn get_dag_ids(&self) -> anyhow::Result<HashMap<ThunkId, Vec<ThunkId>>> {
        match self.roundtrip(ControlCommand::GetDagIds)? {
            ControlValue::DagIds(map) => Ok(map),
            _ => anyhow::bail!("unexpected reply to get_dag_ids"),
        }
    }

    fn halt(&self) -> anyhow::Result<()> {
        match self.roundtrip(ControlCommand::Halt)? {
            ControlValue::Unit => Ok(()),
            _ => anyhow::bail!("unexpected reply to halt"),
        }
    }
}
