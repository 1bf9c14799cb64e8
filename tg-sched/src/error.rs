use tg_dag::ThunkId;
use tg_proc::SelectionError;

/// The scheduler's own error taxonomy (`§7`): conditions a caller might want
/// to branch on, as opposed to the opaque propagation `anyhow::Error`
/// provides everywhere else.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("no processor compatible with thunk {thunk}: {source}")]
    SelectionExhausted {
        thunk: ThunkId,
        #[source]
        source: SelectionError,
    },

    #[error("scheduler halted")]
    Halted,

    #[error("registering a future on thunk {target} from thunk {requester} would deadlock: {requester} is a dependency of {target}")]
    DominatorViolation { requester: ThunkId, target: ThunkId },

    #[error("unknown thunk id {0}")]
    UnknownThunk(ThunkId),

    #[error(transparent)]
    ThunkFailed(#[from] tg_dag::ThunkFailedException),

    #[error(transparent)]
    ControlHandler(#[from] anyhow::Error),
}
