use tg_dag::ProcessorKind;

/// No compatible processor could be found for a thunk.
#[derive(Debug, thiserror::Error)]
#[error("no compatible processor found; surveyed kinds: {}", .surveyed.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", "))]
pub struct SelectionError {
    pub surveyed: Vec<ProcessorKind>,
}
