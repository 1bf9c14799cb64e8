/// Tunables for a scheduler run. Deliberately small: the kernel has no
/// on-disk config format (none is named by the source), so this is a plain
/// builder struct the demo binary wires to `clap` flags, the same role
/// `ExecutionDAGConfig` plays for the teacher's DAG runs.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Worker threads in the default process/thread processor pool.
    pub thread_count: usize,
}

impl SchedulerConfig {
    pub fn new(thread_count: usize) -> Self {
        SchedulerConfig {
            thread_count: thread_count.max(1),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { thread_count: 4 }
    }
}
