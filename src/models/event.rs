use std::path::PathBuf;

use super::RunResult;

/// Notifications emitted by a running worker, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Percentage of work items completed, 0..=100.
    Progress(u8),
    ImageSaved(PathBuf),
    /// Human-readable description of one failed attempt.
    Error(String),
    /// Always the last event of a run.
    Finished(RunResult),
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::Finished(_))
    }
}
