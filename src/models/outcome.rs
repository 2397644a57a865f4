use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How many failures `RunResult::report` lists before collapsing the rest.
const REPORTED_FAILURES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    TransportError,
    UnexpectedContentType,
    InternalError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::TransportError => "transport error",
            FailureReason::UnexpectedContentType => "unexpected content type",
            FailureReason::InternalError => "internal error",
        };
        f.write_str(s)
    }
}

/// One failed attempt as reported in `RunResult::failures`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub model: String,
    pub attempt: u32,
    pub reason: FailureReason,
    pub error: String,
}

impl Failure {
    /// Entry recorded when the run loop itself breaks down.
    pub fn loop_defect(error: impl Into<String>) -> Self {
        Self {
            model: "N/A".to_string(),
            attempt: 0,
            reason: FailureReason::InternalError,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Saved(PathBuf),
    Failed(Failure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub succeeded: bool,
    /// In completion order.
    pub failures: Vec<Failure>,
    /// Set when the stop flag ended the run. Images saved before the stop
    /// stay on disk.
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RunSummary {
    Complete,
    CompletedWithFailures { count: usize },
    Failed,
    Cancelled { failures: usize },
}

impl RunResult {
    pub fn empty_success() -> Self {
        Self {
            succeeded: true,
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn summary(&self) -> RunSummary {
        if self.cancelled {
            RunSummary::Cancelled {
                failures: self.failures.len(),
            }
        } else if !self.failures.is_empty() {
            RunSummary::CompletedWithFailures {
                count: self.failures.len(),
            }
        } else if self.succeeded {
            RunSummary::Complete
        } else {
            RunSummary::Failed
        }
    }

    pub fn report(&self) -> String {
        match self.summary() {
            RunSummary::Complete => "All images were generated and saved.".to_string(),
            RunSummary::Failed => "Generation failed: no images were produced.".to_string(),
            RunSummary::CompletedWithFailures { count } => {
                let mut msg = format!(
                    "Generation finished, but {} images could not be created:\n\n",
                    count
                );
                self.push_failures(&mut msg);
                msg
            }
            RunSummary::Cancelled { failures: 0 } => {
                "Generation stopped. Images saved before the stop were kept.".to_string()
            }
            RunSummary::Cancelled { failures } => {
                let mut msg = format!(
                    "Generation stopped. Images saved before the stop were kept; {} attempts failed:\n\n",
                    failures
                );
                self.push_failures(&mut msg);
                msg
            }
        }
    }

    fn push_failures(&self, msg: &mut String) {
        for failure in self.failures.iter().take(REPORTED_FAILURES) {
            msg.push_str(&format!("• {}: {}\n", failure.model, failure.error));
        }
        if self.failures.len() > REPORTED_FAILURES {
            msg.push_str(&format!(
                "\n... and {} more.",
                self.failures.len() - REPORTED_FAILURES
            ));
        }
    }
}
