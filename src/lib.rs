pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod pollinations;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::GeneratorConfig;
pub use error::{GenerationError, Result};
pub use models::{
    AttemptOutcome, Failure, FailureReason, GenerationRequest, RunResult, RunSummary, SizePreset,
    WorkItem, WorkerEvent, BUILTIN_MODELS,
};
pub use pollinations::{ImageClient, ModelClient, PollinationsClient};
pub use worker::{BatchWorker, ImageBackend, StopHandle, WorkerHandle};
