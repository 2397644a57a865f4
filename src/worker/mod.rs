pub mod backend;
pub mod naming;
pub mod persist;
pub mod progress;

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::{
    error::{GenerationError, Result},
    logger,
    models::{AttemptOutcome, Failure, GenerationRequest, RunResult, WorkItem, WorkerEvent},
};

pub use backend::ImageBackend;
pub use progress::Progress;

/// Cooperative cancellation flag. Cheap to clone, callable from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes effect at the next item boundary; an in-flight request finishes first.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Runs one batch: every model × every repetition, sequentially.
/// Single use; `run` and `spawn` consume the worker.
pub struct BatchWorker {
    request: GenerationRequest,
    backend: Arc<dyn ImageBackend>,
    stop: StopHandle,
    run_id: Uuid,
    #[cfg(test)]
    panic_after_items: Option<usize>,
}

impl BatchWorker {
    pub fn new(request: GenerationRequest, backend: Arc<dyn ImageBackend>) -> Self {
        Self {
            request,
            backend,
            stop: StopHandle::new(),
            run_id: Uuid::new_v4(),
            #[cfg(test)]
            panic_after_items: None,
        }
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        log::info!("🛑 [run {}] Stop requested", self.run_id);
        self.stop.stop();
    }

    /// Starts the run on its own tokio task.
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = self.stop.clone();
        let task = tokio::spawn(self.run(tx));
        WorkerHandle {
            events: rx,
            stop,
            task,
        }
    }

    /// Executes the run in the current task. `Finished` is always the last
    /// event sent on `events`; the same result is returned.
    pub async fn run(self, events: UnboundedSender<WorkerEvent>) -> RunResult {
        let _timer = logger::timer(&format!("batch run {}", self.run_id));

        let result = match AssertUnwindSafe(self.execute(&events)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let result = loop_defect_result(payload.as_ref());
                if let Some(failure) = result.failures.first() {
                    let message = format!("Critical error in generation task: {}", failure.error);
                    log::error!("❌ [run {}] {}", self.run_id, message);
                    let _ = events.send(WorkerEvent::Error(message));
                }
                result
            }
        };

        log::info!(
            "🏁 [run {}] Finished: succeeded={} failures={}",
            self.run_id,
            result.succeeded,
            result.failures.len()
        );
        let _ = events.send(WorkerEvent::Finished(result.clone()));
        result
    }

    async fn execute(&self, events: &UnboundedSender<WorkerEvent>) -> RunResult {
        let total = self.request.total_attempts();
        if total == 0 {
            log::info!("[run {}] Nothing to generate", self.run_id);
            return RunResult::empty_success();
        }

        log::info!(
            "🚀 [run {}] Generating {} images ({} models × {}) into {}",
            self.run_id,
            total,
            self.request.models.len(),
            self.request.repetitions,
            self.request.output_dir.display()
        );

        let mut progress = Progress::new(total);
        let mut saved = 0usize;
        let mut failures = Vec::new();

        for item in self.request.work_items() {
            // Covers both the per-model and the per-attempt checkpoint.
            if self.stop.is_stopped() {
                break;
            }

            match self.attempt(item).await {
                AttemptOutcome::Saved(path) => {
                    saved += 1;
                    log::info!("💾 [run {}] Saved {}", self.run_id, path.display());
                    let _ = events.send(WorkerEvent::ImageSaved(path));
                }
                AttemptOutcome::Failed(failure) => {
                    let message = format!(
                        "Model '{}' (attempt {}): {}",
                        failure.model, failure.attempt, failure.error
                    );
                    log::warn!("⚠️  [run {}] {}", self.run_id, message);
                    let _ = events.send(WorkerEvent::Error(message));
                    failures.push(failure);
                }
            }
            let _ = events.send(WorkerEvent::Progress(progress.complete_one()));

            #[cfg(test)]
            if self.panic_after_items == Some(progress.completed()) {
                panic!("run loop broke after {} items", progress.completed());
            }
        }

        let cancelled = self.stop.is_stopped();
        if cancelled {
            log::warn!(
                "[run {}] Cancelled after {}/{} attempts",
                self.run_id,
                progress.completed(),
                progress.total()
            );
        }

        RunResult {
            succeeded: saved > 0 && !cancelled,
            failures,
            cancelled,
        }
    }

    async fn attempt(&self, item: WorkItem<'_>) -> AttemptOutcome {
        let fetched = AssertUnwindSafe(self.backend.fetch(&self.request, item.model))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(GenerationError::Internal(panic_message(payload.as_ref())))
            });

        let saved = match fetched {
            Ok(bytes) => persist::save_jpeg(bytes, &self.request.output_dir, item).await,
            Err(e) => Err(e),
        };

        match saved {
            Ok(path) => AttemptOutcome::Saved(path),
            Err(e) => AttemptOutcome::Failed(Failure {
                model: item.model.to_string(),
                attempt: item.attempt,
                reason: e.reason(),
                error: e.to_string(),
            }),
        }
    }
}

/// Caller side of a spawned run.
pub struct WorkerHandle {
    events: UnboundedReceiver<WorkerEvent>,
    stop: StopHandle,
    task: JoinHandle<RunResult>,
}

impl WorkerHandle {
    /// Next notification; `None` once `Finished` has been delivered.
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The notifications as a stream. The run keeps going in the background.
    pub fn into_stream(self) -> UnboundedReceiverStream<WorkerEvent> {
        UnboundedReceiverStream::new(self.events)
    }

    /// Waits for the run without consuming notifications.
    pub async fn join(self) -> Result<RunResult> {
        self.task
            .await
            .map_err(|e| GenerationError::Internal(format!("Worker task failed: {}", e)))
    }

    /// Drains every notification up to and including `Finished`.
    pub async fn collect_events(mut self) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

fn loop_defect_result(payload: &(dyn Any + Send)) -> RunResult {
    RunResult {
        succeeded: false,
        failures: vec![Failure::loop_defect(panic_message(payload))],
        cancelled: false,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureReason;
    use crate::test_support::png_bytes;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Image,
        Timeout,
        NotImage,
        Garbage,
        Panic,
    }

    /// Plays back one step per call, in order.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<String>>,
        stop_on_call: Mutex<Option<(usize, StopHandle)>>,
    }

    impl ScriptedBackend {
        fn new(steps: &[Step]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(steps.iter().copied().collect()),
                calls: Mutex::new(Vec::new()),
                stop_on_call: Mutex::new(None),
            })
        }

        fn stop_during_call(&self, call: usize, handle: StopHandle) {
            *self.stop_on_call.lock().unwrap() = Some((call, handle));
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageBackend for ScriptedBackend {
        async fn fetch(&self, _request: &GenerationRequest, model: &str) -> Result<Bytes> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(model.to_string());
                calls.len()
            };
            if let Some((at, handle)) = self.stop_on_call.lock().unwrap().as_ref() {
                if *at == call {
                    handle.stop();
                }
            }
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Image);
            match step {
                Step::Image => Ok(Bytes::from(png_bytes())),
                Step::Timeout => Err(GenerationError::Timeout),
                Step::NotImage => Err(GenerationError::UnexpectedContentType {
                    content_type: "text/html".into(),
                    snippet: "<html>".into(),
                }),
                Step::Garbage => Ok(Bytes::from_static(b"definitely not a png")),
                Step::Panic => panic!("backend exploded"),
            }
        }
    }

    fn request(dir: &std::path::Path, models: &[&str], repetitions: u32) -> GenerationRequest {
        GenerationRequest::new("a red fox in snow", dir)
            .with_models(models.iter().copied())
            .with_size(512, 512)
            .with_repetitions(repetitions)
    }

    async fn run_collect(worker: BatchWorker) -> (Vec<WorkerEvent>, RunResult) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = worker.run(tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (events, result)
    }

    fn progress_values(events: &[WorkerEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn saved_paths(events: &[WorkerEvent]) -> Vec<std::path::PathBuf> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::ImageSaved(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    fn error_count(events: &[WorkerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, WorkerEvent::Error(_)))
            .count()
    }

    #[tokio::test]
    async fn test_empty_request_is_trivial_success() {
        let dir = tempfile::tempdir().unwrap();
        for req in [request(dir.path(), &[], 3), request(dir.path(), &["m1"], 0)] {
            let backend = ScriptedBackend::new(&[]);
            let (events, result) = run_collect(BatchWorker::new(req, backend.clone())).await;
            assert_eq!(result, RunResult::empty_success());
            assert_eq!(events, vec![WorkerEvent::Finished(RunResult::empty_success())]);
            assert!(backend.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_all_attempts_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Image, Step::Image]);
        let worker = BatchWorker::new(request(dir.path(), &["m1"], 2), backend);
        let (events, result) = run_collect(worker).await;

        assert_eq!(progress_values(&events), vec![50, 100]);
        let saved = saved_paths(&events);
        assert_eq!(saved.len(), 2);
        assert_ne!(saved[0], saved[1]);
        for path in &saved {
            assert!(path.exists());
            assert!(path.to_string_lossy().ends_with(".jpg"));
        }
        assert_eq!(result, RunResult::empty_success());
        assert_eq!(events.last(), Some(&WorkerEvent::Finished(result)));
    }

    #[tokio::test]
    async fn test_timeout_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Timeout, Step::Image]);
        let worker = BatchWorker::new(request(dir.path(), &["m1", "m2"], 1), backend.clone());
        let (events, result) = run_collect(worker).await;

        assert_eq!(backend.calls(), vec!["m1", "m2"]);
        assert_eq!(progress_values(&events), vec![50, 100]);
        assert_eq!(saved_paths(&events).len(), 1);
        assert_eq!(error_count(&events), 1);
        assert!(matches!(&events[0], WorkerEvent::Error(msg) if msg.contains("'m1' (attempt 1)")));
        assert_eq!(events[1], WorkerEvent::Progress(50));

        assert!(result.succeeded);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].model, "m1");
        assert_eq!(result.failures[0].attempt, 1);
        assert_eq!(result.failures[0].reason, FailureReason::Timeout);
    }

    #[tokio::test]
    async fn test_every_attempt_wrong_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::NotImage, Step::NotImage, Step::NotImage]);
        let worker = BatchWorker::new(request(dir.path(), &["m1"], 3), backend);
        let (events, result) = run_collect(worker).await;

        assert!(!result.succeeded);
        assert_eq!(result.failures.len(), 3);
        assert!(result
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::UnexpectedContentType));
        let attempts: Vec<u32> = result.failures.iter().map(|f| f.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(progress_values(&events), vec![33, 66, 100]);
        assert_eq!(error_count(&events), 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_and_panic_are_internal_errors() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Garbage, Step::Panic, Step::Image]);
        let worker = BatchWorker::new(request(dir.path(), &["m1"], 3), backend);
        let (events, result) = run_collect(worker).await;

        assert!(result.succeeded);
        assert_eq!(result.failures.len(), 2);
        assert!(result
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::InternalError));
        assert!(result.failures[1].error.contains("backend exploded"));
        assert_eq!(saved_paths(&events).len(), 1);
        assert_eq!(progress_values(&events), vec![33, 66, 100]);
    }

    #[tokio::test]
    async fn test_stop_before_start_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[]);
        let worker = BatchWorker::new(request(dir.path(), &["m1", "m2"], 2), backend.clone());
        worker.stop();
        let (events, result) = run_collect(worker).await;

        assert!(backend.calls().is_empty());
        assert!(!result.succeeded);
        assert!(result.failures.is_empty());
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[tokio::test]
    async fn test_stop_during_first_attempt_lets_it_finish() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Image, Step::Image, Step::Image, Step::Image]);
        let worker = BatchWorker::new(request(dir.path(), &["m1", "m2"], 2), backend.clone());
        backend.stop_during_call(1, worker.stop_handle());

        let events = worker.spawn().collect_events().await;

        assert_eq!(backend.calls(), vec!["m1"]);
        assert_eq!(saved_paths(&events).len(), 1);
        assert_eq!(progress_values(&events), vec![25]);
        assert_eq!(
            events.last(),
            Some(&WorkerEvent::Finished(RunResult {
                succeeded: false,
                failures: Vec::new(),
                cancelled: true,
            }))
        );
    }

    #[tokio::test]
    async fn test_stop_between_models_keeps_failures() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Image, Step::Timeout, Step::Image]);
        let worker = BatchWorker::new(request(dir.path(), &["m1", "m2"], 2), backend.clone());
        backend.stop_during_call(2, worker.stop_handle());

        let handle = worker.spawn();
        let result = {
            let events = handle.collect_events().await;
            match events.last() {
                Some(WorkerEvent::Finished(result)) => result.clone(),
                other => panic!("expected terminal event, got {:?}", other),
            }
        };

        assert_eq!(backend.calls(), vec!["m1", "m1"]);
        assert!(!result.succeeded);
        assert!(result.cancelled);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].reason, FailureReason::Timeout);
    }

    #[tokio::test]
    async fn test_progress_non_decreasing_and_counts_match() {
        let dir = tempfile::tempdir().unwrap();
        let steps = [
            Step::Image,
            Step::Timeout,
            Step::NotImage,
            Step::Image,
            Step::Garbage,
            Step::Image,
            Step::Timeout,
        ];
        let backend = ScriptedBackend::new(&steps);
        let req = request(dir.path(), &["a", "b", "c", "d", "e", "f", "g"], 1);
        let (events, result) = run_collect(BatchWorker::new(req, backend)).await;

        let progress = progress_values(&events);
        assert_eq!(progress.len(), 7);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
        assert_eq!(saved_paths(&events).len() + result.failures.len(), 7);
        assert!(result.succeeded);
    }

    #[tokio::test]
    async fn test_join_returns_result() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Timeout]);
        let handle = BatchWorker::new(request(dir.path(), &["m1"], 1), backend).spawn();
        let result = handle.join().await.unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_event_stream_ends_after_finished() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Image, Step::NotImage]);
        let events: Vec<WorkerEvent> = BatchWorker::new(request(dir.path(), &["m1", "m2"], 1), backend)
            .spawn()
            .into_stream()
            .collect()
            .await;

        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], WorkerEvent::ImageSaved(_)));
        assert_eq!(events[1], WorkerEvent::Progress(50));
        assert!(matches!(events[2], WorkerEvent::Error(_)));
        assert_eq!(events[3], WorkerEvent::Progress(100));
        assert!(events[4].is_terminal());
    }

    #[tokio::test]
    async fn test_stopped_run_reports_cancelled_not_failed() {
        use crate::models::RunSummary;

        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Image; 4]);
        let worker = BatchWorker::new(request(dir.path(), &["m1", "m2"], 2), backend.clone());
        backend.stop_during_call(1, worker.stop_handle());

        let (events, result) = run_collect(worker).await;

        assert_eq!(saved_paths(&events).len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(!result.succeeded);
        assert!(result.cancelled);
        assert_eq!(result.summary(), RunSummary::Cancelled { failures: 0 });
        assert!(!result.report().contains("no images were produced"));
    }

    #[tokio::test]
    async fn test_completed_run_is_not_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Timeout, Step::Image]);
        let worker = BatchWorker::new(request(dir.path(), &["m1"], 2), backend);
        let (_, result) = run_collect(worker).await;
        assert!(result.succeeded);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_loop_panic_ends_run_with_single_synthetic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(&[Step::Image, Step::Timeout, Step::Image]);
        let mut worker = BatchWorker::new(request(dir.path(), &["m1"], 3), backend.clone());
        worker.panic_after_items = Some(2);

        let (events, result) = run_collect(worker).await;

        assert_eq!(backend.calls(), vec!["m1", "m1"]);
        assert_eq!(events.len(), 6, "{:?}", events);
        assert!(matches!(events[0], WorkerEvent::ImageSaved(_)));
        assert_eq!(events[1], WorkerEvent::Progress(33));
        assert!(matches!(&events[2], WorkerEvent::Error(msg) if msg.contains("'m1' (attempt 2)")));
        assert_eq!(events[3], WorkerEvent::Progress(66));
        assert!(matches!(
            &events[4],
            WorkerEvent::Error(msg) if msg.starts_with("Critical error in generation task")
                && msg.contains("run loop broke after 2 items")
        ));

        let expected = RunResult {
            succeeded: false,
            failures: vec![Failure::loop_defect("run loop broke after 2 items")],
            cancelled: false,
        };
        assert_eq!(result, expected);
        assert_eq!(events[5], WorkerEvent::Finished(expected));
    }

    #[test]
    fn test_loop_defect_result() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("index out of bounds"));
        let result = loop_defect_result(payload.as_ref());
        assert!(!result.succeeded);
        assert_eq!(result.failures, vec![Failure::loop_defect("index out of bounds")]);
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
