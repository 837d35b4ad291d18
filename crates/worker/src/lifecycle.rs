//! Worker lifecycle: `Created → Running → {Completed, Failed}`.
//!
//! A [`Worker`] owns exactly one job for the duration of one invocation.
//! `start()` spawns the worker thread (optionally as the GPU-context-owning
//! thread) and `wait()` blocks the calling task until the job reaches a
//! terminal state. There is no cancellation: once started, the only remaining
//! action is to wait.

use std::thread;

use tokio::sync::oneshot;

use crate::backend::BackendError;
use crate::gpu::{GpuContext, GpuContextError};

/// Lifecycle states of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Completed,
    Failed,
}

/// Pure transition table for [`WorkerState`].
pub mod state {
    use super::WorkerState;

    /// Returns the set of states reachable from `from`.
    ///
    /// Terminal states return an empty slice.
    pub fn valid_transitions(from: WorkerState) -> &'static [WorkerState] {
        match from {
            WorkerState::Created => &[WorkerState::Running],
            WorkerState::Running => &[WorkerState::Completed, WorkerState::Failed],
            WorkerState::Completed | WorkerState::Failed => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: WorkerState, to: WorkerState) -> bool {
        valid_transitions(from).contains(&to)
    }
}

/// A failure reported by a running job. Opaque to the dispatcher: no retry,
/// no partial-failure interpretation.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Gpu(#[from] GpuContextError),
}

/// The unit of long-running background work a worker executes.
///
/// One implementation per job kind; the variant is selected once at
/// configuration time and never re-dispatched after construction.
pub trait Job: Send + 'static {
    fn label(&self) -> &'static str;

    /// Run to completion on the current thread. `gpu` is `Some` exactly when
    /// the worker thread owns a GPU context.
    fn run(&mut self, gpu: Option<&GpuContext>) -> Result<(), JobError>;
}

/// Terminal result of one worker run.
#[derive(Debug)]
pub struct WorkerOutcome {
    /// `Completed` or `Failed`.
    pub state: WorkerState,
    pub error: Option<JobError>,
    /// Whether a GPU context was actually created for this run.
    pub gpu_context_used: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker was already started")]
    AlreadyStarted,

    #[error("wait() called before start(), or called twice")]
    NotStarted,

    #[error("worker thread terminated without reporting an outcome")]
    Vanished,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Owns one job and the thread that runs it.
pub struct Worker {
    label: &'static str,
    job: Option<Box<dyn Job>>,
    state: WorkerState,
    done: Option<oneshot::Receiver<WorkerOutcome>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn new(job: Box<dyn Job>) -> Self {
        Self {
            label: job.label(),
            job: Some(job),
            state: WorkerState::Created,
            done: None,
            thread: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// The state as observed from the invoking task. Terminal states become
    /// visible once `wait()` returns.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Begin execution on a worker thread, without GPU support.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        self.spawn(false)
    }

    /// Begin execution on a dedicated thread that creates and owns a
    /// [`GpuContext`] for the whole run.
    pub fn start_with_gpu_context(&mut self) -> Result<(), WorkerError> {
        self.spawn(true)
    }

    fn spawn(&mut self, with_gpu: bool) -> Result<(), WorkerError> {
        let mut job = self.job.take().ok_or(WorkerError::AlreadyStarted)?;
        debug_assert!(state::can_transition(self.state, WorkerState::Running));

        let (tx, rx) = oneshot::channel();
        let label = self.label;
        let handle = thread::Builder::new()
            .name(format!("worker-{label}"))
            .spawn(move || {
                let outcome = run_job(job.as_mut(), with_gpu, label);
                let _ = tx.send(outcome);
            })
            .map_err(WorkerError::Spawn)?;

        self.state = WorkerState::Running;
        self.done = Some(rx);
        self.thread = Some(handle);
        Ok(())
    }

    /// Block until the job reaches a terminal state. Valid exactly once per
    /// `start()`.
    pub async fn wait(&mut self) -> Result<WorkerOutcome, WorkerError> {
        let rx = self.done.take().ok_or(WorkerError::NotStarted)?;
        let outcome = rx.await.map_err(|_| WorkerError::Vanished)?;

        debug_assert!(state::can_transition(self.state, outcome.state));
        self.state = outcome.state;

        // The outcome has been sent, so the thread is finishing; join it so
        // nothing outlives the invocation scope.
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        Ok(outcome)
    }
}

/// Runs on the worker thread. Creates the GPU context here when requested, so
/// the context is born, used, and dropped on the thread that owns it.
fn run_job(job: &mut dyn Job, with_gpu: bool, label: &'static str) -> WorkerOutcome {
    let gpu = if with_gpu {
        match GpuContext::create() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::error!(worker = label, error = %e, "GPU context creation failed");
                return WorkerOutcome {
                    state: WorkerState::Failed,
                    error: Some(e.into()),
                    gpu_context_used: false,
                };
            }
        }
    } else {
        None
    };

    tracing::info!(worker = label, gpu = gpu.is_some(), "Worker started");
    match job.run(gpu.as_ref()) {
        Ok(()) => {
            tracing::info!(worker = label, "Worker completed");
            WorkerOutcome {
                state: WorkerState::Completed,
                error: None,
                gpu_context_used: gpu.is_some(),
            }
        }
        Err(e) => {
            tracing::error!(worker = label, error = %e, "Worker failed");
            WorkerOutcome {
                state: WorkerState::Failed,
                error: Some(e),
                gpu_context_used: gpu.is_some(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- state machine --------------------------------------------------------

    #[test]
    fn created_can_only_start_running() {
        assert!(state::can_transition(
            WorkerState::Created,
            WorkerState::Running
        ));
        assert!(!state::can_transition(
            WorkerState::Created,
            WorkerState::Completed
        ));
        assert!(!state::can_transition(
            WorkerState::Created,
            WorkerState::Failed
        ));
    }

    #[test]
    fn running_reaches_both_terminal_states() {
        assert!(state::can_transition(
            WorkerState::Running,
            WorkerState::Completed
        ));
        assert!(state::can_transition(
            WorkerState::Running,
            WorkerState::Failed
        ));
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(state::valid_transitions(WorkerState::Completed).is_empty());
        assert!(state::valid_transitions(WorkerState::Failed).is_empty());
    }

    // -- worker ---------------------------------------------------------------

    struct StubJob {
        fail: bool,
    }

    impl Job for StubJob {
        fn label(&self) -> &'static str {
            "stub"
        }

        fn run(&mut self, _gpu: Option<&GpuContext>) -> Result<(), JobError> {
            if self.fail {
                Err(JobError::Backend(BackendError::MissingFeatures(1)))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn worker_runs_to_completed() {
        let mut worker = Worker::new(Box::new(StubJob { fail: false }));
        assert_eq!(worker.state(), WorkerState::Created);

        worker.start().unwrap();
        assert_eq!(worker.state(), WorkerState::Running);

        let outcome = worker.wait().await.unwrap();
        assert_eq!(outcome.state, WorkerState::Completed);
        assert!(outcome.error.is_none());
        assert!(!outcome.gpu_context_used);
        assert_eq!(worker.state(), WorkerState::Completed);
    }

    #[tokio::test]
    async fn worker_failure_is_terminal_and_opaque() {
        let mut worker = Worker::new(Box::new(StubJob { fail: true }));
        worker.start().unwrap();
        let outcome = worker.wait().await.unwrap();
        assert_eq!(outcome.state, WorkerState::Failed);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let mut worker = Worker::new(Box::new(StubJob { fail: false }));
        worker.start().unwrap();
        assert_matches!(worker.start(), Err(WorkerError::AlreadyStarted));
        worker.wait().await.unwrap();
    }

    #[tokio::test]
    async fn wait_before_start_is_rejected() {
        let mut worker = Worker::new(Box::new(StubJob { fail: false }));
        assert_matches!(worker.wait().await, Err(WorkerError::NotStarted));
    }

    #[tokio::test]
    async fn wait_twice_is_rejected() {
        let mut worker = Worker::new(Box::new(StubJob { fail: false }));
        worker.start().unwrap();
        worker.wait().await.unwrap();
        assert_matches!(worker.wait().await, Err(WorkerError::NotStarted));
    }

    #[cfg(feature = "gpu")]
    #[tokio::test]
    async fn gpu_worker_owns_its_context() {
        struct GpuCheckJob;

        impl Job for GpuCheckJob {
            fn label(&self) -> &'static str {
                "gpu-check"
            }

            fn run(&mut self, gpu: Option<&GpuContext>) -> Result<(), JobError> {
                let ctx = gpu.expect("gpu context expected");
                assert!(ctx.owns_current_thread());
                Ok(())
            }
        }

        let mut worker = Worker::new(Box::new(GpuCheckJob));
        worker.start_with_gpu_context().unwrap();
        let outcome = worker.wait().await.unwrap();
        assert_eq!(outcome.state, WorkerState::Completed);
        assert!(outcome.gpu_context_used);
    }
}
