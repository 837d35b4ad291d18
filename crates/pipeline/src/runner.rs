//! Execution-path resolution for GPU-requiring workers.
//!
//! A GPU context is bound to the thread that creates it, so GPU-backed work
//! must run on a thread that owns a context. The runner decides the path once
//! per invocation and executes the worker over it; the context itself is
//! created on the worker thread and never leaves it.

use parallax_worker::gpu::gpu_runtime_available;
use parallax_worker::{Worker, WorkerError, WorkerOutcome};

/// Where a worker executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Plain worker thread, no GPU context.
    Direct,
    /// Dedicated thread that creates and owns a GPU context for the run.
    GpuContextThread,
}

impl ExecutionPath {
    /// The context-thread path is taken iff GPU acceleration is requested
    /// and this build supports GPU-context execution.
    pub fn resolve_with(use_gpu: bool, gpu_available: bool) -> Self {
        if use_gpu && gpu_available {
            Self::GpuContextThread
        } else {
            Self::Direct
        }
    }

    /// Resolve against this build's GPU support.
    pub fn resolve(use_gpu: bool) -> Self {
        Self::resolve_with(use_gpu, gpu_runtime_available())
    }
}

/// Start the worker over `path` and block until it reaches a terminal state.
pub async fn execute(mut worker: Worker, path: ExecutionPath) -> Result<WorkerOutcome, WorkerError> {
    tracing::debug!(worker = worker.label(), ?path, "Executing worker");
    match path {
        ExecutionPath::Direct => worker.start()?,
        ExecutionPath::GpuContextThread => worker.start_with_gpu_context()?,
    }
    worker.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_thread_requires_request_and_support() {
        assert_eq!(
            ExecutionPath::resolve_with(true, true),
            ExecutionPath::GpuContextThread
        );
        assert_eq!(ExecutionPath::resolve_with(true, false), ExecutionPath::Direct);
        assert_eq!(ExecutionPath::resolve_with(false, true), ExecutionPath::Direct);
        assert_eq!(
            ExecutionPath::resolve_with(false, false),
            ExecutionPath::Direct
        );
    }

    #[test]
    fn resolve_uses_build_support() {
        assert_eq!(
            ExecutionPath::resolve(true),
            ExecutionPath::resolve_with(true, gpu_runtime_available())
        );
        assert_eq!(ExecutionPath::resolve(false), ExecutionPath::Direct);
    }
}
