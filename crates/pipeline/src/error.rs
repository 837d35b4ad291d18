use parallax_core::CoreError;
use parallax_worker::backend::BackendError;
use parallax_worker::WorkerError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Detected before any worker is constructed; no side effects.
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    /// Opening or preparing the feature store failed.
    #[error("Store error: {0}")]
    Store(#[from] BackendError),

    /// The worker lifecycle itself misbehaved (spawn failure, vanished
    /// thread). Distinct from a job running to a Failed terminal state.
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// The worker ran and reached the Failed terminal state. Opaque: the
    /// dispatcher neither interprets nor retries it.
    #[error("{label} failed: {message}")]
    JobFailed { label: String, message: String },
}
