//! Worker lifecycle, GPU context ownership, and the job variant family.
//!
//! A [`lifecycle::Worker`] wraps exactly one job from [`jobs`] and runs it on
//! its own thread; when the job needs GPU acceleration, that thread also owns
//! the [`gpu::GpuContext`] for the worker's whole run. Collaborators the jobs
//! consume (descriptor backend, match kernel, feature store) are the narrow
//! traits in [`backend`], with default implementations in [`kernel`] and
//! [`sidecar`].

pub mod backend;
pub mod gpu;
pub mod jobs;
pub mod kernel;
pub mod lifecycle;
pub mod sidecar;

pub use lifecycle::{Worker, WorkerError, WorkerOutcome, WorkerState};
