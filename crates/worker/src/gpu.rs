//! Thread-bound GPU context handle.
//!
//! A rendering/compute context is usable only from the thread that created
//! it. [`GpuContext`] is deliberately `!Send`, so the compiler rules out
//! moving a context off its owning thread; the only way to run GPU-backed
//! work is to create the context on the thread that will run the job.

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

/// Whether this build supports GPU-context execution at all.
pub fn gpu_runtime_available() -> bool {
    cfg!(feature = "gpu")
}

#[derive(Debug, thiserror::Error)]
pub enum GpuContextError {
    #[error("this build does not support GPU-context execution")]
    Unsupported,
}

/// A process-scoped GPU context, bound to the thread that created it.
///
/// Created at most once per invocation, only after configuration validation
/// succeeded and the resolved input set is non-empty. Dropped when the worker
/// that used it reaches a terminal state.
pub struct GpuContext {
    owner: ThreadId,
    // Raw pointer marker keeps the handle !Send and !Sync.
    _thread_bound: PhantomData<*const ()>,
}

impl GpuContext {
    /// Create a context bound to the current thread.
    pub(crate) fn create() -> Result<Self, GpuContextError> {
        if !gpu_runtime_available() {
            return Err(GpuContextError::Unsupported);
        }
        let owner = thread::current().id();
        tracing::debug!(?owner, "GPU context created");
        Ok(Self {
            owner,
            _thread_bound: PhantomData,
        })
    }

    /// Whether the calling thread is the one this context is bound to.
    pub fn owns_current_thread(&self) -> bool {
        thread::current().id() == self.owner
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        tracing::debug!(owner = ?self.owner, "GPU context destroyed");
    }
}
