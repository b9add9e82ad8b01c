//! Upload/download progress reporting.
//!
//! Callbacks never run on the task performing the I/O: each report is
//! spawned onto the runtime handle chosen by the caller (or the current
//! runtime when none was given), so a slow callback cannot stall a transfer.

use std::sync::Arc;

use tokio::runtime::Handle;

/// A progress report for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes transferred so far.
    pub transferred: u64,
    /// Total bytes expected, if known.
    pub total: Option<u64>,
}

impl Progress {
    /// Fraction complete in `0.0..=1.0`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some(self.transferred as f64 / total as f64),
            None => None,
        }
    }
}

/// Callback invoked with progress reports.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// A progress callback bound to the executor it must run on.
#[derive(Clone)]
pub struct ProgressSink {
    callback: ProgressCallback,
    handle: Option<Handle>,
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("dedicated_runtime", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl ProgressSink {
    /// Report on the runtime that is current when the transfer runs.
    pub fn new(callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
            handle: None,
        }
    }

    /// Report on a specific runtime, e.g. one dedicated to UI work.
    pub fn on(handle: Handle, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
            handle: Some(handle),
        }
    }

    /// Dispatch a report without waiting for the callback.
    pub fn notify(&self, progress: Progress) {
        let callback = Arc::clone(&self.callback);
        let job = move || callback(progress);
        match &self.handle {
            Some(handle) => {
                handle.spawn_blocking(job);
            }
            None => match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(job);
                }
                // No runtime to hand off to.
                Err(_) => job(),
            },
        }
    }
}
