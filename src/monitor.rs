//! Cooperative cancellation and progress reporting for long-running estimations.

use crate::error::{Error, Result};
use cancellable_loops::{AbortFn, AbortHook, Never};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

/// Abort hook plus a shared progress value, handed down to every pixel-parallel loop.
///
/// Loops poll the hook between row chunks. Progress is `Some(fraction)` while an estimation is
/// running and `None` once it has finished.
#[derive(Clone)]
pub struct Monitor {
    abort: Arc<dyn AbortHook + Send + Sync>,
    progress: Arc<RwLock<Option<f32>>>,
}

impl Default for Monitor {
    fn default() -> Self {
        Monitor {
            abort: Arc::new(Never),
            progress: Arc::new(RwLock::new(None)),
        }
    }
}

impl Monitor {
    /// A monitor that never aborts.
    pub fn new() -> Monitor {
        Monitor::default()
    }

    /// Aborts once `abort_flag` is set.
    pub fn with_abort_flag(abort_flag: Arc<AtomicBool>) -> Monitor {
        Monitor {
            abort: abort_flag,
            ..Monitor::default()
        }
    }

    /// Aborts once `hook` returns `true`.
    pub fn with_hook<F>(hook: F) -> Monitor
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Monitor {
            abort: Arc::new(AbortFn(hook)),
            ..Monitor::default()
        }
    }

    /// Shared handle to the progress value, e.g. for a progress bar in another thread.
    pub fn progress_handle(&self) -> Arc<RwLock<Option<f32>>> {
        Arc::clone(&self.progress)
    }

    pub fn progress(&self) -> Option<f32> {
        self.progress.read().ok().and_then(|p| *p)
    }

    pub fn set_progress(&self, value: Option<f32>) {
        if let Ok(mut p) = self.progress.write() {
            *p = value;
        }
    }

    /// Fails with [`Error::Cancelled`] if the hook has fired.
    pub fn check(&self) -> Result<()> {
        if self.should_abort() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl AbortHook for Monitor {
    fn should_abort(&self) -> bool {
        self.abort.should_abort()
    }
}
