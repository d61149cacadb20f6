//! Cooperative control for long running operations: progress reporting, pausing and
//! cancellation.
//!
//! The core never drives a user interface. It calls into a [`ProgressSink`] and stops at
//! checkpoints, where it waits on a [`PauseGate`] and then looks at a [`CancelToken`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

/// How many symbols the coding loops process between checkpoints.
pub const CHECKPOINT_INTERVAL: usize = 1 << 14;

/// How long a paused operation sleeps before looking at the cancel flag again.
const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Receives progress updates. Percentages are 0-100.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, status: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, status: &str) {
        self(percent, status)
    }
}

/// A sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8, _status: &str) {}
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Whole-operation pause switch. While closed, every checkpoint blocks.
#[derive(Debug, Default, Clone)]
pub struct PauseGate(Arc<(Mutex<bool>, Condvar)>);

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate. Operations stop at their next checkpoint.
    pub fn pause(&self) {
        let (lock, _) = &*self.0;
        *lock.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }

    /// Reopen the gate and wake every waiting operation.
    pub fn resume(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap_or_else(|p| p.into_inner()) = false;
        cvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.0 .0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Block while the gate is closed. Returns early if `cancel` fires.
    pub fn wait(&self, cancel: &CancelToken) {
        let (lock, cvar) = &*self.0;
        let mut paused = lock.lock().unwrap_or_else(|p| p.into_inner());
        while *paused && !cancel.is_cancelled() {
            paused = match cvar.wait_timeout(paused, PAUSE_POLL) {
                Ok((guard, _)) => guard,
                Err(p) => p.into_inner().0,
            };
        }
    }
}

/// Everything an operation needs to report and be steered: a sink, a gate and a token,
/// plus the slice of the overall percentage this step maps onto.
#[derive(Clone)]
pub struct Control {
    sink: Arc<dyn ProgressSink>,
    pause: PauseGate,
    cancel: CancelToken,
    lo: u8,
    hi: u8,
}

impl Default for Control {
    fn default() -> Self {
        Self::new(Arc::new(NoProgress), PauseGate::new(), CancelToken::new())
    }
}

impl Control {
    pub fn new(sink: Arc<dyn ProgressSink>, pause: PauseGate, cancel: CancelToken) -> Self {
        Self {
            sink,
            pause,
            cancel,
            lo: 0,
            hi: 100,
        }
    }

    /// A control whose 0-100% maps onto `lo..=hi` of this one.
    pub fn span(&self, lo: u8, hi: u8) -> Self {
        let width = (self.hi - self.lo) as u32;
        let map = |p: u8| self.lo + (width * p.min(100) as u32 / 100) as u8;
        Self {
            sink: Arc::clone(&self.sink),
            pause: self.pause.clone(),
            cancel: self.cancel.clone(),
            lo: map(lo),
            hi: map(hi.max(lo)),
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }

    /// Wait out a pause, then fail with [`Error::Cancelled`] if cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        self.pause.wait(&self.cancel);
        if self.cancel.is_cancelled() {
            debug!("Cancellation observed at checkpoint.");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Report a percentage (0-100) of this control's span.
    pub fn report(&self, percent: u8, status: &str) {
        let width = (self.hi - self.lo) as u32;
        let p = self.lo + (width * percent.min(100) as u32 / 100) as u8;
        self.sink.report(p, status);
    }

    /// Report `done` out of `total` units.
    pub fn report_fraction(&self, done: u64, total: u64, status: &str) {
        let percent = if total == 0 {
            100
        } else {
            (done.min(total) * 100 / total) as u8
        };
        self.report(percent, status);
    }
}
