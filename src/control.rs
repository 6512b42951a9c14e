//! Execution state shared between a sort worker and its controller.
//!
//! The state is the only thing the controlling thread and the worker share. Every
//! access to the pause flag goes through one mutex paired with one condition variable,
//! and the worker re-checks the flag in a loop after each wake-up, so a `resume` that
//! races a not-yet-blocked pause check is never lost.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::sort::SortError;

/// Sort invocation status as seen by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SortStatus {
    /// Checks whether the status is terminal.
    pub fn is_finished(&self) -> bool {
        matches!(self, SortStatus::Completed | SortStatus::Failed | SortStatus::Cancelled)
    }
}

impl fmt::Display for SortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortStatus::Idle => "idle",
            SortStatus::Running => "running",
            SortStatus::Paused => "paused",
            SortStatus::Completed => "completed",
            SortStatus::Failed => "failed",
            SortStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

struct Inner {
    status: SortStatus,
    paused: bool,
    delay: Duration,
    step_permits: usize,
    cancelled: bool,
    waiting: bool,
}

/// Pause, step, throttle and cancellation state of one sort invocation.
pub struct ExecutionState {
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl ExecutionState {
    pub fn new(delay: Duration, paused: bool) -> Self {
        ExecutionState {
            inner: Mutex::new(Inner {
                status: SortStatus::Running,
                paused,
                delay,
                step_permits: 0,
                cancelled: false,
                waiting: false,
            }),
            wake: Condvar::new(),
        }
    }

    /// Current status. A running sort reports [`SortStatus::Paused`] while the pause flag is set.
    pub fn status(&self) -> SortStatus {
        let inner = self.inner.lock();
        match inner.status {
            SortStatus::Running if inner.paused => SortStatus::Paused,
            status => status,
        }
    }

    /// Updates the throttling delay. A throttle wait already in progress keeps its deadline.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().delay = delay;
    }

    pub fn delay(&self) -> Duration {
        self.inner.lock().delay
    }

    pub fn set_paused(&self, paused: bool) {
        let mut inner = self.inner.lock();
        inner.paused = paused;
        if !paused {
            inner.step_permits = 0;
            inner.waiting = false;
            self.wake.notify_all();
        }
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Lets a paused worker through exactly one checkpoint. Does nothing when not paused.
    pub fn step(&self) {
        let mut inner = self.inner.lock();
        if inner.paused {
            inner.step_permits += 1;
            inner.waiting = false;
            self.wake.notify_all();
        } else {
            log::debug!("step ignored, sort is not paused");
        }
    }

    /// Requests cancellation. The worker stops at its next checkpoint.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.cancelled = true;
        inner.waiting = false;
        self.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Checks whether the worker is blocked on the pause flag and has not been woken since.
    pub fn is_waiting(&self) -> bool {
        self.inner.lock().waiting
    }

    /// Fails with [`SortError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), SortError> {
        if self.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        Ok(())
    }

    /// Per-step suspension point.
    ///
    /// Blocks while paused (unless a step permit is available), then applies the
    /// throttling delay if it is non-zero, regardless of the pause state.
    pub fn checkpoint(&self) -> Result<(), SortError> {
        let mut inner = self.inner.lock();

        loop {
            if inner.cancelled {
                return Err(SortError::Cancelled);
            }
            if !inner.paused {
                break;
            }
            if inner.step_permits > 0 {
                inner.step_permits -= 1;
                break;
            }

            inner.waiting = true;
            self.wake.wait(&mut inner);
            inner.waiting = false;
        }

        if !inner.delay.is_zero() {
            let deadline = Instant::now() + inner.delay;
            while !inner.cancelled {
                if self.wake.wait_until(&mut inner, deadline).timed_out() {
                    break;
                }
            }
            if inner.cancelled {
                return Err(SortError::Cancelled);
            }
        }

        Ok(())
    }

    /// Moves the invocation into a terminal status. Only the first call has an effect.
    pub(crate) fn finish(&self, status: SortStatus) {
        let mut inner = self.inner.lock();
        if inner.status == SortStatus::Running {
            inner.status = status;
        }
        self.wake.notify_all();
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        ExecutionState::new(Duration::ZERO, false)
    }
}
