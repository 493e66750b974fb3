//! Job life-cycle state machine.
//!
//! Status is a single atomic ordinal compared by threshold, so polling
//! `is_done()`/`is_cancelled()` from any thread is lock-free. Transitions
//! are published on a watch channel: observers see `Executing` when the job
//! starts and `Done`/`Cancelled` when it ends.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Life-cycle status of a job. Ordinals advance monotonically except that a
/// force-cancel may jump straight from `New` or `Executing` to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum JobStatus {
    New = 0,
    Executing = 1,
    Done = 2,
    Cancelled = 3,
}

impl JobStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::New,
            1 => Self::Executing,
            2 => Self::Done,
            _ => Self::Cancelled,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Executing => write!(f, "executing"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Handle for deregistering an on-done callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

type OnDone = Arc<dyn Fn() + Send + Sync>;

/// Atomic life-cycle state plus completion callbacks for one job.
pub struct JobState {
    status: AtomicU8,
    status_tx: watch::Sender<JobStatus>,
    on_done: Mutex<Vec<(CallbackId, OnDone)>>,
    next_callback_id: AtomicU64,
    done_invoked: AtomicBool,
}

impl std::fmt::Debug for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobState").field("status", &self.status()).finish()
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

impl JobState {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(JobStatus::New);
        Self {
            status: AtomicU8::new(JobStatus::New as u8),
            status_tx,
            on_done: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(1),
            done_invoked: AtomicBool::new(false),
        }
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Observe status transitions. The receiver sees `Executing` when the
    /// job starts and `Done`/`Cancelled` when it reaches a terminal state.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    /// Compare-and-set the status. Returns false without any change when the
    /// current status is not `expected` — callers treat that as "someone else
    /// already advanced the state", not as an error.
    pub fn update_status(&self, expected: JobStatus, next: JobStatus) -> bool {
        let swapped = self
            .status
            .compare_exchange(expected as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped {
            let _ = self.status_tx.send(next);
            if next >= JobStatus::Done {
                self.done();
            }
        }
        swapped
    }

    /// Cancel the job. Fails (returning false) once the job is already past
    /// `Executing`; otherwise the status is force-set to `Cancelled`
    /// regardless of the current value.
    ///
    /// `_may_interrupt` is advisory for the transport layer, which observes
    /// `is_cancelled()` and reacts; the state change itself is immediate.
    pub fn cancel(&self, _may_interrupt: bool) -> bool {
        let updated = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if JobStatus::from_u8(current) > JobStatus::Executing {
                    None
                } else {
                    Some(JobStatus::Cancelled as u8)
                }
            })
            .is_ok();
        if updated {
            let _ = self.status_tx.send(JobStatus::Cancelled);
            self.done();
        }
        updated
    }

    /// Whether the job reached a terminal state. `Done` and `Cancelled` both
    /// qualify; `Executing` does not.
    pub fn is_done(&self) -> bool {
        self.status() >= JobStatus::Done
    }

    /// Whether the job was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status() >= JobStatus::Cancelled
    }

    /// Register a callback to run when the job reaches a terminal state.
    /// Callbacks run in registration order. If the job is already done the
    /// callback runs immediately.
    pub fn add_on_done(&self, callback: impl Fn() + Send + Sync + 'static) -> CallbackId {
        let id = CallbackId(self.next_callback_id.fetch_add(1, Ordering::Relaxed));
        let callback: OnDone = Arc::new(callback);
        // The flag is read under the list lock: completion drains the list
        // under the same lock, so a registration either lands before the
        // drain or observes the flag and runs here.
        {
            let mut callbacks = self.on_done.lock();
            if !self.done_invoked.load(Ordering::Acquire) {
                callbacks.push((id, callback));
                return id;
            }
        }
        callback();
        id
    }

    /// Deregister a previously registered callback. Returns false if it was
    /// not registered (or already consumed by completion).
    pub fn remove_on_done(&self, id: CallbackId) -> bool {
        let mut callbacks = self.on_done.lock();
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    /// Run the completion callbacks exactly once. Invoked on the first
    /// transition into a terminal state. The flag flips and the list drains
    /// under the list lock, closing the race with `add_on_done`; invocation
    /// happens outside the lock so a callback may itself register or
    /// deregister callbacks without deadlocking.
    fn done(&self) {
        let callbacks: Vec<OnDone> = {
            let mut guard = self.on_done.lock();
            if self.done_invoked.swap(true, Ordering::AcqRel) {
                return;
            }
            guard.drain(..).map(|(_, cb)| cb).collect()
        };
        for callback in callbacks {
            callback();
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
