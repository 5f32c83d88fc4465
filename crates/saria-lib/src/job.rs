//! Single-flight job control — at most one uncancelled job at a time.
//!
//! The assistant is turn-based: a new utterance or message always preempts
//! a stale, possibly long-running generation/speech cycle, so the user
//! never hears overlapping or outdated responses. Cancellation is
//! cooperative — the flag is checked when control returns to the
//! orchestrator; in-flight collaborator calls are never aborted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use saria_core::types::{JobKind, RelayEvent};

use crate::hub::BroadcastHub;

/// One in-flight request turn.
pub struct Job {
    id: u64,
    kind: JobKind,
    cancelled: AtomicBool,
}

impl Job {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Whether this job has been superseded or interrupted. Set at most
    /// once, never reset.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Owns the single "current job" reference.
pub struct JobController {
    hub: Arc<BroadcastHub>,
    current: Mutex<Option<Arc<Job>>>,
    next_id: AtomicU64,
}

impl JobController {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self {
            hub,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Install a new current job, cancelling the previous one.
    ///
    /// The cancel-and-replace sequence runs under one lock: concurrent
    /// callers serialize, and no reader can ever observe two uncancelled
    /// jobs. The `stop` announcement goes out before the replacement is
    /// installed.
    pub fn start(&self, kind: JobKind) -> Arc<Job> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = current.as_ref() {
            if !prev.is_cancelled() {
                debug!("job {}: superseded", prev.id);
                prev.cancel();
                self.hub.publish(&RelayEvent::Stop);
            }
        }
        let job = Arc::new(Job {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            cancelled: AtomicBool::new(false),
        });
        *current = Some(job.clone());
        job
    }

    /// Cancel the current job, if one is running. Returns whether anything
    /// was actually cancelled.
    pub fn interrupt(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some(job) if !job.is_cancelled() => {
                debug!("job {}: interrupted", job.id);
                job.cancel();
                self.hub.publish(&RelayEvent::Stop);
                true
            }
            _ => false,
        }
    }
}
