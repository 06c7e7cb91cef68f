//! Job Scheduler
//!
//! Deduplicates and batches pending component updates. Render effects do
//! not re-run synchronously on every dependency write; their scheduler
//! enqueues the instance's update job here, so a burst of synchronous
//! mutations collapses into one re-render per component.
//!
//! # Flush boundary
//!
//! The core owns no event loop, so there is no implicit microtask point;
//! the embedding host calls [`flush_jobs`] (or [`next_tick`]) after a
//! synchronous burst. Within a flush, jobs run
//! in FIFO enqueue order and the queue is drained until empty, so jobs
//! enqueued by a running job execute in the same flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// A pending unit of work, deduplicated by id while queued.
#[derive(Clone)]
pub struct Job {
    id: u64,
    run: Arc<dyn Fn() + Send + Sync>,
}

impl Job {
    pub fn new<F>(id: u64, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            run: Arc::new(run),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

static QUEUE: Mutex<Vec<Job>> = Mutex::new(Vec::new());
static FLUSH_PENDING: AtomicBool = AtomicBool::new(false);

/// Enqueue `job` unless a job with the same id is already pending.
pub fn queue_job(job: Job) {
    {
        let mut queue = QUEUE.lock();
        if queue.iter().any(|pending| pending.id == job.id) {
            return;
        }
        debug!(job = job.id, "job queued");
        queue.push(job);
    }
    FLUSH_PENDING.store(true, Ordering::SeqCst);
}

/// True when queued jobs are waiting for a flush.
pub fn has_pending_jobs() -> bool {
    FLUSH_PENDING.load(Ordering::SeqCst) && !QUEUE.lock().is_empty()
}

/// Run every queued job in FIFO order, draining until the queue is empty.
/// Jobs enqueued mid-flush are included.
pub fn flush_jobs() {
    FLUSH_PENDING.store(false, Ordering::SeqCst);
    loop {
        let job = {
            let mut queue = QUEUE.lock();
            if queue.is_empty() {
                break;
            }
            queue.remove(0)
        };
        // The queue lock is released while the job runs; a job may enqueue.
        (job.run)();
    }
}

/// Flush pending updates, then run `after`. This is the deterministic
/// "observe post-update state" primitive.
pub fn next_tick<F: FnOnce()>(after: F) {
    flush_jobs();
    after();
}
