//! FIFO access serializer for the non-reentrant engine.
//!
//! Every engine call is wrapped in a job and appended to one queue. A single drain task, spawned
//! on the local executor when the queue goes from idle to busy, runs jobs strictly one after the
//! other: a job's future is driven to completion before the next job is started, so no two
//! engine calls ever interleave even though each of them suspends on sector I/O.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_channel::oneshot;
use futures_util::future::{FutureExt, LocalBoxFuture};
use futures_util::task::{LocalSpawn, LocalSpawnExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerializerError {
    #[error("the executor refused to run the access queue")]
    SpawnFailed,

    #[error("queued operation was dropped before it produced a result")]
    Abandoned,
}

/// What the drain task does after a job reports failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Keep draining; a failed job only affects its own caller.
    #[default]
    ContinueOnFailure,
    /// Stop draining. Remaining jobs wait until the next submission restarts the drain task.
    StallOnFailure,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    pub drain_policy: DrainPolicy,
}

/// A queued job. Resolves to `true` if the wrapped operation succeeded.
type Job = Box<dyn FnOnce() -> LocalBoxFuture<'static, bool>>;

struct QueuedJob {
    id: u64,
    run: Job,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedJob>,
    draining: bool,
    next_id: u64,
}

struct Shared {
    state: RefCell<QueueState>,
    running: Cell<bool>,
    spawner: Box<dyn LocalSpawn>,
    policy: DrainPolicy,
}

/// Serializes access to a single-threaded engine.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct AccessSerializer {
    shared: Rc<Shared>,
}

impl AccessSerializer {
    pub fn new(spawner: impl LocalSpawn + 'static) -> Self {
        Self::with_config(spawner, SerializerConfig::default())
    }

    pub fn with_config(spawner: impl LocalSpawn + 'static, config: SerializerConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(QueueState::default()),
                running: Cell::new(false),
                spawner: Box::new(spawner),
                policy: config.drain_policy,
            }),
        }
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        self.shared.policy
    }

    /// Number of jobs waiting to start (the running job is not counted).
    pub fn queue_len(&self) -> usize {
        self.shared.state.borrow().pending.len()
    }

    /// Whether a job is currently executing.
    pub fn is_running(&self) -> bool {
        self.shared.running.get()
    }

    /// Queues `op` and resolves with its result once it has run.
    ///
    /// The job is enqueued immediately, not when the returned future is first polled, so the
    /// order of `submit` calls is the order of execution. Dropping the returned future does not
    /// cancel the job; its result is discarded.
    pub fn submit<T, E, F, Fut>(&self, op: F) -> impl Future<Output = Result<T, E>> + 'static
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
        T: 'static,
        E: From<SerializerError> + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T, E>>();
        let job: Job = Box::new(move || {
            async move {
                let result = op().await;
                let succeeded = result.is_ok();
                // The caller may have stopped waiting.
                let _ = tx.send(result);
                succeeded
            }
            .boxed_local()
        });

        let spawned = self.enqueue(job);
        async move {
            if !spawned {
                return Err(SerializerError::SpawnFailed.into());
            }
            match rx.await {
                Ok(result) => result,
                Err(oneshot::Canceled) => Err(SerializerError::Abandoned.into()),
            }
        }
    }

    /// Queues `op` without waiting for it. Used for cleanup work such as releasing engine handles
    /// from `Drop`.
    pub fn submit_detached<F, Fut>(&self, op: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let job: Job = Box::new(move || {
            async move {
                op().await;
                true
            }
            .boxed_local()
        });
        self.enqueue(job);
    }

    /// Returns `false` if the drain task could not be spawned.
    fn enqueue(&self, run: Job) -> bool {
        let (id, start) = {
            let mut state = self.shared.state.borrow_mut();
            let id = state.next_id;
            state.next_id = state.next_id.wrapping_add(1);
            state.pending.push_back(QueuedJob { id, run });
            let start = !state.draining;
            state.draining = true;
            (id, start)
        };
        trace!(job = id, "queued engine operation");

        if !start {
            return true;
        }

        let shared = Rc::clone(&self.shared);
        match self.shared.spawner.spawn_local(drain(shared)) {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to spawn access queue drain task");
                let abandoned = {
                    let mut state = self.shared.state.borrow_mut();
                    state.draining = false;
                    std::mem::take(&mut state.pending)
                };
                // Dropping the jobs outside the borrow wakes their callers with `Abandoned`.
                drop(abandoned);
                false
            }
        }
    }
}

impl fmt::Debug for AccessSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessSerializer")
            .field("queue_len", &self.queue_len())
            .field("running", &self.is_running())
            .field("drain_policy", &self.shared.policy)
            .finish()
    }
}

/// Clears the draining flag however the drain task ends.
struct DrainGuard<'a>(&'a Shared);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.running.set(false);
        if let Ok(mut state) = self.0.state.try_borrow_mut() {
            state.draining = false;
        }
    }
}

async fn drain(shared: Rc<Shared>) {
    let _guard = DrainGuard(&shared);
    debug!("access queue draining");

    loop {
        // The borrow must end before the job is polled: jobs submit follow-up work.
        let next = shared.state.borrow_mut().pending.pop_front();
        let Some(job) = next else {
            break;
        };

        shared.running.set(true);
        trace!(job = job.id, "running engine operation");
        let succeeded = (job.run)().await;
        shared.running.set(false);

        if !succeeded {
            match shared.policy {
                DrainPolicy::ContinueOnFailure => {
                    debug!(job = job.id, "engine operation failed; continuing");
                }
                DrainPolicy::StallOnFailure => {
                    warn!(
                        job = job.id,
                        pending = shared.state.borrow().pending.len(),
                        "engine operation failed; access queue stalled until next submission"
                    );
                    break;
                }
            }
        }
    }

    debug!("access queue idle");
}
