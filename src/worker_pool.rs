use crate::errors::{Result, WorkerPoolError};
use slog::{debug, error, info, o, Discard, Logger};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queue and shutdown flag, mutated only under the pool's one mutex
struct PoolState {
    queue: VecDeque<Job>,
    disposed: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    /// Signaled once per submitted job, broadcast on shutdown
    available: Condvar,
    logger: Logger,
}

/// A fixed-size pool of long-lived worker threads draining a shared
/// FIFO queue of fire-and-forget jobs
///
/// ```rust
/// extern crate workpool;
/// use workpool::WorkerPool;
///
/// let pool = WorkerPool::new(4).unwrap();
/// pool.submit(|| println!("from the pool")).unwrap();
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
    /// Drained exactly once, by whichever shutdown caller gets there first
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool with the given number of worker threads
    ///
    /// Every thread is spawned and waiting before this returns. Fails with
    /// `InvalidConfiguration` if `threads` is zero and with `Io` if the OS
    /// refuses to spawn a thread (any threads already started are shut
    /// down first).
    pub fn new(threads: u32) -> Result<WorkerPool> {
        Self::with_logger(threads, Logger::root(Discard, o!()))
    }

    /// Create a pool with one worker per logical CPU
    pub fn with_default_size() -> Result<WorkerPool> {
        Self::new(num_cpus::get() as u32)
    }

    /// Create a pool that reports through the given logger
    ///
    /// The pool logs worker lifecycle at debug level and panicking jobs at
    /// error level.
    pub fn with_logger(threads: u32, logger: Logger) -> Result<WorkerPool> {
        if threads == 0 {
            return Err(WorkerPoolError::InvalidConfiguration(
                "worker count must be positive".to_owned(),
            ));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                disposed: false,
            }),
            available: Condvar::new(),
            logger,
        });

        let mut workers = Vec::with_capacity(threads as usize);
        for worker_id in 0..threads as usize {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("workpool-{}", worker_id))
                .spawn(move || worker_loop(worker_shared, worker_id));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    let partial = WorkerPool {
                        shared: Arc::clone(&shared),
                        workers: Mutex::new(workers),
                    };
                    partial.shutdown();
                    return Err(WorkerPoolError::Io(err));
                }
            }
        }

        info!(shared.logger, "worker pool started"; "threads" => threads);

        Ok(WorkerPool {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Submit a job to be run on some worker thread
    ///
    /// Returns as soon as the job is queued; completion is never reported.
    /// The queue is unbounded, so this never blocks on pool load. Jobs may
    /// themselves submit more work through a shared handle such as
    /// `Arc<WorkerPool>`. Fails with `PoolClosed` once the pool has been
    /// shut down; the job is dropped without running.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|err| WorkerPoolError::LockError(err.to_string()))?;

        if state.disposed {
            return Err(WorkerPoolError::PoolClosed);
        }

        state.queue.push_back(Box::new(job));
        // One job was added, so one waiting worker is enough to wake.
        self.shared.available.notify_one();

        Ok(())
    }

    /// Whether the pool has been shut down
    pub fn is_disposed(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.disposed)
            .unwrap_or(true)
    }

    /// Shut the pool down and wait for every worker thread to terminate
    ///
    /// Jobs still queued are dropped without running; a job already being
    /// executed finishes before its worker exits. Safe to call more than
    /// once, from any number of threads: only the first caller signals and
    /// joins, later callers return once teardown has completed. Must not be
    /// called from inside a submitted job, since a worker cannot join
    /// itself.
    pub fn shutdown(&self) {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(|err| err.into_inner());

            if !state.disposed {
                state.disposed = true;
                // Broadcast, not signal: every waiting worker has to
                // observe the flag and exit.
                self.shared.available.notify_all();
            }
        }

        // Joining happens outside the state lock; a worker finishing its
        // current job needs that lock to observe the flag.
        let mut workers = self
            .workers
            .lock()
            .unwrap_or_else(|err| err.into_inner());

        for worker in workers.drain(..) {
            if worker.join().is_err() {
                error!(self.shared.logger, "worker thread terminated by panic");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    loop {
        let job = {
            let mut state = shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            loop {
                if state.disposed {
                    debug!(shared.logger, "worker exiting"; "worker" => worker_id);
                    return;
                }

                if let Some(job) = state.queue.pop_front() {
                    break job;
                }

                // The wake may be spurious or a shutdown broadcast, so
                // re-check both the flag and the queue afterwards.
                state = shared
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        // The lock is released while the job runs; a slow or re-submitting
        // job never blocks the other workers.
        if let Err(fault) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(shared.logger, "work item panicked";
                "worker" => worker_id,
                "panic" => panic_message(fault.as_ref()));
        }
    }
}

fn panic_message(fault: &(dyn Any + Send)) -> String {
    if let Some(message) = fault.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = fault.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
