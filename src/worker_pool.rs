/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A fixed-size pool of worker threads that execute closures.
//!
//! ## Backpressure
//!
//! Jobs are handed to workers over a zero-capacity [`sync_channel`](std::sync::mpsc::sync_channel): a
//! send only completes when a worker is blocked in `recv`, i.e., when a worker is idle. Submitting to
//! a pool whose workers are all busy therefore blocks the submitter, and there is never a backlog of
//! pending jobs.
//!
//! ## Waiting for jobs
//!
//! There are two ways to wait for submitted jobs:
//! 1. [`execute_all`](WorkerPool::execute_all) submits a group of jobs and blocks until every job in
//!    the group has finished, returning the first error among them. The pool stays open, so the same
//!    workers serve the next group.
//! 2. [`close`](WorkerPool::close) closes the queue, blocks until every worker has finished its
//!    in-flight job and exited, and returns the first error among the jobs that were
//!    [`submit`](WorkerPool::submit)-ted individually.

use std::{
    error::Error,
    fmt::{Debug, Display},
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{self, Receiver, Sender, SyncSender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

/// Number of workers per logical core in a pool sized with
/// [`default_worker_count`](WorkerPool::default_worker_count). Jobs mostly wait on ledger I/O.
pub const DEFAULT_WORKERS_PER_CORE: usize = 3;

/// A unit of work. The only thing a worker needs from it is to run it and learn whether it failed.
pub type Job<E> = Box<dyn FnOnce() -> Result<(), E> + Send + 'static>;

struct Message<E> {
    job: Job<E>,
    // Where to report the job's result. `None` for jobs submitted outside of a group.
    done: Option<Sender<Result<(), WorkerError<E>>>>,
}

pub struct WorkerPool<E: Send + 'static> {
    job_sender: Option<SyncSender<Message<E>>>,
    workers: Vec<JoinHandle<()>>,
    first_error: Arc<Mutex<Option<WorkerError<E>>>>,
}

impl<E: Send + 'static> WorkerPool<E> {
    /// Start a pool of `worker_count` threads (at least one).
    pub fn new(worker_count: usize) -> WorkerPool<E> {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = mpsc::sync_channel(0);
        let job_receiver = Arc::new(Mutex::new(job_receiver));
        let first_error = Arc::new(Mutex::new(None));

        let workers = (0..worker_count)
            .map(|_| start_worker(Arc::clone(&job_receiver), Arc::clone(&first_error)))
            .collect();

        WorkerPool {
            job_sender: Some(job_sender),
            workers,
            first_error,
        }
    }

    /// [`DEFAULT_WORKERS_PER_CORE`] times the number of logical cores.
    pub fn default_worker_count() -> usize {
        DEFAULT_WORKERS_PER_CORE * num_cpus::get()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Hand `job` to a worker, blocking until one is free to accept it.
    ///
    /// The job's result is not reported back. If it fails, its error is kept and returned by
    /// [`close`](Self::close), unless an earlier error was already kept.
    pub fn submit(&self, job: Job<E>) -> Result<(), WorkerError<E>> {
        self.send(Message { job, done: None })
    }

    /// Run every job in `jobs` on the pool and block until all of them have finished.
    ///
    /// Returns the first error encountered. A failed job does not stop the rest of the group from being
    /// submitted or waited for.
    pub fn execute_all<I>(&self, jobs: I) -> Result<(), WorkerError<E>>
    where
        I: IntoIterator<Item = Job<E>>,
    {
        let (done_sender, done_receiver) = mpsc::channel();
        let mut first_error = None;
        let mut submitted = 0usize;

        for job in jobs {
            let message = Message {
                job,
                done: Some(done_sender.clone()),
            };
            if let Err(err) = self.send(message) {
                first_error = Some(err);
                break;
            }
            submitted += 1;
        }
        drop(done_sender);

        for _ in 0..submitted {
            match done_receiver.recv() {
                Ok(Ok(())) => (),
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    first_error.get_or_insert(WorkerError::PoolClosed);
                    break;
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Close the queue and wait for every worker to exit.
    ///
    /// Returns the first error among jobs passed to [`submit`](Self::submit).
    pub fn close(mut self) -> Result<(), WorkerError<E>> {
        self.shutdown();
        match self.first_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn send(&self, message: Message<E>) -> Result<(), WorkerError<E>> {
        self.job_sender
            .as_ref()
            .ok_or(WorkerError::PoolClosed)?
            .send(message)
            .map_err(|_| WorkerError::PoolClosed)
    }

    fn shutdown(&mut self) {
        // Dropping the only sender makes every idle worker's `recv` fail, which ends its loop.
        drop(self.job_sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl<E: Send + 'static> Drop for WorkerPool<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn start_worker<E: Send + 'static>(
    job_receiver: Arc<Mutex<Receiver<Message<E>>>>,
    first_error: Arc<Mutex<Option<WorkerError<E>>>>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        // The guard is dropped before the job runs, so other workers can pick up jobs meanwhile.
        let message = match job_receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };
        let Message { job, done } = match message {
            Ok(message) => message,
            Err(_) => return,
        };

        let result = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(WorkerError::Job(err)),
            Err(_) => Err(WorkerError::JobPanicked),
        };

        match done {
            Some(done) => {
                let _ = done.send(result);
            }
            None => {
                if let Err(err) = result {
                    if let Ok(mut first_error) = first_error.lock() {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }
    })
}

/// Error reported by the [`WorkerPool`].
#[derive(Debug)]
pub enum WorkerError<E> {
    /// A job returned an error.
    Job(E),

    /// A job panicked. The worker that ran it survives and keeps serving jobs.
    JobPanicked,

    /// The pool was closed, or every worker has exited.
    PoolClosed,
}

impl<E: Display> Display for WorkerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Job(err) => write!(f, "job failed: {}", err),
            WorkerError::JobPanicked => write!(f, "job panicked"),
            WorkerError::PoolClosed => write!(f, "worker pool is closed"),
        }
    }
}

impl<E: Debug + Display> Error for WorkerError<E> {}
