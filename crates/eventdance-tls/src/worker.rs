//! A fixed-size worker thread pool for CPU-bound crypto work,
//! `spec.md` §5 "Background work": decrypt/sign/verify/keygen run off
//! the reactor thread, with the result posted back as a plain record —
//! "no shared mutable state crosses the boundary except the immutable
//! input and the result".
//!
//! Grounded on the teacher's `ThreadSleepState` in `spark-core`'s clock
//! module (a plain `std::thread::spawn` paired with a channel back to
//! the waiting side) generalized from one thread per sleep to a fixed
//! pool of `N` threads pulling jobs off a shared `mpsc` queue, since a
//! crypto worker pool — unlike a one-off timer — needs to bound how
//! many OS threads a busy reactor spins up at once.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

type BoxedJob = Box<dyn FnOnce() + Send>;

/// A handle the submitting side polls (once per reactor turn) for the
/// job's result, without blocking the reactor thread.
pub struct JobHandle<R> {
    receiver: Receiver<R>,
}

impl<R> JobHandle<R> {
    pub fn try_recv(&self) -> Option<R> {
        self.receiver.try_recv().ok()
    }
}

/// A fixed-size pool of worker threads pulling jobs off one shared
/// queue. Sized once at construction (`spec.md` does not name a
/// default; EventDance-rs picks one worker per the number of cores
/// available at startup, floor 1).
pub struct WorkerPool {
    job_tx: Sender<BoxedJob>,
    _workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<BoxedJob>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let workers = (0..size.max(1))
            .map(|_| {
                let job_rx = Arc::clone(&job_rx);
                thread::spawn(move || loop {
                    let job = {
                        let guard = job_rx.lock().expect("worker pool queue mutex poisoned");
                        guard.recv()
                    };
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                })
            })
            .collect();
        Self {
            job_tx,
            _workers: workers,
        }
    }

    /// Submits `work`, returning a handle whose result becomes
    /// available once a worker thread picks it up and runs it.
    pub fn submit<F, R>(&self, work: F) -> JobHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: BoxedJob = Box::new(move || {
            let result = work();
            let _ = tx.send(result);
        });
        // The pool outliving every submitter is the caller's
        // responsibility; a send failure here means the pool was
        // already torn down, which only happens at process shutdown.
        let _ = self.job_tx.send(job);
        JobHandle { receiver: rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for<R>(handle: &JobHandle<R>) -> R {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(value) = handle.try_recv() {
                return value;
            }
            assert!(Instant::now() < deadline, "worker job did not complete in time");
        }
    }

    #[test]
    fn submitted_job_result_is_retrievable() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|| 2 + 2);
        assert_eq!(wait_for(&handle), 4);
    }

    #[test]
    fn pool_runs_jobs_concurrently_across_workers() {
        let pool = WorkerPool::new(4);
        let handles: Vec<_> = (0..8).map(|i| pool.submit(move || i * i)).collect();
        let results: Vec<i32> = handles.iter().map(wait_for).collect();
        assert_eq!(results, vec![0, 1, 4, 9, 16, 25, 36, 49]);
    }
}
