use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of listener delivery workers.
///
/// Owned by the session that created it and torn down with it. The job
/// queue is unbounded: a slow listener accumulates queued deliveries
/// rather than exerting backpressure on the reader thread.
pub struct WorkerPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` delivery threads (at least one).
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        let workers = (0..workers.max(1))
            .map(|i| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("vmprobe-delivery-{i}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            job();
                        }
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self {
            jobs: Some(tx),
            workers,
        })
    }

    /// Queue one job. Jobs submitted from a single thread run in FIFO
    /// order when the pool has one worker; with more workers there is no
    /// cross-job ordering.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(jobs) = &self.jobs {
            // Fails only when the workers are gone, i.e. mid-teardown;
            // deliveries are best-effort at that point.
            let _ = jobs.send(Box::new(job));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain whatever is queued,
        // then exit.
        drop(self.jobs.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
