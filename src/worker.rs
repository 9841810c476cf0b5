//! Single-slot background worker.
//!
//! Both the map fetch and the pose estimation run off the event thread
//! with an at-most-one-in-flight invariant: a job is dispatched only
//! when the previous one has been polled out. The slot is a dedicated
//! thread fed through bounded channels of capacity one.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Returned when a dispatch is attempted while a job is outstanding.
/// Callers treat this as "skip this cycle", not as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerBusy;

/// A worker thread processing one job at a time.
pub struct Worker<J, R> {
    job_tx: Option<Sender<J>>,
    result_rx: Receiver<R>,
    busy: bool,
    handle: Option<JoinHandle<()>>,
}

impl<J: Send + 'static, R: Send + 'static> Worker<J, R> {
    /// Spawns the worker thread running `f` on each dispatched job.
    pub fn spawn<F>(mut f: F) -> Self
    where
        F: FnMut(J) -> R + Send + 'static,
    {
        let (job_tx, job_rx) = bounded::<J>(1);
        let (result_tx, result_rx) = bounded::<R>(1);

        let handle = thread::spawn(move || {
            while let Ok(job) = job_rx.recv() {
                if result_tx.send(f(job)).is_err() {
                    break;
                }
            }
        });

        Self {
            job_tx: Some(job_tx),
            result_rx,
            busy: false,
            handle: Some(handle),
        }
    }

    /// Whether a job is outstanding (dispatched but not yet polled).
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Hands a job to the worker. Fails with `WorkerBusy` while a
    /// previous job is outstanding.
    pub fn dispatch(&mut self, job: J) -> Result<(), WorkerBusy> {
        if self.busy {
            return Err(WorkerBusy);
        }
        let Some(tx) = &self.job_tx else {
            return Err(WorkerBusy);
        };
        if tx.try_send(job).is_err() {
            // Channel full or thread gone: either way the slot is not
            // available this cycle.
            return Err(WorkerBusy);
        }
        self.busy = true;
        Ok(())
    }

    /// Collects a finished result without blocking. Clears the busy
    /// flag when a result is taken.
    ///
    /// A disconnected channel means the worker thread died, which only
    /// happens when the job closure panicked. The outstanding job is
    /// lost; the busy flag is cleared so the caller sees the attempt
    /// fail instead of a slot that never frees.
    pub fn poll(&mut self) -> Option<R> {
        match self.result_rx.try_recv() {
            Ok(result) => {
                self.busy = false;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if self.busy {
                    tracing::warn!("worker thread terminated with a job outstanding");
                    self.busy = false;
                }
                None
            }
        }
    }
}

impl<J, R> Drop for Worker<J, R> {
    fn drop(&mut self) {
        // Dropping the sender ends the worker loop.
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
