//! Decode work queue
//!
//! A single dedicated worker thread runs decode/schedule jobs in FIFO order, off
//! the delegate task. Because there is exactly one worker, a job that schedules
//! buffer *k+1* always finishes before the job for *k+2* starts.
//!
//! The queue is bounded; `enqueue` refuses work when full instead of blocking the
//! caller (which may be an audio completion callback).

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Unit of work run on the queue thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum Task {
    Run(Job),
    /// Signals once every task queued before it has finished
    Barrier(mpsc::Sender<()>),
}

/// Shared state between submitters and the worker
struct SharedQueueState {
    queue: Mutex<VecDeque<Task>>,
    condvar: Condvar,
    stop_flag: AtomicBool,
    capacity: usize,
}

/// Bounded FIFO work queue with one worker thread
pub struct WorkQueue {
    state: Arc<SharedQueueState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkQueue {
    /// Spawn the worker thread
    pub fn new(name: &str, capacity: usize) -> std::io::Result<Self> {
        let state = Arc::new(SharedQueueState {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
            capacity: capacity.max(1),
        });

        let worker_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::worker_loop(worker_state))?;

        debug!(name, capacity, "Work queue started");

        Ok(Self {
            state,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Queue a job; returns false when the queue is full or shutting down
    pub fn enqueue(&self, job: Job) -> bool {
        if self.state.stop_flag.load(Ordering::Acquire) {
            return false;
        }

        {
            let mut queue = self.state.queue.lock();
            let pending = queue.iter().filter(|t| matches!(t, Task::Run(_))).count();
            if pending >= self.state.capacity {
                return false;
            }
            queue.push_back(Task::Run(job));
        }

        self.state.condvar.notify_one();
        true
    }

    /// Number of jobs waiting to run
    pub fn pending(&self) -> usize {
        self.state
            .queue
            .lock()
            .iter()
            .filter(|t| matches!(t, Task::Run(_)))
            .count()
    }

    /// Block until every job queued so far (and any job those jobs queued before
    /// the barrier was reached) has run
    ///
    /// Must not be called from the worker thread.
    pub fn wait_idle(&self) {
        let (tx, rx) = mpsc::channel();
        {
            let mut queue = self.state.queue.lock();
            if self.state.stop_flag.load(Ordering::Acquire) {
                return;
            }
            queue.push_back(Task::Barrier(tx));
        }
        self.state.condvar.notify_one();

        // Err means the worker stopped and dropped the barrier
        let _ = rx.recv();
    }

    /// Stop the worker; pending jobs are discarded
    pub fn shutdown(&self) {
        self.state.stop_flag.store(true, Ordering::Release);
        self.state.condvar.notify_one();

        if let Some(handle) = self.thread.lock().take() {
            // The last owner may be dropped from inside a job
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Work queue worker panicked");
            }
        }
    }

    fn worker_loop(state: Arc<SharedQueueState>) {
        loop {
            let task = {
                let mut queue = state.queue.lock();
                while queue.is_empty() && !state.stop_flag.load(Ordering::Acquire) {
                    state.condvar.wait(&mut queue);
                }
                if state.stop_flag.load(Ordering::Acquire) {
                    queue.clear();
                    break;
                }
                queue.pop_front()
            };

            match task {
                Some(Task::Run(job)) => job(),
                Some(Task::Barrier(done)) => {
                    let _ = done.send(());
                }
                None => {}
            }
        }
        debug!("Work queue worker exiting");
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
