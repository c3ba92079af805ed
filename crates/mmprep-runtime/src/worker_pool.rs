// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size worker pool with caller-scoped task batches.
//!
//! # Design
//! - `N` named threads pull boxed jobs from one shared crossbeam channel
//! - Each worker polls with a timeout so the shutdown flag is observed promptly
//! - Every task returns a typed [`PipelineResult`]; panics are caught and turned
//!   into [`PipelineError::WorkerPool`]
//! - A [`TaskBatch`] tracks only its own tasks, so two callers sharing the pool
//!   never observe each other's completion
//! - [`WorkerPool::wait_idle`] is the pool-global barrier: queue empty and no task in flight

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use mmprep_structures::{PipelineError, PipelineResult};

/// Work item as seen by a worker thread; receives the worker id.
type Job = Box<dyn FnOnce(usize) + Send + 'static>;

/// Task as staged by a caller
type Task<T> = Box<dyn FnOnce(usize) -> PipelineResult<T> + Send + 'static>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct PoolShared {
    shutdown: AtomicBool,
    /// Jobs dispatched but not yet finished
    pending: Mutex<usize>,
    idle: Condvar,
}

impl PoolShared {
    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// A fixed set of worker threads consuming one task queue
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Spawn `num_threads` workers named `{name}-worker-{id}`.
    pub fn new(num_threads: usize, name: impl Into<String>) -> PipelineResult<Self> {
        if num_threads == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker pool needs at least one thread".to_string(),
            ));
        }

        let (sender, receiver) = unbounded::<Job>();
        let mut pool = WorkerPool {
            name: name.into(),
            sender: Some(sender),
            handles: Vec::with_capacity(num_threads),
            shared: Arc::new(PoolShared {
                shutdown: AtomicBool::new(false),
                pending: Mutex::new(0),
                idle: Condvar::new(),
            }),
        };

        for worker_id in 0..num_threads {
            let rx = receiver.clone();
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-worker-{}", pool.name, worker_id))
                .spawn(move || worker_loop(worker_id, rx, shared))
                .map_err(|e| {
                    PipelineError::WorkerPool(format!("failed to spawn worker {}: {}", worker_id, e))
                })?;
            pool.handles.push(handle);
        }

        debug!(pool = %pool.name, threads = num_threads, "worker pool started");
        Ok(pool)
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs dispatched to the queue that have not finished yet, across all callers.
    pub fn pending(&self) -> usize {
        *self.shared.pending.lock()
    }

    /// Start a new batch of tasks producing `T`.
    pub fn batch<T: Send + 'static>(&self) -> TaskBatch<'_, T> {
        TaskBatch {
            pool: self,
            staged: Vec::new(),
            state: Arc::new(BatchState {
                slots: Mutex::new(BatchSlots {
                    results: Vec::new(),
                    outstanding: 0,
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Block until the queue is empty and no worker is running a job.
    ///
    /// This barrier is global: it also waits for jobs submitted by other callers.
    pub fn wait_idle(&self) {
        let mut pending = self.shared.pending.lock();
        while *pending > 0 {
            self.shared.idle.wait(&mut pending);
        }
    }

    fn dispatch(&self, job: Job) -> PipelineResult<()> {
        let sender = self.sender.as_ref().ok_or_else(|| {
            PipelineError::WorkerPool(format!("pool {} is shut down", self.name))
        })?;
        *self.shared.pending.lock() += 1;
        if sender.send(job).is_err() {
            self.shared.finish_one();
            return Err(PipelineError::WorkerPool(format!(
                "pool {} has no live workers",
                self.name
            )));
        }
        Ok(())
    }
}

fn worker_loop(worker_id: usize, rx: Receiver<Job>, shared: Arc<PoolShared>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(job) => {
                job(worker_id);
                shared.finish_one();
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.wait_idle();
        self.shared.shutdown.store(true, Ordering::Release);
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!(pool = %self.name, "worker thread panicked during shutdown");
            }
        }
        debug!(pool = %self.name, "worker pool stopped");
    }
}

struct BatchSlots<T> {
    results: Vec<Option<PipelineResult<T>>>,
    outstanding: usize,
}

struct BatchState<T> {
    slots: Mutex<BatchSlots<T>>,
    done: Condvar,
}

impl<T> BatchState<T> {
    fn complete(&self, index: usize, outcome: PipelineResult<T>) {
        let mut slots = self.slots.lock();
        slots.results[index] = Some(outcome);
        slots.outstanding -= 1;
        if slots.outstanding == 0 {
            self.done.notify_all();
        }
    }

    fn wait(&self) {
        let mut slots = self.slots.lock();
        while slots.outstanding > 0 {
            self.done.wait(&mut slots);
        }
    }
}

/// A group of tasks submitted together and awaited together.
///
/// # Example
/// ```
/// use mmprep_runtime::WorkerPool;
///
/// let pool = WorkerPool::new(2, "doc").unwrap();
/// let mut batch = pool.batch::<usize>();
/// for i in 0..4 {
///     batch.add_task(move |_worker| Ok(i * i));
/// }
/// batch.run_all(false);
/// assert_eq!(batch.collect().unwrap(), vec![0, 1, 4, 9]);
/// ```
pub struct TaskBatch<'p, T> {
    pool: &'p WorkerPool,
    staged: Vec<Task<T>>,
    state: Arc<BatchState<T>>,
}

impl<'p, T: Send + 'static> TaskBatch<'p, T> {
    /// Stage a task. Nothing runs until [`TaskBatch::run_all`].
    pub fn add_task<F>(&mut self, task: F)
    where
        F: FnOnce(usize) -> PipelineResult<T> + Send + 'static,
    {
        self.staged.push(Box::new(task));
    }

    /// Number of tasks staged or dispatched so far.
    pub fn len(&self) -> usize {
        self.staged.len() + self.state.slots.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand every staged task to the workers; with `wait`, block until this batch is done.
    pub fn run_all(&mut self, wait: bool) {
        let staged = std::mem::take(&mut self.staged);
        let base = {
            let mut slots = self.state.slots.lock();
            let base = slots.results.len();
            slots.results.extend((0..staged.len()).map(|_| None));
            slots.outstanding += staged.len();
            base
        };

        for (offset, task) in staged.into_iter().enumerate() {
            let index = base + offset;
            let state = Arc::clone(&self.state);
            let job: Job = Box::new(move |worker_id| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(worker_id)))
                    .unwrap_or_else(|payload| {
                        Err(PipelineError::WorkerPool(format!(
                            "task {} panicked: {}",
                            index,
                            panic_message(payload.as_ref())
                        )))
                    });
                state.complete(index, outcome);
            });
            if let Err(e) = self.pool.dispatch(job) {
                self.state.complete(index, Err(e));
            }
        }

        if wait {
            self.state.wait();
        }
    }

    /// Block until every task of this batch has finished and return the per-task results
    /// in submission order.
    ///
    /// With `throw_errors`, any failed task turns the whole call into an error: every
    /// failure is logged and the last one is returned.
    pub fn wait_all(mut self, throw_errors: bool) -> PipelineResult<Vec<PipelineResult<T>>> {
        if !self.staged.is_empty() {
            self.run_all(false);
        }
        self.state.wait();

        let results: Vec<PipelineResult<T>> = std::mem::take(&mut self.state.slots.lock().results)
            .into_iter()
            .map(|r| {
                r.unwrap_or_else(|| Err(PipelineError::WorkerPool("task result missing".to_string())))
            })
            .collect();

        if throw_errors {
            let mut last = None;
            for (index, result) in results.iter().enumerate() {
                if let Err(e) = result {
                    error!(pool = %self.pool.name, task = index, error = %e, "task failed");
                    last = Some(e.clone());
                }
            }
            if let Some(e) = last {
                return Err(e);
            }
        }
        Ok(results)
    }

    /// [`TaskBatch::wait_all`] with errors thrown, unwrapped into plain values.
    pub fn collect(self) -> PipelineResult<Vec<T>> {
        self.wait_all(true)?.into_iter().collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
