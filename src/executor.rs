use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::info;
use rand::Rng;

use crate::error::Error;
use crate::worker::{Worker, WorkerKey};

/// A unit of work handed to a worker thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Mutex-guarded ordered heap of idle workers, keyed by `(fatigue, id)`.
/// Popping blocks until a worker is idle.
pub(crate) struct IdleSet {
    heap: Mutex<BinaryHeap<Reverse<WorkerKey>>>,
    cv: Condvar,
}

impl IdleSet {
    fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn push(&self, key: WorkerKey) {
        let mut heap = self.heap.lock().unwrap();
        heap.push(Reverse(key));
        self.cv.notify_one();
    }

    fn pop_min_blocking(&self) -> WorkerKey {
        let mut heap = self.heap.lock().unwrap();
        loop {
            if let Some(Reverse(key)) = heap.pop() {
                return key;
            }
            heap = self.cv.wait(heap).unwrap();
        }
    }
}

/// The in-flight task counter plus the completion signal layered over it.
/// The counter itself is atomic; `submitAll` additionally holds `guard`
/// across the whole submission loop so that a task completing (and
/// notifying) before the waiter reaches its wait cannot be missed — the
/// notifier has to acquire `guard` too, which blocks it until the submitter
/// calls `wait`.
pub(crate) struct InFlight {
    count: AtomicUsize,
    guard: Mutex<()>,
    cv: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            guard: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.guard.lock().unwrap();
            self.cv.notify_all();
        }
    }

    fn wait_until_zero(&self) {
        let guard = self.guard.lock().unwrap();
        let _guard = self
            .cv
            .wait_while(guard, |_| self.count.load(Ordering::SeqCst) != 0)
            .unwrap();
    }
}

/// A fixed-size pool of workers dispatched by fatigue priority. Guarantees
/// exactly-once execution of every submitted task, bulk barrier semantics
/// (`submit_all`), clean poison-pill shutdown, and race-free completion
/// signalling.
pub struct FatigueExecutor {
    workers: Vec<Arc<Worker>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    idle: Arc<IdleSet>,
    inflight: Arc<InFlight>,
    shutdown_done: AtomicBool,
}

impl FatigueExecutor {
    /// `N` workers, each drawing its fatigue factor uniformly from
    /// `[0.5, 1.5)`. Fails `InvalidArgument` if `N == 0`.
    pub fn new(num_workers: usize) -> Result<Self, Error> {
        let mut rng = rand::thread_rng();
        let factors: Vec<f64> = (0..num_workers)
            .map(|_| rng.gen_range(0.5..1.5))
            .collect();
        Self::with_factors(&factors)
    }

    /// Same construction, but with explicit per-worker fatigue factors.
    /// Kept for deterministic tests — the dispatch policy itself
    /// (least-fatigue-first) is unchanged either way.
    pub fn with_factors(factors: &[f64]) -> Result<Self, Error> {
        if factors.is_empty() {
            return Err(Error::InvalidArgument(
                "executor requires at least one worker".into(),
            ));
        }

        let idle = Arc::new(IdleSet::new());
        let inflight = Arc::new(InFlight::new());
        let mut workers = Vec::with_capacity(factors.len());
        let mut handles = Vec::with_capacity(factors.len());

        for (id, factor) in factors.iter().enumerate() {
            let (worker, handle) =
                Worker::spawn(id as u32, *factor, Arc::clone(&idle), Arc::clone(&inflight));
            idle.push(worker.key());
            workers.push(worker);
            handles.push(handle);
        }

        info!("fatigue executor started with {} workers", workers.len());

        Ok(Self {
            workers,
            handles: Mutex::new(handles),
            idle,
            inflight,
            shutdown_done: AtomicBool::new(false),
        })
    }

    /// Submits every task in order, then blocks until every one of them has
    /// finished. Holds the completion lock across the whole submission loop
    /// to close the wake-before-wait race.
    pub fn submit_all(&self, tasks: Vec<Task>) {
        let _guard = self.inflight.guard.lock().unwrap();
        for task in tasks {
            self.dispatch(task);
        }
        drop(_guard);
        self.inflight.wait_until_zero();
    }

    fn dispatch(&self, task: Task) {
        let key = self.idle.pop_min_blocking();
        self.inflight.increment();
        let worker = &self.workers[key.id as usize];
        if worker.offer(task).is_err() {
            self.inflight.decrement();
            self.idle.push(key);
        }
    }

    /// Waits for in-flight to reach zero, delivers a sentinel to every
    /// worker, then joins every worker thread. Idempotent: later calls, and
    /// the equivalent logic run from `Drop`, are no-ops.
    pub fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inflight.wait_until_zero();
        for worker in &self.workers {
            worker.shutdown_signal();
        }
        let mut handles = self.handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        info!("fatigue executor shut down");
    }
}

impl Drop for FatigueExecutor {
    /// Guarantees every worker thread is released even if evaluation
    /// returned early via `?` or unwound through a panic.
    fn drop(&mut self) {
        self.shutdown();
    }
}
