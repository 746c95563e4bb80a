use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::debug;

use crate::error::Error;
use crate::executor::{IdleSet, InFlight, Task};

/// `(fatigue, id)` ascending. Comparison is total and deterministic: it only
/// ever reads the stored `busyNanos`, never a live clock.
#[derive(Debug, Clone, Copy)]
pub struct WorkerKey {
    pub fatigue: f64,
    pub id: u32,
}

impl PartialEq for WorkerKey {
    fn eq(&self, other: &Self) -> bool {
        self.fatigue.total_cmp(&other.fatigue) == Ordering::Equal && self.id == other.id
    }
}
impl Eq for WorkerKey {}

impl PartialOrd for WorkerKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkerKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fatigue
            .total_cmp(&other.fatigue)
            .then_with(|| self.id.cmp(&other.id))
    }
}

enum Message {
    Task(Task),
    Shutdown,
}

/// A long-lived execution context with a single-slot handoff queue and a
/// cumulative busy-time counter. States: `IDLE -> BUSY -> IDLE -> ... ->
/// DEAD`.
pub struct Worker {
    id: u32,
    fatigue_factor: f64,
    busy_nanos: AtomicU64,
    sender: Sender<Message>,
    idle: Arc<IdleSet>,
    inflight: Arc<InFlight>,
}

impl Worker {
    /// Spawns the worker's run-loop thread and returns the shared handle
    /// alongside its join handle. The worker is not yet in the idle set —
    /// the caller inserts it once construction finishes.
    pub(crate) fn spawn(
        id: u32,
        fatigue_factor: f64,
        idle: Arc<IdleSet>,
        inflight: Arc<InFlight>,
    ) -> (Arc<Worker>, JoinHandle<()>) {
        let (sender, receiver) = bounded::<Message>(1);
        let worker = Arc::new(Worker {
            id,
            fatigue_factor,
            busy_nanos: AtomicU64::new(0),
            sender,
            idle,
            inflight,
        });
        let run_loop_worker = Arc::clone(&worker);
        let handle = thread::Builder::new()
            .name(format!("fatigue-worker-{id}"))
            .spawn(move || run_loop_worker.run(receiver))
            .expect("failed to spawn worker thread");
        (worker, handle)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn busy_nanos(&self) -> u64 {
        self.busy_nanos.load(AtomicOrdering::SeqCst)
    }

    /// `fatigueFactor x cumulativeBusyNanos`. Only meaningful while the
    /// worker is idle — it is frozen for the duration of any task run, and
    /// only updated by the owning worker thread itself.
    pub fn key(&self) -> WorkerKey {
        WorkerKey {
            fatigue: self.fatigue_factor * self.busy_nanos() as f64,
            id: self.id,
        }
    }

    /// Non-blocking. Fails with `InvalidState` if the single handoff slot is
    /// already occupied — under the executor's protocol this is only ever
    /// offered to a worker just removed from the idle set, so it should
    /// never actually fail.
    pub(crate) fn offer(&self, task: Task) -> Result<(), Error> {
        self.sender
            .try_send(Message::Task(task))
            .map_err(|_| Error::InvalidState("worker offered a task while busy".into()))
    }

    /// Reliably delivers the poison pill via a blocking publish, so delivery
    /// is guaranteed even if the slot happens to be momentarily full.
    pub(crate) fn shutdown_signal(&self) {
        let _ = self.sender.send(Message::Shutdown);
    }

    fn run(self: Arc<Self>, receiver: Receiver<Message>) {
        while let Ok(message) = receiver.recv() {
            match message {
                Message::Shutdown => {
                    debug!("worker {} received shutdown signal", self.id);
                    break;
                }
                Message::Task(task) => {
                    let start = Instant::now();
                    task();
                    let elapsed = start.elapsed().as_nanos() as u64;
                    // busyNanos is updated before the worker is returned to
                    // the idle set and before in-flight is decremented, so
                    // no observer ever sees a stale fatigue score or a
                    // premature barrier wakeup.
                    self.busy_nanos.fetch_add(elapsed, AtomicOrdering::SeqCst);
                    self.idle.push(self.key());
                    self.inflight.decrement();
                }
            }
        }
    }
}
