use super::{DispatchOutcome, Dispatcher, Task};
use crate::buffer::TupleBuffer;
use crate::query_plan::StageId;
use crate::reconfiguration::ReconfigurationMarker;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub enum ShutdownMode {
    /// Drain in-flight work already enqueued, then stop.
    Soft,
    /// Discard remaining tasks immediately (their buffers are dropped,
    /// which recycles them back to the pool).
    Hard,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub tasks_executed: AtomicU64,
    pub tasks_retried: AtomicU64,
}

/// Parallel worker threads pulling `(buffer, stage)` tasks off a bounded
/// channel (spec §4.2). `execute` calls are blocking and non-suspending from
/// the worker's perspective; sources that would block live on their own
/// threads outside this pool.
pub struct WorkerPool {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    dispatcher: Arc<dyn Dispatcher>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    hard_stop: Arc<AtomicBool>,
    draining: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    /// `capacity` should be at least `num_workers * 4` (spec §4.2); callers
    /// pass it explicitly rather than deriving it so a zero-worker pool used
    /// purely to exercise queueing/shutdown semantics in tests can still be
    /// given room to hold tasks.
    pub fn new(num_workers: usize, capacity: usize, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let (sender, receiver) = channel::bounded(capacity.max(1));
        let hard_stop = Arc::new(AtomicBool::new(false));
        let draining = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(WorkerStats::default());

        let mut handles = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let receiver = receiver.clone();
            let sender = sender.clone();
            let dispatcher = Arc::clone(&dispatcher);
            let hard_stop = Arc::clone(&hard_stop);
            let draining = Arc::clone(&draining);
            let stats = Arc::clone(&stats);
            let handle = std::thread::Builder::new()
                .name(format!("nes-worker-{id}"))
                .spawn(move || worker_loop(id, receiver, sender, dispatcher, hard_stop, draining, stats))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        tracing::info!(num_workers, capacity, "worker pool started");
        Self { sender, receiver, dispatcher, handles: Mutex::new(handles), hard_stop, draining, stats }
    }

    /// Blocks when the queue is full (back-pressure).
    pub fn submit_data(&self, query_id: u64, stage: StageId, buffer: TupleBuffer) {
        let _ = self.sender.send(Task::Data { query_id, stage, buffer });
    }

    /// Replicates the marker once per recipient stage; the last recipient to
    /// handle its copy triggers the actual lifecycle transition (spec §4.2).
    pub fn submit_reconfiguration(&self, query_id: u64, recipients: Vec<StageId>, marker: Arc<ReconfigurationMarker>) {
        let remaining = Arc::new(AtomicU32::new(recipients.len() as u32));
        for stage in recipients {
            let _ = self.sender.send(Task::Reconfiguration {
                query_id,
                stage,
                marker: Arc::clone(&marker),
                remaining: Arc::clone(&remaining),
            });
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown(&self, mode: ShutdownMode) {
        match mode {
            ShutdownMode::Soft => self.draining.store(true, Ordering::Release),
            ShutdownMode::Hard => self.hard_stop.store(true, Ordering::Release),
        }
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        if matches!(mode, ShutdownMode::Hard) {
            // Drop whatever is left; buffers release and recycle on drop.
            while self.receiver.try_recv().is_ok() {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    _id: usize,
    receiver: Receiver<Task>,
    sender: Sender<Task>,
    dispatcher: Arc<dyn Dispatcher>,
    hard_stop: Arc<AtomicBool>,
    draining: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) {
    loop {
        if hard_stop.load(Ordering::Acquire) {
            return;
        }
        let task = match receiver.recv_timeout(Duration::from_millis(50)) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => {
                if draining.load(Ordering::Acquire) && receiver.is_empty() {
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        };

        run_task(task, &sender, &dispatcher, &stats);

        if hard_stop.load(Ordering::Acquire) {
            return;
        }
    }
}

fn run_task(task: Task, sender: &Sender<Task>, dispatcher: &Arc<dyn Dispatcher>, stats: &WorkerStats) {
    match task {
        Task::Data { query_id, stage, buffer } => {
            match dispatcher.dispatch_data(query_id, stage, buffer) {
                DispatchOutcome::Ok => {
                    stats.tasks_executed.fetch_add(1, Ordering::Relaxed);
                }
                DispatchOutcome::Emit(emitted) => {
                    stats.tasks_executed.fetch_add(1, Ordering::Relaxed);
                    for (successor, out_buffer) in emitted {
                        let _ = sender.send(Task::Data { query_id, stage: successor, buffer: out_buffer });
                    }
                }
                DispatchOutcome::Retry(buffer) => {
                    stats.tasks_retried.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(Duration::from_millis(5));
                    let _ = sender.send(Task::Data { query_id, stage, buffer });
                }
                DispatchOutcome::Fatal(err) => {
                    tracing::error!(query_id, stage = stage.0, %err, "stage execution failed fatally");
                }
            }
        }
        Task::Reconfiguration { query_id, stage, marker, remaining } => {
            let outcome = dispatcher.dispatch_reconfiguration(query_id, stage, marker);
            let left = remaining.fetch_sub(1, Ordering::AcqRel) - 1;
            if left == 0 {
                tracing::debug!(query_id, stage = stage.0, "last recipient applied reconfiguration marker");
            }
            if let DispatchOutcome::Fatal(err) = outcome {
                tracing::error!(query_id, stage = stage.0, %err, "reconfiguration handling failed fatally");
            }
        }
    }
}
