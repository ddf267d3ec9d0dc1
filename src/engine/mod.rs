//! `NodeEngine`: the top-level worker runtime (spec §4.7). Owns the buffer
//! pool, partition manager, worker pool, and the registry of deployed query
//! plans; implements [`crate::queue::Dispatcher`] so the worker pool can
//! route tasks back into plan execution.

use crate::buffer::BufferPool;
use crate::config::ExitCode;
use crate::error::{EngineError, Result};
use crate::partition::PartitionManager;
use crate::pipeline::{ExecutionContext, ExecutionResult, WorkerContext};
use crate::queue::{DispatchOutcome, Dispatcher, ShutdownMode, WorkerPool};
use crate::query_plan::{ExecutableQueryPlan, PlanStatus, StageId};
use crate::reconfiguration::{ReconfigurationEvent, ReconfigurationMarker};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

pub struct EngineConfig {
    pub num_buffers: usize,
    pub buffer_size: usize,
    pub num_worker_threads: usize,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { num_buffers: 1024, buffer_size: 4096, num_worker_threads: num_cpus::get(), queue_capacity: 4096 }
    }
}

struct Inner {
    node_id: Uuid,
    buffer_pool: BufferPool,
    partition_manager: Arc<PartitionManager>,
    plans: DashMap<u64, Arc<Mutex<ExecutableQueryPlan>>>,
    worker_pool: OnceCell<WorkerPool>,
    fatal_listener: Mutex<Option<Box<dyn Fn(&EngineError) + Send + Sync>>>,
}

impl Inner {
    fn worker_pool(&self) -> &WorkerPool {
        self.worker_pool.get().expect("worker pool initialized before first use")
    }

    fn plan(&self, query_id: u64) -> Option<Arc<Mutex<ExecutableQueryPlan>>> {
        self.plans.get(&query_id).map(|e| Arc::clone(e.value()))
    }
}

impl Dispatcher for Inner {
    fn dispatch_data(&self, query_id: u64, stage_id: StageId, buffer: crate::buffer::TupleBuffer) -> DispatchOutcome {
        let Some(plan) = self.plan(query_id) else {
            return DispatchOutcome::Fatal(EngineError::QueryNotFound(query_id));
        };
        let mut plan = plan.lock();
        let Some(stage) = plan.stage_mut(stage_id) else {
            return DispatchOutcome::Fatal(EngineError::QueryNotFound(query_id));
        };
        let crate::query_plan::PipelineStage { routine, handlers, successors, .. } = stage;
        let mut ctx = ExecutionContext::new(handlers.as_mut_slice(), &self.buffer_pool, successors.as_slice());
        let mut worker = WorkerContext::new(0);
        match routine.execute(buffer, &mut ctx, &mut worker) {
            ExecutionResult::Ok => DispatchOutcome::Ok,
            ExecutionResult::NeedsEmit => DispatchOutcome::Emit(ctx.take_emitted()),
            ExecutionResult::Retry(buffer) => DispatchOutcome::Retry(buffer),
            ExecutionResult::Fatal(err) => DispatchOutcome::Fatal(err),
        }
    }

    fn dispatch_reconfiguration(&self, query_id: u64, stage_id: StageId, marker: Arc<ReconfigurationMarker>) -> DispatchOutcome {
        let Some(plan) = self.plan(query_id) else {
            return DispatchOutcome::Fatal(EngineError::QueryNotFound(query_id));
        };
        let mut plan_guard = plan.lock();
        let (decomposed_query_id, version) = (plan_guard.decomposed_query_id, plan_guard.version);
        let events: Vec<ReconfigurationEvent> = marker.events_for(decomposed_query_id, version).map(|e| e.to_vec()).unwrap_or_default();
        let Some(stage) = plan_guard.stage_mut(stage_id) else {
            return DispatchOutcome::Fatal(EngineError::QueryNotFound(query_id));
        };
        for event in &events {
            for handler in stage.handlers.iter_mut() {
                handler.on_reconfiguration(event);
            }
        }
        let terminal = events.iter().any(|e| matches!(e, ReconfigurationEvent::SoftEnd | ReconfigurationEvent::HardEnd));
        let failed = events.iter().any(|e| matches!(e, ReconfigurationEvent::FailEnd));
        drop(events);
        if failed {
            let _ = plan_guard.transition(PlanStatus::Failed);
        } else if terminal && plan_guard.status() == PlanStatus::Stopping {
            let _ = plan_guard.transition(PlanStatus::Stopped);
        }
        DispatchOutcome::Ok
    }
}

/// Top-level worker runtime. Cheap to clone (an `Arc` handle internally).
#[derive(Clone)]
pub struct NodeEngine {
    inner: Arc<Inner>,
}

/// Lets external I/O (the network source) route a decoded frame straight
/// into plan execution the same way the worker pool does when it pops a
/// task off its own queue.
impl Dispatcher for NodeEngine {
    fn dispatch_data(&self, query_id: u64, stage_id: StageId, buffer: crate::buffer::TupleBuffer) -> DispatchOutcome {
        self.inner.dispatch_data(query_id, stage_id, buffer)
    }

    fn dispatch_reconfiguration(&self, query_id: u64, stage_id: StageId, marker: Arc<ReconfigurationMarker>) -> DispatchOutcome {
        self.inner.dispatch_reconfiguration(query_id, stage_id, marker)
    }
}

impl NodeEngine {
    pub fn new(config: EngineConfig) -> Self {
        let inner = Arc::new(Inner {
            node_id: Uuid::new_v4(),
            buffer_pool: BufferPool::new(config.num_buffers, config.buffer_size),
            partition_manager: Arc::new(PartitionManager::new()),
            plans: DashMap::new(),
            worker_pool: OnceCell::new(),
            fatal_listener: Mutex::new(None),
        });
        let dispatcher: Arc<dyn Dispatcher> = Arc::clone(&inner) as Arc<dyn Dispatcher>;
        let worker_pool = WorkerPool::new(config.num_worker_threads, config.queue_capacity, dispatcher);
        let _ = inner.worker_pool.set(worker_pool);
        tracing::info!(node_id = %inner.node_id, "node engine started");
        Self { inner }
    }

    pub fn node_id(&self) -> Uuid {
        self.inner.node_id
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.inner.buffer_pool
    }

    pub fn partition_manager(&self) -> &Arc<PartitionManager> {
        &self.inner.partition_manager
    }

    pub fn on_fatal(&self, listener: impl Fn(&EngineError) + Send + Sync + 'static) {
        *self.inner.fatal_listener.lock() = Some(Box::new(listener));
    }

    /// Created -> Registered. Idempotent: re-registering an already
    /// registered plan is a no-op success.
    pub fn register(&self, plan: ExecutableQueryPlan) -> Result<()> {
        let query_id = plan.query_id;
        if plan.status() == PlanStatus::Created {
            plan.transition(PlanStatus::Registered)?;
        }
        self.inner.plans.insert(query_id, Arc::new(Mutex::new(plan)));
        Ok(())
    }

    /// Registered -> Running.
    pub fn start(&self, query_id: u64) -> Result<()> {
        let plan = self.inner.plan(query_id).ok_or(EngineError::QueryNotFound(query_id))?;
        plan.lock().transition(PlanStatus::Running)?;
        Ok(())
    }

    /// register + start.
    pub fn deploy(&self, plan: ExecutableQueryPlan) -> Result<()> {
        let query_id = plan.query_id;
        self.register(plan)?;
        self.start(query_id)
    }

    /// Running -> Stopping (-> Stopped once drained). `graceful` selects a
    /// soft vs. hard end-of-stream broadcast to every stage (spec §4.6).
    pub fn stop(&self, query_id: u64, graceful: bool) -> Result<()> {
        let plan = self.inner.plan(query_id).ok_or(EngineError::QueryNotFound(query_id))?;
        let stage_ids: Vec<StageId> = {
            let mut plan_guard = plan.lock();
            plan_guard.transition(PlanStatus::Stopping)?;
            plan_guard.stage_ids().copied().collect()
        };
        let mut marker = ReconfigurationMarker::new();
        let event = if graceful { ReconfigurationEvent::SoftEnd } else { ReconfigurationEvent::HardEnd };
        let (decomposed_query_id, version) = {
            let plan_guard = plan.lock();
            (plan_guard.decomposed_query_id, plan_guard.version)
        };
        marker.insert(decomposed_query_id, version, vec![event]);
        self.inner.worker_pool().submit_reconfiguration(query_id, stage_ids, Arc::new(marker));
        if !graceful {
            plan.lock().transition(PlanStatus::Stopped).ok();
        }
        Ok(())
    }

    /// Idempotent: removing an unknown plan is a success.
    pub fn unregister(&self, query_id: u64) -> Result<()> {
        self.inner.plans.remove(&query_id);
        Ok(())
    }

    /// stop(graceful) + unregister.
    pub fn undeploy(&self, query_id: u64) -> Result<()> {
        if self.inner.plans.contains_key(&query_id) {
            self.stop(query_id, true)?;
        }
        self.unregister(query_id)
    }

    /// `None` ("Invalid" per spec §4.6) once the plan has been unregistered
    /// or was never known.
    pub fn status(&self, query_id: u64) -> Option<PlanStatus> {
        self.inner.plan(query_id).map(|p| p.lock().status())
    }

    /// Broadcasts `marker` to every local plan whose `(decomposed_query_id,
    /// version)` has a matching entry in the marker's map (spec §4.7).
    pub fn propagate_marker(&self, marker: Arc<ReconfigurationMarker>) {
        for entry in self.inner.plans.iter() {
            let query_id = *entry.key();
            let (decomposed_query_id, version, stage_ids) = {
                let plan = entry.value().lock();
                (plan.decomposed_query_id, plan.version, plan.stage_ids().copied().collect::<Vec<_>>())
            };
            if marker.events_for(decomposed_query_id, version).is_some() {
                self.inner.worker_pool().submit_reconfiguration(query_id, stage_ids, Arc::clone(&marker));
            }
        }
    }

    /// Logs, hard-stops every local plan, notifies the fatal listener, then
    /// exits the process (spec §4.7). Only `EngineError::FatalEngineError`
    /// should ever reach this call.
    pub fn on_fatal_exception(&self, err: EngineError, backtrace: &str) {
        tracing::error!(%err, backtrace, "fatal engine error, stopping all plans");
        let query_ids: Vec<u64> = self.inner.plans.iter().map(|e| *e.key()).collect();
        for query_id in query_ids {
            let _ = self.stop(query_id, false);
        }
        if let Some(listener) = self.inner.fatal_listener.lock().as_ref() {
            listener(&err);
        }
        self.inner.worker_pool().shutdown(ShutdownMode::Hard);
        std::process::exit(ExitCode::FatalRuntime as i32);
    }
}
