use crate::buffer::{BufferPool, TupleBuffer};
use crate::operators::OperatorHandler;
use crate::query_plan::StageId;

/// Exposes a stage's own operator handlers, the buffer pool, and the
/// downstream emit callback while `execute` runs (spec §4.3).
pub struct ExecutionContext<'a> {
    handlers: &'a mut [Box<dyn OperatorHandler>],
    pool: &'a BufferPool,
    successors: &'a [StageId],
    emitted: Vec<(StageId, TupleBuffer)>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(handlers: &'a mut [Box<dyn OperatorHandler>], pool: &'a BufferPool, successors: &'a [StageId]) -> Self {
        Self { handlers, pool, successors, emitted: Vec::new() }
    }

    pub fn pool(&self) -> &BufferPool {
        self.pool
    }

    pub fn successors(&self) -> &[StageId] {
        self.successors
    }

    pub fn handler_mut(&mut self, index: usize) -> Option<&mut Box<dyn OperatorHandler>> {
        self.handlers.get_mut(index)
    }

    pub fn handlers_mut(&mut self) -> &mut [Box<dyn OperatorHandler>] {
        self.handlers
    }

    /// Queues `buffer` for delivery to every declared successor stage.
    pub fn emit_to_successors(&mut self, buffer: TupleBuffer) {
        match self.successors.split_last() {
            None => {}
            Some((last, rest)) => {
                for successor in rest {
                    self.emitted.push((*successor, buffer.clone()));
                }
                self.emitted.push((*last, buffer));
            }
        }
    }

    /// Queues `buffer` for delivery to one specific successor.
    pub fn emit_to(&mut self, successor: StageId, buffer: TupleBuffer) {
        self.emitted.push((successor, buffer));
    }

    /// Drains the buffers accumulated by `emit_to`/`emit_to_successors` this
    /// call, handing ownership to the scheduler.
    pub fn take_emitted(&mut self) -> Vec<(StageId, TupleBuffer)> {
        std::mem::take(&mut self.emitted)
    }
}

/// Per-worker scratch state. Workers draw from a [`crate::buffer::SubPool`]
/// to reduce contention on the global pool's free list.
pub struct WorkerContext {
    pub worker_id: usize,
    pub subpool: Option<crate::buffer::SubPool>,
}

impl WorkerContext {
    pub fn new(worker_id: usize) -> Self {
        Self { worker_id, subpool: None }
    }

    pub fn with_subpool(worker_id: usize, subpool: crate::buffer::SubPool) -> Self {
        Self { worker_id, subpool: Some(subpool) }
    }
}
