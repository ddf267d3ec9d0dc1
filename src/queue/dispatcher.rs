use crate::buffer::TupleBuffer;
use crate::error::EngineError;
use crate::query_plan::StageId;
use crate::reconfiguration::ReconfigurationMarker;
use std::sync::Arc;

/// Result of running one task against the plan it targets.
pub enum DispatchOutcome {
    Ok,
    /// The stage asked to emit buffers downstream; each pair names the
    /// successor stage that should receive it.
    Emit(Vec<(StageId, TupleBuffer)>),
    /// Transient resource exhaustion. Carries the original input buffer
    /// back; the scheduler resubmits it as a new `Task::Data` for the same
    /// `(query_id, stage)` after a short wait, so the data isn't lost.
    Retry(TupleBuffer),
    Fatal(EngineError),
}

/// Implemented by the query manager: resolves `(query_id, stage)` to a live
/// [`crate::query_plan::ExecutableQueryPlan`] and runs the stage's
/// `execute`, or applies a reconfiguration event.
pub trait Dispatcher: Send + Sync {
    fn dispatch_data(&self, query_id: u64, stage: StageId, buffer: TupleBuffer) -> DispatchOutcome;

    fn dispatch_reconfiguration(
        &self,
        query_id: u64,
        stage: StageId,
        marker: Arc<ReconfigurationMarker>,
    ) -> DispatchOutcome;
}
