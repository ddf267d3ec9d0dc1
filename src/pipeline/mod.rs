//! Executable pipeline stage: a stateless compiled routine that transforms
//! one input buffer into zero or more output buffers (spec §4.3).

mod context;

pub use context::{ExecutionContext, WorkerContext};

use crate::buffer::TupleBuffer;
use crate::error::EngineError;
use crate::query_plan::StageId;

/// Outcome of one `execute` call.
pub enum ExecutionResult {
    Ok,
    /// The stage asked the context to emit one or more buffers; the
    /// scheduler enqueues each for its declared successor.
    NeedsEmit,
    /// Transient resource exhaustion (e.g. the pool was briefly empty).
    /// Carries the input back so the scheduler can resubmit the same task
    /// instead of dropping it.
    Retry(TupleBuffer),
    Fatal(EngineError),
}

/// One unit of compiled work in a query plan's DAG. Implementors must not
/// retain `input` past return unless they explicitly `retain()` it (e.g. a
/// join build side storing tuples in a hash table).
pub trait ExecutableStage: Send + Sync {
    fn execute(
        &self,
        input: TupleBuffer,
        ctx: &mut ExecutionContext<'_>,
        worker: &mut WorkerContext,
    ) -> ExecutionResult;

    /// Human-readable name for logging/diagnostics.
    fn name(&self) -> &str {
        "stage"
    }
}

/// A stage that copies its input straight to every successor, used for
/// sinks and pass-through stages that don't need their own executable
/// logic wired up yet.
pub struct ForwardStage;

impl ExecutableStage for ForwardStage {
    fn execute(&self, input: TupleBuffer, ctx: &mut ExecutionContext<'_>, _worker: &mut WorkerContext) -> ExecutionResult {
        ctx.emit_to_successors(input);
        ExecutionResult::NeedsEmit
    }

    fn name(&self) -> &str {
        "forward"
    }
}

pub type SuccessorList = Vec<StageId>;
