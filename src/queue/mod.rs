//! Task queue & worker pool: dispatch `(Buffer, PipelineStage)` pairs to a
//! fixed pool of worker threads (spec §4.2).
//!
//! The queue is a bounded MPMC channel (`crossbeam::channel`); `enqueue`
//! blocks when full, which is the back-pressure mechanism the rest of the
//! core relies on. Per-origin ordering for single-threaded stages is
//! achieved by having the stage's own operator handler reorder by sequence
//! number (spec §4.2's second alternative) rather than by worker pinning,
//! since a single shared channel has no notion of "the same worker" to pin
//! to; see DESIGN.md for this Open Question decision.

mod dispatcher;
mod worker_pool;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use worker_pool::{ShutdownMode, WorkerPool};

use crate::buffer::TupleBuffer;
use crate::query_plan::StageId;
use crate::reconfiguration::ReconfigurationMarker;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

/// One unit of scheduled work. Reconfiguration messages share the queue with
/// data tasks and are ordered against it (spec §2, §4.2).
pub enum Task {
    Data {
        query_id: u64,
        stage: StageId,
        buffer: TupleBuffer,
    },
    Reconfiguration {
        query_id: u64,
        stage: StageId,
        marker: Arc<ReconfigurationMarker>,
        /// Shared countdown across every recipient copy of this broadcast;
        /// the worker that decrements it to zero is the one that triggers
        /// the actual lifecycle transition (spec §4.2).
        remaining: Arc<AtomicU32>,
    },
}
