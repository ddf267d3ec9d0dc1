//! Executable query plan: the compiled DAG of pipeline stages a `NodeEngine`
//! deploys, runs, and tears down (spec §4.6). Query compilation and physical
//! placement happen upstream of this core; a plan arrives here fully
//! compiled.

use crate::operators::OperatorHandler;
use crate::pipeline::ExecutableStage;
use crate::schema::Schema;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(pub u64);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// One node of the plan DAG: a compiled executable routine plus its own
/// operator handler state and the stages that consume its output (spec
/// §4.3, §4.4).
pub struct PipelineStage {
    pub id: StageId,
    pub input_schema: Schema,
    pub output_schema: Schema,
    pub routine: Box<dyn ExecutableStage>,
    pub handlers: Vec<Box<dyn OperatorHandler>>,
    pub successors: Vec<StageId>,
}

impl PipelineStage {
    pub fn new(
        id: StageId,
        input_schema: Schema,
        output_schema: Schema,
        routine: Box<dyn ExecutableStage>,
        handlers: Vec<Box<dyn OperatorHandler>>,
        successors: Vec<StageId>,
    ) -> Self {
        Self { id, input_schema, output_schema, routine, handlers, successors }
    }
}

/// Lifecycle states a plan moves through (spec §4.6). Transitions are
/// validated; an illegal transition is a programming error surfaced as
/// [`crate::error::EngineError::InvalidTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Created,
    Registered,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl PlanStatus {
    fn allowed_next(self) -> &'static [PlanStatus] {
        match self {
            PlanStatus::Created => &[PlanStatus::Registered, PlanStatus::Failed],
            PlanStatus::Registered => &[PlanStatus::Running, PlanStatus::Failed],
            PlanStatus::Running => &[PlanStatus::Stopping, PlanStatus::Failed],
            PlanStatus::Stopping => &[PlanStatus::Stopped, PlanStatus::Failed],
            PlanStatus::Stopped => &[],
            PlanStatus::Failed => &[],
        }
    }
}

/// The compiled DAG of stages for one decomposed query, as deployed to one
/// worker (spec §3 "Query plan", §4.6).
pub struct ExecutableQueryPlan {
    pub query_id: u64,
    pub decomposed_query_id: u64,
    pub version: u64,
    pub sources: Vec<StageId>,
    pub sinks: Vec<StageId>,
    stages: HashMap<StageId, PipelineStage>,
    status: Mutex<PlanStatus>,
}

impl ExecutableQueryPlan {
    pub fn new(query_id: u64, decomposed_query_id: u64, version: u64, stages: Vec<PipelineStage>, sources: Vec<StageId>, sinks: Vec<StageId>) -> Self {
        let stages = stages.into_iter().map(|s| (s.id, s)).collect();
        Self { query_id, decomposed_query_id, version, sources, sinks, stages, status: Mutex::new(PlanStatus::Created) }
    }

    pub fn stage(&self, id: StageId) -> Option<&PipelineStage> {
        self.stages.get(&id)
    }

    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut PipelineStage> {
        self.stages.get_mut(&id)
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = &StageId> {
        self.stages.keys()
    }

    pub fn status(&self) -> PlanStatus {
        *self.status.lock()
    }

    /// Validates and applies a lifecycle transition (spec §4.6). Returns the
    /// previous status on success.
    pub fn transition(&self, to: PlanStatus) -> crate::error::Result<PlanStatus> {
        let mut status = self.status.lock();
        if !status.allowed_next().contains(&to) {
            return Err(crate::error::EngineError::InvalidTransition { from: status.to_string(), to: to.to_string() });
        }
        let from = *status;
        *status = to;
        tracing::info!(query_id = self.query_id, decomposed_query_id = self.decomposed_query_id, %from, to = %to, "plan transitioned");
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ForwardStage;

    fn empty_plan() -> ExecutableQueryPlan {
        let stage = PipelineStage::new(StageId(0), Schema::empty(), Schema::empty(), Box::new(ForwardStage), Vec::new(), Vec::new());
        ExecutableQueryPlan::new(1, 1, 1, vec![stage], vec![StageId(0)], vec![StageId(0)])
    }

    #[test]
    fn happy_path_transitions_in_order() {
        let plan = empty_plan();
        assert_eq!(plan.status(), PlanStatus::Created);
        plan.transition(PlanStatus::Registered).unwrap();
        plan.transition(PlanStatus::Running).unwrap();
        plan.transition(PlanStatus::Stopping).unwrap();
        plan.transition(PlanStatus::Stopped).unwrap();
        assert_eq!(plan.status(), PlanStatus::Stopped);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let plan = empty_plan();
        let err = plan.transition(PlanStatus::Running).unwrap_err();
        assert!(matches!(err, crate::error::EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn failure_is_reachable_from_any_live_state() {
        let plan = empty_plan();
        plan.transition(PlanStatus::Registered).unwrap();
        plan.transition(PlanStatus::Failed).unwrap();
        assert_eq!(plan.status(), PlanStatus::Failed);
    }
}
