// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! The executable query plan (EQP): a DAG of sources, pipelines, sinks with
//! a lifecycle state (spec.md §3 "Executable query plan (EQP)").

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::Schema;
use crate::error::{ExecutionError, ExecutionResult};
use crate::pipeline::handlers::OperatorHandlerArena;
use crate::pipeline::stage::ExecutablePipelineStage;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            #[cfg(test)]
            pub fn new_for_test(v: u64) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

id_newtype!(SharedQueryId);
id_newtype!(DecomposedQueryId);
id_newtype!(PipelineId);
id_newtype!(SourceOperatorId);
id_newtype!(SinkOperatorId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanVersion(pub u32);

/// Where a pipeline or source forwards its output (spec.md §3: "ordered
/// sources, ordered sinks, a DAG of pipelines").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Successor {
    Pipeline(PipelineId),
    Sink(SinkOperatorId),
}

/// Lifecycle state of an EQP (spec.md §3 "Lifecycle").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqpState {
    Created,
    Deployed,
    Running,
    Finished,
    Stopped,
    ErrorState,
    Invalid,
}

impl EqpState {
    /// Valid forward transitions (spec.md §3 lifecycle bullets). Any
    /// transition not listed here is rejected, which is how we enforce e.g.
    /// "an EQP refused at registration never leaves Created" (spec.md §7
    /// `InvalidPlan`).
    fn can_transition_to(self, next: EqpState) -> bool {
        use EqpState::*;
        matches!(
            (self, next),
            (Created, Deployed)
                | (Created, Invalid)
                | (Deployed, Running)
                | (Running, Finished)
                | (Running, Stopped)
                | (Running, ErrorState)
                | (Created, Stopped)
                | (Deployed, Stopped)
                | (Deployed, ErrorState)
        )
    }
}

pub struct PipelineNode {
    pub id: PipelineId,
    pub stage: Arc<dyn ExecutablePipelineStage>,
    pub successors: Vec<Successor>,
    pub handler_ids: Vec<crate::pipeline::handlers::OperatorHandlerId>,
    pub output_schema: Schema,
}

pub struct SourceBinding {
    pub id: SourceOperatorId,
    pub successors: Vec<PipelineId>,
    pub schema: Schema,
}

pub struct SinkBinding {
    pub id: SinkOperatorId,
    pub schema: Schema,
}

/// Identified by `(decomposedQueryId, version)`, belonging to a
/// `sharedQueryId` shared across reuses (spec.md §3).
pub struct ExecutableQueryPlan {
    pub shared_query_id: SharedQueryId,
    pub decomposed_query_id: DecomposedQueryId,
    pub version: PlanVersion,
    sources: Vec<SourceBinding>,
    sinks: Vec<SinkBinding>,
    pipelines: HashMap<PipelineId, PipelineNode>,
    /// Per-operator mutable state, allocated once and living exactly as long
    /// as the EQP (spec.md §9 "Cyclic ownership": "Handlers are allocated in
    /// an arena owned by the EQP; lifetime is the EQP").
    pub handlers: OperatorHandlerArena,
    state: Mutex<EqpState>,
}

impl ExecutableQueryPlan {
    pub fn new(
        shared_query_id: SharedQueryId,
        decomposed_query_id: DecomposedQueryId,
        version: PlanVersion,
        sources: Vec<SourceBinding>,
        sinks: Vec<SinkBinding>,
        pipelines: HashMap<PipelineId, PipelineNode>,
        handlers: OperatorHandlerArena,
    ) -> ExecutionResult<Self> {
        Self::validate(&sources, &sinks, &pipelines, decomposed_query_id)?;
        Ok(Self {
            shared_query_id,
            decomposed_query_id,
            version,
            sources,
            sinks,
            pipelines,
            handlers,
            state: Mutex::new(EqpState::Created),
        })
    }

    /// Refuses structurally invalid plans at registration time (spec.md §7
    /// `InvalidPlan`: "schema mismatch, unknown operator... refused at
    /// registration; EQP never leaves Created").
    fn validate(
        sources: &[SourceBinding],
        sinks: &[SinkBinding],
        pipelines: &HashMap<PipelineId, PipelineNode>,
        decomposed_query_id: DecomposedQueryId,
    ) -> ExecutionResult<()> {
        if sources.is_empty() {
            return Err(ExecutionError::InvalidPlan(format!(
                "{decomposed_query_id} has no sources"
            )));
        }
        if sinks.is_empty() {
            return Err(ExecutionError::InvalidPlan(format!(
                "{decomposed_query_id} has no sinks"
            )));
        }
        let sink_ids: std::collections::HashSet<_> = sinks.iter().map(|s| s.id).collect();
        for source in sources {
            for successor in &source.successors {
                if !pipelines.contains_key(successor) {
                    return Err(ExecutionError::InvalidPlan(format!(
                        "source {} references unknown pipeline {successor}",
                        source.id
                    )));
                }
            }
        }
        for pipeline in pipelines.values() {
            for successor in &pipeline.successors {
                match successor {
                    Successor::Pipeline(id) => {
                        if !pipelines.contains_key(id) {
                            return Err(ExecutionError::InvalidPlan(format!(
                                "pipeline {} references unknown pipeline {id}",
                                pipeline.id
                            )));
                        }
                    }
                    Successor::Sink(id) => {
                        if !sink_ids.contains(id) {
                            return Err(ExecutionError::InvalidPlan(format!(
                                "pipeline {} references unknown sink {id}",
                                pipeline.id
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn state(&self) -> EqpState {
        *self.state.lock()
    }

    pub fn transition(&self, next: EqpState) -> ExecutionResult<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(ExecutionError::InvalidPlan(format!(
                "{} cannot transition {:?} -> {:?}",
                self.decomposed_query_id, *state, next
            )));
        }
        *state = next;
        Ok(())
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<&PipelineNode> {
        self.pipelines.get(&id)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &PipelineNode> {
        self.pipelines.values()
    }

    pub fn sources(&self) -> &[SourceBinding] {
        &self.sources
    }

    pub fn sinks(&self) -> &[SinkBinding] {
        &self.sinks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_plan_with_dangling_successor() {
        let sources = vec![SourceBinding {
            id: SourceOperatorId(1),
            successors: vec![PipelineId(99)],
            schema: Schema::new(vec![], crate::buffer::Layout::RowMajor),
        }];
        let sinks = vec![SinkBinding {
            id: SinkOperatorId(1),
            schema: Schema::new(vec![], crate::buffer::Layout::RowMajor),
        }];
        let result = ExecutableQueryPlan::new(
            SharedQueryId(1),
            DecomposedQueryId(1),
            PlanVersion(0),
            sources,
            sinks,
            HashMap::new(),
            OperatorHandlerArena::new(),
        );
        assert!(matches!(result, Err(ExecutionError::InvalidPlan(_))));
    }

    #[test]
    fn state_machine_rejects_skipping_deployed() {
        let eqp = minimal_eqp();
        assert_eq!(eqp.state(), EqpState::Created);
        assert!(eqp.transition(EqpState::Running).is_err());
        assert!(eqp.transition(EqpState::Deployed).is_ok());
        assert!(eqp.transition(EqpState::Running).is_ok());
        assert!(eqp.transition(EqpState::Finished).is_ok());
    }

    fn minimal_eqp() -> ExecutableQueryPlan {
        let sink_id = SinkOperatorId(1);
        let sources = vec![SourceBinding {
            id: SourceOperatorId(1),
            successors: vec![],
            schema: Schema::new(vec![], crate::buffer::Layout::RowMajor),
        }];
        let sinks = vec![SinkBinding {
            id: sink_id,
            schema: Schema::new(vec![], crate::buffer::Layout::RowMajor),
        }];
        ExecutableQueryPlan::new(
            SharedQueryId(1),
            DecomposedQueryId(1),
            PlanVersion(0),
            sources,
            sinks,
            HashMap::new(),
            OperatorHandlerArena::new(),
        )
        .unwrap()
    }
}
