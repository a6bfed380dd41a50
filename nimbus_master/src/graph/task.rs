use std::fmt;

use nimbus_core::errors::Result;
use nimbus_core::types::{AccessMode, AppId, CoreId, DataId, DataKind, OnFailure, TaskHistory,
                         TaskId, TaskInfo, TaskSpec, TaskState};
use nimbus_core::utils::ConsistencyCheck;

use data::access::EngineDataAccessId;
use graph::group::TaskGroupRef;

/// Identifier of a parked main-code access waiting on producers.
pub type WaiterId = u64;

/// A dependency parameter after registration: the access it produced and
/// enough metadata to resolve it at task end.
#[derive(Clone, Debug)]
pub struct ResolvedParam {
    pub name: String,
    pub mode: AccessMode,
    pub data_id: DataId,
    pub data_kind: DataKind,
    pub access: EngineDataAccessId,
}

/// Payload distinguishing regular tasks from synthetic commutative group
/// nodes. A group node stands for a set of reorderable writes; dependents
/// attach to it instead of the individual members.
pub enum TaskKind {
    Regular {
        spec: TaskSpec,
        resolved: Vec<ResolvedParam>,
    },
    CommutativeGroup {
        core_id: CoreId,
        data_id: DataId,
        members: Vec<TaskNodeRef>,
        pending_members: usize,
        closed: bool,
        group_predecessor: Option<TaskNodeRef>,
        accesses: Vec<EngineDataAccessId>,
    },
}

/// A node of the task graph.
pub struct TaskNode {
    pub(crate) id: TaskId,
    pub(crate) app: AppId,

    /// Current state. Mutated only by the access processor.
    pub(crate) state: TaskState,

    pub(crate) history: Vec<TaskHistory>,

    pub(crate) on_failure: OnFailure,

    /// Dependency edges. One object can appear several times when a task
    /// uses the same datum as several parameters.
    pub(crate) successors: Vec<TaskNodeRef>,
    pub(crate) predecessors: Vec<TaskNodeRef>,

    /// Stream edges are graph-theoretic only and never gate readiness.
    pub(crate) stream_successors: Vec<TaskNodeRef>,
    pub(crate) stream_predecessors: Vec<TaskNodeRef>,

    /// Unresolved input versions; zero means ready for the dispatcher.
    pub(crate) pending_inputs: usize,

    pub(crate) being_cancelled: bool,

    /// The task started executing on a worker at least once. Decides
    /// whether a cancelled write keeps its produced version.
    pub(crate) submitted: bool,

    pub(crate) groups: Vec<TaskGroupRef>,

    /// Parked main accesses to release when the task ends.
    pub(crate) listeners: Vec<WaiterId>,

    pub(crate) info: TaskInfo,

    pub(crate) kind: TaskKind,
}

wrapped_ref!(TaskNodeRef, TaskNode);

impl TaskNode {
    #[inline]
    pub fn get_id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn get_app(&self) -> AppId {
        self.app
    }

    #[inline]
    pub fn get_state(&self) -> TaskState {
        self.state
    }

    /// The task still counts as an active producer/consumer.
    #[inline]
    pub fn is_pending(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn is_group(&self) -> bool {
        match self.kind {
            TaskKind::CommutativeGroup { .. } => true,
            TaskKind::Regular { .. } => false,
        }
    }

    pub fn spec(&self) -> Option<&TaskSpec> {
        match self.kind {
            TaskKind::Regular { ref spec, .. } => Some(spec),
            TaskKind::CommutativeGroup { .. } => None,
        }
    }

    pub fn resolved_params(&self) -> &[ResolvedParam] {
        match self.kind {
            TaskKind::Regular { ref resolved, .. } => resolved,
            TaskKind::CommutativeGroup { .. } => &[],
        }
    }

    pub fn push_resolved(&mut self, param: ResolvedParam) {
        if let TaskKind::Regular { ref mut resolved, .. } = self.kind {
            resolved.push(param);
        }
    }
}

impl TaskNodeRef {
    pub fn new_regular(id: TaskId, app: AppId, spec: TaskSpec) -> Self {
        let on_failure = spec.on_failure;
        TaskNodeRef::wrap(TaskNode {
            id,
            app,
            state: TaskState::Created,
            history: vec![TaskHistory::New],
            on_failure,
            successors: Vec::new(),
            predecessors: Vec::new(),
            stream_successors: Vec::new(),
            stream_predecessors: Vec::new(),
            pending_inputs: 0,
            being_cancelled: false,
            submitted: false,
            groups: Vec::new(),
            listeners: Vec::new(),
            info: Default::default(),
            kind: TaskKind::Regular {
                spec,
                resolved: Vec::new(),
            },
        })
    }

    pub fn new_commutative_group(
        id: TaskId,
        app: AppId,
        core_id: CoreId,
        data_id: DataId,
        group_predecessor: Option<TaskNodeRef>,
    ) -> Self {
        TaskNodeRef::wrap(TaskNode {
            id,
            app,
            state: TaskState::Analysed,
            history: vec![TaskHistory::New],
            on_failure: OnFailure::Retry,
            successors: Vec::new(),
            predecessors: Vec::new(),
            stream_successors: Vec::new(),
            stream_predecessors: Vec::new(),
            pending_inputs: 0,
            being_cancelled: false,
            submitted: false,
            groups: Vec::new(),
            listeners: Vec::new(),
            info: Default::default(),
            kind: TaskKind::CommutativeGroup {
                core_id,
                data_id,
                members: Vec::new(),
                pending_members: 0,
                closed: false,
                group_predecessor,
                accesses: Vec::new(),
            },
        })
    }

    /// Records `self` depends on `predecessor`. The edge always lands in the
    /// graph; it gates readiness only while the predecessor is pending.
    pub fn add_data_dependency(&self, predecessor: &TaskNodeRef) {
        if self == predecessor {
            return;
        }
        let gates = predecessor.get().is_pending();
        predecessor.get_mut().successors.push(self.clone());
        {
            let mut inner = self.get_mut();
            inner.predecessors.push(predecessor.clone());
            if gates {
                inner.pending_inputs += 1;
            }
        }
    }

    /// Stream edges connect readers to the active stream writers without
    /// blocking either side.
    pub fn add_stream_dependency(&self, writer: &TaskNodeRef) {
        if self == writer {
            return;
        }
        writer.get_mut().stream_successors.push(self.clone());
        self.get_mut().stream_predecessors.push(writer.clone());
    }
}

impl ConsistencyCheck for TaskNodeRef {
    /// Check for state and relationships consistency. Only explores adjacent
    /// objects but still may be slow.
    fn check_consistency(&self) -> Result<()> {
        debug!("Checking task {:?} consistency", self);
        let t = self.get();
        let pending_preds = t.predecessors
            .iter()
            .filter(|p| p.get().is_pending())
            .count();
        if t.pending_inputs > pending_preds {
            bail!(
                "task {} waits on {} inputs but only {} predecessors are pending",
                t.id,
                t.pending_inputs,
                pending_preds
            );
        }
        if t.state == TaskState::ToExecute || t.state == TaskState::Executing {
            if t.pending_inputs != 0 {
                bail!("dispatched task {} still has pending inputs", t.id);
            }
        }
        if t.state == TaskState::Executing && !t.submitted {
            bail!("task {} executing without a recorded submission", t.id);
        }
        if t.state.is_terminal() && !t.listeners.is_empty() {
            bail!("terminal task {} still has listeners", t.id);
        }
        if let TaskKind::CommutativeGroup {
            ref members,
            pending_members,
            ..
        } = t.kind
        {
            if pending_members > members.len() {
                bail!("group task {} pending count exceeds its members", t.id);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TaskNodeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskNodeRef {}", self.get().id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::types::TaskSpec;

    fn task(id: TaskId) -> TaskNodeRef {
        TaskNodeRef::new_regular(id, 1, TaskSpec::new(0, "t", Vec::new()))
    }

    #[test]
    fn dependency_gates_only_on_pending_predecessors() {
        let t1 = task(1);
        let t2 = task(2);
        t2.add_data_dependency(&t1);
        assert_eq!(t2.get().pending_inputs, 1);

        t1.get_mut().state = TaskState::Finished;
        let t3 = task(3);
        t3.add_data_dependency(&t1);
        assert_eq!(t3.get().pending_inputs, 0);
        // The edge is still recorded for graph consumers
        assert_eq!(t3.get().predecessors.len(), 1);
    }

    #[test]
    fn self_dependencies_are_ignored() {
        let t = task(1);
        t.add_data_dependency(&t.clone());
        assert_eq!(t.get().pending_inputs, 0);
        assert!(t.get().predecessors.is_empty());
    }

    #[test]
    fn stream_edges_do_not_gate() {
        let writer = task(1);
        let reader = task(2);
        reader.add_stream_dependency(&writer);
        assert_eq!(reader.get().pending_inputs, 0);
        assert_eq!(reader.get().stream_predecessors.len(), 1);
        assert_eq!(writer.get().stream_successors.len(), 1);
    }
}
