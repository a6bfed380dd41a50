use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use nimbus_core::types::{AppId, CoreId, ImplId, ImplementationSpec, OnFailure, TaskId, WorkerId};
use nimbus_core::utils::RcSet;

use comm::TransferLedger;
use jobs::JobParam;
use profile::{ExecutionProfile, ProfileStore};
use resources::Worker;

/// A dependency-free task as the dispatcher sees it.
#[derive(Clone, Debug)]
pub struct ActionSpec {
    pub task_id: TaskId,
    pub app: AppId,
    pub core_id: CoreId,
    pub label: String,
    pub implementations: Vec<ImplementationSpec>,
    pub priority: bool,
    pub on_failure: OnFailure,
    pub params: Vec<JobParam>,
}

impl ActionSpec {
    pub fn input_renamings(&self) -> Vec<String> {
        self.params
            .iter()
            .filter_map(|p| p.read.clone())
            .collect()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActionState {
    Ready,
    Running,
    Finished,
    Failed,
    Cancelled,
}

/// Scheduling state of one dependency-free task.
pub struct Action {
    pub spec: ActionSpec,
    pub state: ActionState,
    pub assigned: Option<(WorkerId, ImplId)>,
    pub current_job: Option<i32>,
    pub retries: u32,
    pub being_cancelled: bool,
    /// Arrival order; the waiting cost and the final tie-break.
    pub seq: u64,
}

wrapped_ref!(ActionRef, Action);

impl ActionRef {
    pub fn new(spec: ActionSpec, seq: u64) -> Self {
        ActionRef::wrap(Action {
            spec,
            state: ActionState::Ready,
            assigned: None,
            current_job: None,
            retries: 0,
            being_cancelled: false,
            seq,
        })
    }
}

impl fmt::Debug for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ActionRef {}", self.get().spec.task_id)
    }
}

/// Value of an (action, resource, implementation) choice. Lexicographic;
/// lower is better on every component.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Score {
    pub priority: i64,
    pub waiting: i64,
    pub execution: i64,
    pub locality: i64,
}

impl Score {
    fn key(&self) -> (i64, i64, i64, i64) {
        (self.priority, self.waiting, self.execution, self.locality)
    }

    #[inline]
    pub fn is_better(&self, other: &Score) -> bool {
        self.key() < other.key()
    }

    /// `a` beats `b`; an absent score always loses.
    pub fn is_better_option(a: Option<&Score>, b: Option<&Score>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.is_better(b),
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Heap entry pairing an action with its score. Equal scores fall back to
/// arrival order, so the heap yields a deterministic schedule.
pub struct ObjectValue {
    pub action: ActionRef,
    pub score: Score,
    pub seq: u64,
}

impl ObjectValue {
    pub fn new(action: ActionRef, score: Score) -> Self {
        let seq = action.get().seq;
        ObjectValue { action, score, seq }
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ObjectValue {}

impl PartialOrd for ObjectValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectValue {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; the best (lowest) score must come out
        // on top.
        (self.score.key(), self.seq)
            .cmp(&(other.score.key(), other.seq))
            .reverse()
    }
}

/// Per-worker scheduling state: the worker itself, what runs on it and the
/// execution profiles observed there.
pub struct ResourceScheduler {
    pub worker: Worker,
    pub adapter: String,
    pub running: RcSet<ActionRef>,
    pub profiles: HashMap<String, ExecutionProfile>,
    /// `(provider, instance_type)` for elastic workers; their profiles
    /// aggregate under the profile's cloud section.
    pub cloud: Option<(String, String)>,
}

wrapped_ref!(ResourceSchedulerRef, ResourceScheduler);

impl ResourceScheduler {
    #[inline]
    pub fn name(&self) -> String {
        self.worker.get_name().to_string()
    }

    pub fn note_execution(&mut self, signature: &str, duration_ms: f64) {
        self.profiles
            .entry(signature.to_string())
            .or_insert_with(ExecutionProfile::new)
            .note_execution(duration_ms);
    }
}

/// Builds the dispatcher-side state for a newly registered worker. The
/// persisted defaults inform the resource; the live profile map only ever
/// holds what this run observes, so dump/reload cycles never double count.
pub fn generate_resource_scheduler(
    worker: Worker,
    adapter: &str,
    cloud: Option<(String, String)>,
    defaults: &ProfileStore,
) -> ResourceSchedulerRef {
    let known = defaults.resource_defaults(worker.get_name());
    if !known.is_empty() {
        debug!(
            "Resource {} joins with {} profiled implementations",
            worker.get_name(),
            known.len()
        );
    }
    ResourceSchedulerRef::wrap(ResourceScheduler {
        worker,
        adapter: adapter.to_string(),
        running: RcSet::new(),
        profiles: HashMap::new(),
        cloud,
    })
}

/// A requested placement, consumed by the dispatcher after the policy call
/// returns.
pub struct Launch {
    pub action: ActionRef,
    pub worker: WorkerId,
    pub impl_id: ImplId,
}

/// Why an action could not be placed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScheduleError {
    /// No compatible resource exists at all; permanent.
    Blocked,
    /// Compatible resources exist but none has free capacity now.
    Unassigned,
}

/// State handed to the policy for one scheduling step.
pub struct SchedulingContext<'a> {
    pub workers: &'a HashMap<WorkerId, ResourceSchedulerRef>,
    pub ledger: &'a TransferLedger,
    pub profile: &'a ProfileStore,
    pub launches: &'a mut Vec<Launch>,
}

impl<'a> SchedulingContext<'a> {
    /// Places the action on the best compatible worker with free capacity:
    /// fewest missing inputs first, then by worker name, then by the
    /// implementation order of the task.
    pub fn try_launch(&mut self, action: &ActionRef) -> Result<(), ScheduleError> {
        let inputs = action.get().spec.input_renamings();
        let mut compatible = false;
        let mut best: Option<(usize, String, ImplId)> = None;
        for (name, rs) in self.workers.iter() {
            let rs = rs.get();
            for impl_spec in action.get().spec.implementations.iter() {
                if !rs.worker.can_host(&impl_spec.requirements) {
                    continue;
                }
                compatible = true;
                if rs.worker.can_host_dynamic(&impl_spec.requirements) {
                    let locality = self.ledger.missing_on(name, &inputs);
                    let key = (locality, name.clone(), impl_spec.impl_id);
                    let better = match best {
                        Some(ref b) => key < *b,
                        None => true,
                    };
                    if better {
                        best = Some(key);
                    }
                }
            }
        }

        match best {
            Some((_, worker, impl_id)) => {
                let rs = &self.workers[&worker];
                {
                    let requirements = action.get()
                        .spec
                        .implementations
                        .iter()
                        .find(|i| i.impl_id == impl_id)
                        .map(|i| i.requirements.clone())
                        .expect("chosen implementation vanished");
                    let mut rs = rs.get_mut();
                    rs.worker.reserve(&requirements);
                    rs.running.insert(action.clone());
                }
                action.get_mut().assigned = Some((worker.clone(), impl_id));
                self.launches.push(Launch {
                    action: action.clone(),
                    worker,
                    impl_id,
                });
                Ok(())
            }
            None if compatible => Err(ScheduleError::Unassigned),
            None => Err(ScheduleError::Blocked),
        }
    }
}

/// The pluggable scheduling policy. The dispatcher owns the hot loop and
/// calls into the policy at three points: a fresh dependency-free action,
/// the `(data_free, resource_free, blocked_out)` dispatch step after a
/// resource event, and out-of-band action upgrades.
pub trait TaskScheduler: Send {
    fn generate_scheduler_for_resource(
        &mut self,
        worker: Worker,
        adapter: &str,
        cloud: Option<(String, String)>,
        defaults: &ProfileStore,
    ) -> ResourceSchedulerRef {
        generate_resource_scheduler(worker, adapter, cloud, defaults)
    }

    /// Score of an action regardless of the resource it may land on.
    fn generate_action_score(&mut self, action: &ActionRef, ctx: &SchedulingContext) -> Score {
        let inner = action.get();
        let execution = inner
            .spec
            .implementations
            .iter()
            .filter_map(|i| ctx.profile.implementation_mean(&i.signature))
            .fold(None, |best: Option<f64>, t| match best {
                Some(b) if b <= t => Some(b),
                _ => Some(t),
            })
            .unwrap_or(0.0) as i64;
        Score {
            priority: if inner.spec.priority { 0 } else { 1 },
            waiting: inner.seq as i64,
            execution,
            locality: 0,
        }
    }

    /// A new action whose data dependencies are already satisfied.
    fn schedule_action(
        &mut self,
        ctx: &mut SchedulingContext,
        action: &ActionRef,
        score: Score,
    ) -> Result<(), ScheduleError>;

    /// The dispatch step, run whenever a resource frees up or new ready
    /// work arrives together with a resource event.
    fn handle_dependency_free_actions(
        &mut self,
        ctx: &mut SchedulingContext,
        data_free: Vec<ActionRef>,
        resource_free: Vec<ActionRef>,
        blocked_out: &mut Vec<ActionRef>,
        resource: &ResourceSchedulerRef,
    );

    /// Promote an action ahead of the regular ready order.
    fn upgrade_action(&mut self, action: &ActionRef);

    /// Drop every record of the action (cancellation).
    fn forget_action(&mut self, action: &ActionRef);
}
