use std::collections::{BinaryHeap, HashMap};

use nimbus_core::types::TaskId;

use td::scheduler::{ActionRef, ObjectValue, ResourceSchedulerRef, ScheduleError, Score,
                    SchedulingContext, TaskScheduler};

/// Policy dispatching strictly in score order.
///
/// One global ready queue holds every action that could not be placed at
/// arrival. A fresh action is launched immediately only when it outranks
/// the head of the queue; otherwise it waits its turn. Whenever a resource
/// frees up the queue drains greedily, interleaved by score with the
/// actions that became dependency-free in the same step. Upgraded actions
/// bypass the queue and are slotted in whenever their resource has room.
pub struct OrderStrictScheduler {
    ready_queue: BinaryHeap<ObjectValue>,
    /// Live queue entries; stale heap entries are skipped on pop.
    added_actions: HashMap<TaskId, u64>,
    upgraded: Vec<ActionRef>,
}

impl OrderStrictScheduler {
    pub fn new() -> Self {
        debug!("[OrderStrict] Loading OrderStrict policy");
        OrderStrictScheduler {
            ready_queue: BinaryHeap::new(),
            added_actions: HashMap::new(),
            upgraded: Vec::new(),
        }
    }

    fn add_to_ready_queue(&mut self, action: &ActionRef, score: Score) {
        let entry = ObjectValue::new(action.clone(), score);
        self.added_actions
            .insert(action.get().spec.task_id, entry.seq);
        self.ready_queue.push(entry);
    }

    fn entry_is_live(&self, entry: &ObjectValue) -> bool {
        self.added_actions
            .get(&entry.action.get().spec.task_id)
            .map(|seq| *seq == entry.seq)
            .unwrap_or(false)
    }

    /// Score of the best live entry without popping it.
    fn peek_ready(&mut self) -> Option<Score> {
        loop {
            let stale = match self.ready_queue.peek() {
                Some(entry) => !self.entry_is_live(entry),
                None => return None,
            };
            if stale {
                self.ready_queue.pop();
            } else {
                return self.ready_queue.peek().map(|e| e.score);
            }
        }
    }

    fn pop_ready(&mut self) -> Option<ObjectValue> {
        while let Some(entry) = self.ready_queue.pop() {
            if self.entry_is_live(&entry) {
                self.added_actions.remove(&entry.action.get().spec.task_id);
                return Some(entry);
            }
        }
        None
    }

    /// Upgraded actions are slotted onto the given resource ahead of the
    /// regular ready order.
    fn manage_upgraded_actions(
        &mut self,
        ctx: &mut SchedulingContext,
        resource: &ResourceSchedulerRef,
    ) {
        if self.upgraded.is_empty() {
            return;
        }
        debug!(
            "[OrderStrict] Managing {} upgraded actions",
            self.upgraded.len()
        );
        let candidates = ::std::mem::replace(&mut self.upgraded, Vec::new());
        let mut sorted = BinaryHeap::new();
        for action in candidates {
            let score = self.generate_action_score(&action, ctx);
            sorted.push(ObjectValue::new(action, score));
        }
        while let Some(entry) = sorted.pop() {
            let compatible = {
                let rs = resource.get();
                entry
                    .action
                    .get()
                    .spec
                    .implementations
                    .iter()
                    .any(|i| rs.worker.can_host(&i.requirements))
            };
            if compatible && resource.get().worker.can_run_something() {
                match ctx.try_launch(&entry.action) {
                    Ok(()) => continue,
                    Err(_) => {
                        // It may still fit another resource later
                        self.upgraded.push(entry.action);
                    }
                }
            } else {
                self.upgraded.push(entry.action);
            }
        }
    }
}

impl Default for OrderStrictScheduler {
    fn default() -> Self {
        OrderStrictScheduler::new()
    }
}

impl TaskScheduler for OrderStrictScheduler {
    fn schedule_action(
        &mut self,
        ctx: &mut SchedulingContext,
        action: &ActionRef,
        score: Score,
    ) -> Result<(), ScheduleError> {
        if !self.upgraded.is_empty() {
            // Upgraded work goes first; the action waits its turn.
            self.add_to_ready_queue(action, score);
            return Ok(());
        }
        let head = self.peek_ready();
        if head.is_none() || score.is_better(&head.unwrap()) {
            match ctx.try_launch(action) {
                Ok(()) => Ok(()),
                Err(ScheduleError::Unassigned) => {
                    self.add_to_ready_queue(action, score);
                    Ok(())
                }
                Err(ScheduleError::Blocked) => Err(ScheduleError::Blocked),
            }
        } else {
            let compatible = ctx.workers.values().any(|rs| {
                let rs = rs.get();
                action
                    .get()
                    .spec
                    .implementations
                    .iter()
                    .any(|i| rs.worker.can_host(&i.requirements))
            });
            if !compatible {
                return Err(ScheduleError::Blocked);
            }
            self.add_to_ready_queue(action, score);
            Ok(())
        }
    }

    fn handle_dependency_free_actions(
        &mut self,
        ctx: &mut SchedulingContext,
        data_free: Vec<ActionRef>,
        resource_free: Vec<ActionRef>,
        blocked_out: &mut Vec<ActionRef>,
        resource: &ResourceSchedulerRef,
    ) {
        self.manage_upgraded_actions(ctx, resource);

        let mut executable_actions = BinaryHeap::new();
        for action in data_free.into_iter().chain(resource_free.into_iter()) {
            let score = self.generate_action_score(&action, ctx);
            executable_actions.push(ObjectValue::new(action, score));
        }

        loop {
            let ready_score = self.peek_ready();
            let executable_score = executable_actions.peek().map(|e: &ObjectValue| e.score);
            if ready_score.is_none() && executable_score.is_none() {
                break;
            }

            let take_ready =
                Score::is_better_option(ready_score.as_ref(), executable_score.as_ref())
                    || executable_score.is_none();

            let entry = if take_ready {
                match self.pop_ready() {
                    Some(e) => e,
                    None => break,
                }
            } else {
                executable_actions.pop().unwrap()
            };

            match ctx.try_launch(&entry.action) {
                Ok(()) => {}
                Err(ScheduleError::Unassigned) => {
                    // Strict order: nothing behind this action may overtake
                    // it, so the step ends here.
                    if take_ready {
                        self.add_to_ready_queue(&entry.action, entry.score);
                    } else {
                        executable_actions.push(entry);
                    }
                    break;
                }
                Err(ScheduleError::Blocked) => {
                    blocked_out.push(entry.action);
                }
            }
        }

        // Whatever became dependency-free but was not placed waits in the
        // global queue.
        while let Some(entry) = executable_actions.pop() {
            let score = entry.score;
            self.add_to_ready_queue(&entry.action, score);
        }
    }

    fn upgrade_action(&mut self, action: &ActionRef) {
        debug!("[OrderStrict] Upgrading action {:?}", action);
        self.added_actions.remove(&action.get().spec.task_id);
        self.upgraded.push(action.clone());
    }

    fn forget_action(&mut self, action: &ActionRef) {
        self.added_actions.remove(&action.get().spec.task_id);
        self.upgraded.retain(|a| a != action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use nimbus_core::types::{ImplementationSpec, OnFailure};
    use comm::TransferLedger;
    use profile::ProfileStore;
    use resources::method_worker;
    use td::scheduler::{generate_resource_scheduler, ActionSpec, Launch};

    fn action(task_id: TaskId, seq: u64, cpus: u32) -> ActionRef {
        ActionRef::new(
            ActionSpec {
                task_id,
                app: 1,
                core_id: 0,
                label: format!("t{}", task_id),
                implementations: vec![ImplementationSpec::method(0, "t", cpus)],
                priority: false,
                on_failure: OnFailure::Retry,
                params: Vec::new(),
            },
            seq,
        )
    }

    fn one_worker_setup(cpus: u32) -> (HashMap<String, ResourceSchedulerRef>, ProfileStore) {
        let profile = ProfileStore::new();
        let rs = generate_resource_scheduler(method_worker("w0", cpus), "local", None, &profile);
        let mut workers = HashMap::new();
        workers.insert("w0".to_string(), rs);
        (workers, profile)
    }

    #[test]
    fn immediate_launch_on_free_resource() {
        let (workers, profile) = one_worker_setup(2);
        let ledger = TransferLedger::new();
        let mut launches: Vec<Launch> = Vec::new();
        let mut policy = OrderStrictScheduler::new();

        let a = action(1, 1, 1);
        let score = {
            let mut ctx = SchedulingContext {
                workers: &workers,
                ledger: &ledger,
                profile: &profile,
                launches: &mut launches,
            };
            let score = policy.generate_action_score(&a, &ctx);
            policy.schedule_action(&mut ctx, &a, score).unwrap();
            score
        };
        assert_eq!(launches.len(), 1);
        assert!(score.priority > 0);
    }

    #[test]
    fn saturated_resource_queues_in_order() {
        let (workers, profile) = one_worker_setup(1);
        let ledger = TransferLedger::new();
        let mut policy = OrderStrictScheduler::new();

        let first = action(1, 1, 1);
        let second = action(2, 2, 1);
        let third = action(3, 3, 1);

        let mut launches: Vec<Launch> = Vec::new();
        {
            let mut ctx = SchedulingContext {
                workers: &workers,
                ledger: &ledger,
                profile: &profile,
                launches: &mut launches,
            };
            for a in &[&first, &second, &third] {
                let score = policy.generate_action_score(a, &ctx);
                policy.schedule_action(&mut ctx, a, score).unwrap();
            }
        }
        // Only the first fits; the rest queued up.
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].action.get().spec.task_id, 1);

        // Free the worker and run the dispatch step.
        {
            let rs = &workers["w0"];
            let req = first.get().spec.implementations[0].requirements.clone();
            rs.get_mut().worker.release(&req);
            rs.get_mut().running.remove(&first);
        }
        let mut launches: Vec<Launch> = Vec::new();
        let mut blocked = Vec::new();
        {
            let mut ctx = SchedulingContext {
                workers: &workers,
                ledger: &ledger,
                profile: &profile,
                launches: &mut launches,
            };
            let rs = workers["w0"].clone();
            policy.handle_dependency_free_actions(&mut ctx, vec![], vec![], &mut blocked, &rs);
        }
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].action.get().spec.task_id, 2);
        assert!(blocked.is_empty());
    }

    #[test]
    fn upgraded_actions_jump_the_queue() {
        let (workers, profile) = one_worker_setup(1);
        let ledger = TransferLedger::new();
        let mut policy = OrderStrictScheduler::new();

        let running = action(1, 1, 1);
        let waiting = action(2, 2, 1);
        let urgent = action(3, 3, 1);

        let mut launches: Vec<Launch> = Vec::new();
        {
            let mut ctx = SchedulingContext {
                workers: &workers,
                ledger: &ledger,
                profile: &profile,
                launches: &mut launches,
            };
            for a in &[&running, &waiting, &urgent] {
                let score = policy.generate_action_score(a, &ctx);
                policy.schedule_action(&mut ctx, a, score).unwrap();
            }
        }
        assert_eq!(launches.len(), 1);

        // Task 3 is promoted past task 2
        policy.upgrade_action(&urgent);

        {
            let rs = &workers["w0"];
            let req = running.get().spec.implementations[0].requirements.clone();
            rs.get_mut().worker.release(&req);
            rs.get_mut().running.remove(&running);
        }
        let mut launches: Vec<Launch> = Vec::new();
        let mut blocked = Vec::new();
        {
            let mut ctx = SchedulingContext {
                workers: &workers,
                ledger: &ledger,
                profile: &profile,
                launches: &mut launches,
            };
            let rs = workers["w0"].clone();
            policy.handle_dependency_free_actions(&mut ctx, vec![], vec![], &mut blocked, &rs);
        }
        assert_eq!(launches[0].action.get().spec.task_id, 3);
    }

    #[test]
    fn incompatible_action_is_blocked() {
        let (workers, profile) = one_worker_setup(1);
        let ledger = TransferLedger::new();
        let mut policy = OrderStrictScheduler::new();
        // Needs 8 CPUs, the only worker has 1: permanently blocked.
        let big = action(1, 1, 8);
        let mut launches: Vec<Launch> = Vec::new();
        let mut ctx = SchedulingContext {
            workers: &workers,
            ledger: &ledger,
            profile: &profile,
            launches: &mut launches,
        };
        let score = policy.generate_action_score(&big, &ctx);
        assert_eq!(
            policy.schedule_action(&mut ctx, &big, score),
            Err(ScheduleError::Blocked)
        );
    }
}
