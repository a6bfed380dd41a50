//! Dependency analysis: how submitted tasks and main-code accesses turn
//! into graph edges, version bookkeeping and dispatcher work.

use std::time::{Duration, Instant};

use futures::Future;
use futures::sync::oneshot;

use nimbus_core::errors::TaskException;
use nimbus_core::types::{AccessMode, AppId, DataDescription, DataInstanceId, DataKind,
                         JobEndStatus, OnFailure, ParamSpec, TaskEndStatus, TaskHistory, TaskId,
                         TaskSpec, TaskState, WorkerId};

use ap::{AccessProcessor, AccessReply, ApRequest, MainWaiter, ResultFileEntry, TaskEndInfo};
use data::access::EngineDataAccessId;
use data::info::{AccessTracking, DataInfoRef, VersionOutcome};
use data::params::{AccessParams, DataKey};
use graph::app::{ApplicationRef, TaskMonitor};
use graph::group::{BarrierReply, BarrierWaiter};
use graph::task::{ResolvedParam, TaskKind, TaskNodeRef};
use jobs::JobParam;
use td::scheduler::ActionSpec;
use td::TdEvent;

fn cancelled_end() -> TaskEndInfo {
    TaskEndInfo {
        status: TaskEndStatus::Canceled,
        exception: None,
        locations: Vec::new(),
        worker: None,
        duration_ms: None,
        job_status: None,
        blocked: false,
    }
}

impl AccessProcessor {
    /*
     * ------------------------------ APPLICATIONS ------------------------------
     */

    pub(crate) fn register_application(
        &mut self,
        app_id: AppId,
        parallelism_source: String,
        monitor: Box<TaskMonitor>,
        wall_clock_limit: Option<Duration>,
    ) {
        if self.apps.contains_key(&app_id) {
            self.error
                .warn(&format!("Application {} registered twice", app_id));
            return;
        }
        debug!("Registering application {}", app_id);
        let app = ApplicationRef::new(app_id, &parallelism_source, monitor);
        self.apps.insert(app_id, app);
        self.logger
            .add_new_application_event(app_id, parallelism_source);
        if let Some(limit) = wall_clock_limit {
            self.set_wall_clock_limit(app_id, limit);
        }
    }

    pub(crate) fn open_task_group(&mut self, app_id: AppId, name: &str) {
        if let Some(app) = self.apps.get(&app_id) {
            app.get_mut().open_task_group(name);
        }
    }

    pub(crate) fn close_task_group(&mut self, app_id: AppId) {
        if let Some(app) = self.apps.get(&app_id) {
            app.get_mut().close_current_task_group();
        }
    }

    /// Arms a timer killing the application when the deadline passes.
    pub(crate) fn set_wall_clock_limit(&mut self, app_id: AppId, limit: Duration) {
        info!(
            "Application {} limited to {}s of wall clock time",
            app_id,
            limit.as_secs()
        );
        let sender = self.self_sender.clone();
        let killer = ::tokio_timer::Delay::new(Instant::now() + limit)
            .map(move |()| {
                warn!("Wall clock limit reached for application {}", app_id);
                let _ = sender.unbounded_send(ApRequest::CancelApplicationTasks {
                    app: app_id,
                    reply: None,
                });
            })
            .map_err(|e| {
                warn!("Wall clock timer failed: {:?}", e);
            });
        self.handle.spawn(killer);
    }

    /*
     * ------------------------------ TASK SUBMISSION ------------------------------
     */

    pub(crate) fn task_submit(&mut self, app_id: AppId, task_id: TaskId, spec: TaskSpec) {
        let app = match self.apps.get(&app_id).cloned() {
            Some(app) => app,
            None => {
                self.error.warn(&format!(
                    "Task {} submitted for unknown application {}",
                    task_id, app_id
                ));
                // The permit taken at submission must not leak
                self.throttle.release();
                return;
            }
        };
        info!(
            "New task {} ({}) for app {}",
            task_id, spec.label, app_id
        );
        let label = spec.label.clone();
        let params = spec.params.clone();
        let named_groups = spec.groups.clone();
        let task = TaskNodeRef::new_regular(task_id, app_id, spec);
        self.tasks.insert(task_id, task.clone());

        {
            let mut a = app.get_mut();
            a.total_task_count += 1;
            a.monitor.on_creation(task_id);
        }
        // The task joins every group currently open, plus the ones the
        // submission named explicitly
        let mut joined = app.get().current_groups().to_vec();
        for name in named_groups.iter() {
            match app.get().get_group(name) {
                Some(group) => {
                    if !joined.contains(group) {
                        joined.push(group.clone());
                    }
                }
                None => warn!("Task {} names unknown group {:?}", task_id, name),
            }
        }
        for group in joined {
            group.get_mut().add_task(task.clone());
            task.get_mut().groups.push(group);
        }
        self.logger.add_task_submitted_event(app_id, task_id, label);

        task.get_mut().state = TaskState::ToAnalyse;
        for param in params.iter() {
            self.register_parameter(&app, &task, param);
        }
        self.checkpoint.new_task(task_id);

        let ready = {
            let mut t = task.get_mut();
            t.state = TaskState::Analysed;
            t.pending_inputs == 0
        };
        if ready {
            self.forward_to_dispatcher(&task);
        }
    }

    /// Registers one parameter, recursing into collective ones. Returns
    /// whether the parameter contributed a graph edge.
    fn register_parameter(
        &mut self,
        app: &ApplicationRef,
        task: &TaskNodeRef,
        param: &ParamSpec,
    ) -> bool {
        match *param {
            ParamSpec::Basic { .. } => false,
            ParamSpec::Dependency {
                ref name,
                mode,
                ref data,
                ..
            } => self.register_dependency(app, task, name, mode, data),
            ParamSpec::Collective {
                ref name,
                mode,
                ref data,
                ref elements,
            } => {
                let mut has_edge = false;
                for element in elements.iter() {
                    let element_edge = self.register_parameter(app, task, element);
                    has_edge = has_edge || element_edge;
                }
                // The collection datum itself is accessed too
                let cinfo = self.get_or_create_data(app, data);
                cinfo.get_mut().children = elements
                    .iter()
                    .filter_map(|e| match *e {
                        ParamSpec::Dependency { ref data, .. }
                        | ParamSpec::Collective { ref data, .. } => Some(DataKey::of(data)),
                        ParamSpec::Basic { .. } => None,
                    })
                    .collect();
                let own_edge = self.register_dependency(app, task, name, mode, data);
                // Collections are rebuilt on every use; the datum is dropped
                // once registered
                self.delete_by_key(app, &DataKey::of(data), false);
                has_edge || own_edge
            }
        }
    }

    fn register_dependency(
        &mut self,
        app: &ApplicationRef,
        task: &TaskNodeRef,
        name: &str,
        mode: AccessMode,
        data: &DataDescription,
    ) -> bool {
        let dinfo = self.get_or_create_data(app, data);
        let access = match dinfo.get_mut().will_access(mode) {
            Some(access) => access,
            None => {
                // Unsupported access on this data kind; the parameter does
                // not constrain the task
                return false;
            }
        };
        task.get_mut().push_resolved(ResolvedParam {
            name: name.to_string(),
            mode,
            data_id: dinfo.get().get_data_id(),
            data_kind: data.kind(),
            access,
        });

        let mut has_edge = false;
        match mode {
            AccessMode::R => {
                has_edge = self.check_input_dependency(task, &dinfo, mode);
            }
            AccessMode::RW | AccessMode::CV => {
                has_edge = self.check_input_dependency(task, &dinfo, mode);
                self.register_output(app, task, &dinfo, &access, mode);
            }
            AccessMode::W => {
                self.register_output(app, task, &dinfo, &access, mode);
            }
            AccessMode::C => {
                has_edge = self.check_input_dependency(task, &dinfo, mode);
                self.register_output(app, task, &dinfo, &access, mode);
            }
        }

        if mode.is_write() && data.kind() == DataKind::File {
            app.get_mut().add_written_file(&dinfo);
        }
        has_edge
    }

    /// Adds the read-side edges of an access.
    fn check_input_dependency(
        &mut self,
        task: &TaskNodeRef,
        dinfo: &DataInfoRef,
        mode: AccessMode,
    ) -> bool {
        let data_id = dinfo.get().get_data_id();
        debug!(
            "Checking READ dependency for datum {} and task {}",
            data_id,
            task.get().get_id()
        );
        enum Plan {
            Free,
            Writer(TaskNodeRef),
            Concurrent(Vec<TaskNodeRef>),
            Stream(Vec<TaskNodeRef>),
            GroupPredecessor(Option<TaskNodeRef>),
        }

        let plan = {
            let d = dinfo.get();
            match d.tracking {
                AccessTracking::Stream { ref writers } => Plan::Stream(writers.clone()),
                AccessTracking::Standard {
                    ref last_writer,
                    ref concurrent_readers,
                } => {
                    if !concurrent_readers.is_empty() && mode != AccessMode::C {
                        Plan::Concurrent(concurrent_readers.clone())
                    } else {
                        match *last_writer {
                            Some(ref writer) if writer != task => {
                                let join_group = mode == AccessMode::CV && writer.get().is_group()
                                    && {
                                        let w = writer.get();
                                        match w.kind {
                                            TaskKind::CommutativeGroup {
                                                core_id,
                                                data_id: group_data,
                                                closed,
                                                ..
                                            } => {
                                                !closed && group_data == data_id
                                                    && Some(core_id) == task.get()
                                                        .spec()
                                                        .map(|s| s.core_id)
                                            }
                                            _ => false,
                                        }
                                    };
                                if join_group {
                                    let predecessor = match writer.get().kind {
                                        TaskKind::CommutativeGroup {
                                            ref group_predecessor,
                                            ..
                                        } => group_predecessor.clone(),
                                        _ => None,
                                    };
                                    Plan::GroupPredecessor(predecessor)
                                } else {
                                    Plan::Writer(writer.clone())
                                }
                            }
                            _ => Plan::Free,
                        }
                    }
                }
            }
        };

        match plan {
            Plan::Free => {
                debug!("There is no last writer for datum {}", data_id);
                false
            }
            Plan::Writer(writer) => {
                if writer.get().is_group() {
                    // A non-commutative access collapses the group into a
                    // single last writer
                    self.close_commutative_group(&writer);
                }
                debug!(
                    "Adding dependency between task {} and task {}",
                    writer.get().get_id(),
                    task.get().get_id()
                );
                task.add_data_dependency(&writer);
                true
            }
            Plan::Concurrent(readers) => {
                debug!("There was a concurrent access for datum {}", data_id);
                if readers.iter().any(|t| t == task) {
                    return true;
                }
                for reader in readers {
                    task.add_data_dependency(&reader);
                }
                true
            }
            Plan::Stream(writers) => {
                for writer in writers {
                    debug!(
                        "Adding stream dependency between task {} and task {}",
                        writer.get().get_id(),
                        task.get().get_id()
                    );
                    task.add_stream_dependency(&writer);
                }
                true
            }
            Plan::GroupPredecessor(predecessor) => {
                if let Some(predecessor) = predecessor {
                    task.add_data_dependency(&predecessor);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records the write side of an access: the task (or its commutative
    /// group) becomes the producer dependents will see.
    fn register_output(
        &mut self,
        app: &ApplicationRef,
        task: &TaskNodeRef,
        dinfo: &DataInfoRef,
        access: &EngineDataAccessId,
        mode: AccessMode,
    ) {
        let data_id = dinfo.get().get_data_id();
        debug!(
            "Checking WRITE dependency for datum {} and task {}",
            data_id,
            task.get().get_id()
        );

        if dinfo.get().get_params().is_stream() {
            if let AccessTracking::Stream { ref mut writers } = dinfo.get_mut().tracking {
                writers.push(task.clone());
            }
            return;
        }

        if mode == AccessMode::C {
            if let AccessTracking::Standard {
                ref mut concurrent_readers,
                ..
            } = dinfo.get_mut().tracking
            {
                concurrent_readers.push(task.clone());
            }
            return;
        }

        if mode == AccessMode::CV {
            self.register_commutative_output(app, task, dinfo, access);
            return;
        }

        // Plain write: the task takes over as the last writer; an open
        // commutative group on the data closes first.
        let previous = {
            let d = dinfo.get();
            match d.tracking {
                AccessTracking::Standard { ref last_writer, .. } => last_writer.clone(),
                AccessTracking::Stream { .. } => None,
            }
        };
        if let Some(previous) = previous {
            if previous.get().is_group() {
                self.close_commutative_group(&previous);
            }
        }
        if let AccessTracking::Standard {
            ref mut last_writer,
            ref mut concurrent_readers,
        } = dinfo.get_mut().tracking
        {
            *last_writer = Some(task.clone());
            concurrent_readers.clear();
        }
        debug!(
            "New writer for datum {} is task {}",
            data_id,
            task.get().get_id()
        );
    }

    /// Commutative writes with the same (core element, datum) merge into a
    /// single group node. The first such write opens the group; a non-CV
    /// access closes it.
    fn register_commutative_output(
        &mut self,
        app: &ApplicationRef,
        task: &TaskNodeRef,
        dinfo: &DataInfoRef,
        access: &EngineDataAccessId,
    ) {
        let data_id = dinfo.get().get_data_id();
        let core_id = task.get().spec().map(|s| s.core_id).unwrap_or(-1);

        let existing = {
            let d = dinfo.get();
            match d.tracking {
                AccessTracking::Standard { ref last_writer, .. } => match *last_writer {
                    Some(ref writer) => {
                        let joins = match writer.get().kind {
                            TaskKind::CommutativeGroup {
                                core_id: group_core,
                                data_id: group_data,
                                closed,
                                ..
                            } => !closed && group_core == core_id && group_data == data_id,
                            _ => false,
                        };
                        if joins {
                            Some(writer.clone())
                        } else {
                            None
                        }
                    }
                    None => None,
                },
                AccessTracking::Stream { .. } => None,
            }
        };

        let group = match existing {
            Some(group) => group,
            None => {
                let group_id = self.next_synthetic_task_id;
                self.next_synthetic_task_id += 1;
                let predecessor = {
                    let d = dinfo.get();
                    match d.tracking {
                        AccessTracking::Standard { ref last_writer, .. } => last_writer.clone(),
                        AccessTracking::Stream { .. } => None,
                    }
                };
                debug!(
                    "Opening commutative group {} on datum {} (core {})",
                    group_id, data_id, core_id
                );
                let group = TaskNodeRef::new_commutative_group(
                    group_id,
                    app.get().get_id(),
                    core_id,
                    data_id,
                    predecessor,
                );
                self.tasks.insert(group_id, group.clone());
                group
            }
        };

        // The member joins: the group completes only after it, and any
        // dependent of the data waits for the whole group.
        if let TaskKind::CommutativeGroup {
            ref mut members,
            ref mut accesses,
            ..
        } = group.get_mut().kind
        {
            members.push(task.clone());
            accesses.push(*access);
        }
        group.add_data_dependency(task);

        if let AccessTracking::Standard {
            ref mut last_writer,
            ref mut concurrent_readers,
        } = dinfo.get_mut().tracking
        {
            *last_writer = Some(group.clone());
            concurrent_readers.clear();
        }
    }

    fn close_commutative_group(&mut self, group: &TaskNodeRef) {
        let newly_closed = {
            let mut g = group.get_mut();
            match g.kind {
                TaskKind::CommutativeGroup { ref mut closed, .. } => {
                    if *closed {
                        false
                    } else {
                        *closed = true;
                        true
                    }
                }
                _ => false,
            }
        };
        if newly_closed {
            debug!("Closing commutative group {}", group.get().get_id());
            self.maybe_complete_group(group);
        }
    }

    /// A closed group with every member terminated acts as a finished
    /// writer: its dependents are released.
    fn maybe_complete_group(&mut self, group: &TaskNodeRef) {
        let completes = {
            let g = group.get();
            if g.get_state().is_terminal() {
                false
            } else {
                match g.kind {
                    TaskKind::CommutativeGroup { closed, .. } => closed && g.pending_inputs == 0,
                    _ => false,
                }
            }
        };
        if !completes {
            return;
        }
        debug!("Commutative group {} completed", group.get().get_id());
        group.get_mut().state = TaskState::Finished;
        self.notify_listeners(group);
        self.release_data_dependents(group);
        let id = group.get().get_id();
        self.tasks.remove(&id);
    }

    /// Hands a dependency-free task over to the dispatcher.
    fn forward_to_dispatcher(&mut self, task: &TaskNodeRef) {
        let spec = {
            let t = task.get();
            let spec = t.spec().expect("only regular tasks are dispatched");
            ActionSpec {
                task_id: t.get_id(),
                app: t.get_app(),
                core_id: spec.core_id,
                label: spec.label.clone(),
                implementations: spec.implementations.clone(),
                priority: spec.priority,
                on_failure: spec.on_failure,
                params: t.resolved_params()
                    .iter()
                    .map(|rp| JobParam {
                        name: rp.name.clone(),
                        mode: rp.mode,
                        read: rp.access.read_instance().map(|i| i.get_renaming()),
                        write: rp.access.written_instance().map(|i| i.get_renaming()),
                    })
                    .collect(),
            }
        };
        debug!("Task {} is dependency free; forwarding", spec.task_id);
        task.get_mut().state = TaskState::ToExecute;
        let _ = self.td.unbounded_send(TdEvent::ExecuteTask(spec));
    }

    pub(crate) fn task_running(&mut self, task_id: TaskId, worker: WorkerId) {
        if let Some(task) = self.tasks.get(&task_id) {
            let mut t = task.get_mut();
            if !t.state.is_terminal() {
                t.state = TaskState::Executing;
                t.submitted = true;
                t.info.worker = worker.clone();
            }
        }
        let app = self.tasks.get(&task_id).map(|t| t.get().get_app());
        if let Some(app) = app {
            self.logger.add_task_started_event(app, task_id, worker);
        }
    }

    /*
     * ------------------------------ TASK COMPLETION ------------------------------
     */

    pub(crate) fn task_end(&mut self, task_id: TaskId, info: TaskEndInfo) {
        let task = match self.tasks.get(&task_id).cloned() {
            Some(task) => task,
            None => {
                debug!("End notification for unknown task {}; ignoring", task_id);
                return;
            }
        };
        if task.get().get_state().is_terminal() {
            // Double cancellation is a no-op
            debug!("Repeated end notification for task {}", task_id);
            return;
        }
        info!(
            "Notification received for task {} with end status {:?}",
            task_id, info.status
        );

        let app_id = task.get().get_app();
        let app = self.apps.get(&app_id).cloned();

        for &(ref renaming, ref worker) in info.locations.iter() {
            self.ledger.register_location(renaming, worker.clone());
        }

        {
            let mut t = task.get_mut();
            t.state = match info.status {
                TaskEndStatus::Finished => TaskState::Finished,
                TaskEndStatus::Failed => TaskState::Failed,
                TaskEndStatus::Canceled => TaskState::Canceled,
            };
            if info.status == TaskEndStatus::Canceled {
                t.history.push(TaskHistory::Cancelled);
            }
            if let Some(ref worker) = info.worker {
                t.info.worker = worker.clone();
            }
            t.info.duration = info.duration_ms;
        }

        let policy: OnFailure = task.get().on_failure;
        match info.status {
            TaskEndStatus::Failed => {
                if info.blocked {
                    self.error.warn(&format!(
                        "Task {} is blocked: no compatible resource exists",
                        task_id
                    ));
                } else if !policy.produces_empty_results_on_failure() {
                    // RETRY exhausted its attempts or FAIL was requested
                    self.error.error(&format!("Task failed: {}", task_id));
                } else {
                    self.error.warn(&format!("Task failed: {}", task_id));
                }
            }
            TaskEndStatus::Canceled => {
                self.error.warn(&format!("Task canceled: {}", task_id));
            }
            TaskEndStatus::Finished => {}
        }

        // Commit or cancel every parameter access
        let submitted = task.get().submitted;
        let cancel_accesses = (policy == OnFailure::CancelSuccessors
            && info.status == TaskEndStatus::Failed)
            || (info.status == TaskEndStatus::Canceled && policy != OnFailure::Ignore);
        debug!("Marking accessed parameters for task {}", task_id);
        let resolved = task.get().resolved_params().to_vec();
        for rp in resolved.iter() {
            // Stream writers stay active producers beyond the task's end;
            // they retire when the stream itself is deleted
            if rp.data_kind != DataKind::Stream && rp.mode.is_write() {
                self.producer_completed(rp, &task);
            }
            if cancel_accesses {
                self.cancel_access(&rp.access, submitted);
            } else {
                self.commit_access(&rp.access);
            }
        }

        // An application-level exception reaches every group of the task
        if let Some(ref message) = info.exception {
            let exception = TaskException::new(message.clone(), task_id, app_id);
            if let Some(ref app) = app {
                app.get_mut().monitor.on_exception(task_id, message);
            }
            let groups = task.get().groups.to_vec();
            for group in groups {
                if group.get().is_base() {
                    continue;
                }
                let first = group.get_mut().set_exception(exception.clone());
                if first {
                    let name = group.get().get_name().to_string();
                    warn!(
                        "Group {} sees exception from task {}: {}",
                        name, task_id, message
                    );
                    self.logger
                        .add_group_exception_event(app_id, name, message.clone());
                    let members = group.get().pending_tasks().to_vec();
                    for member in members {
                        if member != task {
                            self.cancel_task_node(&member);
                        }
                    }
                }
            }
        }

        // Release parked main accesses
        self.notify_listeners(&task);

        // Group bookkeeping and barriers
        if let Some(ref app) = app {
            let groups = task.get().groups.to_vec();
            for group in groups {
                let drained = group.get_mut().remove_task(&task);
                let name = group.get().get_name().to_string();
                debug!("Group {} released task {}", name, task_id);
                if drained && group.get().is_closed() {
                    app.get_mut().remove_group(&name);
                }
            }
        }

        self.throttle.release();

        if let Some(ref app) = app {
            let mut a = app.get_mut();
            match info.status {
                TaskEndStatus::Finished => a.monitor.on_completion(task_id),
                TaskEndStatus::Failed => a.monitor.on_failure(task_id),
                TaskEndStatus::Canceled => a.monitor.on_cancellation(task_id),
            }
        }

        self.checkpoint.end_task(task_id);
        match info.status {
            TaskEndStatus::Finished => {
                let task_info = task.get().info.clone();
                self.logger.add_task_finished_event(app_id, task_id, task_info);
            }
            TaskEndStatus::Failed => {
                self.logger.add_task_failed_event(
                    app_id,
                    task_id,
                    info.job_status.unwrap_or(JobEndStatus::ExecutionFailed),
                    if info.blocked {
                        "blocked".to_string()
                    } else {
                        "execution failed".to_string()
                    },
                );
            }
            TaskEndStatus::Canceled => {
                self.logger.add_task_canceled_event(app_id, task_id);
            }
        }

        // A task that failed under CANCEL_SUCCESSORS or was cancelled
        // without IGNORE drags its dependents down with it
        if cancel_accesses {
            let successors = task.get().successors.clone();
            for successor in successors {
                let mut s = successor.get_mut();
                if !s.get_state().is_terminal() {
                    s.being_cancelled = true;
                }
            }
        }

        debug!("Releasing data dependent tasks for task {}", task_id);
        self.release_data_dependents(&task);
        self.tasks.remove(&task_id);
    }

    /// A completed producer stops shadowing the data it wrote.
    fn producer_completed(&mut self, rp: &ResolvedParam, task: &TaskNodeRef) {
        let dinfo = match self.data.get(&rp.data_id) {
            Some(d) => d.clone(),
            None => return,
        };
        let mut d = dinfo.get_mut();
        if let AccessTracking::Standard {
            ref mut last_writer,
            ..
        } = d.tracking
        {
            let matches = last_writer.as_ref().map(|w| w == task).unwrap_or(false);
            if matches {
                *last_writer = None;
            }
        }
    }

    fn commit_access(&mut self, access: &EngineDataAccessId) {
        let dinfo = match self.data.get(&access.get_data_id()).cloned() {
            Some(d) => d,
            None => {
                debug!(
                    "Access of data {} cannot be committed: not registered",
                    access.get_data_id()
                );
                return;
            }
        };
        let outcome = dinfo.get_mut().committed_access(access);
        self.apply_outcome(&dinfo, outcome);
    }

    fn cancel_access(&mut self, access: &EngineDataAccessId, keep_modified: bool) {
        let dinfo = match self.data.get(&access.get_data_id()).cloned() {
            Some(d) => d,
            None => {
                debug!(
                    "Access of data {} cannot be cancelled: not registered",
                    access.get_data_id()
                );
                return;
            }
        };
        let outcome = dinfo.get_mut().cancelled_access(access, keep_modified);
        self.apply_outcome(&dinfo, outcome);
    }

    /// Applies the physical consequences of version bookkeeping: removed
    /// renamings leave the transfer layer and a drained datum deregisters.
    fn apply_outcome(&mut self, dinfo: &DataInfoRef, outcome: VersionOutcome) {
        for instance in outcome.removed {
            self.remove_physical(instance);
        }
        if outcome.data_gone {
            self.deregister_data(dinfo);
        }
    }

    fn remove_physical(&mut self, instance: DataInstanceId) {
        let renaming = instance.get_renaming();
        debug!("Removing {} from the transfer layer", renaming);
        self.ledger.remove(&renaming);
        self.logger.add_data_removed_event(instance);
    }

    fn deregister_data(&mut self, dinfo: &DataInfoRef) {
        let (data_id, app_id, key, is_file) = {
            let d = dinfo.get();
            (
                d.get_data_id(),
                d.get_app(),
                DataKey::of(d.get_params()),
                d.get_params().kind() == DataKind::File,
            )
        };
        debug!("Data {} has no versions left; deregistering", data_id);
        self.data.remove(&data_id);
        if let Some(app) = self.apps.get(&app_id).cloned() {
            let registered = app.get()
                .get_data(&key)
                .map(|d| d == dinfo)
                .unwrap_or(false);
            if registered {
                app.get_mut().remove_data(&key);
            }
            if is_file {
                app.get_mut().remove_written_file(dinfo);
            }
        }
    }

    fn notify_listeners(&mut self, task: &TaskNodeRef) {
        let listeners = ::std::mem::replace(&mut task.get_mut().listeners, Vec::new());
        for waiter_id in listeners {
            let fire = match self.waiters.get_mut(&waiter_id) {
                Some(waiter) => {
                    waiter.pending -= 1;
                    waiter.pending == 0
                }
                None => false,
            };
            if fire {
                let waiter = self.waiters.remove(&waiter_id).unwrap();
                let access = match self.data.get(&waiter.access.get_data_id()) {
                    Some(d) => d.get().consolidate(waiter.access),
                    None => waiter.access,
                };
                debug!(
                    "Data {} available for main access",
                    waiter.access.get_data_id()
                );
                let _ = waiter.sender.send(access);
            }
        }
    }

    fn release_data_dependents(&mut self, task: &TaskNodeRef) {
        let successors = task.get().successors.clone();
        for successor in successors {
            if successor.get().get_state().is_terminal() {
                continue;
            }
            let ready = {
                let mut s = successor.get_mut();
                debug_assert!(s.pending_inputs > 0 || s.is_group());
                if s.pending_inputs > 0 {
                    s.pending_inputs -= 1;
                }
                s.pending_inputs == 0
            };
            if !ready {
                continue;
            }
            if successor.get().is_group() {
                self.maybe_complete_group(&successor);
            } else if successor.get().get_state() == TaskState::Analysed {
                if successor.get().being_cancelled {
                    let id = successor.get().get_id();
                    self.task_end(id, cancelled_end());
                } else {
                    self.forward_to_dispatcher(&successor);
                }
            }
        }
    }

    /// Cancellation entry point; idempotent on every path.
    fn cancel_task_node(&mut self, task: &TaskNodeRef) {
        {
            let t = task.get();
            if t.get_state().is_terminal() || t.being_cancelled {
                return;
            }
        }
        task.get_mut().being_cancelled = true;
        let (task_id, state) = {
            let t = task.get();
            (t.get_id(), t.get_state())
        };
        match state {
            TaskState::ToExecute | TaskState::Executing => {
                // The dispatcher owns the running job; the terminal
                // notification comes back through the regular channel
                let _ = self.td.unbounded_send(TdEvent::CancelTask { task_id });
            }
            TaskState::Created | TaskState::ToAnalyse | TaskState::Analysed => {
                self.task_end(task_id, cancelled_end());
            }
            _ => {}
        }
    }

    /*
     * ------------------------------ MAIN-CODE ACCESSES ------------------------------
     */

    pub(crate) fn register_data_access(
        &mut self,
        access: AccessParams,
        reply: oneshot::Sender<AccessReply>,
    ) {
        let app = match self.apps.get(&access.app).cloned() {
            Some(app) => app,
            None => {
                warn!("Access from unknown application {}", access.app);
                let _ = reply.send(AccessReply::Unaware);
                return;
            }
        };
        debug!(
            "Registering access {} to {} from app {}'s main code",
            access.mode,
            access.data.description(),
            access.app
        );

        let key = access.key();
        let existing = app.get().get_data(&key).cloned();
        if existing.is_none() && !access.mode.is_write() {
            debug!("The runtime has no last value for {}", access.data.description());
            let _ = reply.send(AccessReply::Unaware);
            return;
        }
        let dinfo = match existing {
            Some(d) => d,
            None => self.get_or_create_data(&app, &access.data),
        };

        let registered = dinfo.get_mut().will_access(access.mode);
        let daid = match registered {
            Some(daid) => daid,
            None => {
                debug!("Accessing a canceled data from main code");
                let _ = reply.send(AccessReply::Cancelled);
                return;
            }
        };

        if !daid.is_read() {
            let _ = reply.send(AccessReply::Ready { access: daid });
            return;
        }

        let read_instance = daid.read_instance().unwrap();
        self.checkpoint.main_access(read_instance);
        // While the main code holds the value, physical removal is deferred
        dinfo.get_mut().block_deletions();

        // A main read is a non-commutative access: it collapses any open
        // commutative group first
        let open_group = {
            let d = dinfo.get();
            match d.tracking {
                AccessTracking::Standard { ref last_writer, .. } => match *last_writer {
                    Some(ref w) if w.get().is_group() => Some(w.clone()),
                    _ => None,
                },
                AccessTracking::Stream { .. } => None,
            }
        };
        if let Some(group) = open_group {
            self.close_commutative_group(&group);
        }

        let producers: Vec<TaskNodeRef> = {
            let d = dinfo.get();
            match d.tracking {
                AccessTracking::Standard {
                    ref last_writer,
                    ref concurrent_readers,
                } => {
                    let mut pending: Vec<TaskNodeRef> = concurrent_readers
                        .iter()
                        .filter(|t| t.get().is_pending())
                        .cloned()
                        .collect();
                    if let Some(ref writer) = *last_writer {
                        if writer.get().is_pending() {
                            pending.push(writer.clone());
                        }
                    }
                    pending
                }
                // Stream reads never consume the written value
                AccessTracking::Stream { .. } => Vec::new(),
            }
        };

        {
            let mut d = dinfo.get_mut();
            if let AccessTracking::Standard {
                ref mut last_writer,
                ref mut concurrent_readers,
            } = d.tracking
            {
                // A RW main access takes over as the writer
                let steal = access.mode == AccessMode::RW
                    && last_writer.as_ref().map(|w| w.get().is_pending()).unwrap_or(false);
                if steal {
                    *last_writer = None;
                }
                concurrent_readers.clear();
            }
        }

        if producers.is_empty() {
            let consolidated = dinfo.get().consolidate(daid);
            let _ = reply.send(AccessReply::Ready {
                access: consolidated,
            });
        } else {
            info!(
                "App {} waits for data {} to be produced",
                access.app,
                daid.get_data_id()
            );
            let (sx, rx) = oneshot::channel();
            let waiter_id = self.next_waiter_id;
            self.next_waiter_id += 1;
            self.waiters.insert(
                waiter_id,
                MainWaiter {
                    pending: producers.len(),
                    sender: sx,
                    access: daid,
                },
            );
            for producer in producers {
                producer.get_mut().listeners.push(waiter_id);
            }
            let _ = reply.send(AccessReply::MustWait { wait: rx });
        }
    }

    pub(crate) fn finish_data_access(
        &mut self,
        access: AccessParams,
        produced: Option<DataInstanceId>,
    ) {
        let app = match self.apps.get(&access.app).cloned() {
            Some(app) => app,
            None => return,
        };
        let dinfo = match app.get().get_data(&access.key()).cloned() {
            Some(d) => d,
            None => {
                warn!(
                    "{} has not been accessed before; finish ignored",
                    access.data.description()
                );
                return;
            }
        };
        if let Some(instance) = produced {
            if access.result_remains_on_main {
                dinfo.get_mut().value_on_main(instance.get_version_id());
            }
        }
        let last = dinfo.get().get_last_access(access.mode);
        let daid = match last {
            Some(daid) => daid,
            None => {
                warn!(
                    "{} has not been accessed before; finish ignored",
                    access.data.description()
                );
                return;
            }
        };
        let outcome = dinfo.get_mut().committed_access(&daid);
        self.apply_outcome(&dinfo, outcome);
        // Lift the deletion block the registration took for a read access
        if access.mode.is_read() && dinfo.get().has_deletion_blocks() {
            let outcome = dinfo.get_mut().unblock_deletions();
            self.apply_outcome(&dinfo, outcome);
        }
    }

    /// Binds a value produced outside the runtime to the data's current
    /// version.
    pub(crate) fn register_remote_data(
        &mut self,
        app_id: AppId,
        data: DataDescription,
        source: WorkerId,
    ) {
        let app = match self.apps.get(&app_id).cloned() {
            Some(app) => app,
            None => return,
        };
        let dinfo = self.get_or_create_data(&app, &data);
        let renaming = {
            let mut d = dinfo.get_mut();
            d.mark_current_used();
            d.current_instance().get_renaming()
        };
        debug!("Remote data {} bound to {}", renaming, source);
        self.ledger.register_location(&renaming, source);
    }

    pub(crate) fn data_get_last_version(
        &mut self,
        app_id: AppId,
        data: DataDescription,
        reply: oneshot::Sender<Option<DataInstanceId>>,
    ) {
        let instance = self.apps
            .get(&app_id)
            .and_then(|app| app.get().get_data(&DataKey::of(&data)).cloned())
            .map(|d| d.get().current_instance());
        let _ = reply.send(instance);
    }

    /*
     * ------------------------------ DELETION ------------------------------
     */

    pub(crate) fn delete_data(
        &mut self,
        app_id: AppId,
        data: DataDescription,
        reply: oneshot::Sender<bool>,
    ) {
        let app = match self.apps.get(&app_id).cloned() {
            Some(app) => app,
            None => {
                let _ = reply.send(false);
                return;
            }
        };
        let known = self.delete_by_key(&app, &DataKey::of(&data), true);
        let _ = reply.send(known);
    }

    /// Removes a datum from its application. `application_delete` marks a
    /// user-requested removal: it reaches the checkpointer and recurses
    /// into collection children.
    fn delete_by_key(
        &mut self,
        app: &ApplicationRef,
        key: &DataKey,
        application_delete: bool,
    ) -> bool {
        let dinfo = match app.get_mut().remove_data(key) {
            Some(d) => d,
            None => return false,
        };
        let data_id = dinfo.get().get_data_id();
        info!("Deleting data {}", data_id);
        if application_delete {
            self.checkpoint.deleted_data(data_id);
            let children = dinfo.get().children.clone();
            for child in children {
                self.delete_by_key(app, &child, true);
            }
        }
        if dinfo.get().get_params().kind() == DataKind::File {
            app.get_mut().remove_written_file(&dinfo);
        }
        let outcome = dinfo.get_mut().delete();
        // The registry entry is gone either way; physical removal follows
        // the version bookkeeping
        for instance in outcome.removed {
            self.remove_physical(instance);
        }
        if outcome.data_gone {
            self.data.remove(&data_id);
        }
        true
    }

    /*
     * ------------------------------ BARRIERS & RESULTS ------------------------------
     */

    pub(crate) fn barrier(&mut self, app_id: AppId, reply: BarrierWaiter) {
        let app = match self.apps.get(&app_id).cloned() {
            Some(app) => app,
            None => {
                let _ = reply.send(BarrierReply::Released);
                return;
            }
        };
        debug!("Application {} reached a barrier", app_id);
        // Reaching the barrier ends task generation for the open commutative
        // groups of the application
        let open_groups: Vec<TaskNodeRef> = self.data
            .values()
            .filter(|d| d.get().get_app() == app_id)
            .filter_map(|d| match d.get().tracking {
                AccessTracking::Standard { ref last_writer, .. } => match *last_writer {
                    Some(ref w) if w.get().is_group() => Some(w.clone()),
                    _ => None,
                },
                AccessTracking::Stream { .. } => None,
            })
            .collect();
        for group in open_groups {
            self.close_commutative_group(&group);
        }
        self.logger.add_barrier_reached_event(app_id, None);
        app.get().base_group().get_mut().register_barrier(reply);
    }

    pub(crate) fn barrier_group(&mut self, app_id: AppId, group: &str, reply: BarrierWaiter) {
        let found = self.apps
            .get(&app_id)
            .and_then(|app| app.get().get_group(group).cloned());
        match found {
            Some(g) => {
                self.logger
                    .add_barrier_reached_event(app_id, Some(group.to_string()));
                g.get_mut().register_barrier(reply);
            }
            None => {
                warn!(
                    "Barrier on unknown group {:?} of application {}",
                    group, app_id
                );
                let _ = reply.send(BarrierReply::UnknownGroup);
            }
        }
    }

    pub(crate) fn get_result_files(
        &mut self,
        app_id: AppId,
        reply: oneshot::Sender<Vec<ResultFileEntry>>,
    ) {
        let mut entries = Vec::new();
        if let Some(app) = self.apps.get(&app_id) {
            for dinfo in app.get().written_files() {
                let d = dinfo.get();
                let instance = d.current_instance();
                entries.push(ResultFileEntry {
                    data_id: d.get_data_id(),
                    instance,
                    locations: self.ledger.locations(&instance.get_renaming()),
                });
            }
        }
        let _ = reply.send(entries);
    }

    pub(crate) fn cancel_application_tasks(&mut self, app_id: AppId) {
        let app = match self.apps.get(&app_id).cloned() {
            Some(app) => app,
            None => return,
        };
        info!("Cancelling every task of application {}", app_id);
        app.get_mut().wall_clock_expired = true;
        let pending = app.get().base_group().get().pending_tasks().to_vec();
        for task in pending {
            self.cancel_task_node(&task);
        }
    }

    pub(crate) fn shutdown(&mut self) {
        debug!("Access processor shutting down");
        self.checkpoint.shutdown();
        self.logger.flush_events();
    }

    /*
     * ------------------------------ HELPERS ------------------------------
     */

    pub(crate) fn get_or_create_data(
        &mut self,
        app: &ApplicationRef,
        data: &DataDescription,
    ) -> DataInfoRef {
        let key = DataKey::of(data);
        if let Some(existing) = app.get().get_data(&key) {
            debug!("Another access to {}", data.description());
            return existing.clone();
        }
        debug!("FIRST access to {}", data.description());
        let data_id = self.next_data_id;
        self.next_data_id += 1;
        let dinfo = DataInfoRef::new(data_id, app.get().get_id(), data.clone());
        self.data.insert(data_id, dinfo.clone());
        app.get_mut().register_data(key, dinfo.clone());
        dinfo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::executor::{spawn, Notify, Spawn};
    use futures::sync::mpsc::{unbounded, UnboundedReceiver};
    use futures::{Async, Future};
    use futures::sync::oneshot;

    use nimbus_core::logging::MemoryLogger;
    use nimbus_core::types::{ImplementationSpec, TaskSpec};
    use nimbus_core::utils::Semaphore;

    use ap::AccessReply;
    use checkpoint::NoCheckpoint;
    use error_manager::ErrorManager;
    use graph::app::DoNothingTaskMonitor;

    struct NoopNotify;

    impl Notify for NoopNotify {
        fn notify(&self, _id: usize) {}
    }

    static NOOP_NOTIFY: NoopNotify = NoopNotify;

    const APP: AppId = 7;

    /// Drives the access processor synchronously and captures what it
    /// forwards to the dispatcher.
    struct Harness {
        ap: AccessProcessor,
        td_events: Spawn<UnboundedReceiver<TdEvent>>,
        error: ErrorManager,
        _ap_rx: UnboundedReceiver<ApRequest>,
        _core: ::tokio_core::reactor::Core,
    }

    impl Harness {
        fn new() -> Harness {
            let core = ::tokio_core::reactor::Core::new().unwrap();
            let (td_sender, td_receiver) = unbounded();
            let (ap_sender, ap_receiver) = unbounded();
            let error = ErrorManager::new();
            let mut ap = AccessProcessor::new(
                td_sender,
                ap_sender,
                core.handle(),
                Box::new(NoCheckpoint),
                Box::new(MemoryLogger::new()),
                error.clone(),
                Semaphore::new(None),
            );
            ap.register_application(
                APP,
                "test".to_string(),
                Box::new(DoNothingTaskMonitor),
                None,
            );
            Harness {
                ap,
                td_events: spawn(td_receiver),
                error,
                _ap_rx: ap_receiver,
                _core: core,
            }
        }

        fn drain_events(&mut self) -> Vec<TdEvent> {
            let mut out = Vec::new();
            loop {
                match self.td_events.poll_stream_notify(&&NOOP_NOTIFY, 0) {
                    Ok(Async::Ready(Some(event))) => out.push(event),
                    _ => break,
                }
            }
            out
        }

        /// Task ids handed to the dispatcher since the last call.
        fn ready_tasks(&mut self) -> Vec<TaskId> {
            self.drain_events()
                .into_iter()
                .filter_map(|e| match e {
                    TdEvent::ExecuteTask(spec) => Some(spec.task_id),
                    _ => None,
                })
                .collect()
        }

        fn submit(&mut self, task_id: TaskId, params: Vec<ParamSpec>) {
            let mut spec =
                TaskSpec::new(0, "t", vec![ImplementationSpec::method(0, "t", 1)]);
            spec.params = params;
            self.ap.task_submit(APP, task_id, spec);
        }

        fn submit_spec(&mut self, task_id: TaskId, spec: TaskSpec) {
            self.ap.task_submit(APP, task_id, spec);
        }

        fn end(&mut self, task_id: TaskId, status: TaskEndStatus) {
            self.ap.task_end(
                task_id,
                TaskEndInfo {
                    status,
                    exception: None,
                    locations: Vec::new(),
                    worker: None,
                    duration_ms: None,
                    job_status: None,
                    blocked: false,
                },
            );
        }

        fn finish(&mut self, task_id: TaskId) {
            self.end(task_id, TaskEndStatus::Finished);
        }

        fn read_version_of(&self, task_id: TaskId, param: usize) -> i32 {
            let task = self.ap.tasks.get(&task_id).unwrap();
            let access = task.get().resolved_params()[param].access;
            access.read_instance().unwrap().get_version_id()
        }
    }

    fn file(location: &str) -> DataDescription {
        DataDescription::File {
            location: location.to_string(),
        }
    }

    fn dep(mode: AccessMode, data: &DataDescription) -> ParamSpec {
        ParamSpec::dependency(mode, data.clone())
    }

    #[test]
    fn linear_pipeline_serializes_on_versions() {
        let mut h = Harness::new();
        let d = file("/tmp/d");
        h.submit(1, vec![dep(AccessMode::W, &d)]);
        h.submit(2, vec![dep(AccessMode::R, &d)]);

        // Only the writer is dependency free
        assert_eq!(h.ready_tasks(), vec![1]);
        // The reader observes the version the writer produces
        assert_eq!(h.read_version_of(2, 0), 2);

        h.finish(1);
        assert_eq!(h.ready_tasks(), vec![2]);
        h.finish(2);

        let dinfo = h.ap.data.get(&1).unwrap();
        assert_eq!(dinfo.get().get_current_version_id(), 2);
        assert_eq!(dinfo.get().version_count(), 1);
        assert!(dinfo.get().version(1).is_none());
    }

    #[test]
    fn diamond_waits_for_both_branches() {
        let mut h = Harness::new();
        let d = file("/d");
        let e = file("/e");
        let f = file("/f");
        h.submit(1, vec![dep(AccessMode::W, &d)]);
        h.submit(2, vec![dep(AccessMode::R, &d), dep(AccessMode::W, &e)]);
        h.submit(3, vec![dep(AccessMode::R, &d), dep(AccessMode::W, &f)]);
        h.submit(4, vec![dep(AccessMode::R, &e), dep(AccessMode::R, &f)]);

        assert_eq!(h.ready_tasks(), vec![1]);
        assert_eq!(h.ap.tasks.get(&4).unwrap().get().pending_inputs, 2);

        h.finish(1);
        assert_eq!(h.ready_tasks(), vec![2, 3]);
        h.finish(2);
        assert_eq!(h.ready_tasks(), Vec::<TaskId>::new());
        h.finish(3);
        assert_eq!(h.ready_tasks(), vec![4]);
    }

    #[test]
    fn commutative_group_collapses_into_one_writer() {
        let mut h = Harness::new();
        let d = file("/d");
        h.submit(1, vec![dep(AccessMode::CV, &d)]);
        h.submit(2, vec![dep(AccessMode::CV, &d)]);
        h.submit(3, vec![dep(AccessMode::CV, &d)]);
        // Commutative members are unordered between themselves
        assert_eq!(h.ready_tasks(), vec![1, 2, 3]);

        h.submit(4, vec![dep(AccessMode::R, &d)]);
        assert_eq!(h.ready_tasks(), Vec::<TaskId>::new());
        // The reader sees the version after all three writes
        assert_eq!(h.read_version_of(4, 0), 4);
        // and waits for the group node, not the members
        assert_eq!(h.ap.tasks.get(&4).unwrap().get().pending_inputs, 1);

        // Any completion permutation works; the reader releases last
        h.finish(2);
        h.finish(1);
        assert_eq!(h.ready_tasks(), Vec::<TaskId>::new());
        h.finish(3);
        assert_eq!(h.ready_tasks(), vec![4]);
    }

    #[test]
    fn ignored_failure_keeps_the_pipeline_alive() {
        let mut h = Harness::new();
        let d = file("/d");
        let mut spec = TaskSpec::new(0, "t", vec![ImplementationSpec::method(0, "t", 1)])
            .with_on_failure(OnFailure::Ignore);
        spec.params = vec![dep(AccessMode::W, &d)];
        h.submit_spec(1, spec);
        assert_eq!(h.ready_tasks(), vec![1]);

        h.ap.task_end(
            1,
            TaskEndInfo {
                status: TaskEndStatus::Failed,
                exception: None,
                locations: Vec::new(),
                worker: Some("w0".to_string()),
                duration_ms: None,
                job_status: Some(JobEndStatus::ExecutionFailed),
                blocked: false,
            },
        );
        // A warning, not a fatal condition
        assert!(!h.error.fatal_reached());

        // The reader proceeds against the (empty) produced version
        h.submit(2, vec![dep(AccessMode::R, &d)]);
        assert_eq!(h.ready_tasks(), vec![2]);
        assert_eq!(h.read_version_of(2, 0), 2);
    }

    #[test]
    fn failed_task_under_retry_policy_is_fatal() {
        let mut h = Harness::new();
        let d = file("/d");
        h.submit(1, vec![dep(AccessMode::W, &d)]);
        h.ready_tasks();
        h.end(1, TaskEndStatus::Failed);
        assert!(h.error.fatal_reached());
    }

    #[test]
    fn cancellation_rolls_versions_back() {
        let mut h = Harness::new();
        let d = file("/d");
        // The runtime knows a value for version 1
        self::register_value(&mut h, &d);

        h.submit(1, vec![dep(AccessMode::W, &d)]);
        h.ready_tasks();
        {
            let dinfo = h.ap.data.get(&1).unwrap();
            assert_eq!(dinfo.get().get_current_version_id(), 2);
        }

        // Cancelled before it ever ran: the written version is discarded
        h.end(1, TaskEndStatus::Canceled);
        {
            let dinfo = h.ap.data.get(&1).unwrap();
            assert_eq!(dinfo.get().get_current_version_id(), 1);
        }

        // A subsequent read sees version 1 again
        h.submit(2, vec![dep(AccessMode::R, &d)]);
        assert_eq!(h.ready_tasks(), vec![2]);
        assert_eq!(h.read_version_of(2, 0), 1);
    }

    #[test]
    fn double_cancellation_is_a_noop() {
        let mut h = Harness::new();
        let d = file("/d");
        self::register_value(&mut h, &d);
        h.submit(1, vec![dep(AccessMode::W, &d)]);
        h.ready_tasks();
        h.end(1, TaskEndStatus::Canceled);
        let version_after_first = h.ap.data.get(&1).unwrap().get().get_current_version_id();
        h.end(1, TaskEndStatus::Canceled);
        let version_after_second = h.ap.data.get(&1).unwrap().get().get_current_version_id();
        assert_eq!(version_after_first, version_after_second);
        assert_eq!(version_after_first, 1);
    }

    #[test]
    fn stream_writers_survive_unrelated_commit() {
        let mut h = Harness::new();
        let s = DataDescription::Stream { code: 5 };
        h.submit(1, vec![dep(AccessMode::W, &s)]);
        h.submit(2, vec![dep(AccessMode::R, &s)]);
        // Stream readers run alongside their writers
        assert_eq!(h.ready_tasks(), vec![1, 2]);
        assert_eq!(
            h.ap.tasks.get(&2).unwrap().get().stream_predecessors.len(),
            1
        );

        h.finish(1);
        // The writer remains an active producer after its task ended; it
        // retires only with the stream itself
        let writers = match h.ap.data.get(&1).unwrap().get().tracking {
            AccessTracking::Stream { ref writers } => writers.len(),
            _ => panic!("stream data lost its tracking"),
        };
        assert_eq!(writers, 1);
    }

    #[test]
    fn main_access_waits_for_the_producer() {
        let mut h = Harness::new();
        let d = file("/d");
        h.submit(1, vec![dep(AccessMode::W, &d)]);
        h.ready_tasks();

        let (sx, rx) = oneshot::channel();
        h.ap.register_data_access(AccessParams::main_access(APP, AccessMode::R, d.clone()), sx);
        let wait = match rx.wait().unwrap() {
            AccessReply::MustWait { wait } => wait,
            _ => panic!("expected to wait on the producer"),
        };

        h.finish(1);
        let access = wait.wait().unwrap();
        assert_eq!(access.read_instance().unwrap().get_version_id(), 2);
    }

    #[test]
    fn main_read_of_unknown_data_is_value_unaware() {
        let mut h = Harness::new();
        let (sx, rx) = oneshot::channel();
        h.ap.register_data_access(
            AccessParams::main_access(APP, AccessMode::R, file("/nowhere")),
            sx,
        );
        match rx.wait().unwrap() {
            AccessReply::Unaware => {}
            _ => panic!("expected a value-unaware outcome"),
        }
    }

    #[test]
    fn collective_parameters_depend_on_their_elements() {
        let mut h = Harness::new();
        let a = file("/a");
        let b = file("/b");
        h.submit(1, vec![dep(AccessMode::W, &a)]);
        h.submit(
            2,
            vec![ParamSpec::Collective {
                name: "col".to_string(),
                mode: AccessMode::R,
                data: DataDescription::Collection {
                    id: "c1".to_string(),
                },
                elements: vec![dep(AccessMode::R, &a), dep(AccessMode::R, &b)],
            }],
        );
        assert_eq!(h.ready_tasks(), vec![1]);
        // The collection reader waits for the writer of its element
        assert_eq!(h.ap.tasks.get(&2).unwrap().get().pending_inputs, 1);
        h.finish(1);
        assert_eq!(h.ready_tasks(), vec![2]);
    }

    fn register_value(h: &mut Harness, d: &DataDescription) {
        h.ap.register_remote_data(APP, d.clone(), "w0".to_string());
    }
}

