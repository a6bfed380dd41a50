pub mod orderstrict;
pub mod scheduler;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use futures::sync::oneshot;
use futures::Stream;

use nimbus_core::types::{JobEndStatus, JobId, TaskEndStatus, TaskId, WorkerId, WorkerDescription};

use ap::{ApRequest, TaskEndInfo};
use comm::TransferLedger;
use error_manager::ErrorManager;
use jobs::{CommAdapter, JobDescription, JobRef, JobState, MAX_JOB_RETRIES};
use profile::ProfileStore;
use resources::Worker;
use td::scheduler::{ActionRef, ActionSpec, ActionState, Launch, ResourceSchedulerRef,
                    ScheduleError, SchedulingContext, TaskScheduler};

pub use td::orderstrict::OrderStrictScheduler;

/// Events consumed by the task dispatcher loop.
pub enum TdEvent {
    AddWorker {
        name: WorkerId,
        description: WorkerDescription,
        adapter: String,
        cloud: Option<(String, String)>,
    },
    /// A task whose data dependencies are satisfied.
    ExecuteTask(ActionSpec),
    JobCompleted {
        job_id: JobId,
        duration_ms: f64,
        outputs: Vec<(String, WorkerId)>,
    },
    JobFailed {
        job_id: JobId,
        status: JobEndStatus,
        message: String,
    },
    JobException {
        job_id: JobId,
        message: String,
    },
    CancelTask {
        task_id: TaskId,
    },
    UpgradeAction {
        task_id: TaskId,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The task dispatcher: single thread owning the scheduler policy, the
/// per-resource state and the in-flight jobs. Consumes ready-task and
/// resource events; analysis state lives on the access processor and is
/// reached only through messages.
pub struct Dispatcher {
    workers: HashMap<WorkerId, ResourceSchedulerRef>,
    actions: HashMap<TaskId, ActionRef>,
    jobs: HashMap<JobId, JobRef>,
    policy: Box<TaskScheduler>,
    profile: ProfileStore,
    output_profile: Option<PathBuf>,
    ledger: TransferLedger,
    adapters: HashMap<String, Arc<CommAdapter>>,
    ap: UnboundedSender<ApRequest>,
    error: ErrorManager,
    next_job_id: JobId,
    next_seq: u64,
}

impl Dispatcher {
    pub fn new(
        policy: Box<TaskScheduler>,
        profile: ProfileStore,
        output_profile: Option<PathBuf>,
        adapters: HashMap<String, Arc<CommAdapter>>,
        ap: UnboundedSender<ApRequest>,
        error: ErrorManager,
    ) -> Self {
        Dispatcher {
            workers: HashMap::new(),
            actions: HashMap::new(),
            jobs: HashMap::new(),
            policy,
            profile,
            output_profile,
            ledger: TransferLedger::new(),
            adapters,
            ap,
            error,
            next_job_id: 1,
            next_seq: 1,
        }
    }

    /// Runs the event loop until shutdown.
    pub fn run(mut self, requests: UnboundedReceiver<TdEvent>) {
        let mut core = ::tokio_core::reactor::Core::new().unwrap();
        let future = requests.for_each(move |event| {
            if self.handle(event) {
                Ok(())
            } else {
                Err(())
            }
        });
        // The error just signals the end of the loop
        let _ = core.run(future);
        debug!("Task dispatcher loop finished");
    }

    /// Processes one event; false stops the loop.
    fn handle(&mut self, event: TdEvent) -> bool {
        match event {
            TdEvent::AddWorker {
                name,
                description,
                adapter,
                cloud,
            } => {
                self.add_worker(name, description, adapter, cloud);
            }
            TdEvent::ExecuteTask(spec) => {
                self.execute_task(spec);
            }
            TdEvent::JobCompleted {
                job_id,
                duration_ms,
                outputs,
            } => {
                self.job_completed(job_id, duration_ms, outputs);
            }
            TdEvent::JobFailed {
                job_id,
                status,
                message,
            } => {
                self.job_failed(job_id, status, message);
            }
            TdEvent::JobException { job_id, message } => {
                self.job_exception(job_id, message);
            }
            TdEvent::CancelTask { task_id } => {
                self.cancel_task(task_id);
            }
            TdEvent::UpgradeAction { task_id } => {
                if let Some(action) = self.actions.get(&task_id).cloned() {
                    self.policy.upgrade_action(&action);
                }
            }
            TdEvent::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn add_worker(
        &mut self,
        name: WorkerId,
        description: WorkerDescription,
        adapter: String,
        cloud: Option<(String, String)>,
    ) {
        if self.workers.contains_key(&name) {
            self.error
                .warn(&format!("Dispatcher already knows worker {}", name));
            return;
        }
        if !self.adapters.contains_key(&adapter) {
            self.error.warn(&format!(
                "Worker {} registered with unknown adapter {:?}; ignoring",
                name, adapter
            ));
            return;
        }
        debug!("New worker {} over adapter {}", name, adapter);
        let worker = Worker::new(name.clone(), description);
        let rs =
            self.policy
                .generate_scheduler_for_resource(worker, &adapter, cloud, &self.profile);
        self.workers.insert(name, rs.clone());
        self.dispatch_step(&rs);
    }

    fn execute_task(&mut self, spec: ActionSpec) {
        let task_id = spec.task_id;
        let seq = self.next_seq;
        self.next_seq += 1;
        let action = ActionRef::new(spec, seq);
        self.actions.insert(task_id, action.clone());

        let mut launches = Vec::new();
        let result = {
            let mut ctx = SchedulingContext {
                workers: &self.workers,
                ledger: &self.ledger,
                profile: &self.profile,
                launches: &mut launches,
            };
            let score = self.policy.generate_action_score(&action, &ctx);
            self.policy.schedule_action(&mut ctx, &action, score)
        };
        match result {
            Ok(()) => self.perform_launches(launches),
            Err(ScheduleError::Unassigned) => unreachable!("policies queue unassigned actions"),
            Err(ScheduleError::Blocked) => self.action_blocked(&action),
        }
    }

    /// A permanently unplaceable action fails alone; the runtime stays up.
    fn action_blocked(&mut self, action: &ActionRef) {
        let task_id = action.get().spec.task_id;
        warn!("No resource can ever host task {}", task_id);
        action.get_mut().state = ActionState::Failed;
        self.actions.remove(&task_id);
        let _ = self.ap.unbounded_send(ApRequest::TaskEnd {
            task_id,
            info: TaskEndInfo {
                status: TaskEndStatus::Failed,
                exception: None,
                locations: Vec::new(),
                worker: None,
                duration_ms: None,
                job_status: None,
                blocked: true,
            },
        });
    }

    fn perform_launches(&mut self, launches: Vec<Launch>) {
        for launch in launches {
            let job_id = self.next_job_id;
            self.next_job_id += 1;

            let description = {
                let action = launch.action.get();
                let implementation = action
                    .spec
                    .implementations
                    .iter()
                    .find(|i| i.impl_id == launch.impl_id)
                    .expect("launch names an unknown implementation")
                    .clone();
                JobDescription {
                    job_id,
                    task_id: action.spec.task_id,
                    app: action.spec.app,
                    label: action.spec.label.clone(),
                    implementation,
                    worker: launch.worker.clone(),
                    params: action.spec.params.clone(),
                }
            };

            {
                let mut action = launch.action.get_mut();
                action.state = ActionState::Running;
                action.current_job = Some(job_id);
            }

            let adapter_name = self.workers[&launch.worker].get().adapter.clone();
            let adapter = self.adapters[&adapter_name].clone();
            debug!(
                "Launching job {} (task {}) on worker {}",
                job_id,
                description.task_id,
                launch.worker
            );
            self.jobs.insert(job_id, JobRef::new(description.clone()));
            let _ = self.ap.unbounded_send(ApRequest::TaskRunning {
                task_id: description.task_id,
                worker: launch.worker.clone(),
            });
            adapter.run_job(description);
        }
    }

    /// Releases the capacity a job held and returns its resource scheduler.
    fn release_job_resources(&mut self, job: &JobRef) -> Option<ResourceSchedulerRef> {
        let (worker, task_id, requirements) = {
            let inner = job.get();
            (
                inner.description.worker.clone(),
                inner.description.task_id,
                inner.description.implementation.requirements.clone(),
            )
        };
        let rs = match self.workers.get(&worker) {
            Some(rs) => rs.clone(),
            None => return None,
        };
        {
            let mut rs = rs.get_mut();
            rs.worker.release(&requirements);
            if let Some(action) = self.actions.get(&task_id) {
                rs.running.remove(action);
            }
        }
        Some(rs)
    }

    /// Runs the dispatch step after a resource event.
    fn dispatch_step(&mut self, rs: &ResourceSchedulerRef) {
        let mut launches = Vec::new();
        let mut blocked = Vec::new();
        {
            let mut ctx = SchedulingContext {
                workers: &self.workers,
                ledger: &self.ledger,
                profile: &self.profile,
                launches: &mut launches,
            };
            self.policy
                .handle_dependency_free_actions(&mut ctx, vec![], vec![], &mut blocked, rs);
        }
        self.perform_launches(launches);
        for action in blocked {
            self.action_blocked(&action);
        }
    }

    fn job_completed(&mut self, job_id: JobId, duration_ms: f64, outputs: Vec<(String, WorkerId)>) {
        let job = match self.jobs.remove(&job_id) {
            Some(job) => job,
            None => {
                warn!("Completion for unknown job {}", job_id);
                return;
            }
        };
        job.get_mut().state = JobState::Completed;
        let task_id = job.get().get_task_id();
        let worker = job.get().get_worker().to_string();
        let signature = job.get().description.implementation.signature.clone();

        for &(ref renaming, ref location) in outputs.iter() {
            self.ledger.register_location(renaming, location.clone());
        }

        let rs = self.release_job_resources(&job);
        if let Some(ref rs) = rs {
            rs.get_mut().note_execution(&signature, duration_ms);
        }

        let cancelled = match self.actions.remove(&task_id) {
            Some(action) => {
                let mut inner = action.get_mut();
                inner.current_job = None;
                if inner.being_cancelled {
                    inner.state = ActionState::Cancelled;
                    true
                } else {
                    inner.state = ActionState::Finished;
                    false
                }
            }
            None => false,
        };

        let status = if cancelled {
            TaskEndStatus::Canceled
        } else {
            TaskEndStatus::Finished
        };
        let _ = self.ap.unbounded_send(ApRequest::TaskEnd {
            task_id,
            info: TaskEndInfo {
                status,
                exception: None,
                locations: outputs,
                worker: Some(worker),
                duration_ms: Some(duration_ms),
                job_status: Some(JobEndStatus::Ok),
                blocked: false,
            },
        });

        if let Some(rs) = rs {
            self.dispatch_step(&rs);
        }
    }

    fn job_failed(&mut self, job_id: JobId, status: JobEndStatus, message: String) {
        let job = match self.jobs.remove(&job_id) {
            Some(job) => job,
            None => {
                warn!("Failure for unknown job {}", job_id);
                return;
            }
        };
        job.get_mut().state = JobState::Failed;
        let task_id = job.get().get_task_id();
        let worker = job.get().get_worker().to_string();
        let rs = self.release_job_resources(&job);

        let action = self.actions.get(&task_id).cloned();
        let mut terminal: Option<TaskEndStatus> = None;
        match action {
            Some(ref action) => {
                let retry = {
                    let mut inner = action.get_mut();
                    inner.current_job = None;
                    // Submission-level problems are always worth another
                    // attempt; execution failures only under RETRY.
                    let retryable = match status {
                        JobEndStatus::SubmissionFailed | JobEndStatus::TransfersFailed => true,
                        _ => inner.spec.on_failure == ::nimbus_core::types::OnFailure::Retry,
                    };
                    if inner.being_cancelled {
                        inner.state = ActionState::Cancelled;
                        terminal = Some(TaskEndStatus::Canceled);
                        false
                    } else if retryable && inner.retries + 1 < MAX_JOB_RETRIES {
                        inner.retries += 1;
                        true
                    } else {
                        inner.state = ActionState::Failed;
                        terminal = Some(TaskEndStatus::Failed);
                        false
                    }
                };
                if retry {
                    info!(
                        "Resubmitting task {} after {} ({} attempts so far)",
                        task_id,
                        message,
                        action.get().retries
                    );
                    let mut launches = Vec::new();
                    let result = {
                        let mut ctx = SchedulingContext {
                            workers: &self.workers,
                            ledger: &self.ledger,
                            profile: &self.profile,
                            launches: &mut launches,
                        };
                        let score = self.policy.generate_action_score(action, &ctx);
                        self.policy.schedule_action(&mut ctx, action, score)
                    };
                    match result {
                        Ok(()) => self.perform_launches(launches),
                        Err(_) => {
                            action.get_mut().state = ActionState::Failed;
                            terminal = Some(TaskEndStatus::Failed);
                        }
                    }
                }
            }
            None => {
                warn!("Failure for job {} of unknown task {}", job_id, task_id);
            }
        }

        if let Some(end_status) = terminal {
            self.actions.remove(&task_id);
            let _ = self.ap.unbounded_send(ApRequest::TaskEnd {
                task_id,
                info: TaskEndInfo {
                    status: end_status,
                    exception: None,
                    locations: Vec::new(),
                    worker: Some(worker),
                    duration_ms: None,
                    job_status: Some(status),
                    blocked: false,
                },
            });
        }

        if let Some(rs) = rs {
            self.dispatch_step(&rs);
        }
    }

    /// A task raised an application-level exception: it completes, and the
    /// access processor propagates the exception to its groups.
    fn job_exception(&mut self, job_id: JobId, message: String) {
        let job = match self.jobs.remove(&job_id) {
            Some(job) => job,
            None => {
                warn!("Exception for unknown job {}", job_id);
                return;
            }
        };
        job.get_mut().state = JobState::Completed;
        let task_id = job.get().get_task_id();
        let worker = job.get().get_worker().to_string();
        let rs = self.release_job_resources(&job);
        if let Some(action) = self.actions.remove(&task_id) {
            action.get_mut().state = ActionState::Finished;
        }
        let _ = self.ap.unbounded_send(ApRequest::TaskEnd {
            task_id,
            info: TaskEndInfo {
                status: TaskEndStatus::Finished,
                exception: Some(message),
                locations: Vec::new(),
                worker: Some(worker),
                duration_ms: None,
                job_status: Some(JobEndStatus::Ok),
                blocked: false,
            },
        });
        if let Some(rs) = rs {
            self.dispatch_step(&rs);
        }
    }

    /// Cancellation is idempotent: unknown or finished tasks are a no-op.
    fn cancel_task(&mut self, task_id: TaskId) {
        let action = match self.actions.get(&task_id).cloned() {
            Some(action) => action,
            None => return,
        };
        let (state, current_job) = {
            let inner = action.get();
            (inner.state, inner.current_job)
        };
        match state {
            ActionState::Running => {
                action.get_mut().being_cancelled = true;
                if let Some(job_id) = current_job {
                    let adapter_name = {
                        let worker = action.get().assigned.as_ref().map(|a| a.0.clone());
                        worker.and_then(|w| self.workers.get(&w).map(|rs| rs.get().adapter.clone()))
                    };
                    if let Some(adapter_name) = adapter_name {
                        self.adapters[&adapter_name].cancel_job(job_id);
                    }
                }
            }
            ActionState::Ready => {
                self.policy.forget_action(&action);
                action.get_mut().state = ActionState::Cancelled;
                self.actions.remove(&task_id);
                let _ = self.ap.unbounded_send(ApRequest::TaskEnd {
                    task_id,
                    info: TaskEndInfo {
                        status: TaskEndStatus::Canceled,
                        exception: None,
                        locations: Vec::new(),
                        worker: None,
                        duration_ms: None,
                        job_status: None,
                        blocked: false,
                    },
                });
            }
            _ => {}
        }
    }

    /// Folds the per-resource profiles into the store and persists it.
    fn shutdown(&mut self) {
        let names: Vec<WorkerId> = self.workers.keys().cloned().collect();
        for name in names {
            let rs = self.workers[&name].clone();
            let rs = rs.get();
            for (signature, profile) in rs.profiles.iter() {
                self.profile.accumulate_implementation(signature, profile);
            }
            match rs.cloud {
                Some((ref provider, ref instance_type)) => {
                    self.profile
                        .update_cloud_instance(provider, instance_type, &rs.profiles);
                }
                None => {
                    self.profile.update_resource(&name, &rs.profiles);
                }
            }
        }
        if let Some(ref path) = self.output_profile {
            if let Err(e) = self.profile.save(path) {
                self.error
                    .warn(&format!("Cannot write output profile: {}", e));
            }
        }
    }
}
