use nimbus_core::types::{DataId, DataInstanceId, TaskId};

/// Receiver of task and data milestones, so that a restarted run can reuse
/// already-produced versions. The runtime only talks to this interface; the
/// default implementation persists nothing.
#[allow(unused_variables)]
pub trait CheckpointManager: Send {
    fn new_task(&mut self, task: TaskId) {}
    fn end_task(&mut self, task: TaskId) {}
    fn main_access(&mut self, instance: DataInstanceId) {}
    fn deleted_data(&mut self, data: DataId) {}
    fn shutdown(&mut self) {}
}

pub struct NoCheckpoint;

impl CheckpointManager for NoCheckpoint {}

/// Checkpointer recording the milestones it saw; used by the test suite to
/// assert the runtime feeds the interface correctly.
#[derive(Default)]
pub struct RecordingCheckpoint {
    pub tasks_started: Vec<TaskId>,
    pub tasks_ended: Vec<TaskId>,
    pub main_accesses: Vec<DataInstanceId>,
    pub deleted: Vec<DataId>,
}

impl CheckpointManager for RecordingCheckpoint {
    fn new_task(&mut self, task: TaskId) {
        self.tasks_started.push(task);
    }

    fn end_task(&mut self, task: TaskId) {
        self.tasks_ended.push(task);
    }

    fn main_access(&mut self, instance: DataInstanceId) {
        self.main_accesses.push(instance);
    }

    fn deleted_data(&mut self, data: DataId) {
        self.deleted.push(data);
    }
}
