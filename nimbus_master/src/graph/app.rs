use std::collections::HashMap;
use std::fmt;

use nimbus_core::types::{AppId, TaskId};

use data::info::DataInfoRef;
use data::params::DataKey;
use graph::group::TaskGroupRef;

/// Hooks through which the runtime reports task outcomes back to whoever
/// drives the application. All callbacks run on the access processor
/// thread; implementations must not block.
#[allow(unused_variables)]
pub trait TaskMonitor: Send {
    fn on_creation(&mut self, task: TaskId) {}
    fn on_completion(&mut self, task: TaskId) {}
    fn on_failure(&mut self, task: TaskId) {}
    fn on_cancellation(&mut self, task: TaskId) {}
    fn on_exception(&mut self, task: TaskId, message: &str) {}
}

/// Monitor discarding every notification; the default.
pub struct DoNothingTaskMonitor;

impl TaskMonitor for DoNothingTaskMonitor {}

/// Per-program state: data registries, the stack of open task groups and
/// the record of written files for end-of-run retrieval.
pub struct Application {
    id: AppId,

    parallelism_source: String,

    pub(crate) total_task_count: usize,

    /// Open groups; every new task joins all of them. The bottom entry is
    /// the base group holding the whole application.
    group_stack: Vec<TaskGroupRef>,
    groups: HashMap<String, TaskGroupRef>,

    /// Data owned by the application, keyed the way the caller names it.
    data: HashMap<DataKey, DataInfoRef>,

    /// Files written by tasks, fetched back when the application ends.
    written_files: Vec<DataInfoRef>,

    pub(crate) monitor: Box<TaskMonitor>,

    /// The wall-clock limit fired and the application is being cancelled.
    pub(crate) wall_clock_expired: bool,
}

wrapped_ref!(ApplicationRef, Application);

impl Application {
    #[inline]
    pub fn get_id(&self) -> AppId {
        self.id
    }

    #[inline]
    pub fn get_parallelism_source(&self) -> &str {
        &self.parallelism_source
    }

    /*
     * ----------------------------------- GROUP MANAGEMENT -----------------------------------
     */

    pub fn base_group(&self) -> &TaskGroupRef {
        &self.group_stack[0]
    }

    pub fn current_groups(&self) -> &[TaskGroupRef] {
        &self.group_stack
    }

    pub fn get_group(&self, name: &str) -> Option<&TaskGroupRef> {
        self.groups.get(name)
    }

    pub fn remove_group(&mut self, name: &str) -> Option<TaskGroupRef> {
        self.groups.remove(name)
    }

    pub fn open_task_group(&mut self, name: &str) {
        debug!("Adding group {} to the current groups stack", name);
        let group = if self.group_stack.is_empty() {
            TaskGroupRef::new_base(name, self.id)
        } else {
            TaskGroupRef::new(name, self.id)
        };
        self.group_stack.push(group.clone());
        self.groups.insert(name.to_string(), group);
    }

    /// Pops the top of the group stack; the base group never closes this way.
    pub fn close_current_task_group(&mut self) {
        if self.group_stack.len() <= 1 {
            warn!("Application {} has no open group to close", self.id);
            return;
        }
        let group = self.group_stack.pop().unwrap();
        group.get_mut().set_closed();
    }

    /*
     * ----------------------------------- DATA MANAGEMENT -----------------------------------
     */

    pub fn register_data(&mut self, key: DataKey, info: DataInfoRef) {
        self.data.insert(key, info);
    }

    pub fn get_data(&self, key: &DataKey) -> Option<&DataInfoRef> {
        self.data.get(key)
    }

    pub fn remove_data(&mut self, key: &DataKey) -> Option<DataInfoRef> {
        self.data.remove(key)
    }

    /// Removes and returns every datum the application owns.
    pub fn pop_all_data(&mut self) -> Vec<DataInfoRef> {
        self.data.drain().map(|(_, v)| v).collect()
    }

    pub fn add_written_file(&mut self, info: &DataInfoRef) {
        if !self.written_files.contains(info) {
            self.written_files.push(info.clone());
        }
    }

    pub fn remove_written_file(&mut self, info: &DataInfoRef) {
        let before = self.written_files.len();
        self.written_files.retain(|f| f != info);
        if self.written_files.len() != before {
            info!(
                "Removed data {} from written files",
                info.get().get_data_id()
            );
        }
    }

    pub fn written_files(&self) -> &[DataInfoRef] {
        &self.written_files
    }
}

impl ApplicationRef {
    pub fn new(id: AppId, parallelism_source: &str, monitor: Box<TaskMonitor>) -> Self {
        let app = ApplicationRef::wrap(Application {
            id,
            parallelism_source: parallelism_source.to_string(),
            total_task_count: 0,
            group_stack: Vec::new(),
            groups: HashMap::new(),
            data: HashMap::new(),
            written_files: Vec::new(),
            monitor,
            wall_clock_expired: false,
        });
        // The base group scopes the whole application and backs the global
        // barrier.
        let base_name = format!("App{}", id);
        app.get_mut().open_task_group(&base_name);
        app
    }
}

impl fmt::Debug for ApplicationRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ApplicationRef {}", self.get().id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::types::DataDescription;

    fn app() -> ApplicationRef {
        ApplicationRef::new(7, "test", Box::new(DoNothingTaskMonitor))
    }

    #[test]
    fn base_group_survives_close() {
        let app = app();
        assert_eq!(app.get().current_groups().len(), 1);
        app.get_mut().open_task_group("inner");
        assert_eq!(app.get().current_groups().len(), 2);
        app.get_mut().close_current_task_group();
        assert_eq!(app.get().current_groups().len(), 1);
        // Closing again must not pop the base group
        app.get_mut().close_current_task_group();
        assert_eq!(app.get().current_groups().len(), 1);
    }

    #[test]
    fn closed_groups_remain_addressable_until_drained() {
        let app = app();
        app.get_mut().open_task_group("g");
        app.get_mut().close_current_task_group();
        assert!(app.get().get_group("g").is_some());
    }

    #[test]
    fn data_registry_is_keyed_by_caller_name() {
        let app = app();
        let desc = DataDescription::Object { code: 11 };
        let info = ::data::info::DataInfoRef::new(1, 7, desc.clone());
        app.get_mut().register_data(::data::params::DataKey::of(&desc), info);
        assert!(app.get()
            .get_data(&::data::params::DataKey::of(&desc))
            .is_some());
    }
}
