use std::fmt;

use futures::sync::oneshot;

use nimbus_core::errors::TaskException;
use nimbus_core::types::AppId;

use graph::task::TaskNodeRef;

/// Outcome delivered to a blocked barrier call.
#[derive(Debug)]
pub enum BarrierReply {
    Released,
    Exception(TaskException),
    /// The barrier named a group the application never opened.
    UnknownGroup,
}

pub type BarrierWaiter = oneshot::Sender<BarrierReply>;

/// A named set of tasks within an application, with a shared barrier and
/// shared exception semantics. Applications keep a stack of open groups and
/// every new task joins all of them.
pub struct TaskGroup {
    name: String,
    app: AppId,

    /// The bottom group of an application scopes every task; exceptions do
    /// not propagate to it.
    base: bool,

    /// Tasks of the group that have not reached a terminal state.
    pending: Vec<TaskNodeRef>,
    total_tasks: usize,

    /// A closed group accepts no further tasks and is dropped from its
    /// application once it drains.
    closed: bool,

    barriers: Vec<BarrierWaiter>,

    exception: Option<TaskException>,
}

wrapped_ref!(TaskGroupRef, TaskGroup);

impl TaskGroup {
    #[inline]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn get_app(&self) -> AppId {
        self.app
    }

    #[inline]
    pub fn has_pending_tasks(&self) -> bool {
        !self.pending.is_empty()
    }

    #[inline]
    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn is_base(&self) -> bool {
        self.base
    }

    pub fn set_closed(&mut self) {
        self.closed = true;
    }

    pub fn pending_tasks(&self) -> &[TaskNodeRef] {
        &self.pending
    }

    pub fn get_exception(&self) -> Option<&TaskException> {
        self.exception.as_ref()
    }

    /// The first raised exception wins; later ones are logged by the caller.
    pub fn set_exception(&mut self, e: TaskException) -> bool {
        if self.exception.is_none() {
            self.exception = Some(e);
            true
        } else {
            false
        }
    }

    pub fn add_task(&mut self, task: TaskNodeRef) {
        self.total_tasks += 1;
        self.pending.push(task);
    }

    fn reply(&self) -> BarrierReply {
        match self.exception {
            Some(ref e) => BarrierReply::Exception(e.clone()),
            None => BarrierReply::Released,
        }
    }

    /// Registers a barrier on the group, releasing it right away when no
    /// task is pending.
    pub fn register_barrier(&mut self, waiter: BarrierWaiter) {
        if self.pending.is_empty() {
            let _ = waiter.send(self.reply());
        } else {
            self.barriers.push(waiter);
        }
    }

    /// Drops a terminated task; fires the barriers when the group drains.
    /// Returns whether the group became empty.
    pub fn remove_task(&mut self, task: &TaskNodeRef) -> bool {
        self.pending.retain(|t| t != task);
        if self.pending.is_empty() {
            for waiter in self.barriers.drain(..) {
                let _ = waiter.send(match self.exception {
                    Some(ref e) => BarrierReply::Exception(e.clone()),
                    None => BarrierReply::Released,
                });
            }
            true
        } else {
            false
        }
    }
}

impl TaskGroupRef {
    pub fn new(name: &str, app: AppId) -> Self {
        debug!("Creating task group {} for app {}", name, app);
        TaskGroupRef::wrap(TaskGroup {
            name: name.to_string(),
            app,
            base: false,
            pending: Vec::new(),
            total_tasks: 0,
            closed: false,
            barriers: Vec::new(),
            exception: None,
        })
    }

    pub fn new_base(name: &str, app: AppId) -> Self {
        let group = TaskGroupRef::new(name, app);
        group.get_mut().base = true;
        group
    }
}

impl fmt::Debug for TaskGroupRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskGroupRef {}", self.get().name)
    }
}
