pub mod app;
pub mod group;
pub mod task;

pub use self::app::{Application, ApplicationRef, DoNothingTaskMonitor, TaskMonitor};
pub use self::group::{BarrierReply, BarrierWaiter, TaskGroup, TaskGroupRef};
pub use self::task::{ResolvedParam, TaskKind, TaskNode, TaskNodeRef, WaiterId};
