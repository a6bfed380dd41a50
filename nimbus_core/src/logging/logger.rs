use chrono::{DateTime, Utc};

use logging::events::{self, Event, EventId};
use types::{AppId, DataInstanceId, JobEndStatus, TaskId, TaskInfo, WorkerId};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItemInt {
    pub value: i64,
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItemString {
    pub value: String,
    pub mode: String,
}

/// Filter for querying the event log back out.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchCriteria {
    pub id: Option<SearchItemInt>,
    pub event_types: Option<Vec<SearchItemString>>,
    pub app: Option<SearchItemInt>,
}

pub type QueryEvents = Vec<(EventId, DateTime<Utc>, String)>;

/// Sink for structured runtime events. Implementations buffer events and
/// persist them on `flush_events`.
pub trait Logger {
    fn add_event(&mut self, event: Event) {
        self.add_event_with_timestamp(event, Utc::now());
    }

    fn add_event_with_timestamp(&mut self, event: Event, time: DateTime<Utc>);

    fn flush_events(&mut self);

    fn get_events(&mut self, search_criteria: SearchCriteria) -> ::errors::Result<QueryEvents>;

    fn add_new_worker_event(&mut self, worker: WorkerId) {
        self.add_event(Event::WorkerNew(events::WorkerNewEvent { worker }));
    }

    fn add_worker_removed_event(&mut self, worker: WorkerId, error_msg: String) {
        self.add_event(Event::WorkerRemoved(events::WorkerRemovedEvent {
            worker,
            error_msg,
        }));
    }

    fn add_new_application_event(&mut self, app: AppId, parallelism_source: String) {
        self.add_event(Event::ApplicationNew(events::ApplicationNewEvent {
            app,
            parallelism_source,
        }));
    }

    fn add_application_closed_event(
        &mut self,
        app: AppId,
        reason: events::ApplicationClosedReason,
        message: String,
    ) {
        self.add_event(Event::ApplicationClosed(events::ApplicationClosedEvent {
            app,
            reason,
            message,
        }));
    }

    fn add_task_submitted_event(&mut self, app: AppId, task: TaskId, label: String) {
        self.add_event(Event::TaskSubmitted(events::TaskSubmittedEvent {
            app,
            task,
            label,
        }));
    }

    fn add_task_started_event(&mut self, app: AppId, task: TaskId, worker: WorkerId) {
        self.add_event(Event::TaskStarted(events::TaskStartedEvent {
            app,
            task,
            worker,
        }));
    }

    fn add_task_finished_event(&mut self, app: AppId, task: TaskId, info: TaskInfo) {
        self.add_event(Event::TaskFinished(events::TaskFinishedEvent {
            app,
            task,
            info,
        }));
    }

    fn add_task_failed_event(
        &mut self,
        app: AppId,
        task: TaskId,
        status: JobEndStatus,
        error_msg: String,
    ) {
        self.add_event(Event::TaskFailed(events::TaskFailedEvent {
            app,
            task,
            status,
            error_msg,
        }));
    }

    fn add_task_canceled_event(&mut self, app: AppId, task: TaskId) {
        self.add_event(Event::TaskCanceled(events::TaskCanceledEvent { app, task }));
    }

    fn add_group_exception_event(&mut self, app: AppId, group: String, message: String) {
        self.add_event(Event::GroupException(events::GroupExceptionEvent {
            app,
            group,
            message,
        }));
    }

    fn add_data_removed_event(&mut self, instance: DataInstanceId) {
        self.add_event(Event::DataRemoved(events::DataRemovedEvent { instance }));
    }

    fn add_barrier_reached_event(&mut self, app: AppId, group: Option<String>) {
        self.add_event(Event::BarrierReached(events::BarrierReachedEvent {
            app,
            group,
        }));
    }

    fn add_dummy_event(&mut self) {
        self.add_event(Event::Dummy(1));
    }
}

/// Logger keeping everything in memory; the default when no log directory
/// is configured and the backend of choice in tests.
pub struct MemoryLogger {
    events: Vec<(EventId, DateTime<Utc>, Event)>,
    next_id: EventId,
}

impl MemoryLogger {
    pub fn new() -> Self {
        MemoryLogger {
            events: Vec::new(),
            next_id: 1,
        }
    }
}

impl Logger for MemoryLogger {
    fn add_event_with_timestamp(&mut self, event: Event, time: DateTime<Utc>) {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push((id, time, event));
    }

    fn flush_events(&mut self) {
        // Nothing to persist
    }

    fn get_events(&mut self, criteria: SearchCriteria) -> ::errors::Result<QueryEvents> {
        let result = self.events
            .iter()
            .filter(|&&(_, _, ref e)| match criteria.event_types {
                Some(ref types) => types.iter().any(|t| t.value == e.event_type()),
                None => true,
            })
            .filter(|&&(_, _, ref e)| match criteria.app {
                Some(ref app) => e.app_id().map(|a| a as i64) == Some(app.value),
                None => true,
            })
            .map(|&(id, time, ref e)| {
                (id, time, ::serde_json::to_string(e).unwrap_or_default())
            })
            .collect();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_logger_filters_by_type() {
        let mut logger = MemoryLogger::new();
        logger.add_new_worker_event("w0".to_string());
        logger.add_task_submitted_event(42, 1, "inc".to_string());
        logger.add_dummy_event();

        let criteria = SearchCriteria {
            event_types: Some(vec![SearchItemString {
                value: "TaskSubmitted".to_string(),
                mode: "=".to_string(),
            }]),
            ..Default::default()
        };
        let events = logger.get_events(criteria).unwrap();
        assert_eq!(events.len(), 1);
    }
}
