use std::path::Path;

use chrono::{DateTime, Utc};
use futures::sync::{mpsc, oneshot};
use futures::{Future, Stream};
use rusqlite::Connection;
use serde_json;

use errors::Result;
use logging::events::Event;
use logging::logger::{Logger, QueryEvents, SearchCriteria};

#[derive(Clone, Debug)]
pub struct EventWrapper {
    pub event: Event,
    pub timestamp: DateTime<Utc>,
}

/// Logger persisting events into an SQLite database. Events are buffered in
/// the owning thread and shipped to a dedicated writer thread on flush.
pub struct SQLiteLogger {
    events: Vec<EventWrapper>,
    queue: mpsc::UnboundedSender<LoggerMessage>,
}

enum LoggerMessage {
    SaveEvents(Vec<EventWrapper>),
    LoadEvents(SearchCriteria, oneshot::Sender<QueryEvents>),
}

fn save_events(conn: &mut Connection, events: Vec<EventWrapper>) -> Result<()> {
    debug!("Saving {} events into log", events.len());
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO events (timestamp, event_type, app, event) VALUES (?, ?, ?, ?)",
        )?;

        for e in events.iter() {
            let app = e.event.app_id().map(|a| a as i64);
            stmt.execute(&[
                &e.timestamp,
                &e.event.event_type(),
                &app,
                &serde_json::to_string(&e.event)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn make_where_string(column: &str, mode: &str) -> Result<String> {
    match mode {
        "=" | "<" | ">" | "<=" | ">=" => Ok(format!("{} {} ?", column, mode)),
        _ => bail!("Invalid search criteria"),
    }
}

fn load_events(conn: &mut Connection, search_criteria: &SearchCriteria) -> Result<QueryEvents> {
    let mut args: Vec<&::rusqlite::types::ToSql> = Vec::new();
    let mut where_conds = Vec::new();

    if let Some(ref v) = search_criteria.id {
        where_conds.push(make_where_string("id", &v.mode)?);
        args.push(&v.value);
    }

    if let Some(ref v) = search_criteria.event_types {
        let conditions: Result<Vec<_>> = v.iter()
            .map(|e| make_where_string("event_type", &e.mode))
            .collect();
        where_conds.push(format!("({})", conditions?.join(" OR ")));

        for event in v {
            args.push(&event.value);
        }
    }

    if let Some(ref v) = search_criteria.app {
        where_conds.push(make_where_string("app", &v.mode)?);
        args.push(&v.value);
    }

    let query_str = if where_conds.is_empty() {
        "SELECT id, timestamp, event FROM events ORDER BY id".to_string()
    } else {
        format!(
            "SELECT id, timestamp, event FROM events WHERE {} ORDER BY id",
            where_conds.join(" AND ")
        )
    };

    debug!("Running query: {}", query_str);
    let mut query = conn.prepare_cached(&query_str)?;
    let iter = query
        .query_map(&args, |row| (row.get(0), row.get(1), row.get(2)))?
        .map(|e| e.unwrap());
    let results: Vec<_> = iter.collect();
    debug!("Logger query response: {} rows", results.len());
    Ok(results)
}

impl SQLiteLogger {
    pub fn new(log_dir: &Path) -> Result<Self> {
        let conn = Connection::open(log_dir.join("events.db"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                timestamp TEXT NOT NULL,
                event_type VARCHAR(18) NOT NULL,
                app INTEGER,
                event TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_timestamp ON events(timestamp);
             CREATE INDEX IF NOT EXISTS idx_event_type ON events(event_type);
             CREATE INDEX IF NOT EXISTS idx_app ON events(app);
             ",
        )?;

        let (sx, rx) = mpsc::unbounded();

        ::std::thread::spawn(move || {
            debug!("Logger thread started");
            let mut conn = conn;
            let mut core = ::tokio_core::reactor::Core::new().unwrap();
            let future = rx.for_each(move |m| {
                match m {
                    LoggerMessage::SaveEvents(events) => {
                        save_events(&mut conn, events).unwrap();
                    }
                    LoggerMessage::LoadEvents(search_criteria, sender) => {
                        match load_events(&mut conn, &search_criteria) {
                            Ok(result) => {
                                // The query side may have gone away; not fatal
                                let _ = sender.send(result);
                            }
                            Err(e) => info!("Event query error: {}", e),
                        };
                    }
                }
                Ok(())
            });
            core.run(future).unwrap();
        });

        Ok(SQLiteLogger {
            events: Vec::new(),
            queue: sx,
        })
    }
}

impl Logger for SQLiteLogger {
    fn add_event_with_timestamp(&mut self, event: Event, timestamp: DateTime<Utc>) {
        self.events.push(EventWrapper { event, timestamp });
    }

    fn flush_events(&mut self) {
        if self.events.is_empty() {
            return;
        }
        debug!("Flushing {} events", self.events.len());
        self.queue
            .unbounded_send(LoggerMessage::SaveEvents(::std::mem::replace(
                &mut self.events,
                Vec::new(),
            )))
            .unwrap();
    }

    fn get_events(&mut self, search_criteria: SearchCriteria) -> Result<QueryEvents> {
        self.flush_events();
        let (sx, rx) = oneshot::channel();
        self.queue
            .unbounded_send(LoggerMessage::LoadEvents(search_criteria, sx))
            .unwrap();
        rx.wait().map_err(|_| "Invalid logger query".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate tempdir;

    fn create_logger(dir: &Path) -> SQLiteLogger {
        SQLiteLogger::new(dir).unwrap()
    }

    #[test]
    fn test_add_event() {
        let tmp = self::tempdir::TempDir::new("events").unwrap();
        let mut logger = create_logger(tmp.path());
        logger.add_dummy_event();
        assert_eq!(logger.events.len(), 1);
    }

    #[test]
    fn test_flush_and_query() {
        let tmp = self::tempdir::TempDir::new("events").unwrap();
        let mut logger = create_logger(tmp.path());
        logger.add_dummy_event();
        logger.add_task_submitted_event(3, 1, "inc".to_string());
        logger.flush_events();
        assert_eq!(logger.events.len(), 0);

        let events = logger.get_events(Default::default()).unwrap();
        assert_eq!(events.len(), 2);
    }
}
