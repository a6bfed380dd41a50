pub mod events;
pub mod logger;
pub mod sqlite_logger;

pub use self::events::{Event, EventId};
pub use self::logger::{Logger, MemoryLogger, QueryEvents, SearchCriteria};
pub use self::sqlite_logger::SQLiteLogger;
