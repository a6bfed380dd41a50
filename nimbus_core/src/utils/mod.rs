pub(crate) mod consistency;
pub(crate) mod semaphore;
pub(crate) mod wrapped;

use std::collections::HashSet;

pub type RcSet<T> = HashSet<T>;

pub use self::consistency::{ConsistencyCheck, DEBUG_CHECK_CONSISTENCY};
pub use self::semaphore::Semaphore;
pub use self::wrapped::WrappedRcRefCell;
