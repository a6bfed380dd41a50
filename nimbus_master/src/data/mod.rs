pub mod access;
pub mod info;
pub mod params;
pub mod version;

pub use self::access::EngineDataAccessId;
pub use self::info::{AccessTracking, DataInfo, DataInfoRef, VersionOutcome};
pub use self::params::{AccessParams, DataKey};
pub use self::version::DataVersion;
