extern crate chrono;
#[macro_use]
extern crate error_chain;
extern crate futures;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate rusqlite;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate tokio_core;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod errors;
pub mod logging;
pub mod types;
pub mod utils;

pub use errors::{Error, ErrorKind, Result, ResultExt};
