extern crate chrono;
#[macro_use]
extern crate error_chain;
extern crate futures;
#[macro_use]
extern crate log;
extern crate num_cpus;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate tokio_core;
extern crate tokio_timer;

extern crate nimbus_core;

#[macro_use]
mod macros;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ap;
pub mod checkpoint;
pub mod comm;
pub mod config;
pub mod data;
pub mod error_manager;
pub mod graph;
pub mod jobs;
pub mod profile;
pub mod resources;
pub mod runtime;
pub mod td;

pub use runtime::Runtime;

/// Detected CPU count, at least one.
pub fn num_cpus_detected() -> u32 {
    ::std::cmp::max(1, ::num_cpus::get()) as u32
}
