//! TCP reachability prober.
//!
//! Repeatedly opens (and immediately closes) TCP connections to one target,
//! tracking UP/DOWN state, outage intervals, connect latency and address
//! changes. Results flow out through [`sink::Sink`] implementations.

pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod prober;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod stats;
pub mod tracker;
pub mod util;

pub use error::{ConfigError, ResolveError};
pub use monitor::{Controls, Monitor, MonitorSettings};
pub use resolver::{IpPreference, Lookup, Resolver, SystemLookup};
pub use session::{Session, Target};
pub use stats::{RunningStats, Snapshot};
