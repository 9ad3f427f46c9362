//! Co-simulation core.
//!
//! Couples independently written parallel simulators into a single run by
//! linearizing their pairwise communications into a deterministic schedule.
//! See `clock`, `index`, `negotiator`, `buffer`, `router`, `transport`,
//! `subconnector`, `scheduler` and `port`/`runtime` for the pieces; none of
//! this crate launches processes, parses configuration files, or maps ranks
//! to programs — that's the launcher's job.

pub mod buffer;
pub mod clock;
pub mod collector;
pub mod config;
pub mod connector;
pub mod data_map;
pub mod distributor;
pub mod error;
pub mod index;
pub mod negotiator;
pub mod port;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod subconnector;
pub mod transport;

/// Hasher-aligned `HashMap` alias, consistent everywhere in this crate.
pub type HashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
/// Hasher-aligned `HashSet` alias.
pub type HashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;

/// Globally unique identifier assigned to a port-pair at configuration time.
pub type PortCode = i32;
/// Rank within a program's intracommunicator.
pub type Rank = i32;
/// Global index into a producer or consumer's unit/array index space.
pub type GlobalIndex = i64;
/// Rank-relative index into a unit/array index space.
pub type LocalIndex = i64;

/// Logs at debug level when the `logs` feature is enabled; compiles to
/// nothing otherwise, so the hot per-tick path carries no cost in builds
/// that don't want it.
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        #[cfg(feature = "logs")]
        {
            tracing::debug!($($arg)*);
        }
    };
}

/// Logs at warn level; always compiled in, since a warning should always be
/// seen regardless of the `logs` feature.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*);
    };
}

/// Logs at trace level, gated the same way as `log!`.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "logs")]
        {
            tracing::trace!($($arg)*);
        }
    };
}

/// Initializes a `tracing` subscriber writing to stderr. Tests and any
/// embedding binary can call this once; the core never initializes it on
/// its own (libraries shouldn't install global state implicitly).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
