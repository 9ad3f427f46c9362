//! Runtime error taxonomy.
//!
//! Configuration and contract violations (double `map()`, non-positive
//! `max_buffered`, wrong port direction) are programmer errors and fail
//! fast via `panic!`/`assert!` at setup time, matching how
//! `fantoch::run::process` panics outright on `workers > 1 &&
//! !P::parallel()` rather than returning an error for it. Everything
//! that can fail once the run is underway — messaging, buffering,
//! negotiation — is represented here and propagated with `?`.

use std::fmt;

/// A core failure. Every variant here is fatal to the whole job: there is
/// no per-message recovery, since correctness relies on every process
/// staying in lock-step.
#[derive(Debug)]
pub enum MusicError {
    /// A FIBO insertion exceeded its declared element size, or a BIFO grew
    /// past its bound.
    BufferOverflow(String),
    /// A collector tried to read from an empty BIFO.
    Underrun(String),
    /// Producer and consumer index spaces disagreed on a required index.
    SpatialNegotiation(String),
    /// The underlying messaging substrate (a `Link`) returned an error.
    Messaging(String),
}

impl fmt::Display for MusicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MusicError::BufferOverflow(msg) => {
                write!(f, "buffer overflow: {}", msg)
            }
            MusicError::Underrun(msg) => write!(f, "underrun: {}", msg),
            MusicError::SpatialNegotiation(msg) => {
                write!(f, "spatial negotiation inconsistency: {}", msg)
            }
            MusicError::Messaging(msg) => {
                write!(f, "messaging substrate failure: {}", msg)
            }
        }
    }
}

impl std::error::Error for MusicError {}

pub type Result<T> = std::result::Result<T, MusicError>;
