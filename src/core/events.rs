//! Domain events reported by the engine.
//!
//! The core never logs directly. It reports what it is doing to an
//! [`Observer`], which the caller injects into the solution. The default
//! [`TracingObserver`] forwards everything to `tracing`; [`NullObserver`]
//! drops it.

use std::fmt;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A declared dependency has no local copy.
    Missing { solution: String, name: String },

    /// A restore of `name` is about to be attempted.
    RestoreStarted { name: String, range: String },

    /// A package was installed into the solution.
    Restored {
        name: String,
        version: String,
        source: String,
    },

    /// A package was satisfied from the local cache.
    CacheHit { name: String, version: String },

    /// A restore failed; siblings continue.
    RestoreFailed { name: String, reason: String },

    /// Validation found a problem.
    Problem { name: String, message: String },

    /// A full validation report for a failed assertion.
    ValidationReport { solution: String, report: String },

    /// Files in the local package store are held open by another process.
    LockedFiles { solution: String, process: Option<String> },

    /// The solution switched storage layouts.
    Converted { solution: String, mode: String },

    /// A solution's local state was cleaned.
    Cleaned { solution: String, mode: String },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Missing { solution, name } => {
                write!(f, "{}: missing local copy of {}", solution, name)
            }
            Event::RestoreStarted { name, range } => write!(f, "restoring {} ({})", name, range),
            Event::Restored {
                name,
                version,
                source,
            } => write!(f, "restored {} {} from {}", name, version, source),
            Event::CacheHit { name, version } => write!(f, "using cached {} {}", name, version),
            Event::RestoreFailed { name, reason } => {
                write!(f, "could not restore {}: {}", name, reason)
            }
            Event::Problem { name, message } => write!(f, "{}: {}", name, message),
            Event::ValidationReport { solution, report } => {
                write!(f, "solution {} is invalid:\n{}", solution, report)
            }
            Event::LockedFiles {
                solution,
                process: Some(process),
            } => write!(f, "{}: package files are locked by {}", solution, process),
            Event::LockedFiles {
                solution,
                process: None,
            } => write!(f, "{}: package files are locked", solution),
            Event::Converted { solution, mode } => {
                write!(f, "converted {} to {} storage", solution, mode)
            }
            Event::Cleaned { solution, mode } => write!(f, "cleaned {} ({})", solution, mode),
        }
    }
}

/// Receiver of engine events.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Forwards events to `tracing` at a level matching their severity.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notify(&self, event: &Event) {
        match event {
            Event::RestoreFailed { .. }
            | Event::Problem { .. }
            | Event::ValidationReport { .. }
            | Event::LockedFiles { .. } => warn!("{}", event),
            Event::Restored { .. } | Event::Converted { .. } | Event::Cleaned { .. } => {
                info!("{}", event)
            }
            _ => debug!("{}", event),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn notify(&self, _event: &Event) {}
}
