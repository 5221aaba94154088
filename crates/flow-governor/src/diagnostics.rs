//! Diagnostic events emitted over a governor's lifetime.
//!
//! Events are observability only and never feed back into admission
//! decisions. The governor holds an `Arc<dyn DiagnosticsSink>`; the default
//! [`TracingSink`] renders events as `tracing` lines.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// A lifecycle or generation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernorEvent {
    /// The first generation started.
    Engaged {
        /// Governor name.
        name: String,
        /// Initial table size in bytes.
        size: usize,
    },
    /// A generation ended and the table changed size.
    Resized {
        /// Governor name.
        name: String,
        /// Packets counted in the finished generation.
        packets: u32,
        /// Length of the finished generation.
        elapsed: Duration,
        /// Table size during the finished generation.
        old_size: usize,
        /// Table size for the next generation.
        new_size: usize,
    },
    /// A generation ended without a size change.
    Rollover {
        /// Governor name.
        name: String,
        /// Packets counted in the finished generation.
        packets: u32,
        /// Length of the finished generation.
        elapsed: Duration,
        /// Table size, unchanged.
        size: usize,
    },
    /// The governor was destroyed.
    Disengaged {
        /// Governor name.
        name: String,
    },
}

impl GovernorEvent {
    /// Name of the governor that emitted the event.
    pub fn name(&self) -> &str {
        match self {
            Self::Engaged { name, .. }
            | Self::Resized { name, .. }
            | Self::Rollover { name, .. }
            | Self::Disengaged { name } => name,
        }
    }
}

impl std::fmt::Display for GovernorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engaged { name, size } => write!(
                f,
                "{}: engaging governor with {} kB hash table",
                name,
                size / 1024
            ),
            Self::Resized {
                name,
                packets,
                elapsed,
                old_size,
                new_size,
            } => write!(
                f,
                "{}: processed {} packets in {:.2} s, {} hash table to {} kB",
                name,
                packets,
                elapsed.as_secs_f64(),
                if new_size > old_size {
                    "enlarging"
                } else {
                    "shrinking"
                },
                new_size / 1024
            ),
            Self::Rollover {
                name,
                packets,
                elapsed,
                size,
            } => write!(
                f,
                "{}: processed {} packets in {:.2} s with {} kB hash table",
                name,
                packets,
                elapsed.as_secs_f64(),
                size / 1024
            ),
            Self::Disengaged { name } => write!(f, "{}: disengaging", name),
        }
    }
}

/// Receiver for governor diagnostics.
pub trait DiagnosticsSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: &GovernorEvent);
}

/// Logs events through `tracing`: same-size rollovers at DEBUG, everything
/// else at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&self, event: &GovernorEvent) {
        match event {
            GovernorEvent::Rollover {
                name,
                packets,
                elapsed,
                size,
            } => debug!(
                governor = %name,
                packets,
                elapsed_ms = elapsed.as_millis() as u64,
                size,
                "{}",
                event
            ),
            GovernorEvent::Resized {
                name,
                old_size,
                new_size,
                ..
            } => info!(governor = %name, old_size, new_size, "{}", event),
            _ => info!(governor = %event.name(), "{}", event),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<GovernorEvent>>,
}

impl RecordingSink {
    /// Creates an empty sink, already wrapped for sharing with a governor.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a copy of the events recorded so far.
    pub fn events(&self) -> Vec<GovernorEvent> {
        self.lock().clone()
    }

    /// Removes and returns the recorded events.
    pub fn take(&self) -> Vec<GovernorEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// A test that panicked mid-emit poisons the lock; the events are
    /// still wanted.
    fn lock(&self) -> MutexGuard<'_, Vec<GovernorEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DiagnosticsSink for RecordingSink {
    fn emit(&self, event: &GovernorEvent) {
        self.lock().push(event.clone());
    }
}
