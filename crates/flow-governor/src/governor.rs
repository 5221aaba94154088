//! The flow setup governor.
//!
//! A [`Governor`] decides, per observed packet batch, whether a flow has
//! seen enough traffic to deserve a datapath flow or should stay on the
//! slow path. It counts packets per flow hash in a [`CountingTable`] and
//! installs a flow once its counter reaches the setup threshold.
//!
//! # Generations
//!
//! The table is wiped every `size / 4` packets. The length of each such
//! generation drives the table size for the next one:
//!
//! | Generation length            | Next size                    |
//! |------------------------------|------------------------------|
//! | `< min_elapsed`              | doubled, at most `max_size`  |
//! | `> max_elapsed`              | halved, at least `min_size`  |
//! | otherwise                    | unchanged                    |
//!
//! When traffic stops, generations stop rolling over on their own;
//! [`Governor::run`] shrinks the table instead, and [`Governor::is_idle`]
//! tells the owner when there is nothing left to shrink.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::config::GovernorConfig;
use crate::diagnostics::{DiagnosticsSink, GovernorEvent, TracingSink};
use crate::error::GovernorResult;
use crate::sketch::CountingTable;

/// Cumulative counters over a governor's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GovernorStats {
    /// Generations started, including the first.
    pub generations: u64,
    /// Generations that changed the table size.
    pub resizes: u64,
    /// Packets passed to the admission query.
    pub packets: u64,
    /// Admission queries that returned "install".
    pub installs: u64,
}

/// Adaptive admission controller for datapath flow setup.
///
/// Not thread-safe by design: every method that counts or rolls over takes
/// `&mut self`. Shard governors per thread or lock externally.
pub struct Governor {
    name: String,
    config: GovernorConfig,
    table: CountingTable,
    /// Start of the current generation.
    start: Instant,
    /// Packets counted in the current generation.
    n_packets: u32,
    stats: GovernorStats,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("name", &self.name)
            .field("size", &self.table.size())
            .field("n_packets", &self.n_packets)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Governor {
    /// Creates a governor named `name` with the default parameters, the
    /// system clock and `tracing` diagnostics.
    pub fn new(name: impl Into<String>) -> GovernorResult<Self> {
        Self::with_config(name, GovernorConfig::default())
    }

    /// Creates a governor with custom parameters.
    pub fn with_config(name: impl Into<String>, config: GovernorConfig) -> GovernorResult<Self> {
        Self::with_parts(name, config, Arc::new(SystemClock), Arc::new(TracingSink))
    }

    /// Creates a governor with every collaborator supplied by the caller.
    ///
    /// Fails if `config` is invalid or the initial table cannot be
    /// allocated.
    pub fn with_parts(
        name: impl Into<String>,
        config: GovernorConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> GovernorResult<Self> {
        config.validate()?;

        let name = name.into();
        let table = CountingTable::with_size(config.min_size)?;
        sink.emit(&GovernorEvent::Engaged {
            name: name.clone(),
            size: table.size(),
        });

        Ok(Self {
            name,
            start: clock.now(),
            n_packets: 0,
            stats: GovernorStats {
                generations: 1,
                ..Default::default()
            },
            config,
            table,
            clock,
            sink,
        })
    }

    /// Destroys the governor. Equivalent to dropping it.
    pub fn destroy(self) {}

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters this governor runs with.
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Current table size in bytes.
    pub fn size(&self) -> usize {
        self.table.size()
    }

    /// Packets counted in the current generation.
    pub fn n_packets(&self) -> u32 {
        self.n_packets
    }

    /// When the current generation started.
    pub fn generation_start(&self) -> Instant {
        self.start
    }

    /// Lifetime statistics.
    pub fn stats(&self) -> &GovernorStats {
        &self.stats
    }

    /// Current value of the counter `hash` maps to.
    pub fn counter(&self, hash: u32) -> u8 {
        self.table.get(hash)
    }

    /// Decides whether the flow with hash `hash`, for which `n` packets just
    /// arrived, should be installed in the datapath (`true`) or handled
    /// packet by packet (`false`).
    ///
    /// `n` is ordinarily 1, more when packets are batched.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn should_install_flow(&mut self, hash: u32, n: u32) -> bool {
        assert!(n > 0, "governor {}: packet count must be positive", self.name);

        self.n_packets = self.n_packets.saturating_add(n);
        self.stats.packets += u64::from(n);
        if self.n_packets as usize >= self.table.size() / 4 {
            let next = self.next_size(self.elapsed());
            self.new_generation(next);
        }

        // Stored counters stay below the threshold, so the only thing to
        // guard against is a huge `n` wrapping the sum.
        let count = n.saturating_add(u32::from(self.table.get(hash)));
        let install = count >= u32::from(self.config.flow_setup_threshold);
        if install {
            self.table.set(hash, 0);
            self.stats.installs += 1;
        } else {
            self.table.set(hash, count as u8);
        }

        install
    }

    /// Periodic maintenance. Shrinks the table when the current generation
    /// has outlived `max_elapsed` without filling up.
    pub fn run(&mut self) {
        if self.elapsed() > self.config.max_elapsed() {
            let size = self.table.size();
            if size > self.config.min_size {
                self.new_generation(size / 2);
            }
            // At the minimum size a new generation would only restart the
            // idle clock.
        }
    }

    /// Latest time by which [`Governor::run`] should next be called.
    pub fn wait(&self) -> Instant {
        self.start + self.config.max_elapsed()
    }

    /// Returns true if the governor is at its minimum size and has seen no
    /// full generation for longer than `max_elapsed`. The owner may then
    /// drop it.
    pub fn is_idle(&self) -> bool {
        self.table.size() == self.config.min_size && self.elapsed() > self.config.max_elapsed()
    }

    /// Time since the current generation started.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }

    fn next_size(&self, elapsed: Duration) -> usize {
        let size = self.table.size();
        if elapsed < self.config.min_elapsed() && size < self.config.max_size {
            size * 2
        } else if elapsed > self.config.max_elapsed() && size > self.config.min_size {
            size / 2
        } else {
            size
        }
    }

    /// Starts a new generation with a table of `size` bytes.
    fn new_generation(&mut self, size: usize) {
        assert!(
            size >= self.config.min_size && size <= self.config.max_size,
            "governor {}: table size {} out of range",
            self.name,
            size
        );
        assert!(
            size.is_power_of_two(),
            "governor {}: table size {} is not a power of two",
            self.name,
            size
        );

        let old_size = self.table.size();
        let elapsed = self.elapsed();
        if size != old_size {
            self.sink.emit(&GovernorEvent::Resized {
                name: self.name.clone(),
                packets: self.n_packets,
                elapsed,
                old_size,
                new_size: size,
            });
            self.table.reallocate(size);
            self.stats.resizes += 1;
        } else {
            self.sink.emit(&GovernorEvent::Rollover {
                name: self.name.clone(),
                packets: self.n_packets,
                elapsed,
                size,
            });
            self.table.clear();
        }

        self.start = self.clock.now();
        self.n_packets = 0;
        self.stats.generations += 1;
    }
}

impl Drop for Governor {
    fn drop(&mut self) {
        self.sink.emit(&GovernorEvent::Disengaged {
            name: self.name.clone(),
        });
    }
}
