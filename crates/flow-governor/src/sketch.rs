//! Packed counting table backing the governor.
//!
//! Each byte holds two independent 4-bit counters. A flow hash selects a
//! byte with bits `[1, log2(size)]` and one of its two nibbles with bit 0:
//!
//! ```text
//!   hash:  ... | b_k ... b_2 b_1 | b_0
//!                 cell index       nibble (0 = high, 1 = low)
//! ```
//!
//! Hashes that differ only in bit 0 share a byte but never a counter.
//! Collisions above that are accepted; the table is an approximate
//! frequency estimator, not an exact per-flow counter.

use crate::config::COUNTER_MAX;
use crate::error::{GovernorError, GovernorResult};

/// Fixed-size table of packed 4-bit counters.
#[derive(Clone, PartialEq, Eq)]
pub struct CountingTable {
    cells: Vec<u8>,
}

impl std::fmt::Debug for CountingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingTable")
            .field("size", &self.cells.len())
            .field("nonzero_cells", &self.cells.iter().filter(|c| **c != 0).count())
            .finish()
    }
}

impl CountingTable {
    /// Allocates a zeroed table of `size` bytes.
    ///
    /// `size` must be a power of two.
    pub fn with_size(size: usize) -> GovernorResult<Self> {
        if !size.is_power_of_two() {
            return Err(GovernorError::invalid_size(size, "not a power of two"));
        }

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(size)
            .map_err(|_| GovernorError::AllocationFailed { bytes: size })?;
        cells.resize(size, 0);

        Ok(Self { cells })
    }

    /// Table size in bytes (two counters per byte).
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Number of independent counters.
    pub fn counters(&self) -> usize {
        self.cells.len() * 2
    }

    /// Replaces the table with a zeroed one of `size` bytes.
    ///
    /// Panics if `size` is not a power of two.
    pub fn reallocate(&mut self, size: usize) {
        assert!(
            size.is_power_of_two(),
            "governor table size {} is not a power of two",
            size
        );
        self.cells = vec![0; size];
    }

    /// Zeroes every counter, keeping the allocation.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Returns true if every counter is zero.
    pub fn is_clear(&self) -> bool {
        self.cells.iter().all(|c| *c == 0)
    }

    /// Returns the counter addressed by `hash`.
    pub fn get(&self, hash: u32) -> u8 {
        let cell = self.cells[self.index(hash)];
        if hash & 1 == 0 {
            cell >> 4
        } else {
            cell & 0x0f
        }
    }

    /// Stores `value` in the counter addressed by `hash`, leaving the other
    /// nibble of the cell untouched.
    pub fn set(&mut self, hash: u32, value: u8) {
        debug_assert!(value <= COUNTER_MAX, "counter value {} overflows nibble", value);
        let value = value & 0x0f;
        let index = self.index(hash);
        let cell = &mut self.cells[index];
        *cell = if hash & 1 == 0 {
            (value << 4) | (*cell & 0x0f)
        } else {
            (*cell & 0xf0) | value
        };
    }

    fn index(&self, hash: u32) -> usize {
        (hash >> 1) as usize & (self.cells.len() - 1)
    }
}
