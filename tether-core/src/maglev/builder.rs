//! Maglev permutation-filling table construction.
//!
//! Each backend derives an `(offset, skip)` pair from its identifier, which
//! defines a walk over the slot space. Backends take turns claiming the next
//! free slot on their own walk until every slot has an owner. Adding or
//! removing one backend only perturbs roughly `1/N` of the slots.

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::Backend;
use crate::hash::fnv1a32;
use crate::maglev::table::Table;

/// Prime table size used when none is configured.
pub const DEFAULT_TABLE_SIZE: usize = 65_537;

/// Appended to a backend identifier to derive its skip hash.
const SKIP_SEPARATOR: &str = "#";

/// Marks a slot nobody has claimed yet.
const EMPTY: usize = usize::MAX;

/// Reasons a table build is rejected.
///
/// A failed build never replaces a table that is already serving traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The backend list was empty.
    #[error("cannot build a table without backends")]
    NoBackends,

    /// The table size was zero.
    #[error("table size must be positive")]
    InvalidTableSize,

    /// Every backend exhausted its walk before all slots were claimed.
    ///
    /// Only reachable with a non-prime table size.
    #[error("table of size {table_size} left unfilled after claiming {filled} slots")]
    Unfillable {
        /// Requested table size
        table_size: usize,
        /// Slots claimed before every walk was exhausted
        filled: usize,
    },
}

/// Builds immutable Maglev lookup tables of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableBuilder {
    table_size: usize,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_SIZE)
    }
}

impl TableBuilder {
    /// Create a builder producing tables with `table_size` slots.
    ///
    /// A prime size is recommended; other sizes are accepted but may leave a
    /// backend's walk unable to reach every slot.
    pub fn new(table_size: usize) -> Self {
        Self { table_size }
    }

    /// The number of slots in every table this builder produces.
    pub fn table_size(&self) -> usize {
        self.table_size
    }

    /// Build a table from an ordered backend list.
    ///
    /// The output depends on the order of `backends`: two identical sets in
    /// different orders may fill contested slots differently.
    pub fn build(&self, backends: Vec<Backend>) -> Result<Table, BuildError> {
        let m = self.table_size;
        if backends.is_empty() {
            return Err(BuildError::NoBackends);
        }
        if m == 0 {
            return Err(BuildError::InvalidTableSize);
        }
        if !is_prime(m) {
            warn!(table_size = m, "table size is not prime; slot coverage is not guaranteed");
        }

        let mut walks: Vec<Walk> = backends.iter().map(|b| Walk::new(&b.id, m)).collect();
        let mut slots = vec![EMPTY; m];
        let mut filled = 0;

        while filled < m {
            let mut claimed_this_round = false;

            for (index, walk) in walks.iter_mut().enumerate() {
                let Some(slot) = walk.next_free(&slots) else {
                    continue;
                };
                slots[slot] = index;
                filled += 1;
                claimed_this_round = true;

                if filled == m {
                    break;
                }
            }

            if !claimed_this_round {
                return Err(BuildError::Unfillable {
                    table_size: m,
                    filled,
                });
            }
        }

        debug!(
            backends = backends.len(),
            table_size = m,
            "built maglev table"
        );
        Ok(Table::from_parts(slots, backends))
    }
}

/// Convenience wrapper for [`TableBuilder::build`].
pub fn build(backends: Vec<Backend>, table_size: usize) -> Result<Table, BuildError> {
    TableBuilder::new(table_size).build(backends)
}

/// One backend's position along its permutation of the slot space.
#[derive(Debug, Clone, Copy)]
struct Walk {
    offset: u64,
    skip: u64,
    next: u64,
    table_size: u64,
}

impl Walk {
    fn new(id: &str, table_size: usize) -> Self {
        let m = table_size as u64;
        let offset = u64::from(fnv1a32(id.as_bytes())) % m;

        // skip lives in [1, m-1] so it is coprime with a prime m
        let skip = if m > 1 {
            let skip_key = format!("{id}{SKIP_SEPARATOR}");
            u64::from(fnv1a32(skip_key.as_bytes())) % (m - 1) + 1
        } else {
            1
        };

        Self {
            offset,
            skip,
            next: 0,
            table_size: m,
        }
    }

    /// The slot at position `j` of this permutation.
    fn slot_at(&self, j: u64) -> usize {
        ((self.offset + j * self.skip) % self.table_size) as usize
    }

    /// Advances to the next unclaimed slot, consuming it from the walk.
    ///
    /// Returns `None` once the walk has visited `table_size` positions.
    fn next_free(&mut self, slots: &[usize]) -> Option<usize> {
        while self.next < self.table_size {
            let slot = self.slot_at(self.next);
            self.next += 1;
            if slots[slot] == EMPTY {
                return Some(slot);
            }
        }
        None
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}
