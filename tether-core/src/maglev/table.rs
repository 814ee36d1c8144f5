//! Immutable Maglev lookup table and its read path.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::domain::{join_ids, Backend};
use crate::hash::slot_for;

/// Immutable consistent-hash lookup table.
///
/// Every slot holds an index into `backends`. Tables are never mutated after
/// construction, so any holder of a reference may read it without
/// synchronization, even after a router has evicted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    slots: Vec<usize>,
    backends: Vec<Backend>,
}

impl Table {
    pub(crate) fn from_parts(slots: Vec<usize>, backends: Vec<Backend>) -> Self {
        debug_assert!(slots.iter().all(|&i| i < backends.len()));
        Self { slots, backends }
    }

    /// Number of slots in the table.
    pub fn table_size(&self) -> usize {
        self.slots.len()
    }

    /// The backends in the order they were supplied to the builder.
    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// The backend owning `slot`, if the slot exists.
    pub fn owner_of(&self, slot: usize) -> Option<&Backend> {
        self.slots.get(slot).map(|&i| &self.backends[i])
    }

    fn start_slot(&self, key: &str) -> usize {
        slot_for(key, self.slots.len())
    }

    /// Returns the backend for a given key.
    pub fn lookup(&self, key: &str) -> &Backend {
        &self.backends[self.slots[self.start_slot(key)]]
    }

    /// Returns up to `n` distinct backends for `key`.
    ///
    /// Scans forward from the key's slot, wrapping around, and visits each
    /// slot at most once.
    pub fn lookup_n(&self, key: &str, n: usize) -> Vec<&Backend> {
        if n == 0 {
            return Vec::new();
        }

        let m = self.slots.len();
        let start = self.start_slot(key);
        let mut seen = HashSet::new();
        let mut result = Vec::with_capacity(n.min(self.backends.len()));

        for i in 0..m {
            if result.len() >= n {
                break;
            }
            let index = self.slots[(start + i) % m];
            if seen.insert(index) {
                result.push(&self.backends[index]);
            }
        }

        result
    }

    /// Returns up to `count` backends with pairwise-distinct failure domains.
    ///
    /// At most `max_jumps` slots are probed, so the cost is bounded
    /// regardless of table size. A short result means fewer isolated
    /// replicas were reachable, not a failure.
    pub fn lookup_n_with_domain_isolation(
        &self,
        key: &str,
        count: usize,
        max_jumps: usize,
    ) -> Vec<&Backend> {
        let m = self.slots.len();
        if count == 0 || max_jumps == 0 || m == 0 {
            return Vec::new();
        }

        let start = self.start_slot(key);
        let mut seen_backends = HashSet::new();
        let mut seen_domains = HashSet::new();
        let mut result = Vec::with_capacity(count.min(self.backends.len()));

        // probes past one full lap only revisit slots
        for i in 0..max_jumps.min(m) {
            if result.len() >= count {
                break;
            }
            let index = self.slots[(start + i) % m];
            if seen_backends.contains(&index) {
                continue;
            }

            let backend = &self.backends[index];
            if !seen_domains.insert(backend.failure_domain.as_str()) {
                continue;
            }
            seen_backends.insert(index);
            result.push(backend);
        }

        result
    }

    /// Comma-joined backend identifiers in slot order.
    ///
    /// Intended for logs and side-by-side comparison; not a stable format.
    pub fn dump_slots(&self) -> String {
        join_ids(self.slots.iter().map(|&i| &self.backends[i]))
    }

    /// Counts slots whose owning backend differs between two tables.
    ///
    /// Tables of different sizes share no slot layout, so every slot of the
    /// larger one is counted as changed.
    pub fn slot_diff(&self, other: &Table) -> usize {
        if self.table_size() != other.table_size() {
            return self.table_size().max(other.table_size());
        }
        self.slots
            .iter()
            .zip(&other.slots)
            .filter(|&(&a, &b)| self.backends[a].id != other.backends[b].id)
            .count()
    }

    /// Number of slots owned by each backend identifier.
    ///
    /// Backends that won no slot are reported with a count of zero.
    pub fn slot_shares(&self) -> BTreeMap<&str, usize> {
        let mut shares: BTreeMap<&str, usize> =
            self.backends.iter().map(|b| (b.id.as_str(), 0)).collect();
        for &i in &self.slots {
            *shares.entry(self.backends[i].id.as_str()).or_default() += 1;
        }
        shares
    }
}

impl fmt::Display for Table {
    /// Lists member identifiers in builder order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_ids(&self.backends))
    }
}
