//! Event routing: mapping an incoming global index to the local handler
//! (or local index) that should receive it.
//!
//! Two backends share the same `RoutingData` (an `offset`, added to the
//! raw id to get the local id): a table expands every `IndexInterval`
//! into one hash-table entry per global id, and a tree keeps intervals
//! sorted and binary-searches on lookup instead. Collective ports
//! mandate the table backend because an all-to-all event exchange needs
//! O(1) dispatch per event; tree is the default for point-to-point
//! ports, where the entries are few and an interval scan is cheap and
//! avoids the table's O(n) memory.

use serde::{Deserialize, Serialize};

use crate::index::IndexInterval;
use crate::{GlobalIndex, HashMap};

/// The wire record for one spike: a `(time, id)` pair. `bincode`'s
/// default fixed-int encoding lays this out as 8 bytes of `t` followed
/// by 4 bytes of `id`, so `EVENT_WIRE_SIZE` bytes per record with no
/// length framing needed between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub t: f64,
    pub id: i32,
}

/// Encoded size of one `Event` record under `bincode`'s default
/// (fixed-width, no varint) encoding: 8 bytes for `t` plus 4 for `id`.
pub const EVENT_WIRE_SIZE: usize = 12;

/// Routing metadata attached to one negotiated interval: the offset
/// subtracted from a raw global id to get the id used by the local side
/// (`local_id = global_id − offset`), plus a `target` identifying which
/// of the port's own buffers or handler slots this interval feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingData {
    pub interval: IndexInterval,
    pub offset: GlobalIndex,
    pub target: usize,
}

impl RoutingData {
    /// Builds routing data straight from a negotiated interval: `offset`
    /// is the interval's own `local()` translation.
    pub fn from_interval(interval: IndexInterval, target: usize) -> Self {
        Self {
            interval,
            offset: interval.local(),
            target,
        }
    }

    pub fn local_id(&self, global_id: GlobalIndex) -> GlobalIndex {
        global_id - self.offset
    }
}

/// Hash-table backend: every global id in every inserted interval gets
/// its own entry. Mandatory for collective ports, since those
/// negotiate many small, scattered ranges across every rank.
#[derive(Debug, Clone, Default)]
pub struct TableRouter {
    table: HashMap<GlobalIndex, RoutingData>,
}

impl TableRouter {
    pub fn new() -> Self {
        Self {
            table: HashMap::default(),
        }
    }

    pub fn insert(&mut self, data: RoutingData) {
        for id in data.interval.begin()..data.interval.end() {
            self.table.insert(id, data);
        }
    }

    pub fn route(&self, global_id: GlobalIndex) -> Option<&RoutingData> {
        self.table.get(&global_id)
    }
}

/// Interval-scan backend: keeps inserted intervals sorted by `begin()` and
/// binary-searches on lookup. Default for point-to-point ports, where the
/// table backend's per-id expansion would waste memory on what's usually
/// a handful of contiguous ranges.
#[derive(Debug, Clone, Default)]
pub struct TreeRouter {
    entries: Vec<RoutingData>,
    built: bool,
}

impl TreeRouter {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            built: false,
        }
    }

    pub fn insert(&mut self, data: RoutingData) {
        self.entries.push(data);
        self.built = false;
    }

    /// Sorts the entries so `route` can binary-search. Must be called
    /// once, after every `insert` and before the first `route`.
    pub fn build(&mut self) {
        self.entries.sort_by_key(|d| d.interval.begin());
        self.built = true;
    }

    pub fn route(&self, global_id: GlobalIndex) -> Option<&RoutingData> {
        debug_assert!(self.built, "TreeRouter::route called before build()");
        let idx = self
            .entries
            .partition_point(|d| d.interval.begin() <= global_id);
        if idx == 0 {
            return None;
        }
        let candidate = &self.entries[idx - 1];
        if candidate.interval.contains(global_id) {
            Some(candidate)
        } else {
            None
        }
    }
}

/// Either backend, selected once at port-mapping time: tree for
/// point-to-point, table for collective (or whenever the port's
/// `processing_method` is explicitly `Table`).
#[derive(Debug, Clone)]
pub enum EventRouter {
    Table(TableRouter),
    Tree(TreeRouter),
}

impl EventRouter {
    pub fn insert(&mut self, data: RoutingData) {
        match self {
            EventRouter::Table(t) => t.insert(data),
            EventRouter::Tree(t) => t.insert(data),
        }
    }

    /// No-op for the table backend (already fully built on insert);
    /// required before routing through a tree backend.
    pub fn build(&mut self) {
        if let EventRouter::Tree(t) = self {
            t.build();
        }
    }

    pub fn route(&self, global_id: GlobalIndex) -> Option<&RoutingData> {
        match self {
            EventRouter::Table(t) => t.route(global_id),
            EventRouter::Tree(t) => t.route(global_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(begin: GlobalIndex, end: GlobalIndex, offset: GlobalIndex) -> RoutingData {
        RoutingData {
            interval: IndexInterval::untranslated(begin, end),
            offset,
            target: 0,
        }
    }

    #[test]
    fn table_router_resolves_every_id_in_range() {
        let mut r = TableRouter::new();
        r.insert(data(10, 13, 10));
        assert_eq!(r.route(10).unwrap().local_id(10), 0);
        assert_eq!(r.route(12).unwrap().local_id(12), 2);
        assert!(r.route(13).is_none());
    }

    #[test]
    fn tree_router_binary_searches_sorted_intervals() {
        let mut r = TreeRouter::new();
        r.insert(data(100, 110, 0));
        r.insert(data(0, 10, -1000));
        r.build();
        assert_eq!(r.route(5).unwrap().local_id(5), 1005);
        assert_eq!(r.route(105).unwrap().local_id(105), 105);
        assert!(r.route(50).is_none());
    }

    #[test]
    fn event_router_table_variant_routes() {
        let mut r = EventRouter::Table(TableRouter::new());
        r.insert(data(0, 2, 0));
        r.build();
        assert!(r.route(0).is_some());
        assert!(r.route(2).is_none());
    }

    #[test]
    fn from_interval_derives_offset_from_local_translation() {
        let interval = IndexInterval::new(10, 20, 3);
        let data = RoutingData::from_interval(interval, 5);
        assert_eq!(data.offset, 3);
        assert_eq!(data.target, 5);
        assert_eq!(data.local_id(10), 7);
    }
}
