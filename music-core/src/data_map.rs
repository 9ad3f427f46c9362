//! The application-side memory a port samples from or writes into.
//!
//! A `DataMap` pairs an `IndexMap` (which global indices live here) with
//! `element_size` (how many bytes each one occupies). The application
//! hands over an explicit `&[u8]`/`&mut [u8]` at the point a collector
//! or distributor actually needs to read or write, which keeps the core
//! free of unsafe code and any assumption about the buffer's lifetime
//! relative to the port.

use crate::index::{IndexInterval, IndexMap};

/// Describes one contiguous application-memory region and the index
/// range it backs. `element_size` is in bytes; `local_base` is the index
/// (in the index map's own space) that byte offset 0 corresponds to.
#[derive(Debug, Clone, Copy)]
pub struct DataMap<'a, M: IndexMap> {
    index_map: &'a M,
    element_size: usize,
}

impl<'a, M: IndexMap> DataMap<'a, M> {
    pub fn new(index_map: &'a M, element_size: usize) -> Self {
        assert!(element_size > 0, "DataMap: element_size must be positive");
        Self {
            index_map,
            element_size,
        }
    }

    pub fn index_map(&self) -> &M {
        self.index_map
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Byte range within a buffer sized to `index_map`'s full span that
    /// corresponds to `interval`, given the buffer's base index.
    pub fn byte_range(&self, base: crate::GlobalIndex, interval: &IndexInterval) -> std::ops::Range<usize> {
        let start = (interval.begin() - base) as usize * self.element_size;
        let end = (interval.end() - base) as usize * self.element_size;
        start..end
    }
}
