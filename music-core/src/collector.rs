//! Gathers one tick's worth of continuous or event data from every
//! subconnector feeding an input port into the application's buffer.
//!
//! A collector is a sorted map from `IndexInterval` to the buffer that
//! supplies it, plus the number of elements to read from that buffer
//! per tick (which can differ from the interval's own width once index
//! maps are compiled down against the negotiated ranges).

use crate::buffer::Bifo;
use crate::error::{MusicError, Result};
use crate::index::IndexInterval;

/// One routed range: where in the local buffer it lands, which remote
/// subconnector's `Bifo` supplies it, and how many elements to pull from
/// that buffer each tick.
#[derive(Debug, Clone, Copy)]
struct Entry {
    interval: IndexInterval,
    buffer_index: usize,
    length: usize,
}

/// Collects per-tick blocks from a set of input `Bifo`s (one per remote
/// rank/subconnector) into one local buffer, in the order negotiation
/// established.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    entries: Vec<Entry>,
    element_size: usize,
}

impl Collector {
    pub fn new(element_size: usize) -> Self {
        assert!(element_size > 0, "Collector: element_size must be positive");
        Self {
            entries: Vec::new(),
            element_size,
        }
    }

    /// Registers that elements in `interval` (`length` of them) arrive via
    /// `buffers[buffer_index]`. Must be called once per negotiated range,
    /// in any order; entries are sorted by `begin()` here.
    pub fn add_routing_interval(
        &mut self,
        interval: IndexInterval,
        buffer_index: usize,
        length: usize,
    ) {
        self.entries.push(Entry {
            interval,
            buffer_index,
            length,
        });
        self.entries.sort_by_key(|e| e.interval.begin());
    }

    /// Reads one tick's block from each registered buffer and writes it
    /// into `out`, offset by `base` (the first global index `out`
    /// represents). Errors with `Underrun` if any buffer has nothing
    /// queued, since a producer that skipped a tick it owed data for is a
    /// fatal desynchronization.
    pub fn collect(
        &self,
        buffers: &mut [Bifo],
        base: crate::GlobalIndex,
        out: &mut [u8],
    ) -> Result<()> {
        for entry in &self.entries {
            let buf = buffers.get_mut(entry.buffer_index).ok_or_else(|| {
                MusicError::Underrun(format!(
                    "collector has no buffer at index {}",
                    entry.buffer_index
                ))
            })?;
            let start = (entry.interval.begin() - base) as usize * self.element_size;
            for i in 0..entry.length {
                let block = buf.next()?;
                let offset = start + i * self.element_size;
                out[offset..offset + self.element_size].copy_from_slice(block);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_pulls_from_registered_buffer_in_order() {
        let mut collector = Collector::new(1);
        collector.add_routing_interval(IndexInterval::untranslated(0, 2), 0, 2);

        let mut buf = Bifo::new(1, 4);
        {
            let block = buf.insert_block();
            block[..2].copy_from_slice(&[42, 43]);
        }
        buf.trim_block(2).unwrap();

        let mut buffers = vec![buf];
        let mut out = vec![0u8; 2];
        collector.collect(&mut buffers, 0, &mut out).unwrap();
        assert_eq!(out, vec![42, 43]);
    }

    #[test]
    fn collect_underruns_on_empty_buffer() {
        let mut collector = Collector::new(1);
        collector.add_routing_interval(IndexInterval::untranslated(0, 1), 0, 1);
        let mut buffers = vec![Bifo::new(1, 4)];
        let mut out = vec![0u8; 1];
        assert!(matches!(
            collector.collect(&mut buffers, 0, &mut out),
            Err(MusicError::Underrun(_))
        ));
    }
}
