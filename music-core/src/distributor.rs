//! The mirror of `collector`: scatters one tick's worth of application
//! data out to every subconnector of an output port. Structurally the
//! collector's twin: same sorted `IndexInterval -> length` map, opposite
//! data direction.

use crate::buffer::Bifo;
use crate::error::Result;
use crate::index::IndexInterval;

#[derive(Debug, Clone, Copy)]
struct Entry {
    interval: IndexInterval,
    buffer_index: usize,
    length: usize,
}

/// Scatters per-tick blocks from one local buffer out to a set of output
/// `Bifo`s (one per remote rank/subconnector), in the order negotiation
/// established.
#[derive(Debug, Clone, Default)]
pub struct Distributor {
    entries: Vec<Entry>,
    element_size: usize,
}

impl Distributor {
    pub fn new(element_size: usize) -> Self {
        assert!(
            element_size > 0,
            "Distributor: element_size must be positive"
        );
        Self {
            entries: Vec::new(),
            element_size,
        }
    }

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

    /// Writes one tick's block into each registered buffer from `data`,
    /// offset by `base` (the first global index `data` represents).
    pub fn distribute(
        &self,
        buffers: &mut [Bifo],
        base: crate::GlobalIndex,
        data: &[u8],
    ) -> Result<()> {
        for entry in &self.entries {
            let start = (entry.interval.begin() - base) as usize * self.element_size;
            let buf = &mut buffers[entry.buffer_index];
            let block = buf.insert_block();
            let n = entry.length * self.element_size;
            block[..n].copy_from_slice(&data[start..start + n]);
            buf.trim_block(entry.length)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribute_writes_into_registered_buffer() {
        let mut distributor = Distributor::new(1);
        distributor.add_routing_interval(IndexInterval::untranslated(0, 2), 0, 2);

        let mut buffers = vec![Bifo::new(1, 4)];
        let data = vec![7u8, 8];
        distributor.distribute(&mut buffers, 0, &data).unwrap();

        assert_eq!(buffers[0].next().unwrap(), &[7]);
        assert_eq!(buffers[0].next().unwrap(), &[8]);
    }
}
