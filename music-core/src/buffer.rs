//! The two buffer shapes used to stage data between a port and its
//! subconnectors.
//!
//! `Fibo` grows on demand and is reset wholesale once per tick: message
//! ports append variable-length records all tick long, then hand the
//! whole block to the subconnector. `Bifo` is block-structured and wraps
//! around a fixed capacity: continuous and event ports write one
//! fixed-size block per tick and the far side reads it back one block
//! later, so the buffer needs to hold two blocks at once without ever
//! reallocating mid-run.

use crate::error::{MusicError, Result};

/// Grow-on-demand append buffer. One instance backs each connector leg of
/// a message port; `insert` is called any number of times per tick,
/// `take_block` exactly once.
///
/// Reading the pending bytes (`pending()`) is kept separate from
/// resetting the insertion cursor (`reset()`), so a caller can inspect
/// what accumulated before deciding whether the tick produced anything
/// worth sending.
#[derive(Debug, Clone)]
pub struct Fibo {
    buffer: Vec<u8>,
    insertion: usize,
}

impl Fibo {
    /// `initial_capacity` is a sizing hint, not a hard limit: the buffer
    /// doubles whenever an insertion doesn't fit.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; initial_capacity.max(1)],
            insertion: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.insertion == 0
    }

    /// Appends `data`, growing the backing storage if needed, and returns
    /// the offset it was written at.
    pub fn insert(&mut self, data: &[u8]) -> usize {
        let needed = self.insertion + data.len();
        if needed > self.buffer.len() {
            let mut new_len = self.buffer.len().max(1);
            while new_len < needed {
                new_len *= 2;
            }
            self.buffer.resize(new_len, 0);
        }
        let offset = self.insertion;
        self.buffer[offset..offset + data.len()].copy_from_slice(data);
        self.insertion += data.len();
        offset
    }

    /// The bytes inserted since the last `reset`, without consuming them.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[..self.insertion]
    }

    /// Drops the pending bytes, readying the buffer for the next tick's
    /// insertions.
    pub fn reset(&mut self) {
        self.insertion = 0;
    }
}

/// One of the four cursors a `Bifo` tracks into its ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Beginning,
    End,
    Top,
    Current,
}

/// Block-structured wrap-around buffer: fixed `element_size`, a capacity
/// sized to hold at least two blocks of up to `max_block_size` elements,
/// and four cursors (`beginning`, `end`, `top`, `current`) into a flat
/// byte ring, all measured in elements.
///
/// `insert_block` is called once per producer tick to reserve space for
/// the next outgoing block; `trim_block` is called once the producer
/// knows how many elements it actually wrote; `next` is called by the
/// consumer once per tick to read the oldest un-consumed block.
#[derive(Debug, Clone)]
pub struct Bifo {
    buffer: Vec<u8>,
    element_size: usize,
    max_block_size: usize,
    /// Capacity in elements; always >= 2 * max_block_size.
    capacity: usize,
    beginning: usize,
    end: usize,
    top: usize,
    current: usize,
}

impl Bifo {
    pub fn new(element_size: usize, max_block_size: usize) -> Self {
        assert!(element_size > 0, "Bifo: element_size must be positive");
        assert!(max_block_size > 0, "Bifo: max_block_size must be positive");
        let capacity = max_block_size * 2;
        Self {
            buffer: vec![0u8; capacity * element_size],
            element_size,
            max_block_size,
            capacity,
            beginning: 0,
            end: 0,
            top: 0,
            current: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current == self.end
    }

    fn byte_range(&self, start: usize, len_elems: usize) -> std::ops::Range<usize> {
        let s = start * self.element_size;
        s..s + len_elems * self.element_size
    }

    /// Reserves space for the next block and returns a mutable view into
    /// it, sized `max_block_size` elements (the caller trims it down with
    /// `trim_block` once it knows the real length). Grows the ring when
    /// `beginning + max_block_size` would overrun `capacity`.
    pub fn insert_block(&mut self) -> &mut [u8] {
        if self.current >= self.max_block_size {
            self.beginning = 0;
        } else {
            self.beginning = self.top;
            if self.beginning + self.max_block_size > self.capacity {
                self.grow(self.capacity * 2);
            }
        }
        let range = self.byte_range(self.beginning, self.max_block_size);
        &mut self.buffer[range]
    }

    /// Records that the block reserved by the last `insert_block` actually
    /// holds `size` elements. Errors if the trimmed end would overrun the
    /// buffer's actual `capacity`.
    pub fn trim_block(&mut self, size: usize) -> Result<()> {
        if size > self.max_block_size {
            return Err(MusicError::BufferOverflow(format!(
                "block of {} elements exceeds max_block_size {}",
                size, self.max_block_size
            )));
        }
        self.end = self.beginning + size;
        if self.end > self.capacity {
            return Err(MusicError::BufferOverflow(format!(
                "trimmed end {} exceeds buffer capacity {}",
                self.end, self.capacity
            )));
        }
        if self.beginning == self.top {
            self.top = self.end;
        }
        Ok(())
    }

    /// Reads the next un-consumed block. Wraps `current` back to 0 once it
    /// catches up to `top`.
    pub fn next(&mut self) -> Result<&[u8]> {
        if self.is_empty() {
            return Err(MusicError::Underrun(
                "Bifo::next called with nothing buffered".into(),
            ));
        }
        if self.current == self.top {
            self.current = 0;
        }
        let range = self.byte_range(self.current, self.element_size_elems_for_next());
        self.current += self.element_size_elems_for_next();
        Ok(&self.buffer[range])
    }

    /// `next()` reads exactly one element at a time; callers needing a
    /// whole block loop it themselves.
    fn element_size_elems_for_next(&self) -> usize {
        1
    }

    fn grow(&mut self, new_capacity: usize) {
        self.buffer.resize(new_capacity * self.element_size, 0);
        self.capacity = new_capacity;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The bytes of the most recently trimmed block (`[beginning, end)`),
    /// for a subconnector to hand to its `Link` without walking `next()`
    /// element by element.
    pub fn block(&self) -> &[u8] {
        let range = self.byte_range(self.beginning, self.end - self.beginning);
        &self.buffer[range]
    }

    /// Writes `data` as the next block: reserves space, copies it in, and
    /// trims to `data.len() / element_size` elements. The inverse of
    /// `block()`, used by an input subconnector after `Link::recv_bytes`.
    pub fn fill_block(&mut self, data: &[u8]) -> Result<()> {
        assert_eq!(
            data.len() % self.element_size,
            0,
            "Bifo::fill_block: data length not a multiple of element_size"
        );
        let elems = data.len() / self.element_size;
        {
            let dest = self.insert_block();
            dest[..data.len()].copy_from_slice(data);
        }
        self.trim_block(elems)
    }

    pub fn cursor(&self, which: Cursor) -> usize {
        match which {
            Cursor::Beginning => self.beginning,
            Cursor::End => self.end,
            Cursor::Top => self.top,
            Cursor::Current => self.current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fibo_grows_when_insertions_exceed_capacity() {
        let mut f = Fibo::new(4);
        f.insert(&[1, 2, 3, 4]);
        f.insert(&[5, 6, 7, 8]);
        assert_eq!(f.pending(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn fibo_reset_clears_pending_without_touching_storage() {
        let mut f = Fibo::new(8);
        f.insert(&[9, 9]);
        assert!(!f.is_empty());
        f.reset();
        assert!(f.is_empty());
        assert_eq!(f.pending(), &[] as &[u8]);
    }

    #[test]
    fn bifo_round_trips_a_block() {
        let mut b = Bifo::new(1, 4);
        {
            let block = b.insert_block();
            block[..3].copy_from_slice(&[1, 2, 3]);
        }
        b.trim_block(3).unwrap();
        assert!(!b.is_empty());
        for expected in [1u8, 2, 3] {
            assert_eq!(b.next().unwrap(), &[expected]);
        }
        assert!(b.is_empty());
    }

    #[test]
    fn bifo_trim_block_rejects_oversized_block() {
        let mut b = Bifo::new(1, 4);
        b.insert_block();
        assert!(b.trim_block(5).is_err());
    }

    #[test]
    fn bifo_wraps_around_after_consuming_first_block() {
        let mut b = Bifo::new(1, 4);
        {
            let block = b.insert_block();
            block[..2].copy_from_slice(&[10, 20]);
        }
        b.trim_block(2).unwrap();
        let _ = b.next().unwrap();
        let _ = b.next().unwrap();
        assert!(b.is_empty());

        // second block should start a new cycle (current >= max_block_size)
        {
            let block = b.insert_block();
            block[..2].copy_from_slice(&[30, 40]);
        }
        b.trim_block(2).unwrap();
        assert_eq!(b.next().unwrap(), &[30]);
        assert_eq!(b.next().unwrap(), &[40]);
    }

    #[test]
    fn next_on_empty_buffer_is_underrun() {
        let mut b = Bifo::new(1, 4);
        assert!(matches!(b.next(), Err(MusicError::Underrun(_))));
    }
}
