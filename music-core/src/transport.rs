//! The messaging substrate a subconnector sends and receives blocks over.
//!
//! This system runs one process per rank, each driving its ticks with
//! blocking message passing rather than an event loop — the opposite of
//! the async runtime the rest of this crate's stylistic ancestor favors
//! elsewhere. `Link` is the seam: a synchronous, length-delimited
//! byte-block channel. `FramedStreamLink<S>` wraps any blocking
//! `Read + Write` stream using the same length-prefix-then-bincode framing
//! as `run::rw::Rw<S>`, just driven synchronously instead of through a
//! `Framed`/`tokio_util` codec. `InMemoryLink` backs same-process,
//! multi-rank integration tests without needing a real
//! socket or an MPI intercommunicator.

use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, Sender};

use bytes::Bytes;

use crate::error::{MusicError, Result};

/// One point-to-point byte-block channel between two ranks. A
/// subconnector owns exactly one of these per remote rank it talks to.
/// `recv_bytes` returns a `Bytes` rather than a fresh `Vec<u8>`, matching
/// how `run::rw::Rw<S>` hands frames back as `Bytes` rather than copying
/// into an owned buffer for every message.
pub trait Link {
    fn send_bytes(&mut self, data: &[u8]) -> Result<()>;
    fn recv_bytes(&mut self) -> Result<Bytes>;
}

/// An in-process `Link` over `std::sync::mpsc`, for driving multiple
/// simulated ranks within one test binary.
pub struct InMemoryLink {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
}

impl InMemoryLink {
    /// Builds a connected pair: `a`'s sends arrive at `b`'s receives and
    /// vice versa.
    pub fn pair() -> (InMemoryLink, InMemoryLink) {
        let (tx_a, rx_b) = std::sync::mpsc::channel();
        let (tx_b, rx_a) = std::sync::mpsc::channel();
        (
            InMemoryLink { tx: tx_a, rx: rx_a },
            InMemoryLink { tx: tx_b, rx: rx_b },
        )
    }
}

impl Link for InMemoryLink {
    fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(data))
            .map_err(|e| MusicError::Messaging(e.to_string()))
    }

    fn recv_bytes(&mut self) -> Result<Bytes> {
        self.rx
            .recv()
            .map_err(|e| MusicError::Messaging(e.to_string()))
    }
}

/// A `Link` over any blocking byte stream (a `TcpStream`, a pipe, an
/// MPI-intercommunicator shim), framed the same way `run::rw::Rw<S>`
/// frames its bincode payloads: a 4-byte big-endian length prefix
/// followed by that many raw bytes. No bincode encoding is imposed here —
/// callers already hand `Link` raw element bytes sized by `element_size`,
/// so the frame payload *is* the message.
pub struct FramedStreamLink<S> {
    stream: S,
}

impl<S: Read + Write> FramedStreamLink<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Link for FramedStreamLink<S> {
    fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        let len = data.len() as u32;
        self.stream
            .write_all(&len.to_be_bytes())
            .and_then(|_| self.stream.write_all(data))
            .and_then(|_| self.stream.flush())
            .map_err(|e: io::Error| MusicError::Messaging(e.to_string()))
    }

    fn recv_bytes(&mut self) -> Result<Bytes> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .map_err(|e| MusicError::Messaging(e.to_string()))?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut data = vec![0u8; len];
        self.stream
            .read_exact(&mut data)
            .map_err(|e| MusicError::Messaging(e.to_string()))?;
        Ok(Bytes::from(data))
    }
}
