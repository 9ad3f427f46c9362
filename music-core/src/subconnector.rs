//! One link's worth of a connector: the piece that actually owns a
//! `Link` and moves bytes across it once per scheduled communication.
//!
//! Direction and payload shape collapse into one tagged enum rather than
//! a type per combination: continuous / event / message, each further
//! split by output vs. input. Each subconnector still owns exactly one
//! `Link`, so fusing two connectors at the scheduler level
//! (multi-connector lumping) fuses their `Subconnector`s too.

use crate::buffer::{Bifo, Fibo};
use crate::error::Result;
use crate::transport::Link;

/// A continuous subconnector, backed by a block-structured `Bifo`: exactly
/// one block moves per scheduled communication.
pub struct BlockSubconnector {
    buffer: Bifo,
    link: Box<dyn Link + Send>,
}

impl BlockSubconnector {
    pub fn new(buffer: Bifo, link: Box<dyn Link + Send>) -> Self {
        Self { buffer, link }
    }

    pub fn buffer(&self) -> &Bifo {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Bifo {
        &mut self.buffer
    }

    /// Sends the most recently trimmed block over the link.
    pub fn send(&mut self) -> Result<()> {
        let bytes = self.buffer.block().to_vec();
        self.link.send_bytes(&bytes)
    }

    /// Receives one block and stages it in the buffer for the consumer to
    /// `next()` out.
    pub fn receive(&mut self) -> Result<()> {
        let bytes = self.link.recv_bytes()?;
        self.buffer.fill_block(&bytes)
    }
}

/// A message subconnector, backed by a grow-on-demand `Fibo`: any number
/// of variable-length records accumulate over the tick and move as one
/// batch.
pub struct MessageSubconnector {
    buffer: Fibo,
    link: Box<dyn Link + Send>,
}

impl MessageSubconnector {
    pub fn new(buffer: Fibo, link: Box<dyn Link + Send>) -> Self {
        Self { buffer, link }
    }

    pub fn buffer(&self) -> &Fibo {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Fibo {
        &mut self.buffer
    }

    /// Sends everything accumulated since the last `send`/`reset`, then
    /// resets the buffer for the next tick's insertions.
    pub fn send(&mut self) -> Result<()> {
        self.link.send_bytes(self.buffer.pending())?;
        self.buffer.reset();
        Ok(())
    }

    /// Receives this tick's batch of messages and stages it for the port
    /// to unpack record by record.
    pub fn receive(&mut self) -> Result<()> {
        let bytes = self.link.recv_bytes()?;
        self.buffer.reset();
        self.buffer.insert(&bytes);
        Ok(())
    }
}

/// Direction and payload shape of one subconnector. A `Connector` (see
/// `connector`) owns one of these per remote rank it talks to. Continuous
/// ports move fixed-size blocks through a `Bifo`; event and
/// message ports both move a variable number of records accumulated over
/// one tick through a `Fibo`, so they share `MessageSubconnector`'s shape
/// even though the record format differs (`(time, id)` vs. length-prefixed
/// bytes) — both are bursty producer-side staging.
pub enum Subconnector {
    ContinuousOutput(BlockSubconnector),
    ContinuousInput(BlockSubconnector),
    EventOutput(MessageSubconnector),
    EventInput(MessageSubconnector),
    MessageOutput(MessageSubconnector),
    MessageInput(MessageSubconnector),
}

impl Subconnector {
    /// Performs this subconnector's half of one scheduled communication:
    /// send if it's an output leg, receive if it's an input leg.
    pub fn tick(&mut self) -> Result<()> {
        match self {
            Subconnector::ContinuousOutput(s) => s.send(),
            Subconnector::ContinuousInput(s) => s.receive(),
            Subconnector::EventOutput(s) => s.send(),
            Subconnector::EventInput(s) => s.receive(),
            Subconnector::MessageOutput(s) => s.send(),
            Subconnector::MessageInput(s) => s.receive(),
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(
            self,
            Subconnector::ContinuousOutput(_)
                | Subconnector::EventOutput(_)
                | Subconnector::MessageOutput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryLink;

    #[test]
    fn block_subconnector_round_trips_over_in_memory_link() {
        let (link_out, link_in) = InMemoryLink::pair();

        let mut out_buf = Bifo::new(1, 4);
        {
            let block = out_buf.insert_block();
            block[..2].copy_from_slice(&[11, 22]);
        }
        out_buf.trim_block(2).unwrap();

        let mut out_sub = Subconnector::ContinuousOutput(BlockSubconnector::new(
            out_buf,
            Box::new(link_out),
        ));
        let mut in_sub = Subconnector::ContinuousInput(BlockSubconnector::new(
            Bifo::new(1, 4),
            Box::new(link_in),
        ));

        out_sub.tick().unwrap();
        in_sub.tick().unwrap();

        if let Subconnector::ContinuousInput(s) = &mut in_sub {
            assert_eq!(s.buffer_mut().next().unwrap(), &[11]);
            assert_eq!(s.buffer_mut().next().unwrap(), &[22]);
        } else {
            panic!("expected ContinuousInput");
        }
    }

    #[test]
    fn message_subconnector_round_trips_a_batch() {
        let (link_out, link_in) = InMemoryLink::pair();

        let mut out_buf = Fibo::new(8);
        out_buf.insert(&[1, 2, 3]);
        out_buf.insert(&[4, 5]);

        let mut out_sub =
            Subconnector::MessageOutput(MessageSubconnector::new(out_buf, Box::new(link_out)));
        let mut in_sub =
            Subconnector::MessageInput(MessageSubconnector::new(Fibo::new(8), Box::new(link_in)));

        out_sub.tick().unwrap();
        in_sub.tick().unwrap();

        if let Subconnector::MessageInput(s) = &in_sub {
            assert_eq!(s.buffer().pending(), &[1, 2, 3, 4, 5]);
        } else {
            panic!("expected MessageInput");
        }
    }

    #[test]
    fn event_subconnector_round_trips_encoded_records() {
        use crate::router::{Event, EVENT_WIRE_SIZE};

        let (link_out, link_in) = InMemoryLink::pair();

        let mut out_buf = Fibo::new(EVENT_WIRE_SIZE * 2);
        for event in [Event { t: 0.0, id: 7 }, Event { t: 1.5, id: 7 }] {
            out_buf.insert(&bincode::serialize(&event).unwrap());
        }

        let mut out_sub =
            Subconnector::EventOutput(MessageSubconnector::new(out_buf, Box::new(link_out)));
        let mut in_sub = Subconnector::EventInput(MessageSubconnector::new(
            Fibo::new(EVENT_WIRE_SIZE * 2),
            Box::new(link_in),
        ));

        out_sub.tick().unwrap();
        in_sub.tick().unwrap();

        if let Subconnector::EventInput(s) = &in_sub {
            let decoded: Vec<Event> = s
                .buffer()
                .pending()
                .chunks_exact(EVENT_WIRE_SIZE)
                .map(|c| bincode::deserialize(c).unwrap())
                .collect();
            assert_eq!(decoded, vec![Event { t: 0.0, id: 7 }, Event { t: 1.5, id: 7 }]);
        } else {
            panic!("expected EventInput");
        }
    }
}
