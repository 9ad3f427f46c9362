//! Ports: the application-facing handles used to publish continuous,
//! event, or message data, and the state machine that guards how they may
//! be used across a run's configuration/runtime phases.
//!
//! A double `map()` call or a direction mismatch is a configuration or
//! contract violation, not a recoverable runtime failure, so those stay
//! genuine `panic!`/`assert!` calls rather than `Result`s.
//! `to_scheduler_max_buffered` converts a "ticks of data the consumer may
//! lag" count into the scheduler's internal "additional producer ticks
//! before blocking" offset.

use crate::buffer::{Bifo, Fibo};
use crate::collector::Collector;
use crate::distributor::Distributor;
use crate::error::Result;
use crate::index::IndexMap;
use crate::router::{Event, EventRouter, RoutingData, TableRouter, TreeRouter, EVENT_WIRE_SIZE};
use crate::GlobalIndex;

/// A port's lifecycle. Every port starts `Created`, becomes `Mapped` once
/// the application hands over its index map, then `Connected` or
/// `Unconnected` once the spatial negotiator has run (a port can be
/// legally left unconnected if nothing on the other program maps to it),
/// then `Running` for the duration of the tick loop, and finally
/// `Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Created,
    Mapped,
    Connected,
    Unconnected,
    Running,
    Finalized,
}

/// Sentinel meaning "no buffering limit specified". A port mapped with
/// this value imposes no scheduler-side bound on how far the producer
/// may run ahead of the consumer.
pub const MAX_BUFFERED_NO_VALUE: i64 = -1;

/// Shared state machine every port variant embeds.
#[derive(Debug, Clone)]
pub struct PortBase {
    name: String,
    state: PortState,
}

impl PortBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: PortState::Created,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    /// Converts a `max_buffered` ticks-of-data count into the scheduler's
    /// additional-producer-ticks offset. `MAX_BUFFERED_NO_VALUE` passes
    /// through unchanged.
    pub fn to_scheduler_max_buffered(max_buffered: i64) -> i64 {
        if max_buffered != MAX_BUFFERED_NO_VALUE {
            max_buffered - 1
        } else {
            max_buffered
        }
    }

    /// Must be called exactly once, transitioning `Created -> Mapped`.
    pub fn map(&mut self) {
        assert_eq!(
            self.state,
            PortState::Created,
            "port '{}' has already been mapped",
            self.name
        );
        self.state = PortState::Mapped;
    }

    /// Records the outcome of spatial negotiation: `Mapped -> Connected`
    /// or `Mapped -> Unconnected`.
    pub fn set_connected(&mut self, connected: bool) {
        assert_eq!(
            self.state,
            PortState::Mapped,
            "port '{}' must be mapped before negotiation",
            self.name
        );
        self.state = if connected {
            PortState::Connected
        } else {
            PortState::Unconnected
        };
    }

    /// `Connected`/`Unconnected -> Running`, called once before the first
    /// tick.
    pub fn start_running(&mut self) {
        assert!(
            matches!(self.state, PortState::Connected | PortState::Unconnected),
            "port '{}' must be connected or unconnected before running",
            self.name
        );
        self.state = PortState::Running;
    }

    pub fn finalize(&mut self) {
        self.state = PortState::Finalized;
    }

    pub fn assert_mapped_or_later(&self) {
        assert_ne!(
            self.state,
            PortState::Created,
            "port '{}' used before being mapped",
            self.name
        );
    }
}

/// A continuous output port: samples application memory once per tick
/// and scatters it to every remote rank via a `Distributor`.
pub struct ContOutputPort {
    base: PortBase,
    distributor: Distributor,
}

impl ContOutputPort {
    pub fn new(name: impl Into<String>, element_size: usize) -> Self {
        Self {
            base: PortBase::new(name),
            distributor: Distributor::new(element_size),
        }
    }

    pub fn map<M: IndexMap>(&mut self, _index_map: &M, _max_buffered: i64) {
        self.base.map();
    }

    pub fn distributor_mut(&mut self) -> &mut Distributor {
        &mut self.distributor
    }

    pub fn tick(&mut self, buffers: &mut [Bifo], base: GlobalIndex, data: &[u8]) -> Result<()> {
        self.base.assert_mapped_or_later();
        self.distributor.distribute(buffers, base, data)
    }
}

/// A continuous input port: gathers this tick's data from every remote
/// rank via a `Collector` into application memory.
pub struct ContInputPort {
    base: PortBase,
    collector: Collector,
}

impl ContInputPort {
    pub fn new(name: impl Into<String>, element_size: usize) -> Self {
        Self {
            base: PortBase::new(name),
            collector: Collector::new(element_size),
        }
    }

    pub fn map<M: IndexMap>(&mut self, _index_map: &M, _max_buffered: i64) {
        self.base.map();
    }

    pub fn collector_mut(&mut self) -> &mut Collector {
        &mut self.collector
    }

    pub fn tick(&mut self, buffers: &mut [Bifo], base: GlobalIndex, out: &mut [u8]) -> Result<()> {
        self.base.assert_mapped_or_later();
        self.collector.collect(buffers, base, out)
    }
}

/// An event output port: forwards `(time, id)` spikes through an
/// `EventRouter` chosen at map time — table for collective ports
/// (mandatory there), tree otherwise — into one grow-on-demand `Fibo`
/// per remote subconnector: events are bursty producer-side staging, so
/// they use FIBOs like message ports, not the fixed-block BIFOs
/// continuous ports use.
pub struct EventOutputPort {
    base: PortBase,
    router: EventRouter,
    buffers: Vec<Fibo>,
}

impl EventOutputPort {
    /// `n_buffers` is the number of distinct remote subconnectors this
    /// port's routing table may target (one `Fibo` per negotiated
    /// destination).
    pub fn new(name: impl Into<String>, is_collective: bool, n_buffers: usize) -> Self {
        Self {
            base: PortBase::new(name),
            router: if is_collective {
                EventRouter::Table(TableRouter::new())
            } else {
                EventRouter::Tree(TreeRouter::new())
            },
            buffers: (0..n_buffers).map(|_| Fibo::new(EVENT_WIRE_SIZE * 8)).collect(),
        }
    }

    pub fn add_routing(&mut self, data: RoutingData) {
        self.router.insert(data);
    }

    /// Must be called once negotiation has finished and before the first
    /// `insert_event`.
    pub fn build_table(&mut self) {
        self.base.map();
        self.router.build();
    }

    pub fn buffers(&self) -> &[Fibo] {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut [Fibo] {
        &mut self.buffers
    }

    /// Routes `(time, id)`, translates `id` into the receiver's local
    /// space, and appends the encoded record into the buffer the
    /// negotiated interval containing `id` points at. A no-op if `id`
    /// isn't covered by any negotiated interval. Returns whether a
    /// destination was found.
    pub fn insert_event(&mut self, time: f64, id: GlobalIndex) -> bool {
        self.base.assert_mapped_or_later();
        let Some(data) = self.router.route(id).copied() else {
            return false;
        };
        let event = Event {
            t: time,
            id: data.local_id(id) as i32,
        };
        let bytes = bincode::serialize(&event).expect("Event encoding cannot fail");
        self.buffers[data.target].insert(&bytes);
        true
    }
}

/// An event input port: the consumer side, decoding incoming `(time, id)`
/// records and routing the raw id to the local id a handler expects.
pub struct EventInputPort {
    base: PortBase,
    router: EventRouter,
}

impl EventInputPort {
    pub fn new(name: impl Into<String>, is_collective: bool) -> Self {
        Self {
            base: PortBase::new(name),
            router: if is_collective {
                EventRouter::Table(TableRouter::new())
            } else {
                EventRouter::Tree(TreeRouter::new())
            },
        }
    }

    pub fn add_routing(&mut self, data: RoutingData) {
        self.router.insert(data);
    }

    pub fn build_table(&mut self) {
        self.base.map();
        self.router.build();
    }

    pub fn handle_event(&self, id: GlobalIndex) -> Option<GlobalIndex> {
        self.router.route(id).map(|d| d.local_id(id))
    }

    /// Decodes every record batched into `fibo` this tick and routes each
    /// one, dropping records whose id isn't covered by this port's
    /// negotiated ranges.
    pub fn dispatch(&self, fibo: &Fibo) -> Vec<(f64, GlobalIndex)> {
        self.base.assert_mapped_or_later();
        fibo.pending()
            .chunks_exact(EVENT_WIRE_SIZE)
            .filter_map(|chunk| {
                let event: Event =
                    bincode::deserialize(chunk).expect("Event decoding cannot fail");
                self.handle_event(event.id as GlobalIndex)
                    .map(|local_id| (event.t, local_id))
            })
            .collect()
    }
}

/// One outgoing message record: the tick it was produced at, plus the
/// application's payload bytes.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub time: f64,
    pub payload: Vec<u8>,
}

/// A message output port: batches variable-length records into a `Fibo`
/// per remote rank over the course of one tick.
pub struct MessageOutputPort {
    base: PortBase,
}

impl MessageOutputPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: PortBase::new(name),
        }
    }

    pub fn map(&mut self) {
        self.base.map();
    }

    /// Serializes one record as `[time: f64][len: u32][payload]` into
    /// `fibo`.
    pub fn insert_message(&self, fibo: &mut crate::buffer::Fibo, time: f64, payload: &[u8]) {
        self.base.assert_mapped_or_later();
        let mut header = Vec::with_capacity(12 + payload.len());
        header.extend_from_slice(&time.to_le_bytes());
        header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        header.extend_from_slice(payload);
        fibo.insert(&header);
    }
}

/// A message input port. A wildcard index map means every sender's
/// messages are delivered here regardless of id.
pub struct MessageInputPort {
    base: PortBase,
    wildcard: bool,
}

impl MessageInputPort {
    pub fn new(name: impl Into<String>, wildcard: bool) -> Self {
        Self {
            base: PortBase::new(name),
            wildcard,
        }
    }

    pub fn map(&mut self) {
        self.base.map();
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Unpacks every record batched into `fibo` this tick.
    pub fn unpack_messages(&self, fibo: &crate::buffer::Fibo) -> Vec<MessageRecord> {
        self.base.assert_mapped_or_later();
        let bytes = fibo.pending();
        let mut records = Vec::new();
        let mut offset = 0;
        while offset + 12 <= bytes.len() {
            let time = f64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
            let len = u32::from_le_bytes(bytes[offset + 8..offset + 12].try_into().unwrap()) as usize;
            offset += 12;
            let payload = bytes[offset..offset + len].to_vec();
            offset += len;
            records.push(MessageRecord { time, payload });
        }
        records
    }
}
