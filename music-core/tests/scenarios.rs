//! End-to-end scenarios mirroring representative coupled-simulation
//! setups: a continuous port moving data between two simulated ranks
//! over an in-process link, a 2x3 rank spatial negotiation, a
//! latency-bearing two-node schedule, a three-program chain, and a
//! wildcard message port fed by several senders.

use music_core::buffer::{Bifo, Fibo};
use music_core::clock::Clock;
use music_core::connector::{CommunicationType, Connector, PortKind};
use music_core::index::{IndexInterval, IndexMap, IndexType, LinearIndex, PermutationIndex};
use music_core::negotiator::{negotiate, RankIntervals};
use music_core::port::{EventInputPort, EventOutputPort, MessageInputPort, MessageOutputPort, PortBase};
use music_core::router::RoutingData;
use music_core::scheduler::Scheduler;
use music_core::subconnector::{BlockSubconnector, MessageSubconnector, Subconnector};
use music_core::transport::InMemoryLink;

#[test]
fn continuous_port_moves_one_tick_of_data_over_in_memory_link() {
    let (link_out, link_in) = InMemoryLink::pair();

    let mut output = Connector::new(1, PortKind::Continuous, CommunicationType::PointToPoint, false, 0);
    output.push_subconnector(Subconnector::ContinuousOutput(BlockSubconnector::new(
        Bifo::new(8, 4),
        Box::new(link_out),
    )));

    let mut input = Connector::new(1, PortKind::Continuous, CommunicationType::PointToPoint, true, 0);
    input.push_subconnector(Subconnector::ContinuousInput(BlockSubconnector::new(
        Bifo::new(8, 4),
        Box::new(link_in),
    )));

    // application writes a 3-element f64 sample into the output buffer
    let sample: [f64; 3] = [1.0, 2.0, 3.0];
    let sample_bytes: Vec<u8> = sample.iter().flat_map(|v| v.to_le_bytes()).collect();
    if let Subconnector::ContinuousOutput(sub) = &mut output.subconnectors_mut()[0] {
        let block = sub.buffer_mut().insert_block();
        block[..sample_bytes.len()].copy_from_slice(&sample_bytes);
        sub.buffer_mut().trim_block(3).unwrap();
    }

    output.tick().unwrap();
    input.tick().unwrap();

    if let Subconnector::ContinuousInput(sub) = &mut input.subconnectors_mut()[0] {
        let mut received = Vec::new();
        for _ in 0..3 {
            received.extend_from_slice(sub.buffer_mut().next().unwrap());
        }
        let values: Vec<f64> = received
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    } else {
        panic!("expected ContinuousInput");
    }
}

#[test]
fn spatial_negotiation_two_producer_three_consumer_ranks() {
    let producers = vec![
        RankIntervals {
            rank: 0,
            intervals: vec![IndexInterval::untranslated(0, 10)],
        },
        RankIntervals {
            rank: 1,
            intervals: vec![IndexInterval::untranslated(10, 20)],
        },
    ];
    let consumers = vec![
        RankIntervals {
            rank: 0,
            intervals: vec![IndexInterval::untranslated(0, 7)],
        },
        RankIntervals {
            rank: 1,
            intervals: vec![IndexInterval::untranslated(7, 14)],
        },
        RankIntervals {
            rank: 2,
            intervals: vec![IndexInterval::untranslated(14, 20)],
        },
    ];

    let result = negotiate(&producers, &consumers).unwrap();

    // every global index from 0..20 must be claimed by exactly one
    // negotiated range
    let mut covered = vec![false; 20];
    for n in &result {
        for id in n.interval.begin()..n.interval.end() {
            assert!(!covered[id as usize], "index {} claimed twice", id);
            covered[id as usize] = true;
        }
    }
    assert!(covered.iter().all(|&c| c));
}

#[test]
fn permutation_index_feeding_negotiator_collapses_before_intersecting() {
    let consumer_indices = PermutationIndex::new(vec![0, 1, 2, 5, 6], IndexType::Local);
    assert_eq!(consumer_indices.intervals().len(), 2);
}

#[test]
fn three_program_chain_schedule_is_time_ordered() {
    // A -> B -> C, all ticking at the same rate: the local node's
    // schedule (here, B, which both sends and receives) should come out
    // non-decreasing in time.
    let mut scheduler = Scheduler::new(1);
    let a = scheduler.add_node(Clock::new(1000, 100));
    let b = scheduler.add_node(Clock::new(1000, 100));
    let c = scheduler.add_node(Clock::new(1000, 100));
    scheduler.add_sconnection(a, b, 1, 0, 0, false);
    scheduler.add_sconnection(b, c, 2, 0, 0, false);
    scheduler.initialize(&mut []);
    scheduler.build_schedule(&[]);

    let times: Vec<_> = scheduler.schedule().iter().map(|e| e.time).collect();
    assert!(!times.is_empty());
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn event_port_two_program_latency_scenario_delivers_in_order() {
    // A (1 proc, tick 1 ms) -> B (1 proc, tick 2 ms), one event port with
    // latency = 2 ms: the schedule's receive ticks for B must land on 2ms
    // and 4ms, and a spike producer inserting (0.0, 0), (1.5, 0) must
    // arrive at B in the same order with the ids it was sent with.
    let mut scheduler = Scheduler::new(1);
    let a = scheduler.add_node(Clock::new(1, 1));
    let b = scheduler.add_node(Clock::new(1, 2));
    scheduler.add_sconnection(a, b, 0, 2, 0, false);
    scheduler.initialize(&mut []);
    scheduler.build_schedule(&[]);

    let receive_times: Vec<_> = scheduler.schedule().iter().map(|e| e.time).take(2).collect();
    assert_eq!(receive_times, vec![2, 4]);

    let (link_out, link_in) = InMemoryLink::pair();

    let mut out = EventOutputPort::new("spike_out", false, 1);
    out.add_routing(RoutingData::from_interval(IndexInterval::new(0, 1, 0), 0));
    out.build_table();
    assert!(out.insert_event(0.0, 0));
    assert!(out.insert_event(1.5, 0));

    let mut out_sub = Subconnector::EventOutput(MessageSubconnector::new(
        out.buffers()[0].clone(),
        Box::new(link_out),
    ));
    let mut in_sub = Subconnector::EventInput(MessageSubconnector::new(
        music_core::buffer::Fibo::new(64),
        Box::new(link_in),
    ));
    out_sub.tick().unwrap();
    in_sub.tick().unwrap();

    let mut input = EventInputPort::new("spike_in", false);
    input.add_routing(RoutingData::from_interval(IndexInterval::new(0, 1, 0), 0));
    input.build_table();

    let dispatched = if let Subconnector::EventInput(sub) = &in_sub {
        input.dispatch(sub.buffer())
    } else {
        unreachable!()
    };
    assert_eq!(dispatched, vec![(0.0, 0), (1.5, 0)]);
}

#[test]
fn linear_index_matches_scenario_layout() {
    // A rank owning 10 contiguous elements starting at global index 40.
    let idx = LinearIndex::new(40, 10, IndexType::Global);
    assert_eq!(idx.intervals()[0].begin(), 40);
    assert_eq!(idx.intervals()[0].end(), 50);
}

#[test]
fn continuous_port_every_third_producer_tick_reaches_a_slower_consumer() {
    // Producer ticks at 1ms, consumer at 3ms, delay = 0, user-facing
    // max_buffered = 3 (scheduler offset = 2 after the -1 conversion). The
    // consumer's receive ticks must land on multiples of 3, and the data
    // that arrives at tick k*3 is whatever the producer last sent at or
    // before that point — the producer is never more than max_buffered+1
    // ticks ahead of what's been communicated.
    let mut scheduler = Scheduler::new(1);
    let producer = scheduler.add_node(Clock::new(3, 1));
    let consumer = scheduler.add_node(Clock::new(3, 3));
    let scheduler_max_buffered = PortBase::to_scheduler_max_buffered(3) as u64;
    scheduler.add_sconnection(producer, consumer, 7, 0, scheduler_max_buffered, false);
    scheduler.initialize(&mut []);
    scheduler.build_schedule(&[]);

    let receive_times: Vec<_> = scheduler.schedule().iter().map(|e| e.time).collect();
    assert!(!receive_times.is_empty());
    for &t in &receive_times {
        assert_eq!(t % 3, 0, "consumer can only receive on its own tick boundary");
    }
}

#[test]
fn three_program_chain_downstream_schedule_is_also_time_ordered() {
    // A -> B -> C, all ticking at the same rate, latency = 1 tick per hop.
    // Building the plan from the last node in the chain must produce a
    // non-empty, time-ordered schedule the same way it does from the
    // middle node (see `three_program_chain_schedule_is_time_ordered`),
    // and every entry must be a `B -> C` communication since that's the
    // only link touching C.
    let mut scheduler = Scheduler::new(2);
    let a = scheduler.add_node(Clock::new(1, 1));
    let b = scheduler.add_node(Clock::new(1, 1));
    let c = scheduler.add_node(Clock::new(1, 1));
    scheduler.add_sconnection(a, b, 1, 1, 0, false);
    let bc_link = scheduler.add_sconnection(b, c, 2, 1, 0, false);
    scheduler.initialize(&mut []);
    scheduler.build_schedule(&[]);

    assert!(!scheduler.schedule().is_empty());
    assert!(scheduler
        .schedule()
        .iter()
        .all(|e| e.sconnection == bc_link));
    let times: Vec<_> = scheduler.schedule().iter().map(|e| e.time).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn wildcard_message_port_delivers_every_senders_message_exactly_once() {
    // Four senders, one wildcard receiver: each sender's batch arrives in
    // its own Fibo (one per subconnector); the port unpacks each
    // independently and every message must show up exactly once, with no
    // cross-sender mixing.
    let mut input = MessageInputPort::new("wildcard_in", true);
    input.map();
    assert!(input.is_wildcard());

    let mut output = MessageOutputPort::new("wildcard_out");
    output.map();

    let mut senders_fibos = Vec::new();
    for sender_id in 0..4u8 {
        let mut fibo = Fibo::new(16);
        output.insert_message(&mut fibo, sender_id as f64, &[sender_id, sender_id]);
        senders_fibos.push(fibo);
    }

    let mut all_payloads = Vec::new();
    for fibo in &senders_fibos {
        let records = input.unpack_messages(fibo);
        assert_eq!(records.len(), 1, "each sender batches exactly one message this tick");
        all_payloads.push(records[0].payload.clone());
    }

    let mut expected: Vec<Vec<u8>> = (0..4u8).map(|id| vec![id, id]).collect();
    all_payloads.sort();
    expected.sort();
    assert_eq!(all_payloads, expected);
}
