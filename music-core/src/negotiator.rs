//! Spatial negotiation: deciding, for every pair of producer/consumer
//! ranks, exactly which global indices flow between them.
//!
//! A standalone, link-free computation so it can be unit tested without a
//! running job: given the producer's and consumer's `IndexInterval`s (one
//! set per rank), it produces one `IndexInterval` per (producer rank,
//! consumer rank) pair with nonempty overlap.

use crate::error::{MusicError, Result};
use crate::index::IndexInterval;
use crate::router::RoutingData;
use crate::Rank;

/// One rank's contribution to a spatial negotiation: the intervals it
/// owns, tagged with its rank so results can be grouped per remote.
#[derive(Debug, Clone)]
pub struct RankIntervals {
    pub rank: Rank,
    pub intervals: Vec<IndexInterval>,
}

/// The outcome for one (producer rank, consumer rank) pair: the indices
/// that must travel between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub producer_rank: Rank,
    pub consumer_rank: Rank,
    pub interval: IndexInterval,
}

impl Negotiated {
    /// Turns one negotiated range into event-router input, pointing at
    /// `target` (an output port's buffer slot, or an input port's handler
    /// slot — the caller assigns `target` meaning).
    pub fn to_routing_data(&self, target: usize) -> RoutingData {
        RoutingData::from_interval(self.interval, target)
    }
}

/// Intersects every producer rank's intervals against every consumer
/// rank's, in rank order (lowest producer rank first, then lowest
/// consumer rank), ties broken by `begin()`. Message ports using a
/// wildcard consumer skip negotiation entirely and should not call this.
pub fn negotiate(
    producers: &[RankIntervals],
    consumers: &[RankIntervals],
) -> Result<Vec<Negotiated>> {
    let mut out = Vec::new();
    for p in producers {
        for pi in &p.intervals {
            for c in consumers {
                for ci in &c.intervals {
                    if let Some(overlap) = pi.intersect(ci) {
                        out.push(Negotiated {
                            producer_rank: p.rank,
                            consumer_rank: c.rank,
                            interval: overlap,
                        });
                    }
                }
            }
        }
    }
    out.sort_by(|a, b| {
        (a.producer_rank, a.consumer_rank, a.interval.begin()).cmp(&(
            b.producer_rank,
            b.consumer_rank,
            b.interval.begin(),
        ))
    });
    check_no_overlap(&out)?;
    Ok(out)
}

/// Every index must be claimed by at most one (producer, consumer) pair
/// on the consumer side per global id range, or the job's index maps
/// disagree about ownership and the port can never deliver consistent
/// data (reported as a `SpatialNegotiation` error).
fn check_no_overlap(results: &[Negotiated]) -> Result<()> {
    let mut by_consumer: Vec<&Negotiated> = results.iter().collect();
    by_consumer.sort_by_key(|n| (n.consumer_rank, n.interval.begin()));
    for pair in by_consumer.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.consumer_rank == b.consumer_rank && a.interval.end() > b.interval.begin() {
            return Err(MusicError::SpatialNegotiation(format!(
                "consumer rank {} receives overlapping ranges [{}, {}) and [{}, {})",
                a.consumer_rank,
                a.interval.begin(),
                a.interval.end(),
                b.interval.begin(),
                b.interval.end()
            )));
        }
    }
    Ok(())
}
