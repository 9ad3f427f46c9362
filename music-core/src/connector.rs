//! A port's view of one remote program: a set of subconnectors, one per
//! local/remote rank pair, that together move one port's worth of data
//! each scheduled communication.
//!
//! One `Connector` struct carries a `PortKind`/`CommunicationType` tag
//! instead of a type per direction × kind combination.
//!
//! A `Connector`'s `id_flag` is the bitmask the scheduler's
//! multi-connector lumping ORs together when it fuses several
//! connectors that fire at the same scheduled time with the same
//! `(is_proxy, remote_leader, is_input)` shape into one `MultiConnector`.

use crate::error::Result;
use crate::subconnector::Subconnector;
use crate::{PortCode, Rank};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationType {
    PointToPoint,
    Collective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMethod {
    Tree,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Continuous,
    Event(ProcessingMethod),
    Message,
}

/// One port's connector to a remote program: owns every subconnector that
/// moves this port's data to or from that program's ranks.
pub struct Connector {
    port_code: PortCode,
    kind: PortKind,
    communication_type: CommunicationType,
    is_input: bool,
    remote_leader: Rank,
    /// OR-ed together across fused connectors by multi-connector lumping;
    /// zero means "not yet assigned to a scheduling slot".
    id_flag: u64,
    subconnectors: Vec<Subconnector>,
}

impl Connector {
    pub fn new(
        port_code: PortCode,
        kind: PortKind,
        communication_type: CommunicationType,
        is_input: bool,
        remote_leader: Rank,
    ) -> Self {
        Self {
            port_code,
            kind,
            communication_type,
            is_input,
            remote_leader,
            id_flag: 0,
            subconnectors: Vec::new(),
        }
    }

    pub fn port_code(&self) -> PortCode {
        self.port_code
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn communication_type(&self) -> CommunicationType {
        self.communication_type
    }

    pub fn is_input(&self) -> bool {
        self.is_input
    }

    pub fn remote_leader(&self) -> Rank {
        self.remote_leader
    }

    pub fn id_flag(&self) -> u64 {
        self.id_flag
    }

    pub fn set_id_flag(&mut self, id_flag: u64) {
        self.id_flag = id_flag;
    }

    pub fn push_subconnector(&mut self, sub: Subconnector) {
        self.subconnectors.push(sub);
    }

    pub fn subconnectors(&self) -> &[Subconnector] {
        &self.subconnectors
    }

    pub fn subconnectors_mut(&mut self) -> &mut [Subconnector] {
        &mut self.subconnectors
    }

    /// Whether this connector's remote side needs a rank not reachable
    /// directly in the local intracommunicator, i.e. whether it requires
    /// a `ProxyConnector` to stand in during multi-connector lumping.
    pub fn needs_multi_communication(&self) -> bool {
        self.communication_type == CommunicationType::Collective
    }

    /// Ticks every subconnector this connector owns, in the order they
    /// were added.
    pub fn tick(&mut self) -> Result<()> {
        for sub in &mut self.subconnectors {
            sub.tick()?;
        }
        Ok(())
    }

    /// The fusion criterion multi-connector lumping uses: two connectors
    /// scheduled at the same time may be merged into one `MultiConnector`
    /// iff they agree on proxy status, remote leader, and direction.
    pub fn fusion_key(&self, is_proxy: bool) -> (bool, Rank, bool) {
        (is_proxy, self.remote_leader, self.is_input)
    }
}

/// Stands in for an all-proxy multi-connector group: a rank that
/// participates in a collective communication only to keep the group's
/// process count consistent, without itself owning data to send or
/// receive. Carries just enough bookkeeping for the scheduler's fusion
/// scan to group it with its peers.
#[derive(Debug, Clone, Copy)]
pub struct ProxyConnector {
    pub remote_leader: Rank,
    pub is_input: bool,
    pub id_flag: u64,
}

impl ProxyConnector {
    pub fn fusion_key(&self) -> (bool, Rank, bool) {
        (true, self.remote_leader, self.is_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_key_matches_for_same_shaped_connectors() {
        let a = Connector::new(1, PortKind::Continuous, CommunicationType::Collective, true, 0);
        let b = Connector::new(2, PortKind::Message, CommunicationType::Collective, true, 0);
        assert_eq!(a.fusion_key(false), b.fusion_key(false));
    }

    #[test]
    fn fusion_key_differs_on_direction() {
        let a = Connector::new(1, PortKind::Continuous, CommunicationType::Collective, true, 0);
        let b = Connector::new(2, PortKind::Continuous, CommunicationType::Collective, false, 0);
        assert_ne!(a.fusion_key(false), b.fusion_key(false));
    }
}
