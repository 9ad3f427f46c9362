//! The tick loop: the one thing every coupled program calls in its main
//! loop once setup is done.
//!
//! `tick()` walks the pre-computed schedule, dispatches everything due
//! this tick to the `UnicommAgent`/`MulticommAgent` the scheduler built,
//! and ticks the local clock; `finalize()` releases the communicator.
//! Everything interesting already happened in `Scheduler`.

use crate::clock::Clock;
use crate::connector::Connector;
use crate::error::Result;
use crate::log;
use crate::scheduler::{MulticommAgent, ScheduleEntry, UnicommAgent};
use crate::HashSet;

/// Drives one program's local clock forward, firing every connector the
/// scheduler decided is due each tick through its bound agent.
pub struct Runtime {
    local_time: Clock,
    schedule: Vec<ScheduleEntry>,
    unicomm_agents: Vec<UnicommAgent>,
    multicomm_agents: Vec<MulticommAgent>,
    finalized: bool,
}

impl Runtime {
    pub fn new(
        local_time: Clock,
        schedule: Vec<ScheduleEntry>,
        unicomm_agents: Vec<UnicommAgent>,
        multicomm_agents: Vec<MulticommAgent>,
    ) -> Self {
        Self {
            local_time,
            schedule,
            unicomm_agents,
            multicomm_agents,
            finalized: false,
        }
    }

    pub fn time(&self) -> f64 {
        self.local_time.time()
    }

    pub fn local_time(&self) -> Clock {
        self.local_time
    }

    /// Fires every agent due at the current tick, then advances the
    /// clock. `connectors` is indexed the way `Scheduler::initialize`
    /// bound it — `UnicommAgent::connector_index` and the fused
    /// `MultiConnector`s inside each `MulticommAgent` both point into it
    /// directly, not by `SConnection` id.
    pub fn tick(&mut self, connectors: &mut [Connector]) -> Result<()> {
        let now = self.local_time.integer_time();
        let due: HashSet<usize> = self
            .schedule
            .iter()
            .filter(|entry| entry.time == now)
            .map(|entry| entry.sconnection)
            .collect();

        for agent in &self.unicomm_agents {
            if due.contains(&agent.sconnection) {
                if let Some(connector) = connectors.get_mut(agent.connector_index) {
                    connector.tick()?;
                }
            }
        }
        for agent in &mut self.multicomm_agents {
            agent.tick(now, &due, connectors)?;
        }

        log!("runtime ticked to {}", now);
        self.local_time.tick();
        Ok(())
    }

    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}
