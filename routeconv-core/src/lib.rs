/*!
# Routing convergence

Core of the routing convergence harness: a virtual-time [`Scheduler`],
convergence trackers polling the routing tables of a simulated network, link
fault injection and flow statistics, tied together by an [`Experiment`]
driven through the phases of a [`PhasePlan`].

The simulated network itself is external: it is reached through the
[`RoutingTables`], [`InterfaceControl`] and [`FlowMonitor`] traits, grouped
in [`SimulatedNetwork`].

[`Scheduler`]: scheduler::Scheduler
*/

pub mod convergence;
pub mod defaults;
pub mod experiment;
pub mod flow;
pub mod link;
pub mod phase;
pub mod routing;
pub mod scheduler;
pub mod time;

pub use self::{
    convergence::{
        Convergence, ConvergenceMeasure, NetworkConvergenceTracker, NodeConvergenceTracker,
        TrackerConfig, TrackerId, TrackingMode, TrackingState,
    },
    experiment::{Experiment, ExperimentError, ExperimentReport, SimulatedNetwork},
    flow::{FlowFilter, FlowMonitor, FlowRecord, FlowStatsAggregator},
    link::{InterfaceControl, InterfaceIndex, LinkFaultInjector, LinkId, LinkMap},
    phase::{Phase, PhasePlan, PhaseScheduler},
    routing::{RouterId, RoutingStateSnapshot, RoutingTables},
    time::SimTime,
};
