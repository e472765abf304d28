//! The execution context of a convergence experiment.
//!
//! An [`Experiment`] owns everything the scheduled callbacks act upon: the
//! simulated network, the link map, the convergence trackers of every phase
//! and the flow samples taken so far. The [`Scheduler`] lends it mutably to
//! one callback at a time.

use crate::{
    convergence::{
        Convergence, ConvergenceError, ConvergenceHost, NetworkConvergenceTracker, TrackerConfig,
        TrackerId,
    },
    flow::{FlowFilter, FlowMetrics, FlowMonitor, FlowRecord, FlowReport, FlowStatsAggregator},
    link::{InterfaceControl, LinkError, LinkFaultInjector, LinkId, LinkMap},
    phase::{FaultKind, Phase},
    routing::{RouterId, RoutingError, RoutingTables},
    scheduler::{ScheduleError, Scheduler},
    time::SimTime,
};
use thiserror::Error;

/// The simulated network the experiment runs against.
///
/// Implementations compute the routing, carry the traffic and own the
/// interfaces; the experiment only observes and perturbs them.
pub trait SimulatedNetwork: RoutingTables + InterfaceControl + FlowMonitor + 'static {
    /// Called with the current virtual instant before every query or fault
    /// injection.
    fn sync_clock(&mut self, _now: SimTime) {}
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("An experiment needs at least one router to monitor")]
    NoRouters,
    #[error("Tracker ({tracker}) Not Found")]
    UnknownTracker { tracker: TrackerId },
    #[error("{0}")]
    Routing(#[from] RoutingError),
    #[error("{0}")]
    Link(#[from] LinkError),
    #[error("{0}")]
    Convergence(#[from] ConvergenceError),
    #[error("{0}")]
    Schedule(#[from] ScheduleError),
}

/// The flows as sampled at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSnapshot {
    pub at: SimTime,
    pub report: FlowReport,
    /// every flow on its own, only when enabled with
    /// [`Experiment::with_per_flow`]
    pub per_flow: Vec<(FlowRecord, FlowMetrics)>,
}

/// Convergence measured over one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub tracker: TrackerId,
    pub start: Option<SimTime>,
    pub end: Option<SimTime>,
    pub convergence: Convergence,
    pub changes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentReport {
    pub phases: Vec<PhaseReport>,
    pub flows: Vec<FlowSnapshot>,
}

pub struct Experiment<N> {
    network: N,
    links: LinkMap,
    routers: Vec<RouterId>,

    trackers: Vec<(Phase, NetworkConvergenceTracker)>,

    aggregator: FlowStatsAggregator,
    flow_filter: Option<FlowFilter>,
    per_flow: bool,
    flows: Vec<FlowSnapshot>,
}

impl<N> Experiment<N>
where
    N: SimulatedNetwork,
{
    /// Set up an experiment monitoring `routers` of `network`.
    ///
    /// # Errors
    ///
    /// Fails if `routers` is empty or if the routing table of any of them
    /// cannot be rendered: both are configuration errors and are reported
    /// before anything runs.
    pub fn new<I>(
        mut network: N,
        links: LinkMap,
        routers: I,
        aggregator: FlowStatsAggregator,
    ) -> Result<Self, ExperimentError>
    where
        I: IntoIterator<Item = RouterId>,
    {
        let mut routers: Vec<_> = routers.into_iter().collect();
        routers.sort();
        routers.dedup();

        if routers.is_empty() {
            return Err(ExperimentError::NoRouters);
        }

        network.sync_clock(SimTime::ZERO);
        for &router in &routers {
            network.routing_table(router)?;
        }

        log::debug!(
            "experiment over {} routers and {} links",
            routers.len(),
            links.len()
        );

        Ok(Self {
            network,
            links,
            routers,
            trackers: Vec::new(),
            aggregator,
            flow_filter: None,
            per_flow: false,
            flows: Vec::new(),
        })
    }

    /// Restrict the flow samples to one source and destination pair.
    pub fn with_flow_filter(mut self, filter: Option<FlowFilter>) -> Self {
        self.flow_filter = filter;
        self
    }

    /// Also list every flow on its own at each flow sample.
    pub fn with_per_flow(mut self, per_flow: bool) -> Self {
        self.per_flow = per_flow;
        self
    }

    #[inline]
    pub fn network(&self) -> &N {
        &self.network
    }

    #[inline]
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    #[inline]
    pub fn links(&self) -> &LinkMap {
        &self.links
    }

    #[inline]
    pub fn routers(&self) -> &[RouterId] {
        &self.routers
    }

    pub fn tracker(&self, id: TrackerId) -> Option<(Phase, &NetworkConvergenceTracker)> {
        self.trackers
            .get(id.index())
            .map(|(phase, tracker)| (*phase, tracker))
    }

    pub fn flow_snapshots(&self) -> &[FlowSnapshot] {
        &self.flows
    }

    /// Register a new idle tracker observing `phase` over all the monitored
    /// routers.
    pub fn add_tracker(
        &mut self,
        phase: Phase,
        config: TrackerConfig,
    ) -> Result<TrackerId, ExperimentError> {
        let tracker = NetworkConvergenceTracker::new(self.routers.iter().copied(), config)?;
        let id = TrackerId::new(self.trackers.len());
        self.trackers.push((phase, tracker));
        Ok(id)
    }

    pub fn start_tracker(
        &mut self,
        id: TrackerId,
        scheduler: &mut Scheduler<Self>,
    ) -> Result<(), ExperimentError> {
        let now = scheduler.now();
        self.network.sync_clock(now);

        let (phase, tracker) = self
            .trackers
            .get_mut(id.index())
            .ok_or(ExperimentError::UnknownTracker { tracker: id })?;
        tracker.start(id, &self.network, scheduler)?;

        log::info!("[{now}] convergence tracking {phase} started");
        Ok(())
    }

    pub fn stop_tracker(
        &mut self,
        id: TrackerId,
        scheduler: &mut Scheduler<Self>,
    ) -> Result<(), ExperimentError> {
        let (phase, tracker) = self
            .trackers
            .get_mut(id.index())
            .ok_or(ExperimentError::UnknownTracker { tracker: id })?;

        if !tracker.is_active() {
            return Ok(());
        }
        tracker.stop(scheduler);

        log::info!(
            "[{}] convergence {phase}: {}",
            scheduler.now(),
            tracker.convergence()
        );
        Ok(())
    }

    /// Tear down or restore `link`.
    pub fn inject(&mut self, link: LinkId, kind: FaultKind, now: SimTime) -> Result<(), LinkError> {
        self.network.sync_clock(now);

        let injector = LinkFaultInjector::new(&self.links);
        match kind {
            FaultKind::TearDown => injector.tear_down(&mut self.network, link),
            FaultKind::Restore => injector.restore(&mut self.network, link),
        }
    }

    /// Sample the flow monitor and keep the result for the report.
    pub fn sample_flows(&mut self, now: SimTime) -> &FlowSnapshot {
        self.network.sync_clock(now);

        let report = self.aggregator.sample(&mut self.network, self.flow_filter);
        let per_flow = if self.per_flow {
            self.aggregator.per_flow(&mut self.network)
        } else {
            Vec::new()
        };

        log::info!(
            "[{now}] {} flows: loss {:.4}, throughput {:.4} Mbps, delay {:.6}s",
            report.sample.flows,
            report.metrics.packet_loss_ratio,
            report.metrics.throughput_mbps,
            report.metrics.mean_delay
        );

        let index = self.flows.len();
        self.flows.push(FlowSnapshot {
            at: now,
            report,
            per_flow,
        });
        &self.flows[index]
    }

    pub fn report(&self) -> ExperimentReport {
        let phases = self
            .trackers
            .iter()
            .enumerate()
            .map(|(index, (phase, tracker))| PhaseReport {
                phase: *phase,
                tracker: TrackerId::new(index),
                start: tracker.phase_start(),
                end: tracker.phase_end(),
                convergence: tracker.convergence(),
                changes: tracker.changes(),
            })
            .collect();

        ExperimentReport {
            phases,
            flows: self.flows.clone(),
        }
    }
}

impl<N> ConvergenceHost for Experiment<N>
where
    N: SimulatedNetwork,
{
    fn poll_router(
        &mut self,
        tracker: TrackerId,
        router: RouterId,
        now: SimTime,
    ) -> anyhow::Result<()> {
        self.network.sync_clock(now);

        let (_, network_tracker) = self
            .trackers
            .get_mut(tracker.index())
            .ok_or(ExperimentError::UnknownTracker { tracker })?;
        network_tracker.poll(router, now, &self.network)?;

        Ok(())
    }
}
