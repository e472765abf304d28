//! Segmentation of an experiment in observation phases around link faults.
//!
//! A [`PhasePlan`] lists what happens when: the observation windows of the
//! convergence trackers, the link faults and the instants the flows are
//! sampled. The [`PhaseScheduler`] turns a plan into scheduled callbacks on
//! an [`Experiment`] and runs it.

use crate::{
    convergence::{ConvergenceMeasure, TrackerConfig, TrackingMode},
    experiment::{Experiment, ExperimentError, SimulatedNetwork},
    link::LinkId,
    scheduler::{ScheduleError, Scheduler, TimerId},
    time::SimTime,
};
use std::{fmt, time::Duration};
use thiserror::Error;

/// The observation phases of a fault cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    BeforeFault,
    DuringFault,
    AfterFault,
}

impl Phase {
    pub const ALL: [Self; 3] = [Self::BeforeFault, Self::DuringFault, Self::AfterFault];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeFault => f.write_str("before the link failure"),
            Self::DuringFault => f.write_str("during the link failure"),
            Self::AfterFault => f.write_str("after the link recovery"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    TearDown,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaultEvent {
    pub at: SimTime,
    pub link: LinkId,
    pub kind: FaultKind,
}

/// The window over which one convergence tracker observes the network.
///
/// With [`TrackingMode::StartOnCreate`] the tracker starts when the plan is
/// installed, whatever `start` says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseWindow {
    pub phase: Phase,
    pub start: SimTime,
    pub stop: SimTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePlan {
    pub windows: Vec<PhaseWindow>,
    pub faults: Vec<FaultEvent>,
    pub flow_samples: Vec<SimTime>,
    pub horizon: SimTime,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhaseError {
    #[error("Phase `{phase}' stops at {stop}, before it starts at {start}")]
    InvalidWindow {
        phase: Phase,
        start: SimTime,
        stop: SimTime,
    },
    #[error("The link goes down at {down} but is restored at {up}, before it failed")]
    RecoveryBeforeFailure { down: SimTime, up: SimTime },
    #[error("{what} at {at} is after the end of the simulation ({horizon})")]
    BeyondHorizon {
        what: &'static str,
        at: SimTime,
        horizon: SimTime,
    },
    #[error("The routing tables cannot be polled with a zero interval")]
    ZeroPollInterval,
}

impl PhasePlan {
    /// An empty plan: nothing happens until `horizon`.
    pub fn new(horizon: SimTime, tracker: TrackerConfig) -> Self {
        Self {
            windows: Vec::new(),
            faults: Vec::new(),
            flow_samples: Vec::new(),
            horizon,
            tracker,
        }
    }

    /// The three phases layout.
    ///
    /// `links` go down at `down` and come back at `up`. One tracker
    /// observes each of `[0, down]`, `[down, up]` and `[up, horizon]`, and
    /// the flows are sampled at `down`, `up` and `horizon`.
    ///
    /// The trackers always wait for their window to start: the tracker mode
    /// of `tracker` is overridden.
    pub fn fault_cycle(
        links: &[LinkId],
        down: SimTime,
        up: SimTime,
        horizon: SimTime,
        tracker: TrackerConfig,
    ) -> Result<Self, PhaseError> {
        let tracker = TrackerConfig {
            mode: TrackingMode::ExplicitStart,
            ..tracker
        };

        let plan = Self::new(horizon, tracker)
            .with_faults(links, down, up)?
            .with_window(Phase::BeforeFault, SimTime::ZERO, down)
            .with_window(Phase::DuringFault, down, up)
            .with_window(Phase::AfterFault, up, horizon)
            .with_flow_sample(down)
            .with_flow_sample(up)
            .with_flow_sample(horizon);

        plan.validate()?;
        Ok(plan)
    }

    /// A single tracker, tracking from the start of the simulation and
    /// stopped when the `links` go down, reporting the absolute instant the
    /// network stabilized. The flows are sampled at the horizon.
    ///
    /// The tracker mode and measure of `tracker` are overridden.
    pub fn stop_at_fault(
        links: &[LinkId],
        down: SimTime,
        up: SimTime,
        horizon: SimTime,
        tracker: TrackerConfig,
    ) -> Result<Self, PhaseError> {
        let tracker = TrackerConfig {
            mode: TrackingMode::StartOnCreate,
            measure: ConvergenceMeasure::StabilizedAt,
            ..tracker
        };

        let plan = Self::new(horizon, tracker)
            .with_faults(links, down, up)?
            .with_window(Phase::BeforeFault, SimTime::ZERO, down)
            .with_flow_sample(horizon);

        plan.validate()?;
        Ok(plan)
    }

    fn with_faults(
        mut self,
        links: &[LinkId],
        down: SimTime,
        up: SimTime,
    ) -> Result<Self, PhaseError> {
        if up < down {
            return Err(PhaseError::RecoveryBeforeFailure { down, up });
        }

        for &link in links {
            self = self.with_fault(down, link, FaultKind::TearDown);
        }
        for &link in links {
            self = self.with_fault(up, link, FaultKind::Restore);
        }
        Ok(self)
    }

    pub fn with_window(mut self, phase: Phase, start: SimTime, stop: SimTime) -> Self {
        self.windows.push(PhaseWindow { phase, start, stop });
        self
    }

    pub fn with_fault(mut self, at: SimTime, link: LinkId, kind: FaultKind) -> Self {
        self.faults.push(FaultEvent { at, link, kind });
        self
    }

    pub fn with_flow_sample(mut self, at: SimTime) -> Self {
        self.flow_samples.push(at);
        self
    }

    /// Check that the trackers can poll, that every window is well formed
    /// and that everything happens within the horizon.
    pub fn validate(&self) -> Result<(), PhaseError> {
        if self.tracker.poll_interval.is_zero() {
            return Err(PhaseError::ZeroPollInterval);
        }

        let horizon = self.horizon;
        let within = |what: &'static str, at: SimTime| {
            if at > horizon {
                Err(PhaseError::BeyondHorizon { what, at, horizon })
            } else {
                Ok(())
            }
        };

        for window in &self.windows {
            if window.stop < window.start {
                return Err(PhaseError::InvalidWindow {
                    phase: window.phase,
                    start: window.start,
                    stop: window.stop,
                });
            }
            within("The end of a phase", window.stop)?;
        }
        for fault in &self.faults {
            within("A link fault", fault.at)?;
        }
        for &at in &self.flow_samples {
            within("A flow sample", at)?;
        }

        Ok(())
    }
}

/// Drives an [`Experiment`] through the phases of a [`PhasePlan`].
///
/// Everything scheduled for the same instant executes in scheduling order.
/// [`install`] schedules, in that order: the link faults, the flow samples
/// and then for each window its start and stop. At a phase boundary the
/// fault is therefore injected first, the flows are sampled, the previous
/// phase stops and the next one starts with the post-fault routing tables
/// as its baseline: the fault instant is never counted as a change.
///
/// [`install`]: PhaseScheduler::install
pub struct PhaseScheduler<N> {
    scheduler: Scheduler<Experiment<N>>,
    plan: PhasePlan,
}

impl<N> PhaseScheduler<N>
where
    N: SimulatedNetwork,
{
    /// # Errors
    ///
    /// the `plan` is [validated](PhasePlan::validate) first.
    pub fn new(plan: PhasePlan) -> Result<Self, PhaseError> {
        plan.validate()?;
        Ok(Self {
            scheduler: Scheduler::new(),
            plan,
        })
    }

    #[inline]
    pub fn plan(&self) -> &PhasePlan {
        &self.plan
    }

    #[inline]
    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Schedule a custom `action` `delay` after now.
    pub fn schedule<F>(&mut self, delay: Duration, action: F) -> TimerId
    where
        F: FnOnce(&mut Experiment<N>, &mut Scheduler<Experiment<N>>) -> anyhow::Result<()>
            + 'static,
    {
        self.scheduler.schedule(delay, action)
    }

    /// Schedule a custom `action` at `at`.
    ///
    /// # Errors
    ///
    /// fails if `at` is already in the past.
    pub fn schedule_at<F>(&mut self, at: SimTime, action: F) -> Result<TimerId, ScheduleError>
    where
        F: FnOnce(&mut Experiment<N>, &mut Scheduler<Experiment<N>>) -> anyhow::Result<()>
            + 'static,
    {
        self.scheduler.schedule_at(at, action)
    }

    /// Register the trackers of the plan in `experiment` and schedule all
    /// the events of the plan.
    ///
    /// # Errors
    ///
    /// Every link of the plan must be known to the experiment; trackers
    /// starting on creation must be able to read the routing tables.
    /// Nothing is scheduled if a link is unknown.
    pub fn install(&mut self, experiment: &mut Experiment<N>) -> Result<(), ExperimentError> {
        for fault in &self.plan.faults {
            experiment.links().endpoints(fault.link)?;
        }

        for &FaultEvent { at, link, kind } in &self.plan.faults {
            self.scheduler.schedule_at(
                at,
                move |experiment: &mut Experiment<N>, scheduler: &mut Scheduler<Experiment<N>>| {
                    experiment.inject(link, kind, scheduler.now())?;
                    Ok(())
                },
            )?;
        }

        for &at in &self.plan.flow_samples {
            self.scheduler.schedule_at(
                at,
                |experiment: &mut Experiment<N>, scheduler: &mut Scheduler<Experiment<N>>| {
                    experiment.sample_flows(scheduler.now());
                    Ok(())
                },
            )?;
        }

        for &PhaseWindow { phase, start, stop } in &self.plan.windows {
            let id = experiment.add_tracker(phase, self.plan.tracker)?;

            match self.plan.tracker.mode {
                TrackingMode::StartOnCreate => {
                    experiment.start_tracker(id, &mut self.scheduler)?;
                }
                TrackingMode::ExplicitStart => {
                    self.scheduler.schedule_at(
                        start,
                        move |experiment: &mut Experiment<N>,
                              scheduler: &mut Scheduler<Experiment<N>>| {
                            experiment.start_tracker(id, scheduler)?;
                            Ok(())
                        },
                    )?;
                }
            }

            self.scheduler.schedule_at(
                stop,
                move |experiment: &mut Experiment<N>, scheduler: &mut Scheduler<Experiment<N>>| {
                    experiment.stop_tracker(id, scheduler)?;
                    Ok(())
                },
            )?;
        }

        log::debug!(
            "installed {} phases, {} faults and {} flow samples until {}",
            self.plan.windows.len(),
            self.plan.faults.len(),
            self.plan.flow_samples.len(),
            self.plan.horizon
        );

        Ok(())
    }

    /// Run the simulation until the horizon of the plan.
    pub fn run(&mut self, experiment: &mut Experiment<N>) -> anyhow::Result<()> {
        log::info!("running the simulation until {}", self.plan.horizon);
        self.scheduler.run_until(experiment, self.plan.horizon)?;
        log::info!("simulation completed at {}", self.scheduler.now());
        Ok(())
    }
}
