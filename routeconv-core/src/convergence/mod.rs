//! Detection of routing convergence.
//!
//! A [`NodeConvergenceTracker`] polls the routing table of one router and
//! remembers the last instant it saw it change. A
//! [`NetworkConvergenceTracker`] owns one node tracker per monitored router
//! and reports the network as converged at the instant the *last* of them
//! stopped changing.

mod network;
mod node;

use crate::{
    routing::{RouterId, RoutingError},
    scheduler::ScheduleError,
    time::SimTime,
};
use std::{fmt, time::Duration};
use thiserror::Error;

pub use self::{
    network::{NetworkConvergenceTracker, TrackerId},
    node::{NodeConvergenceTracker, TrackingState},
};

/// When a tracker starts tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrackingMode {
    /// The tracker is created idle and only tracks between an explicit
    /// `start` and `stop`.
    #[default]
    ExplicitStart,
    /// The tracker starts tracking the instant it is registered; only
    /// `stop` is needed, typically to freeze the measure before a fault.
    StartOnCreate,
}

/// What [`NetworkConvergenceTracker::convergence`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConvergenceMeasure {
    /// Time from the start of the phase to the last observed change.
    #[default]
    Elapsed,
    /// The absolute instant of the last observed change.
    StabilizedAt,
}

/// Configuration shared by the node trackers of a network tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub mode: TrackingMode,
    pub measure: ConvergenceMeasure,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: crate::defaults::DEFAULT_POLL_INTERVAL,
            mode: TrackingMode::default(),
            measure: ConvergenceMeasure::default(),
        }
    }
}

/// The measured convergence of one network tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Convergence {
    Elapsed(Duration),
    StabilizedAt(SimTime),
}

impl Convergence {
    pub fn as_secs_f64(&self) -> f64 {
        match self {
            Self::Elapsed(duration) => duration.as_secs_f64(),
            Self::StabilizedAt(instant) => instant.as_secs_f64(),
        }
    }
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elapsed(duration) => crate::time::Duration::new(*duration).fmt(f),
            Self::StabilizedAt(instant) => write!(f, "stable since {instant}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error("A convergence tracker needs at least one router to monitor")]
    NoRouters,
    #[error("Router ({router}) is not monitored by this tracker")]
    NotMonitored { router: RouterId },
    #[error("{0}")]
    Routing(#[from] RoutingError),
    #[error("{0}")]
    Schedule(#[from] ScheduleError),
}

/// The context that owns the network trackers and executes their polls.
///
/// The polling timers armed by [`NetworkConvergenceTracker::start`] only
/// carry the tracker and router identifiers; when they fire the host
/// resolves them back to the tracker and the routing tables.
pub trait ConvergenceHost: 'static {
    fn poll_router(
        &mut self,
        tracker: TrackerId,
        router: RouterId,
        now: SimTime,
    ) -> anyhow::Result<()>;
}
