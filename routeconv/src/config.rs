//! Command line configuration of a replay.

use clap::{Parser, ValueEnum};
use routeconv_core::{LinkId, PhasePlan, SimTime, TrackerConfig, defaults, phase::PhaseError, time};
use serde::Serialize;
use std::{fmt, path::PathBuf};

/// The routing protocols a trace may hold a recording of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProtocol {
    Rip,
    Olsr,
}

impl RoutingProtocol {
    /// name of the protocol section in a trace
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rip => "rip",
            Self::Olsr => "olsr",
        }
    }
}

impl fmt::Display for RoutingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the observation phases are laid out around the link fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// one tracker before, during and after the failure
    FaultCycle,
    /// one tracker from the start, stopped at the failure
    StopAtFault,
}

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct Args {
    /// Recorded network trace to replay.
    #[arg(short, long)]
    pub trace: PathBuf,
    /// Routing protocol recording of the trace to replay.
    #[arg(short, long = "routing-protocol", value_enum, default_value_t = RoutingProtocol::Rip)]
    pub routing_protocol: RoutingProtocol,
    /// Directory the JSON report is written to.
    #[arg(short, long, default_value = "./")]
    pub subfolder: PathBuf,
    /// Instant the faulty links are torn down.
    #[arg(long, default_value_t = defaults::DEFAULT_LINK_DOWN)]
    pub link_down: SimTime,
    /// Instant the faulty links are restored.
    #[arg(long, default_value_t = defaults::DEFAULT_LINK_UP)]
    pub link_up: SimTime,
    /// End of the simulation.
    #[arg(long, default_value_t = defaults::DEFAULT_HORIZON)]
    pub horizon: SimTime,
    /// Cadence at which the routing tables are polled.
    #[arg(short, long, default_value_t = time::Duration::new(defaults::DEFAULT_POLL_INTERVAL))]
    pub poll_interval: time::Duration,
    #[arg(short, long, value_enum, default_value_t = Layout::FaultCycle)]
    pub layout: Layout,
    /// Window the flow throughput is averaged over [default: the horizon]
    #[arg(short, long)]
    pub window: Option<time::Duration>,
    /// Also report every flow on its own.
    #[arg(long)]
    pub per_flow: bool,
}

impl Args {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: self.poll_interval.into_duration(),
            ..TrackerConfig::default()
        }
    }

    /// The phases of the experiment, with `links` failing.
    pub fn plan(&self, links: &[LinkId]) -> Result<PhasePlan, PhaseError> {
        match self.layout {
            Layout::FaultCycle => PhasePlan::fault_cycle(
                links,
                self.link_down,
                self.link_up,
                self.horizon,
                self.tracker_config(),
            ),
            Layout::StopAtFault => PhasePlan::stop_at_fault(
                links,
                self.link_down,
                self.link_up,
                self.horizon,
                self.tracker_config(),
            ),
        }
    }

    pub fn window(&self) -> std::time::Duration {
        self.window
            .map(time::Duration::into_duration)
            .unwrap_or_else(|| self.horizon.elapsed())
    }
}
