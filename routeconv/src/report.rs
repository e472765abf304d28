//! Console and JSON rendering of an experiment's results.

use crate::config::{Layout, RoutingProtocol};
use anyhow::{Context as _, Result};
use routeconv_core::{
    Convergence, ExperimentReport,
    experiment::{FlowSnapshot, PhaseReport},
    flow::{FlowMetrics, FlowRecord},
};
use serde::Serialize;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub trace: String,
    pub protocol: RoutingProtocol,
    pub layout: Layout,
    pub poll_interval: f64,
    pub phases: Vec<PhaseEntry>,
    pub flows: Vec<FlowEntry>,
}

/// Convergence over one phase, instants and durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseEntry {
    pub phase: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub measure: Measure,
    pub convergence: f64,
    pub changes: u64,
}

/// What the convergence of a [`PhaseEntry`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// time from the start of the phase to the last change
    Elapsed,
    /// instant of the last change
    StabilizedAt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEntry {
    pub at: f64,
    pub filter: Option<String>,
    pub flows: usize,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub metrics: MetricsEntry,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub per_flow: Vec<PerFlowEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsEntry {
    pub packet_loss_ratio: f64,
    pub average_packet_size: f64,
    pub throughput_mbps: f64,
    pub mean_delay: f64,
    pub mean_jitter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerFlowEntry {
    pub id: u32,
    pub source: String,
    pub destination: String,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub metrics: MetricsEntry,
}

impl From<&FlowMetrics> for MetricsEntry {
    fn from(metrics: &FlowMetrics) -> Self {
        Self {
            packet_loss_ratio: metrics.packet_loss_ratio,
            average_packet_size: metrics.average_packet_size,
            throughput_mbps: metrics.throughput_mbps,
            mean_delay: metrics.mean_delay,
            mean_jitter: metrics.mean_jitter,
        }
    }
}

impl From<&PhaseReport> for PhaseEntry {
    fn from(report: &PhaseReport) -> Self {
        let measure = match report.convergence {
            Convergence::Elapsed(_) => Measure::Elapsed,
            Convergence::StabilizedAt(_) => Measure::StabilizedAt,
        };
        Self {
            phase: report.phase.to_string(),
            start: report.start.map(|at| at.as_secs_f64()),
            end: report.end.map(|at| at.as_secs_f64()),
            measure,
            convergence: report.convergence.as_secs_f64(),
            changes: report.changes,
        }
    }
}

impl From<&(FlowRecord, FlowMetrics)> for PerFlowEntry {
    fn from((record, metrics): &(FlowRecord, FlowMetrics)) -> Self {
        Self {
            id: record.id.into_u32(),
            source: record.source.to_string(),
            destination: record.destination.to_string(),
            tx_packets: record.tx_packets,
            rx_packets: record.rx_packets,
            lost_packets: record.lost_packets,
            metrics: metrics.into(),
        }
    }
}

impl From<&FlowSnapshot> for FlowEntry {
    fn from(snapshot: &FlowSnapshot) -> Self {
        let report = &snapshot.report;
        Self {
            at: snapshot.at.as_secs_f64(),
            filter: report.filter.map(|filter| filter.to_string()),
            flows: report.sample.flows,
            tx_packets: report.sample.tx_packets,
            rx_packets: report.sample.rx_packets,
            lost_packets: report.sample.lost_packets,
            metrics: (&report.metrics).into(),
            per_flow: snapshot.per_flow.iter().map(PerFlowEntry::from).collect(),
        }
    }
}

impl Report {
    pub fn new(
        trace: impl Into<String>,
        protocol: RoutingProtocol,
        layout: Layout,
        poll_interval: std::time::Duration,
        experiment: &ExperimentReport,
    ) -> Self {
        Self {
            trace: trace.into(),
            protocol,
            layout,
            poll_interval: poll_interval.as_secs_f64(),
            phases: experiment.phases.iter().map(PhaseEntry::from).collect(),
            flows: experiment.flows.iter().map(FlowEntry::from).collect(),
        }
    }

    /// `<trace>_<protocol>.json`
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.trace, self.protocol)
    }

    pub fn print<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "{} ({})", self.trace, self.protocol)?;

        for phase in &self.phases {
            match phase.measure {
                Measure::StabilizedAt => writeln!(
                    out,
                    "Network stable since {:.1}s ({} changes) {}",
                    phase.convergence, phase.changes, phase.phase
                )?,
                Measure::Elapsed => writeln!(
                    out,
                    "Convergence time {}: {:.1}s ({} changes)",
                    phase.phase, phase.convergence, phase.changes
                )?,
            }
        }

        for flows in &self.flows {
            writeln!(out)?;
            match &flows.filter {
                Some(filter) => writeln!(out, "Flow statistics at {}s for {filter}", flows.at)?,
                None => writeln!(
                    out,
                    "Flow statistics at {}s over {} flows",
                    flows.at, flows.flows
                )?,
            }
            print_metrics(&mut out, &flows.metrics, "  ")?;

            for flow in &flows.per_flow {
                writeln!(
                    out,
                    "  Flow {} ({} -> {})",
                    flow.id, flow.source, flow.destination
                )?;
                writeln!(
                    out,
                    "    Tx packets: {}, Rx packets: {}, Lost packets: {}",
                    flow.tx_packets, flow.rx_packets, flow.lost_packets
                )?;
                print_metrics(&mut out, &flow.metrics, "    ")?;
            }
        }

        Ok(())
    }

    /// Write the report as JSON in `dir`, created if needed.
    pub fn write_json(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create the directory {}", dir.display()))?;

        let path = dir.join(self.file_name());
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(io::BufWriter::new(file), self)
            .with_context(|| format!("Failed to write the report to {}", path.display()))?;

        Ok(path)
    }
}

fn print_metrics<W: Write>(out: &mut W, metrics: &MetricsEntry, indent: &str) -> io::Result<()> {
    writeln!(
        out,
        "{indent}Packet loss ratio: {:.4}",
        metrics.packet_loss_ratio
    )?;
    writeln!(
        out,
        "{indent}Average packet size: {:.1} bytes",
        metrics.average_packet_size
    )?;
    writeln!(out, "{indent}Throughput: {:.6} Mbps", metrics.throughput_mbps)?;
    writeln!(out, "{indent}Mean delay: {:.6}s", metrics.mean_delay)?;
    writeln!(out, "{indent}Mean jitter: {:.6}s", metrics.mean_jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use routeconv_core::{
        Phase, SimTime, TrackerId,
        flow::{FlowReport, FlowStatsSample},
    };
    use std::time::Duration;

    fn experiment() -> ExperimentReport {
        ExperimentReport {
            phases: vec![PhaseReport {
                phase: Phase::DuringFault,
                tracker: TrackerId::new(1),
                start: Some(SimTime::from_secs(100)),
                end: Some(SimTime::from_secs(200)),
                convergence: Convergence::Elapsed(Duration::from_millis(5_300)),
                changes: 4,
            }],
            flows: vec![FlowSnapshot {
                at: SimTime::from_secs(300),
                report: FlowReport {
                    filter: None,
                    sample: FlowStatsSample {
                        flows: 2,
                        tx_packets: 100,
                        rx_packets: 90,
                        lost_packets: 10,
                        ..FlowStatsSample::default()
                    },
                    metrics: FlowMetrics {
                        packet_loss_ratio: 0.1,
                        ..FlowMetrics::default()
                    },
                },
                per_flow: Vec::new(),
            }],
        }
    }

    fn report() -> Report {
        Report::new(
            "triangle",
            RoutingProtocol::Olsr,
            Layout::FaultCycle,
            Duration::from_millis(100),
            &experiment(),
        )
    }

    #[test]
    fn console() {
        let mut out = Vec::new();
        report().print(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("Convergence time during the link failure: 5.3s (4 changes)"));
        assert!(out.contains("Flow statistics at 300s over 2 flows"));
        assert!(out.contains("Packet loss ratio: 0.1000"));
    }

    #[test]
    fn stabilization_instant() {
        let mut experiment = experiment();
        experiment.phases[0].convergence =
            Convergence::StabilizedAt(SimTime::from_millis(42_100));
        let report = Report::new(
            "triangle",
            RoutingProtocol::Rip,
            Layout::StopAtFault,
            Duration::from_millis(100),
            &experiment,
        );
        assert_eq!(report.phases[0].measure, Measure::StabilizedAt);

        let mut out = Vec::new();
        report.print(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Network stable since 42.1s (4 changes) during the link failure"));

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["phases"][0]["measure"], "stabilized_at");
    }

    #[test]
    fn json() {
        let report = report();
        assert_eq!(report.file_name(), "triangle_olsr.json");

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["protocol"], "olsr");
        assert_eq!(value["layout"], "fault-cycle");
        assert_eq!(value["phases"][0]["measure"], "elapsed");
        assert_eq!(value["phases"][0]["convergence"], 5.3);
        assert_eq!(value["flows"][0]["lost_packets"], 10);
        assert!(value["flows"][0].get("per_flow").is_none());
    }
}
