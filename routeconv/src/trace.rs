//! Replay of a recorded network trace.
//!
//! A trace is a JSON document holding the topology of a simulated network
//! and, for each routing protocol it was run with, the routing tables of
//! every router and the flow monitor counters as they evolved in virtual
//! time. The [`TraceNetwork`] plays one protocol's recording back through
//! the [`SimulatedNetwork`] traits.
//!
//! ```json
//! {
//!   "name": "triangle",
//!   "nodes": [ { "id": 1, "name": "R1", "router": true }, ... ],
//!   "links": [ { "a": 1, "a_interface": 1, "b": 2, "b_interface": 1 }, ... ],
//!   "faults": [ [1, 2] ],
//!   "flow_filter": { "source": "10.1.1.1", "destination": "10.1.6.2" },
//!   "protocols": {
//!     "rip": {
//!       "routing": { "1": [ { "at": "0s", "table": "..." }, ... ] },
//!       "flows": [ { "at": "100s", "records": [ ... ] } ]
//!     }
//!   }
//! }
//! ```
//!
//! Routing tables are recorded as printed by the simulator: the first line
//! holds the time of the print and is ignored.

use crate::config::RoutingProtocol;
use anyhow::{Context as _, Result};
use routeconv_core::{
    FlowFilter, FlowMonitor, FlowRecord, InterfaceControl, InterfaceIndex, LinkId, LinkMap,
    RouterId, RoutingStateSnapshot, RoutingTables, SimTime, SimulatedNetwork,
    flow::FlowId,
    link::LinkError,
    routing::RoutingError,
    time::{self, DurationParseError},
};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    net::IpAddr,
    path::Path,
};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trace {
    pub name: String,
    pub nodes: Vec<NodeTrace>,
    pub links: Vec<LinkTrace>,
    /// the links that fail
    pub faults: Vec<(u64, u64)>,
    #[serde(default)]
    pub flow_filter: Option<FlowFilterTrace>,
    pub protocols: BTreeMap<String, ProtocolTrace>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeTrace {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    /// only routers are monitored for convergence
    #[serde(default)]
    pub router: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkTrace {
    pub a: u64,
    pub a_interface: u32,
    pub b: u64,
    pub b_interface: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowFilterTrace {
    pub source: IpAddr,
    pub destination: IpAddr,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolTrace {
    #[serde(default)]
    pub routing: BTreeMap<u64, Vec<TableTrace>>,
    #[serde(default)]
    pub flows: Vec<FlowSampleTrace>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableTrace {
    pub at: String,
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowSampleTrace {
    pub at: String,
    pub records: Vec<FlowRecordTrace>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowRecordTrace {
    pub id: u32,
    pub source: IpAddr,
    pub destination: IpAddr,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub delay_sum: String,
    pub jitter_sum: String,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("No recording of the `{protocol}' routing protocol in the trace (available: {available})")]
    UnknownProtocol {
        protocol: RoutingProtocol,
        available: String,
    },
    #[error("Node ({id}) Not Found in the trace")]
    UnknownNode { id: u64 },
    #[error("Node ({id}) is declared more than once")]
    DuplicateNode { id: u64 },
    #[error("The trace has no router to monitor")]
    NoRouters,
    #[error("Invalid instant or duration in the trace: {0}")]
    InvalidTime(#[from] DurationParseError),
    #[error("{0}")]
    Link(#[from] LinkError),
}

/// Everything an experiment needs, extracted from a [`Trace`].
pub struct Setup {
    pub network: TraceNetwork,
    pub links: LinkMap,
    pub routers: Vec<RouterId>,
    pub faults: Vec<LinkId>,
    pub flow_filter: Option<FlowFilter>,
}

impl Trace {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read the trace {}", path.display()))?;
        let trace = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse the trace {}", path.display()))?;
        Ok(trace)
    }

    /// Build the replay of the `protocol` recording.
    pub fn setup(&self, protocol: RoutingProtocol) -> Result<Setup, TraceError> {
        let recording =
            self.protocols
                .get(protocol.name())
                .ok_or_else(|| TraceError::UnknownProtocol {
                    protocol,
                    available: self
                        .protocols
                        .keys()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                })?;

        let mut nodes = HashSet::new();
        for node in &self.nodes {
            if !nodes.insert(node.id) {
                return Err(TraceError::DuplicateNode { id: node.id });
            }
        }
        let node = |id: u64| {
            if nodes.contains(&id) {
                Ok(RouterId::new(id))
            } else {
                Err(TraceError::UnknownNode { id })
            }
        };

        let routers: Vec<_> = self
            .nodes
            .iter()
            .filter(|node| node.router)
            .map(|node| RouterId::new(node.id))
            .collect();
        if routers.is_empty() {
            return Err(TraceError::NoRouters);
        }

        let mut builder = LinkMap::builder();
        for link in &self.links {
            builder.register(
                (node(link.a)?, InterfaceIndex::new(link.a_interface)),
                (node(link.b)?, InterfaceIndex::new(link.b_interface)),
            )?;
        }
        let links = builder.build();

        let faults = self
            .faults
            .iter()
            .map(|&(a, b)| -> Result<LinkId, TraceError> {
                Ok(LinkId::new((node(a)?, node(b)?)))
            })
            .collect::<Result<Vec<_>, TraceError>>()?;

        let mut timelines = HashMap::new();
        for (&id, tables) in &recording.routing {
            let mut timeline = tables
                .iter()
                .map(|entry| -> Result<_, TraceError> {
                    Ok((
                        entry.at.parse::<SimTime>()?,
                        RoutingStateSnapshot::from_printed_table(&entry.table),
                    ))
                })
                .collect::<Result<Vec<_>, TraceError>>()?;
            timeline.sort_by_key(|(at, _)| *at);
            timelines.insert(node(id)?, timeline);
        }
        for router in &routers {
            if timelines.get(router).is_none_or(Vec::is_empty) {
                log::warn!("no routing table recorded for router {router}");
            }
        }

        let mut flows = recording
            .flows
            .iter()
            .map(|sample| -> Result<_, TraceError> {
                let records = sample
                    .records
                    .iter()
                    .map(FlowRecordTrace::to_record)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((sample.at.parse::<SimTime>()?, records))
            })
            .collect::<Result<Vec<_>, TraceError>>()?;
        flows.sort_by_key(|(at, _)| *at);
        if flows.is_empty() {
            log::warn!("no flow recorded in the `{protocol}' recording");
        }

        log::debug!(
            "trace `{}': {} nodes, {} routers, {} links, {} faulty",
            self.name,
            self.nodes.len(),
            routers.len(),
            links.len(),
            faults.len()
        );

        Ok(Setup {
            network: TraceNetwork {
                now: SimTime::ZERO,
                timelines,
                flows,
                down: HashSet::new(),
            },
            links,
            routers,
            faults,
            flow_filter: self
                .flow_filter
                .map(|filter| FlowFilter::new(filter.source, filter.destination)),
        })
    }
}

impl FlowRecordTrace {
    fn to_record(&self) -> Result<FlowRecord, DurationParseError> {
        Ok(FlowRecord {
            id: FlowId::new(self.id),
            source: self.source,
            destination: self.destination,
            tx_packets: self.tx_packets,
            rx_packets: self.rx_packets,
            lost_packets: self.lost_packets,
            tx_bytes: self.tx_bytes,
            rx_bytes: self.rx_bytes,
            delay_sum: self.delay_sum.parse::<time::Duration>()?.into_duration(),
            jitter_sum: self.jitter_sum.parse::<time::Duration>()?.into_duration(),
        })
    }
}

/// Plays a recording back.
///
/// Every query answers with the latest recorded value at or before the
/// current virtual instant. The routing reaction to a link fault is part of
/// the recording: interfaces going up and down are only kept track of.
#[derive(Debug, Clone)]
pub struct TraceNetwork {
    now: SimTime,
    timelines: HashMap<RouterId, Vec<(SimTime, RoutingStateSnapshot)>>,
    flows: Vec<(SimTime, Vec<FlowRecord>)>,
    down: HashSet<(RouterId, InterfaceIndex)>,
}

/// the latest entry of `timeline` at or before `now`
fn latest<T>(timeline: &[(SimTime, T)], now: SimTime) -> Option<&T> {
    let recorded = timeline.partition_point(|(at, _)| *at <= now);
    recorded.checked_sub(1).map(|index| &timeline[index].1)
}

impl TraceNetwork {
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn is_interface_up(&self, router: RouterId, interface: InterfaceIndex) -> bool {
        !self.down.contains(&(router, interface))
    }

    /// number of interfaces currently down across the network
    pub fn interfaces_down(&self) -> usize {
        self.down.len()
    }
}

impl RoutingTables for TraceNetwork {
    fn routing_table(&self, router: RouterId) -> Result<RoutingStateSnapshot, RoutingError> {
        let timeline = self
            .timelines
            .get(&router)
            .ok_or(RoutingError::NoRoutingFacility { router })?;

        // nothing printed yet: the routing protocol did not start
        Ok(latest(timeline, self.now)
            .cloned()
            .unwrap_or_else(|| RoutingStateSnapshot::new("")))
    }
}

impl InterfaceControl for TraceNetwork {
    fn set_interface_up(&mut self, node: RouterId, interface: InterfaceIndex) {
        if self.down.remove(&(node, interface)) {
            log::debug!("[{}] node {node} interface {interface} up", self.now);
        }
    }

    fn set_interface_down(&mut self, node: RouterId, interface: InterfaceIndex) {
        if self.down.insert((node, interface)) {
            log::debug!("[{}] node {node} interface {interface} down", self.now);
        }
    }
}

impl FlowMonitor for TraceNetwork {
    /// The recorded counters already account for the lost packets.
    fn check_for_lost_packets(&mut self) {}

    fn flow_stats(&self) -> Vec<FlowRecord> {
        latest(&self.flows, self.now).cloned().unwrap_or_default()
    }
}

impl SimulatedNetwork for TraceNetwork {
    fn sync_clock(&mut self, now: SimTime) {
        self.now = now;
    }
}
