//! Flow statistics and the quality metrics derived from them.
//!
//! The flow monitor of the simulated network keeps cumulative counters per
//! flow. The [`FlowStatsAggregator`] reads them at chosen instants and
//! derives packet loss, average packet size, throughput, delay and jitter.

use std::{fmt, net::IpAddr, time::Duration};

/// Identifier of a flow, as assigned by the flow monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowId(u32);

impl FlowId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn into_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cumulative counters of one flow since the flow monitor was installed.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub id: FlowId,
    pub source: IpAddr,
    pub destination: IpAddr,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    /// sum of the end-to-end delays of the received packets
    pub delay_sum: Duration,
    /// sum of the delay variations between consecutive received packets
    pub jitter_sum: Duration,
}

/// Access to the flow monitoring facility of the simulated network.
pub trait FlowMonitor {
    /// Account the packets that are overdue as lost.
    fn check_for_lost_packets(&mut self);

    /// the current counters of every flow
    fn flow_stats(&self) -> Vec<FlowRecord>;
}

/// Restricts the sampled flows to one source and destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowFilter {
    pub source: IpAddr,
    pub destination: IpAddr,
}

impl FlowFilter {
    pub fn new(source: IpAddr, destination: IpAddr) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn matches(&self, record: &FlowRecord) -> bool {
        record.source == self.source && record.destination == self.destination
    }
}

impl fmt::Display for FlowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Counters summed over one or more flows at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowStatsSample {
    pub flows: usize,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub delay_sum: Duration,
    pub jitter_sum: Duration,
}

/// Quality metrics derived from a [`FlowStatsSample`].
///
/// Every ratio with a zero denominator evaluates to `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowMetrics {
    /// lost packets over transmitted packets
    pub packet_loss_ratio: f64,
    /// transmitted bytes over transmitted packets
    pub average_packet_size: f64,
    /// received megabits per second of the observation window
    pub throughput_mbps: f64,
    /// mean end-to-end delay of the received packets, in seconds
    pub mean_delay: f64,
    /// mean jitter of the received packets, in seconds
    pub mean_jitter: f64,
}

impl FlowStatsSample {
    pub fn add(&mut self, record: &FlowRecord) {
        self.flows += 1;
        self.tx_packets += record.tx_packets;
        self.rx_packets += record.rx_packets;
        self.lost_packets += record.lost_packets;
        self.tx_bytes += record.tx_bytes;
        self.rx_bytes += record.rx_bytes;
        self.delay_sum += record.delay_sum;
        self.jitter_sum += record.jitter_sum;
    }

    /// Derive the metrics of the sample, the throughput being averaged over
    /// `window`.
    ///
    /// ```
    /// # use routeconv_core::flow::FlowStatsSample;
    /// # use std::time::Duration;
    /// let sample = FlowStatsSample {
    ///     flows: 1,
    ///     tx_packets: 100,
    ///     lost_packets: 10,
    ///     ..FlowStatsSample::default()
    /// };
    /// let metrics = sample.metrics(Duration::from_secs(300));
    /// assert_eq!(metrics.packet_loss_ratio, 0.1);
    /// assert_eq!(metrics.mean_delay, 0.0);
    /// ```
    pub fn metrics(&self, window: Duration) -> FlowMetrics {
        let tx_packets = self.tx_packets as f64;
        let rx_packets = self.rx_packets as f64;

        let (packet_loss_ratio, average_packet_size) = if self.tx_packets == 0 {
            (0.0, 0.0)
        } else {
            (
                self.lost_packets as f64 / tx_packets,
                self.tx_bytes as f64 / tx_packets,
            )
        };

        let throughput_mbps = if window.is_zero() {
            0.0
        } else {
            self.rx_bytes as f64 * 8.0 / window.as_secs_f64() / 1_000_000.0
        };

        let mean_delay = if self.rx_packets == 0 {
            0.0
        } else {
            self.delay_sum.as_secs_f64() / rx_packets
        };

        let mean_jitter = if self.rx_packets <= 1 {
            0.0
        } else {
            self.jitter_sum.as_secs_f64() / (rx_packets - 1.0)
        };

        FlowMetrics {
            packet_loss_ratio,
            average_packet_size,
            throughput_mbps,
            mean_delay,
            mean_jitter,
        }
    }
}

impl<'a> FromIterator<&'a FlowRecord> for FlowStatsSample {
    fn from_iter<T: IntoIterator<Item = &'a FlowRecord>>(iter: T) -> Self {
        let mut sample = Self::default();
        for record in iter {
            sample.add(record);
        }
        sample
    }
}

/// The result of sampling the flow monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    pub filter: Option<FlowFilter>,
    pub sample: FlowStatsSample,
    pub metrics: FlowMetrics,
}

/// Derives flow quality metrics from the flow monitor counters.
///
/// The aggregator keeps no state between two samples: each sample is a
/// function of the counters at that instant and of the fixed observation
/// `window` the throughput is averaged over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStatsAggregator {
    window: Duration,
}

impl FlowStatsAggregator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    #[inline]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Sample the flows matching `filter` (all the flows without filter).
    ///
    /// The counters of the matching flows are summed before the metrics are
    /// derived, so the result is a true aggregate rather than an average of
    /// per-flow averages.
    pub fn sample<M>(&self, monitor: &mut M, filter: Option<FlowFilter>) -> FlowReport
    where
        M: FlowMonitor + ?Sized,
    {
        monitor.check_for_lost_packets();
        let records = monitor.flow_stats();

        let sample: FlowStatsSample = records
            .iter()
            .filter(|record| filter.is_none_or(|filter| filter.matches(record)))
            .collect();

        if sample.flows == 0 {
            match filter {
                Some(filter) => log::warn!("no flow matches {filter}"),
                None => log::warn!("no flow recorded by the flow monitor"),
            }
        }

        let metrics = sample.metrics(self.window);
        FlowReport {
            filter,
            sample,
            metrics,
        }
    }

    /// Sample every flow on its own.
    pub fn per_flow<M>(&self, monitor: &mut M) -> Vec<(FlowRecord, FlowMetrics)>
    where
        M: FlowMonitor + ?Sized,
    {
        monitor.check_for_lost_packets();
        monitor
            .flow_stats()
            .into_iter()
            .map(|record| {
                let metrics = FlowStatsSample::from_iter([&record]).metrics(self.window);
                (record, metrics)
            })
            .collect()
    }
}
