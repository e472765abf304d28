use std::{fmt, sync::Arc};
use thiserror::Error;

/// The identifier of a node (router or host) of the simulated network
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouterId(u64);

impl RouterId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The routing table of one router, rendered as text.
///
/// Snapshots are only ever compared for equality and the comparison is on
/// the raw content: two tables holding the same routes printed in a
/// different order are *different* snapshots. A routing facility that
/// reorders equivalent entries between two polls is therefore seen as
/// changing, and this shows in the measured convergence time.
///
/// The text must not contain anything that changes with time alone (such
/// as the instant the table was printed at), see
/// [`RoutingStateSnapshot::from_printed_table`].
///
/// ```
/// # use routeconv_core::routing::RoutingStateSnapshot;
/// let a = RoutingStateSnapshot::new("10.0.1.0/24 via 1\n10.0.2.0/24 via 2\n");
/// let b = RoutingStateSnapshot::new("10.0.2.0/24 via 2\n10.0.1.0/24 via 1\n");
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingStateSnapshot(Arc<str>);

impl RoutingStateSnapshot {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Build a snapshot from a table printed with a leading header line.
    ///
    /// Routing facilities commonly print the node and the current time on the
    /// first line of their table; that line is dropped so that identical
    /// routes give identical snapshots whenever they are sampled. Text
    /// without any line break is kept as is.
    ///
    /// ```
    /// # use routeconv_core::routing::RoutingStateSnapshot;
    /// let early = RoutingStateSnapshot::from_printed_table(
    ///     "Node: 2, Time: +10s, Local time: +10s\n10.0.3.0/24 via 1\n",
    /// );
    /// let late = RoutingStateSnapshot::from_printed_table(
    ///     "Node: 2, Time: +95.2s, Local time: +95.2s\n10.0.3.0/24 via 1\n",
    /// );
    /// assert_eq!(early, late);
    /// assert_eq!(early.as_str(), "10.0.3.0/24 via 1\n");
    /// ```
    pub fn from_printed_table(text: &str) -> Self {
        match text.split_once('\n') {
            Some((_header, table)) => Self::new(table),
            None => Self::new(text),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoutingStateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a router's routing table cannot be rendered.
///
/// This is a configuration problem (the monitored router does not exist or
/// has no routing facility installed); it is detected before the simulation
/// starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Router ({router}) Not Found")]
    UnknownRouter { router: RouterId },
    #[error("Router ({router}) has no routing facility installed")]
    NoRoutingFacility { router: RouterId },
}

/// Access to the routing state computed by the simulated network.
pub trait RoutingTables {
    /// the current routing table of `router`
    fn routing_table(&self, router: RouterId) -> Result<RoutingStateSnapshot, RoutingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print() {
        assert_eq!(format!("{}", RouterId(42)), "42")
    }

    #[test]
    fn snapshots_compare_on_content() {
        let a = RoutingStateSnapshot::new("10.0.0.0/24 via 1\n");
        let b = RoutingStateSnapshot::new(String::from("10.0.0.0/24 via 1\n"));
        assert_eq!(a, b);

        let trailing_space = RoutingStateSnapshot::new("10.0.0.0/24 via 1 \n");
        assert_ne!(a, trailing_space);
    }

    #[test]
    fn printed_table_without_header() {
        let snapshot = RoutingStateSnapshot::from_printed_table("no routes");
        assert_eq!(snapshot.as_str(), "no routes");

        let snapshot = RoutingStateSnapshot::from_printed_table("header only\n");
        assert!(snapshot.is_empty());
    }
}
