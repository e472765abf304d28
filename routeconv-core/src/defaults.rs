use crate::time::SimTime;
use std::time::Duration;

/// Default cadence at which the convergence trackers poll the routing
/// tables.
///
/// The convergence is only known with this resolution: a change is
/// detected at the first poll following it.
///
/// ```
/// # use routeconv_core::{defaults::*, time};
/// assert_eq!(
///     time::Duration::new(DEFAULT_POLL_INTERVAL).to_string(),
///     "100ms"
/// );
/// ```
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default instant the faulty links are torn down.
///
/// ```
/// # use routeconv_core::defaults::*;
/// assert_eq!(DEFAULT_LINK_DOWN.to_string(), "100s");
/// ```
pub const DEFAULT_LINK_DOWN: SimTime = SimTime::from_secs(100);

/// Default instant the faulty links are restored.
pub const DEFAULT_LINK_UP: SimTime = SimTime::from_secs(200);

/// Default end of the simulation.
///
/// Also the default window the flow throughput is averaged over.
///
/// ```
/// # use routeconv_core::defaults::*;
/// assert!(DEFAULT_LINK_DOWN < DEFAULT_LINK_UP);
/// assert!(DEFAULT_LINK_UP < DEFAULT_HORIZON);
/// ```
pub const DEFAULT_HORIZON: SimTime = SimTime::from_secs(300);
