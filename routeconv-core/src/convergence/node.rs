use crate::{
    routing::{RouterId, RoutingError, RoutingStateSnapshot, RoutingTables},
    scheduler::TimerId,
    time::SimTime,
};

/// Lifecycle of a [`NodeConvergenceTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrackingState {
    /// created, never started
    #[default]
    Created,
    /// polling and recording changes
    Active,
    /// stopped; the history is kept and frozen
    Stopped,
}

/// Tracks the last instant the routing table of one router changed.
///
/// The tracker itself does not query anything on its own: its owner arms a
/// repeating timer (kept in the tracker, see [`attach_timer`]) that calls
/// [`poll`] at a fixed cadence. [`stop`] hands the timer back so the owner
/// can cancel it; no poll is executed after the tracker is stopped.
///
/// `last_change` only moves while the tracker is [`TrackingState::Active`],
/// and only at an instant where the polled snapshot differs from the
/// previous one. Since polls are executed in virtual-time order it never
/// goes backward.
///
/// [`attach_timer`]: NodeConvergenceTracker::attach_timer
/// [`poll`]: NodeConvergenceTracker::poll
/// [`stop`]: NodeConvergenceTracker::stop
#[derive(Debug, Clone)]
pub struct NodeConvergenceTracker {
    router: RouterId,

    state: TrackingState,

    baseline: Option<RoutingStateSnapshot>,

    last_change: SimTime,

    /// number of changes observed since the tracker was created
    changes: u64,

    timer: Option<TimerId>,
}

impl NodeConvergenceTracker {
    pub fn new(router: RouterId) -> Self {
        Self {
            router,
            state: TrackingState::Created,
            baseline: None,
            last_change: SimTime::ZERO,
            changes: 0,
            timer: None,
        }
    }

    #[inline]
    pub fn router(&self) -> RouterId {
        self.router
    }

    #[inline]
    pub fn state(&self) -> TrackingState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == TrackingState::Active
    }

    /// instant of the last observed change, or of the (re)start of the
    /// tracker if nothing changed since.
    #[inline]
    pub fn last_change(&self) -> SimTime {
        self.last_change
    }

    #[inline]
    pub fn changes(&self) -> u64 {
        self.changes
    }

    #[inline]
    pub fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    /// Start tracking at `now`, with `baseline` as the reference table.
    ///
    /// Starting an already active tracker re-baselines it.
    pub fn start(&mut self, now: SimTime, baseline: RoutingStateSnapshot) {
        self.state = TrackingState::Active;
        self.baseline = Some(baseline);
        self.last_change = now;
    }

    /// Keep the polling timer driving this tracker.
    ///
    /// Returns the previously attached timer, if any, which the caller is
    /// responsible to cancel.
    pub fn attach_timer(&mut self, timer: TimerId) -> Option<TimerId> {
        self.timer.replace(timer)
    }

    /// Stop tracking.
    ///
    /// Idempotent: stopping a stopped tracker, or one that was never
    /// started, changes nothing. Returns the polling timer to cancel.
    pub fn stop(&mut self) -> Option<TimerId> {
        if self.state == TrackingState::Active {
            self.state = TrackingState::Stopped;
        }
        self.timer.take()
    }

    /// Compare `snapshot` with the baseline and record a change at `now`
    /// if they differ.
    ///
    /// Returns `true` if a change was recorded. Always `false` while the
    /// tracker is not active.
    pub fn observe(&mut self, now: SimTime, snapshot: RoutingStateSnapshot) -> bool {
        if !self.is_active() {
            return false;
        }

        if self.baseline.as_ref() == Some(&snapshot) {
            return false;
        }

        debug_assert!(
            now >= self.last_change,
            "polls are expected in virtual time order"
        );

        self.baseline = Some(snapshot);
        self.last_change = now;
        self.changes += 1;
        log::debug!("router {} routing table changed at {now}", self.router);

        true
    }

    /// Fetch the routing table of the tracked router and [`observe`] it.
    ///
    /// The routing tables are not queried while the tracker is inactive.
    ///
    /// [`observe`]: NodeConvergenceTracker::observe
    pub fn poll<R>(&mut self, now: SimTime, routing: &R) -> Result<bool, RoutingError>
    where
        R: RoutingTables + ?Sized,
    {
        if !self.is_active() {
            return Ok(false);
        }

        let snapshot = routing.routing_table(self.router)?;
        Ok(self.observe(now, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, collections::HashMap};

    const ROUTER: RouterId = RouterId::new(1);

    fn table(text: &str) -> RoutingStateSnapshot {
        RoutingStateSnapshot::new(text)
    }

    fn at(millis: u64) -> SimTime {
        SimTime::from_millis(millis)
    }

    #[derive(Default)]
    struct Tables {
        tables: HashMap<RouterId, RoutingStateSnapshot>,
        queries: RefCell<u32>,
    }

    impl RoutingTables for Tables {
        fn routing_table(&self, router: RouterId) -> Result<RoutingStateSnapshot, RoutingError> {
            *self.queries.borrow_mut() += 1;
            self.tables
                .get(&router)
                .cloned()
                .ok_or(RoutingError::NoRoutingFacility { router })
        }
    }

    #[test]
    fn created_tracker_ignores_polls() {
        let mut tracker = NodeConvergenceTracker::new(ROUTER);
        let tables = Tables::default();

        assert_eq!(tracker.state(), TrackingState::Created);
        assert!(!tracker.poll(at(100), &tables).unwrap());
        assert!(!tracker.observe(at(100), table("a")));
        assert_eq!(*tables.queries.borrow(), 0);
        assert_eq!(tracker.last_change(), SimTime::ZERO);
    }

    #[test]
    fn start_records_the_baseline_instant() {
        let mut tracker = NodeConvergenceTracker::new(ROUTER);
        tracker.start(at(100_000), table("a"));

        assert!(tracker.is_active());
        assert_eq!(tracker.last_change(), at(100_000));
        assert_eq!(tracker.changes(), 0);
    }

    #[test]
    fn only_changes_move_the_timestamp() {
        let mut tracker = NodeConvergenceTracker::new(ROUTER);
        tracker.start(at(0), table("a"));

        assert!(!tracker.observe(at(100), table("a")));
        assert!(tracker.observe(at(200), table("b")));
        assert!(!tracker.observe(at(300), table("b")));
        assert!(tracker.observe(at(400), table("a")));
        assert!(!tracker.observe(at(500), table("a")));

        assert_eq!(tracker.last_change(), at(400));
        assert_eq!(tracker.changes(), 2);
    }

    #[test]
    fn last_change_is_monotonic() {
        let mut tracker = NodeConvergenceTracker::new(ROUTER);
        tracker.start(at(0), table("0"));

        let mut previous = tracker.last_change();
        for step in 1..=50u64 {
            // the table changes on every third poll only
            let text = (step / 3).to_string();
            let changed = tracker.observe(at(step * 100), table(&text));

            assert!(tracker.last_change() >= previous);
            if changed {
                assert_eq!(tracker.last_change(), at(step * 100));
            } else {
                assert_eq!(tracker.last_change(), previous);
            }
            previous = tracker.last_change();
        }
        assert_eq!(tracker.last_change(), at(4_800));
    }

    #[test]
    fn stopped_tracker_is_frozen() {
        let mut tracker = NodeConvergenceTracker::new(ROUTER);
        tracker.start(at(0), table("a"));
        assert!(tracker.observe(at(100), table("b")));

        assert_eq!(tracker.stop(), None);
        assert_eq!(tracker.state(), TrackingState::Stopped);

        assert!(!tracker.observe(at(200), table("c")));
        assert_eq!(tracker.last_change(), at(100));
        assert_eq!(tracker.changes(), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut tracker = NodeConvergenceTracker::new(ROUTER);

        // never started
        assert_eq!(tracker.stop(), None);
        assert_eq!(tracker.state(), TrackingState::Created);

        tracker.start(at(0), table("a"));
        tracker.stop();
        let last_change = tracker.last_change();
        tracker.stop();

        assert_eq!(tracker.state(), TrackingState::Stopped);
        assert_eq!(tracker.last_change(), last_change);
    }

    #[test]
    fn poll_queries_the_routing_tables() {
        let mut tables = Tables::default();
        tables.tables.insert(ROUTER, table("a"));

        let mut tracker = NodeConvergenceTracker::new(ROUTER);
        tracker.start(at(0), table("a"));
        assert!(!tracker.poll(at(100), &tables).unwrap());

        tables.tables.insert(ROUTER, table("b"));
        assert!(tracker.poll(at(200), &tables).unwrap());
        assert_eq!(tracker.last_change(), at(200));
        assert_eq!(*tables.queries.borrow(), 2);
    }

    #[test]
    fn poll_propagates_routing_errors() {
        let tables = Tables::default();

        let mut tracker = NodeConvergenceTracker::new(ROUTER);
        tracker.start(at(0), table("a"));

        assert_eq!(
            tracker.poll(at(100), &tables),
            Err(RoutingError::NoRoutingFacility { router: ROUTER })
        );
    }
}
