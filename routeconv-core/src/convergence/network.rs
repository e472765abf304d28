use super::{
    Convergence, ConvergenceError, ConvergenceHost, ConvergenceMeasure, NodeConvergenceTracker,
    TrackerConfig, TrackingMode, TrackingState,
};
use crate::{
    routing::{RouterId, RoutingTables},
    scheduler::Scheduler,
    time::SimTime,
};
use std::{collections::BTreeMap, fmt, time::Duration};

/// Identifier of a [`NetworkConvergenceTracker`] within its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackerId(usize);

impl TrackerId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tracks the convergence of a set of routers over one observation phase.
///
/// The network is converged once every router stopped changing: the
/// stabilization instant is the maximum of the children's last change
/// instants. If nothing changed during the phase it is the phase start
/// itself.
///
/// Instances are fully independent; measuring before, during and after a
/// fault uses three of them over the same routers, each with its own node
/// trackers and poll history.
#[derive(Debug, Clone)]
pub struct NetworkConvergenceTracker {
    config: TrackerConfig,

    trackers: BTreeMap<RouterId, NodeConvergenceTracker>,

    phase_start: Option<SimTime>,
    phase_end: Option<SimTime>,
}

impl NetworkConvergenceTracker {
    /// Create a tracker over `routers`, idle.
    ///
    /// Duplicated routers are monitored once.
    ///
    /// # Errors
    ///
    /// [`ConvergenceError::NoRouters`] if `routers` is empty.
    pub fn new<I>(routers: I, config: TrackerConfig) -> Result<Self, ConvergenceError>
    where
        I: IntoIterator<Item = RouterId>,
    {
        let trackers: BTreeMap<_, _> = routers
            .into_iter()
            .map(|router| (router, NodeConvergenceTracker::new(router)))
            .collect();

        if trackers.is_empty() {
            return Err(ConvergenceError::NoRouters);
        }

        Ok(Self {
            config,
            trackers,
            phase_start: None,
            phase_end: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn mode(&self) -> TrackingMode {
        self.config.mode
    }

    pub fn routers(&self) -> impl Iterator<Item = RouterId> + '_ {
        self.trackers.keys().copied()
    }

    pub fn node_trackers(&self) -> impl Iterator<Item = &NodeConvergenceTracker> {
        self.trackers.values()
    }

    pub fn node_tracker(&self, router: RouterId) -> Option<&NodeConvergenceTracker> {
        self.trackers.get(&router)
    }

    /// Aggregate state: active if any child is active, created if no child
    /// was ever started, stopped otherwise.
    pub fn state(&self) -> TrackingState {
        let mut state = TrackingState::Created;
        for tracker in self.trackers.values() {
            match tracker.state() {
                TrackingState::Active => return TrackingState::Active,
                TrackingState::Stopped => state = TrackingState::Stopped,
                TrackingState::Created => (),
            }
        }
        state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state() == TrackingState::Active
    }

    #[inline]
    pub fn phase_start(&self) -> Option<SimTime> {
        self.phase_start
    }

    #[inline]
    pub fn phase_end(&self) -> Option<SimTime> {
        self.phase_end
    }

    /// Start all the node trackers at the current instant of `scheduler`.
    ///
    /// Every router's table is fetched first as the baseline; if any of them
    /// cannot be rendered nothing is started. A repeating poll is then armed
    /// for each router, first firing one `poll_interval` from now. Starting
    /// an active tracker restarts it (previous timers are cancelled).
    ///
    /// `id` is the identifier under which the `host` knows this tracker.
    pub fn start<C, R>(
        &mut self,
        id: TrackerId,
        routing: &R,
        scheduler: &mut Scheduler<C>,
    ) -> Result<(), ConvergenceError>
    where
        C: ConvergenceHost,
        R: RoutingTables + ?Sized,
    {
        let now = scheduler.now();

        let baselines = self
            .trackers
            .keys()
            .map(|&router| routing.routing_table(router).map(|table| (router, table)))
            .collect::<Result<Vec<_>, _>>()?;

        self.stop(scheduler);

        let interval = self.config.poll_interval;
        for (router, baseline) in baselines {
            let timer = scheduler.schedule_repeating(
                interval,
                interval,
                move |host: &mut C, scheduler: &mut Scheduler<C>| {
                    host.poll_router(id, router, scheduler.now())
                },
            )?;

            if let Some(tracker) = self.trackers.get_mut(&router) {
                tracker.start(now, baseline);
                if let Some(previous) = tracker.attach_timer(timer) {
                    scheduler.cancel(previous);
                }
            }
        }

        self.phase_start = Some(now);
        self.phase_end = None;
        log::debug!(
            "tracker {id} started at {now} over {} routers, polling every {:?}",
            self.trackers.len(),
            interval
        );

        Ok(())
    }

    /// Stop all the node trackers and cancel their polling timers.
    ///
    /// Idempotent; a no-op on a tracker that was never started.
    pub fn stop<C>(&mut self, scheduler: &mut Scheduler<C>) {
        let was_active = self.is_active();

        for tracker in self.trackers.values_mut() {
            if let Some(timer) = tracker.stop() {
                scheduler.cancel(timer);
            }
        }

        if was_active {
            self.phase_end = Some(scheduler.now());
        }
    }

    /// Poll the tracker of `router` (called by the [`ConvergenceHost`] when
    /// the router's timer fires).
    pub fn poll<R>(
        &mut self,
        router: RouterId,
        now: SimTime,
        routing: &R,
    ) -> Result<bool, ConvergenceError>
    where
        R: RoutingTables + ?Sized,
    {
        let tracker = self
            .trackers
            .get_mut(&router)
            .ok_or(ConvergenceError::NotMonitored { router })?;

        Ok(tracker.poll(now, routing)?)
    }

    /// The instant the last router stopped changing, `None` if the tracker
    /// never started.
    pub fn stabilized_at(&self) -> Option<SimTime> {
        let started = self.phase_start?;

        let last_change = self
            .trackers
            .values()
            .map(NodeConvergenceTracker::last_change)
            .max()
            .unwrap_or(started);

        Some(last_change.max(started))
    }

    /// Time from the start of the phase to the last change of any router.
    ///
    /// Zero if nothing changed during the phase or the tracker never
    /// started.
    pub fn convergence_duration(&self) -> Duration {
        match (self.phase_start, self.stabilized_at()) {
            (Some(start), Some(stable)) => stable.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// The convergence as configured by [`TrackerConfig::measure`].
    pub fn convergence(&self) -> Convergence {
        match self.config.measure {
            ConvergenceMeasure::Elapsed => Convergence::Elapsed(self.convergence_duration()),
            ConvergenceMeasure::StabilizedAt => {
                Convergence::StabilizedAt(self.stabilized_at().unwrap_or(SimTime::ZERO))
            }
        }
    }

    /// total number of changes observed across all the routers
    pub fn changes(&self) -> u64 {
        self.trackers.values().map(NodeConvergenceTracker::changes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{RoutingError, RoutingStateSnapshot};
    use std::collections::HashMap;

    /// Routing tables scripted as a list of `(from, table)` per router.
    #[derive(Default)]
    struct Scripted {
        scripts: HashMap<RouterId, Vec<(SimTime, &'static str)>>,
        now: SimTime,
    }

    impl Scripted {
        fn routers(n: u64) -> Self {
            let mut scripted = Self::default();
            for router in 1..=n {
                scripted
                    .scripts
                    .insert(RouterId::new(router), vec![(SimTime::ZERO, "initial")]);
            }
            scripted
        }

        fn change(&mut self, router: u64, at: SimTime, table: &'static str) -> &mut Self {
            let script = self.scripts.entry(RouterId::new(router)).or_default();
            script.push((at, table));
            script.sort_by_key(|(at, _)| *at);
            self
        }
    }

    impl RoutingTables for Scripted {
        fn routing_table(&self, router: RouterId) -> Result<RoutingStateSnapshot, RoutingError> {
            let script = self
                .scripts
                .get(&router)
                .ok_or(RoutingError::UnknownRouter { router })?;
            let table = script
                .iter()
                .take_while(|(at, _)| *at <= self.now)
                .last()
                .map(|(_, table)| *table)
                .unwrap_or("");
            Ok(RoutingStateSnapshot::new(table))
        }
    }

    struct Host {
        routing: Scripted,
        trackers: Vec<NetworkConvergenceTracker>,
    }

    impl ConvergenceHost for Host {
        fn poll_router(
            &mut self,
            tracker: TrackerId,
            router: RouterId,
            now: SimTime,
        ) -> anyhow::Result<()> {
            self.routing.now = now;
            self.trackers[tracker.index()].poll(router, now, &self.routing)?;
            Ok(())
        }
    }

    fn routers(n: u64) -> Vec<RouterId> {
        (1..=n).map(RouterId::new).collect()
    }

    fn host(routing: Scripted, n: u64, config: TrackerConfig) -> Host {
        Host {
            routing,
            trackers: vec![NetworkConvergenceTracker::new(routers(n), config).unwrap()],
        }
    }

    /// run one phase of the first tracker over `[start, stop]`
    fn run_phase(host: &mut Host, start: SimTime, stop: SimTime) {
        let mut scheduler = Scheduler::<Host>::new();
        let id = TrackerId::new(0);

        scheduler
            .schedule_at(start, move |host: &mut Host, scheduler: &mut Scheduler<Host>| {
                host.routing.now = scheduler.now();
                let Host { routing, trackers } = host;
                trackers[id.index()].start(id, &*routing, scheduler)?;
                Ok(())
            })
            .unwrap();
        scheduler
            .schedule_at(stop, move |host: &mut Host, scheduler: &mut Scheduler<Host>| {
                host.trackers[id.index()].stop(scheduler);
                Ok(())
            })
            .unwrap();

        scheduler.run_until(host, stop + Duration::from_secs(10)).unwrap();
        assert!(scheduler.is_empty(), "no poll survives the stop");
    }

    #[test]
    fn empty_router_set() {
        assert!(matches!(
            NetworkConvergenceTracker::new([], TrackerConfig::default()),
            Err(ConvergenceError::NoRouters)
        ));
    }

    #[test]
    fn never_started() {
        let tracker =
            NetworkConvergenceTracker::new(routers(3), TrackerConfig::default()).unwrap();

        assert_eq!(tracker.state(), TrackingState::Created);
        assert_eq!(tracker.stabilized_at(), None);
        assert_eq!(tracker.convergence_duration(), Duration::ZERO);
    }

    #[test]
    fn quiescent_network_converges_immediately() {
        let mut host = host(Scripted::routers(3), 3, TrackerConfig::default());

        run_phase(&mut host, SimTime::from_secs(100), SimTime::from_secs(200));

        let tracker = &host.trackers[0];
        assert_eq!(tracker.state(), TrackingState::Stopped);
        assert_eq!(tracker.convergence_duration(), Duration::ZERO);
        assert_eq!(tracker.stabilized_at(), Some(SimTime::from_secs(100)));
        assert_eq!(tracker.phase_end(), Some(SimTime::from_secs(200)));
        assert_eq!(tracker.changes(), 0);
    }

    #[test]
    fn quiescent_network_absolute_measure() {
        let config = TrackerConfig {
            measure: ConvergenceMeasure::StabilizedAt,
            ..TrackerConfig::default()
        };
        let mut host = host(Scripted::routers(3), 3, config);

        run_phase(&mut host, SimTime::ZERO, SimTime::from_secs(100));

        assert_eq!(
            host.trackers[0].convergence(),
            Convergence::StabilizedAt(SimTime::ZERO)
        );
    }

    #[test]
    fn fault_triggered_change() {
        let mut routing = Scripted::routers(3);
        routing
            .change(1, SimTime::from_millis(100_050), "r1 after fault")
            .change(2, SimTime::from_millis(102_000), "r2 after fault")
            .change(3, SimTime::from_millis(103_700), "r3 reroute")
            .change(3, SimTime::from_millis(105_250), "r3 after fault");
        let mut host = host(routing, 3, TrackerConfig::default());

        run_phase(&mut host, SimTime::from_secs(100), SimTime::from_secs(200));

        let convergence = host.trackers[0].convergence_duration();
        let expected = Duration::from_millis(5_300);
        let interval = TrackerConfig::default().poll_interval;
        assert!(convergence >= expected.saturating_sub(interval));
        assert!(convergence <= expected + interval);
        // with a change at 105.25s the next poll is exactly at 105.3s
        assert_eq!(convergence, expected);
        assert_eq!(host.trackers[0].changes(), 4);
    }

    #[test]
    fn last_router_to_change_wins_in_any_order() {
        let change_at = [
            SimTime::from_millis(10_500),
            SimTime::from_millis(12_000),
            SimTime::from_millis(17_300),
        ];
        let permutations = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for permutation in permutations {
            let mut routing = Scripted::routers(3);
            for (router, &slot) in (1..=3).zip(permutation.iter()) {
                routing.change(router, change_at[slot], "changed");
            }
            let mut host = host(routing, 3, TrackerConfig::default());

            run_phase(&mut host, SimTime::from_secs(10), SimTime::from_secs(30));

            let tracker = &host.trackers[0];
            assert_eq!(
                tracker.stabilized_at(),
                Some(SimTime::from_millis(17_300)),
                "permutation {permutation:?}"
            );
            assert_eq!(
                tracker.convergence_duration(),
                Duration::from_millis(7_300),
                "permutation {permutation:?}"
            );
        }
    }

    #[test]
    fn changes_after_stop_are_ignored() {
        let mut routing = Scripted::routers(2);
        routing
            .change(1, SimTime::from_secs(5), "during")
            .change(2, SimTime::from_secs(50), "after stop");
        let mut host = host(routing, 2, TrackerConfig::default());

        run_phase(&mut host, SimTime::ZERO, SimTime::from_secs(20));

        assert_eq!(
            host.trackers[0].convergence_duration(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn stop_is_idempotent() {
        let mut scheduler = Scheduler::<Host>::new();
        let mut tracker =
            NetworkConvergenceTracker::new(routers(2), TrackerConfig::default()).unwrap();

        tracker.stop(&mut scheduler);
        assert_eq!(tracker.state(), TrackingState::Created);
        assert_eq!(tracker.phase_end(), None);

        let routing = Scripted::routers(2);
        tracker
            .start(TrackerId::new(0), &routing, &mut scheduler)
            .unwrap();
        assert_eq!(scheduler.len(), 2);

        tracker.stop(&mut scheduler);
        tracker.stop(&mut scheduler);
        assert_eq!(tracker.state(), TrackingState::Stopped);
        assert_eq!(tracker.phase_end(), Some(SimTime::ZERO));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn restart_does_not_leak_timers() {
        let mut scheduler = Scheduler::<Host>::new();
        let mut tracker =
            NetworkConvergenceTracker::new(routers(3), TrackerConfig::default()).unwrap();
        let routing = Scripted::routers(3);

        tracker
            .start(TrackerId::new(0), &routing, &mut scheduler)
            .unwrap();
        tracker
            .start(TrackerId::new(0), &routing, &mut scheduler)
            .unwrap();

        assert_eq!(scheduler.len(), 3);
    }

    #[test]
    fn start_fails_without_routing_facility() {
        let mut scheduler = Scheduler::<Host>::new();
        let mut tracker =
            NetworkConvergenceTracker::new(routers(3), TrackerConfig::default()).unwrap();
        // router 3 is not known by the routing tables
        let routing = Scripted::routers(2);

        let error = tracker
            .start(TrackerId::new(0), &routing, &mut scheduler)
            .unwrap_err();

        assert!(matches!(
            error,
            ConvergenceError::Routing(RoutingError::UnknownRouter { router }) if router == RouterId::new(3)
        ));
        assert_eq!(tracker.state(), TrackingState::Created);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn poll_unknown_router() {
        let mut tracker =
            NetworkConvergenceTracker::new(routers(1), TrackerConfig::default()).unwrap();
        let routing = Scripted::routers(1);

        assert!(matches!(
            tracker.poll(RouterId::new(9), SimTime::ZERO, &routing),
            Err(ConvergenceError::NotMonitored { .. })
        ));
    }
}
