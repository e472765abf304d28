//! Virtual-time discrete event scheduler.
//!
//! The [`Scheduler`] drives the whole experiment: every tracker poll, fault
//! injection and flow sampling is a callback queued at a [`SimTime`] and
//! executed in order of that time. Callbacks due at the same instant are
//! executed in the order they were scheduled (FIFO).
//!
//! The scheduler is parameterised over the context `C` the callbacks
//! operate on. The context is owned by the caller of [`Scheduler::run_until`]
//! and lent mutably to each callback in turn; there is no shared state and
//! no locking.

use crate::time::SimTime;
use anyhow::Result;
use core::{cmp::Reverse, fmt};
use std::{
    collections::{BinaryHeap, HashSet},
    time::Duration,
};
use thiserror::Error;

/// Callback executed once at its due time.
pub type Action<C> = Box<dyn FnOnce(&mut C, &mut Scheduler<C>) -> Result<()>>;

/// Callback executed every time a repeating timer fires.
pub type RepeatingAction<C> = Box<dyn FnMut(&mut C, &mut Scheduler<C>) -> Result<()>>;

/// Handle on a scheduled callback, used to [cancel] it.
///
/// [cancel]: Scheduler::cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Cannot schedule an event at {at}: the simulation is already at {now}")]
    InThePast { at: SimTime, now: SimTime },
    #[error("A repeating timer needs a non zero interval")]
    ZeroInterval,
}

enum Task<C> {
    Once(Action<C>),
    Every {
        interval: Duration,
        action: RepeatingAction<C>,
    },
}

struct Entry<C> {
    due: SimTime,
    /// schedule order, breaks ties between entries due at the same instant
    seq: u64,
    timer: TimerId,
    task: Task<C>,
}

impl<C> PartialEq for Entry<C> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<C> Eq for Entry<C> {}

impl<C> PartialOrd for Entry<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Entry<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

pub struct Scheduler<C> {
    now: SimTime,

    queue: BinaryHeap<Reverse<Entry<C>>>,

    /// timers that are scheduled and neither fired (one-shot) nor cancelled
    live: HashSet<TimerId>,

    next_seq: u64,
    next_timer: u64,
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            queue: BinaryHeap::new(),
            live: HashSet::new(),
            next_seq: 0,
            next_timer: 0,
        }
    }

    /// the current virtual instant
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// number of pending (not cancelled) timers
    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    #[inline]
    pub fn is_pending(&self, timer: TimerId) -> bool {
        self.live.contains(&timer)
    }

    /// the due time of the next pending event, if any
    pub fn next_due(&self) -> Option<SimTime> {
        self.queue
            .iter()
            .filter(|Reverse(entry)| self.live.contains(&entry.timer))
            .map(|Reverse(entry)| entry.due)
            .min()
    }

    /// Schedule `action` to be executed at the instant `at`.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::InThePast`] if `at` is before [`Scheduler::now`].
    /// Scheduling at exactly `now` is allowed: the action executes after
    /// every action already queued for this instant.
    pub fn schedule_at<F>(&mut self, at: SimTime, action: F) -> Result<TimerId, ScheduleError>
    where
        F: FnOnce(&mut C, &mut Scheduler<C>) -> Result<()> + 'static,
    {
        if at < self.now {
            return Err(ScheduleError::InThePast { at, now: self.now });
        }

        Ok(self.push(at, None, Task::Once(Box::new(action))))
    }

    /// Schedule `action` to be executed `delay` after [`Scheduler::now`].
    pub fn schedule<F>(&mut self, delay: Duration, action: F) -> TimerId
    where
        F: FnOnce(&mut C, &mut Scheduler<C>) -> Result<()> + 'static,
    {
        let at = self.now + delay;
        self.push(at, None, Task::Once(Box::new(action)))
    }

    /// Schedule `action` to be executed `delay` after [`Scheduler::now`] and
    /// then every `interval` until the returned timer is [cancelled].
    ///
    /// [cancelled]: Scheduler::cancel
    pub fn schedule_repeating<F>(
        &mut self,
        delay: Duration,
        interval: Duration,
        action: F,
    ) -> Result<TimerId, ScheduleError>
    where
        F: FnMut(&mut C, &mut Scheduler<C>) -> Result<()> + 'static,
    {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }

        let at = self.now + delay;
        Ok(self.push(
            at,
            None,
            Task::Every {
                interval,
                action: Box::new(action),
            },
        ))
    }

    /// Cancel a pending timer.
    ///
    /// Returns `false` if the timer already fired (one-shot) or was already
    /// cancelled, in which case nothing happens.
    pub fn cancel(&mut self, timer: TimerId) -> bool {
        let cancelled = self.live.remove(&timer);
        if cancelled {
            log::trace!("cancelled timer {timer} at {}", self.now);
        }
        cancelled
    }

    fn push(&mut self, due: SimTime, timer: Option<TimerId>, task: Task<C>) -> TimerId {
        let timer = timer.unwrap_or_else(|| {
            let timer = TimerId(self.next_timer);
            self.next_timer += 1;
            self.live.insert(timer);
            timer
        });
        let seq = self.next_seq;
        self.next_seq += 1;

        self.queue.push(Reverse(Entry {
            due,
            seq,
            timer,
            task,
        }));

        timer
    }

    /// Pop the next live entry due at or before `horizon`, dropping the
    /// cancelled ones on the way.
    fn pop_due(&mut self, horizon: SimTime) -> Option<Entry<C>> {
        loop {
            let Reverse(next) = self.queue.peek()?;
            if next.due > horizon {
                return None;
            }
            let Reverse(entry) = self.queue.pop()?;
            if self.live.contains(&entry.timer) {
                return Some(entry);
            }
        }
    }

    /// Execute every event due at or before `horizon`, in order.
    ///
    /// On return the clock is at `horizon` (unless it was already past it);
    /// events due after the horizon stay queued and never run unless
    /// `run_until` is called again with a later horizon.
    ///
    /// # Errors
    ///
    /// The first error returned by a callback aborts the run and is
    /// returned as is. The clock stays at the instant of the failing event.
    pub fn run_until(&mut self, context: &mut C, horizon: SimTime) -> Result<()> {
        while let Some(Entry {
            due,
            timer,
            task,
            ..
        }) = self.pop_due(horizon)
        {
            self.now = due;
            log::trace!("dispatching timer {timer} at {due}");

            match task {
                Task::Once(action) => {
                    self.live.remove(&timer);
                    action(context, self)?;
                }
                Task::Every {
                    interval,
                    mut action,
                } => {
                    action(context, self)?;
                    // the action may have cancelled its own timer
                    if self.live.contains(&timer) {
                        self.push(due + interval, Some(timer), Task::Every { interval, action });
                    }
                }
            }
        }

        if self.now < horizon {
            self.now = horizon;
        }

        Ok(())
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
