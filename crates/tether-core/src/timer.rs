//! Timer system for Tether.
//!
//! Provides one-shot and repeating timers. The timer manager does not run
//! anything on its own: a driver asks for [`TimerManager::next_deadline`],
//! waits until then, and calls [`TimerManager::process_expired`] to learn
//! which timers fired.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::clock::{Clock, SystemClock};
use crate::error::TimerError;

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

/// The type of timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once after the specified duration.
    OneShot,
    /// Fires repeatedly at the specified interval.
    Repeating,
}

/// Internal timer data.
#[derive(Debug)]
struct TimerData {
    /// When this timer should next fire.
    next_fire: Instant,
    /// The interval for repeating timers.
    interval: Duration,
    kind: TimerKind,
}

/// An entry in the timer queue (min-heap by fire time).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.fire_time.cmp(&self.fire_time)
    }
}

/// Owns every pending timer of one connection session.
pub struct TimerManager {
    clock: Arc<dyn Clock>,
    timers: SlotMap<TimerId, TimerData>,
    /// Priority queue of pending timer fires. May hold entries for stopped
    /// timers or superseded fire times; those are skipped lazily.
    queue: BinaryHeap<TimerQueueEntry>,
}

impl TimerManager {
    /// Create a timer manager on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a timer manager that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
        }
    }

    /// The clock this manager reads time from.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start a one-shot timer that fires after the specified duration.
    ///
    /// Returns the timer ID that can be used to cancel the timer.
    pub fn start_one_shot(&mut self, duration: Duration) -> TimerId {
        self.insert(duration, TimerKind::OneShot)
    }

    /// Start a repeating timer that fires at the specified interval.
    ///
    /// The first fire occurs after `interval` duration.
    pub fn start_repeating(&mut self, interval: Duration) -> TimerId {
        self.insert(interval, TimerKind::Repeating)
    }

    fn insert(&mut self, interval: Duration, kind: TimerKind) -> TimerId {
        let next_fire = self.clock.now() + interval;
        let id = self.timers.insert(TimerData {
            next_fire,
            interval,
            kind,
        });
        self.queue.push(TimerQueueEntry {
            id,
            fire_time: next_fire,
        });
        tracing::trace!(target: "tether_core::timer", ?id, ?kind, ?interval, "timer started");
        id
    }

    /// Stop and remove a timer.
    ///
    /// Returns an error if the timer is unknown, already stopped, or was a
    /// one-shot timer that has already fired.
    pub fn stop(&mut self, id: TimerId) -> Result<(), TimerError> {
        match self.timers.remove(id) {
            Some(_) => {
                tracing::trace!(target: "tether_core::timer", ?id, "timer stopped");
                Ok(())
            }
            None => Err(TimerError::InvalidTimerId),
        }
    }

    /// Check if a timer is currently active.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// The instant at which the next timer fires, if any.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_stale_entries();
        self.queue.peek().map(|entry| entry.fire_time)
    }

    /// Get the duration until the next timer fires, if any.
    pub fn time_until_next(&mut self) -> Option<Duration> {
        let deadline = self.next_deadline()?;
        Some(deadline.saturating_duration_since(self.clock.now()))
    }

    /// Process all timers that should fire now.
    ///
    /// Returns the fired timer IDs in fire-time order. One-shot timers are
    /// removed; repeating timers are rescheduled one interval from now.
    #[tracing::instrument(skip(self), target = "tether_core::timer", level = "trace")]
    pub fn process_expired(&mut self) -> Vec<TimerId> {
        let now = self.clock.now();
        let mut fired = Vec::new();
        // Requeued after the scan so a zero interval cannot spin forever.
        let mut rescheduled = Vec::new();

        while let Some(entry) = self.queue.peek().copied() {
            if entry.fire_time > now {
                break;
            }
            self.queue.pop();

            let Some(timer) = self.timers.get_mut(entry.id) else {
                continue;
            };
            if timer.next_fire != entry.fire_time {
                continue;
            }

            tracing::trace!(target: "tether_core::timer", id = ?entry.id, "timer fired");
            fired.push(entry.id);

            match timer.kind {
                TimerKind::OneShot => {
                    self.timers.remove(entry.id);
                }
                TimerKind::Repeating => {
                    timer.next_fire = now + timer.interval;
                    rescheduled.push(TimerQueueEntry {
                        id: entry.id,
                        fire_time: timer.next_fire,
                    });
                }
            }
        }

        self.queue.extend(rescheduled);
        fired
    }

    /// Get the number of active timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    fn discard_stale_entries(&mut self) {
        while let Some(entry) = self.queue.peek() {
            let live = self
                .timers
                .get(entry.id)
                .is_some_and(|t| t.next_fire == entry.fire_time);
            if live {
                break;
            }
            self.queue.pop();
        }
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerManager")
            .field("active", &self.timers.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}
