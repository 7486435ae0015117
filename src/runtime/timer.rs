//! Deferred jobs.
//!
//! Work that the firmware would hand to a kernel work queue or timer (connect
//! retries, heartbeat republishing, periodic sampling) is represented as a `Job`
//! message. Jobs sit in a `TimerQueue` until their deadline and are then handed,
//! one at a time, to the dispatcher.
//!
//! The queue uses virtual time: the owner moves it forward with `advance_to`.
//! This keeps the queue usable without a time driver and makes its behaviour
//! fully deterministic.

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::error::TimerError;

/// Work that can be deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Job {
    /// Try to connect to the cloud.
    ConnectRetry,
    /// Publish the static heartbeat message.
    Heartbeat,
    /// Sample the sensor and publish the reading.
    Sample,
}

/// Identifies a scheduled job so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerHandle(u32);

/// Object-safe interface for scheduling and cancelling jobs.
pub trait Scheduler {
    /// Runs `job` once after `delay`.
    fn schedule_once(&mut self, delay: Duration, job: Job) -> Result<TimerHandle, TimerError>;

    /// Runs `job` now, then every `period`.
    fn schedule_periodic(&mut self, period: Duration, job: Job)
    -> Result<TimerHandle, TimerError>;

    /// Cancels a scheduled job.
    ///
    /// Returns `false` if the job is no longer pending (it already ran, or has
    /// already been handed out for execution). Cancellation is best-effort.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Whether the job behind `handle` is still waiting to run.
    fn is_pending(&self, handle: TimerHandle) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    handle: TimerHandle,
    job: Job,
    deadline: Instant,
    period: Option<Duration>,
}

/// A fixed-capacity queue of deferred jobs.
pub struct TimerQueue<const N: usize> {
    entries: Vec<Entry, N>,
    now: Instant,
    next_id: u32,
}

impl<const N: usize> TimerQueue<N> {
    /// Create an empty queue whose clock starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            entries: Vec::new(),
            now,
            next_id: 0,
        }
    }

    /// The queue's current notion of time.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Moves the clock forward. Going backwards is ignored.
    pub fn advance_to(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Removes and returns the next job whose deadline has passed.
    ///
    /// Jobs are returned in deadline order, ties in scheduling order. A
    /// periodic job is re-armed for its next period; periods that were missed
    /// entirely are skipped rather than replayed.
    pub fn pop_due(&mut self) -> Option<Job> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.deadline <= self.now)
            .min_by_key(|(_, e)| (e.deadline, e.handle.0))
            .map(|(i, _)| i)?;

        let entry = self.entries[index];
        match entry.period {
            Some(period) => {
                let mut next = entry.deadline + period;
                if next <= self.now {
                    next = self.now + period;
                }
                self.entries[index].deadline = next;
            }
            None => {
                self.entries.swap_remove(index);
            }
        }
        Some(entry.job)
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(
        &mut self,
        job: Job,
        deadline: Instant,
        period: Option<Duration>,
    ) -> Result<TimerHandle, TimerError> {
        let handle = TimerHandle(self.next_id);
        self.entries
            .push(Entry {
                handle,
                job,
                deadline,
                period,
            })
            .map_err(|_| TimerError::QueueFull)?;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(handle)
    }
}

impl<const N: usize> Scheduler for TimerQueue<N> {
    fn schedule_once(&mut self, delay: Duration, job: Job) -> Result<TimerHandle, TimerError> {
        let deadline = self.now + delay;
        self.insert(job, deadline, None)
    }

    fn schedule_periodic(
        &mut self,
        period: Duration,
        job: Job,
    ) -> Result<TimerHandle, TimerError> {
        // A zero period would stay due forever.
        if period.as_ticks() == 0 {
            return Err(TimerError::ZeroPeriod);
        }
        let deadline = self.now;
        self.insert(job, deadline, Some(period))
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.entries.iter().position(|e| e.handle == handle) {
            Some(index) => {
                self.entries.swap_remove(index);
                true
            }
            None => false,
        }
    }

    fn is_pending(&self, handle: TimerHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }
}
