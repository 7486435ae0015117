//! Connection Supervisor.
//!
//! Owns the connection state and the retry schedule. The state machine runs for
//! the lifetime of the device:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Ready
//!       ^                           |          |
//!       +------ Disconnected / Error ----------+
//! ```
//!
//! Every connect attempt re-arms the retry job at the fixed retry interval,
//! whether or not the transport accepted the request, because success is only
//! known once the `Connected` event arrives. `Connected` cancels the pending
//! retry. That cancellation can lose a race with a retry that has already been
//! handed to the dispatcher; such a retry then hits the guard in
//! `attempt_connect` and does nothing.
//!
//! Only the loss of a live session triggers an immediate attempt. Errors
//! reported while the session is still down leave the retry interval alone.

use embassy_time::Duration;

use crate::fmt::Dbg;
use crate::runtime::timer::{Job, Scheduler, TimerHandle};
use crate::transport::CloudTransport;

/// State of the cloud session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
}

impl ConnectionState {
    /// Outbound sends are only allowed in `Connected` and `Ready`.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }
}

/// What `attempt_connect` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectOutcome {
    /// Already connected; nothing was done and no retry was armed.
    Skipped,
    /// The transport accepted the connect request.
    Requested,
    /// The transport rejected the connect request.
    Failed,
}

/// At most one pending connect retry.
#[derive(Debug)]
pub struct RetrySchedule {
    interval: Duration,
    pending: Option<TimerHandle>,
}

impl RetrySchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Replaces any pending retry with one that fires after `delay`.
    fn arm(&mut self, delay: Duration, scheduler: &mut impl Scheduler) {
        self.cancel(scheduler);
        match scheduler.schedule_once(delay, Job::ConnectRetry) {
            Ok(handle) => self.pending = Some(handle),
            Err(e) => error!("Failed to schedule connection retry: {}", Dbg(&e)),
        }
    }

    /// Best-effort: a retry already handed out for execution still runs.
    fn cancel(&mut self, scheduler: &mut impl Scheduler) -> bool {
        match self.pending.take() {
            Some(handle) => scheduler.cancel(handle),
            None => false,
        }
    }
}

/// Tracks the cloud session and drives reconnection.
pub struct ConnectionSupervisor {
    state: ConnectionState,
    retry: RetrySchedule,
}

impl ConnectionSupervisor {
    pub fn new(retry_interval: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry: RetrySchedule::new(retry_interval),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry(&self) -> &RetrySchedule {
        &self.retry
    }

    /// Schedules the first connect attempt with no delay.
    pub fn start(&mut self, scheduler: &mut impl Scheduler) {
        info!("Connecting to cloud");
        self.retry.arm(Duration::from_secs(0), scheduler);
    }

    /// Asks the transport to connect, then re-arms the retry job.
    ///
    /// Does nothing if the session is already up.
    pub async fn attempt_connect<T: CloudTransport>(
        &mut self,
        transport: &mut T,
        scheduler: &mut impl Scheduler,
    ) -> ConnectOutcome {
        if self.state.is_connected() {
            debug!("Already connected, skipping connection attempt");
            return ConnectOutcome::Skipped;
        }

        self.state = ConnectionState::Connecting;
        let outcome = match transport.connect().await {
            Ok(()) => ConnectOutcome::Requested,
            Err(e) => {
                error!("cloud connect failed, error: {}", Dbg(&e));
                ConnectOutcome::Failed
            }
        };

        info!(
            "Next connection retry in {} seconds",
            self.retry.interval.as_secs()
        );
        self.retry.arm(self.retry.interval, scheduler);
        outcome
    }

    pub fn on_connecting(&mut self) {
        if !self.state.is_connected() {
            self.state = ConnectionState::Connecting;
        }
    }

    pub fn on_connected(&mut self, scheduler: &mut impl Scheduler) {
        self.state = ConnectionState::Connected;
        if self.retry.cancel(scheduler) {
            debug!("Pending connection retry cancelled");
        }
    }

    /// Returns `true` if this is a transition into `Ready`.
    pub fn on_ready(&mut self) -> bool {
        let was_ready = self.state == ConnectionState::Ready;
        self.state = ConnectionState::Ready;
        !was_ready
    }

    /// Link lost (disconnect or error).
    ///
    /// Losing a live session reconnects right away. While already offline the
    /// pending fixed-interval retry is left as it is.
    pub fn on_disconnected(&mut self, scheduler: &mut impl Scheduler) {
        let was_connected = self.state.is_connected();
        self.state = ConnectionState::Disconnected;
        if was_connected {
            self.retry.arm(Duration::from_secs(0), scheduler);
        } else {
            debug!("Link error while offline, keeping retry schedule");
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use embassy_time::Instant;

    use super::*;
    use crate::runtime::timer::TimerQueue;
    use crate::testing::MockTransport;

    const RETRY: Duration = Duration::from_secs(30);

    fn setup() -> (ConnectionSupervisor, MockTransport, TimerQueue<4>) {
        (
            ConnectionSupervisor::new(RETRY),
            MockTransport::default(),
            TimerQueue::new(Instant::from_secs(0)),
        )
    }

    #[test]
    fn starts_disconnected_with_immediate_attempt() {
        let (mut supervisor, _, mut timers) = setup();
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        supervisor.start(&mut timers);
        assert_eq!(timers.pop_due(), Some(Job::ConnectRetry));
    }

    #[test]
    fn attempt_rearms_retry_even_on_success() {
        let (mut supervisor, mut transport, mut timers) = setup();
        let outcome = block_on(supervisor.attempt_connect(&mut transport, &mut timers));

        assert_eq!(outcome, ConnectOutcome::Requested);
        assert_eq!(supervisor.state(), ConnectionState::Connecting);
        assert_eq!(transport.connects, 1);
        assert_eq!(timers.next_deadline(), Some(Instant::from_secs(30)));
    }

    #[test]
    fn failed_attempt_is_not_fatal() {
        let (mut supervisor, mut transport, mut timers) = setup();
        transport.fail_connect = true;
        let outcome = block_on(supervisor.attempt_connect(&mut transport, &mut timers));

        assert_eq!(outcome, ConnectOutcome::Failed);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_deadline(), Some(Instant::from_secs(30)));
    }

    #[test]
    fn connected_cancels_pending_retry() {
        let (mut supervisor, mut transport, mut timers) = setup();
        block_on(supervisor.attempt_connect(&mut transport, &mut timers));
        supervisor.on_connected(&mut timers);

        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert!(timers.is_empty());
    }

    #[test]
    fn in_flight_retry_becomes_a_no_op_once_connected() {
        let (mut supervisor, mut transport, mut timers) = setup();
        block_on(supervisor.attempt_connect(&mut transport, &mut timers));

        timers.advance_to(Instant::from_secs(30));
        assert_eq!(timers.pop_due(), Some(Job::ConnectRetry));
        supervisor.on_connected(&mut timers);

        let outcome = block_on(supervisor.attempt_connect(&mut transport, &mut timers));
        assert_eq!(outcome, ConnectOutcome::Skipped);
        assert_eq!(transport.connects, 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn disconnect_schedules_single_immediate_retry() {
        let (mut supervisor, _, mut timers) = setup();
        supervisor.on_connected(&mut timers);
        supervisor.on_ready();

        supervisor.on_disconnected(&mut timers);
        supervisor.on_disconnected(&mut timers);

        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.pop_due(), Some(Job::ConnectRetry));
    }

    #[test]
    fn errors_while_offline_keep_fixed_interval() {
        let (mut supervisor, mut transport, mut timers) = setup();
        supervisor.start(&mut timers);
        assert_eq!(timers.pop_due(), Some(Job::ConnectRetry));
        block_on(supervisor.attempt_connect(&mut transport, &mut timers));

        for t in 1..=5 {
            timers.advance_to(Instant::from_secs(t));
            supervisor.on_disconnected(&mut timers);
            assert_eq!(timers.pop_due(), None);
        }

        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_deadline(), Some(Instant::from_secs(30)));
    }

    #[test]
    fn ready_reports_transition_once() {
        let (mut supervisor, _, mut timers) = setup();
        supervisor.on_connected(&mut timers);
        assert!(supervisor.on_ready());
        assert!(!supervisor.on_ready());
        assert_eq!(supervisor.state(), ConnectionState::Ready);
    }

    #[test]
    fn connecting_event_does_not_downgrade_live_session() {
        let (mut supervisor, _, mut timers) = setup();
        supervisor.on_connecting();
        assert_eq!(supervisor.state(), ConnectionState::Connecting);
        supervisor.on_connected(&mut timers);
        supervisor.on_connecting();
        assert_eq!(supervisor.state(), ConnectionState::Connected);
    }
}
