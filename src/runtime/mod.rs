//! Cloud Runtime
//!
//! Drives a `CloudAgent` from an async task.
//!
//! # Overview
//!
//! The runtime is a single dispatch loop. It waits for whichever comes first:
//! - a link-layer event posted through the `CloudEventChannel`
//! - the deadline of the next deferred job in the agent's timer queue
//!
//! and hands it to the agent. Only one event or job is processed at a time, so
//! the agent's state needs no locking.
//!
//! # Startup
//!
//! Before the first connect attempt the runtime waits on a `LinkSignal`, raised
//! by the modem/network driver once it is registered on the network. This is
//! the only place where the runtime blocks for an unbounded time.
//!
//! # Example
//!
//! ```ignore
//! static EVENTS: CloudEventChannel<4> = CloudEventChannel::new();
//! static LINK: LinkSignal = LinkSignal::new();
//!
//! let agent = CloudAgent::new(config, transport, sensor, clock, Instant::now())?;
//! let mut runtime = CloudRuntime::new(agent, EVENTS.receiver(), &LINK);
//! runtime.run().await;
//! ```

pub(crate) mod dispatcher;
pub(crate) mod publisher;
pub(crate) mod supervisor;
pub(crate) mod timer;

use core::pin::pin;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use futures::future::{Either, select};

pub use dispatcher::{CloudAgent, DEFAULT_TIMER_SLOTS, MIN_TIMER_SLOTS};
pub use publisher::PublicationScheduler;
pub use supervisor::{ConnectOutcome, ConnectionState, ConnectionSupervisor, RetrySchedule};
pub use timer::{Job, Scheduler, TimerHandle, TimerQueue};

use crate::telemetry::{Clock, SensorSource};
use crate::transport::{CloudEventReceiver, CloudTransport};

/// Raised by the link layer once the network is available.
pub type LinkSignal = Signal<CriticalSectionRawMutex, ()>;

/// How long to sleep when no job is pending; events still wake the loop.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// The async dispatch loop around a `CloudAgent`.
pub struct CloudRuntime<'a, T, S, C, const DEPTH: usize, const TIMERS: usize = DEFAULT_TIMER_SLOTS>
{
    agent: CloudAgent<T, S, C, TIMERS>,
    events: CloudEventReceiver<'a, DEPTH>,
    link: &'a LinkSignal,
}

impl<'a, T, S, C, const DEPTH: usize, const TIMERS: usize> CloudRuntime<'a, T, S, C, DEPTH, TIMERS>
where
    T: CloudTransport,
    S: SensorSource,
    C: Clock,
{
    pub fn new(
        agent: CloudAgent<T, S, C, TIMERS>,
        events: CloudEventReceiver<'a, DEPTH>,
        link: &'a LinkSignal,
    ) -> Self {
        Self {
            agent,
            events,
            link,
        }
    }

    pub fn agent(&mut self) -> &mut CloudAgent<T, S, C, TIMERS> {
        &mut self.agent
    }

    /// Waits for the link, then processes events and jobs forever.
    pub async fn run(&mut self) -> ! {
        info!("Connecting to LTE network, this may take several minutes...");
        self.link.wait().await;
        info!("Connected to LTE network");

        self.agent.advance_to(Instant::now());
        self.agent.start();

        loop {
            self.step().await;
        }
    }

    /// Processes one event or one batch of due jobs. Jobs that came due while
    /// the event was pending run right after it.
    pub async fn step(&mut self) {
        let deadline = self
            .agent
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + IDLE_WAIT);

        let event = match select(pin!(self.events.receive()), pin!(Timer::at(deadline))).await {
            Either::Left((event, _)) => Some(event),
            Either::Right(((), _)) => None,
        };

        match event {
            Some(event) => self.agent.dispatch(Instant::now(), event.as_event()).await,
            None => self.agent.run_due(Instant::now()).await,
        }
    }
}
