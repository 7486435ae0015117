//! Event Dispatcher.
//!
//! `CloudAgent` owns every piece of mutable state of the connectivity manager
//! (connection state, retry schedule, telemetry cadence, heartbeat timer) and is
//! the single entry point for both link-layer events and due jobs. All handlers
//! take `&mut self`, so no two of them ever run at the same time.
//!
//! Handlers never fail: errors are logged here and go no further.

use embassy_time::Instant;

use crate::command::Command;
use crate::config::CloudConfig;
use crate::error::{CloudError, ConfigError};
use crate::fmt::{Dbg, lossy};
use crate::runtime::publisher::PublicationScheduler;
use crate::runtime::supervisor::{ConnectOutcome, ConnectionState, ConnectionSupervisor};
use crate::runtime::timer::{Job, TimerQueue};
use crate::status::DeviceStatus;
use crate::telemetry::{Clock, SensorSource, TelemetryCadence, TelemetrySampler};
use crate::transport::{CloudEvent, CloudTransport};

/// Jobs the agent can have queued at once: one connect retry, one heartbeat,
/// one periodic sample and one one-shot sample. Every producer replaces or
/// folds into its own entry, so the queue never holds more.
pub const MIN_TIMER_SLOTS: usize = 4;

/// Number of timer slots used by default.
pub const DEFAULT_TIMER_SLOTS: usize = 8;

/// The connectivity manager.
///
/// # Type Parameters
///
/// - `T`: the cloud transport
/// - `S`: the sensor source
/// - `C`: the wall clock
/// - `TIMERS`: capacity of the deferred-job queue
pub struct CloudAgent<T, S, C, const TIMERS: usize = DEFAULT_TIMER_SLOTS> {
    config: CloudConfig,
    transport: T,
    supervisor: ConnectionSupervisor,
    publisher: PublicationScheduler,
    sampler: TelemetrySampler<S, C>,
    timers: TimerQueue<TIMERS>,
}

impl<T, S, C, const TIMERS: usize> CloudAgent<T, S, C, TIMERS>
where
    T: CloudTransport,
    S: SensorSource,
    C: Clock,
{
    /// Create a new agent. The timer clock starts at `now`.
    ///
    /// Fails if the configuration is invalid; this is the only fatal error.
    pub fn new(
        config: CloudConfig,
        transport: T,
        sensor: S,
        clock: C,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        const { assert!(TIMERS >= MIN_TIMER_SLOTS, "timer queue too small") };
        config.validate()?;

        let status = config.announce_status.then(DeviceStatus::default);
        Ok(Self {
            config,
            transport,
            supervisor: ConnectionSupervisor::new(config.retry_interval),
            publisher: PublicationScheduler::new(
                config.backend,
                config.publication,
                config.heartbeat_payload,
                status,
            ),
            sampler: TelemetrySampler::new(sensor, clock, config.telemetry_period),
            timers: TimerQueue::new(now),
        })
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn cadence(&self) -> TelemetryCadence {
        self.sampler.cadence()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timers(&self) -> &TimerQueue<TIMERS> {
        &self.timers
    }

    /// Moves the agent's clock forward.
    pub fn advance_to(&mut self, now: Instant) {
        self.timers.advance_to(now);
    }

    /// Deadline of the next pending job.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Schedules the first connect attempt. Call once the link layer is up.
    pub fn start(&mut self) {
        self.supervisor.start(&mut self.timers);
    }

    /// Publishes the heartbeat message as soon as possible.
    pub fn request_publication(&mut self) {
        if let Err(e) = self.publisher.request_heartbeat(&mut self.timers) {
            error!("Failed to schedule publication: {}", Dbg(&e));
        }
    }

    /// Advances the clock to `now` and runs every job that became due.
    pub async fn run_due(&mut self, now: Instant) {
        self.advance_to(now);
        while let Some(job) = self.timers.pop_due() {
            self.handle_job(job).await;
        }
    }

    /// Handles one event at `now`, then runs every job that became due.
    ///
    /// Running due jobs after each event keeps a busy event stream from
    /// delaying retries and samples.
    pub async fn dispatch(&mut self, now: Instant, event: CloudEvent<'_>) {
        self.advance_to(now);
        self.handle_event(event).await;
        self.run_due(now).await;
    }

    /// Runs one deferred job.
    pub async fn handle_job(&mut self, job: Job) {
        trace!("Running job {}", Dbg(&job));
        match job {
            Job::ConnectRetry => {
                let outcome = self
                    .supervisor
                    .attempt_connect(&mut self.transport, &mut self.timers)
                    .await;
                if outcome == ConnectOutcome::Skipped {
                    trace!("Connection retry was a no-op");
                }
            }
            Job::Heartbeat => {
                let state = self.supervisor.state();
                let result = self
                    .publisher
                    .publish_heartbeat(state, &mut self.transport, &mut self.timers)
                    .await;
                report("heartbeat", result);
            }
            Job::Sample => self.publish_sample().await,
        }
    }

    /// Handles one link-layer event.
    pub async fn handle_event(&mut self, event: CloudEvent<'_>) {
        match event {
            CloudEvent::Connecting => {
                info!("CLOUD_EVT_CONNECTING");
                self.supervisor.on_connecting();
            }
            CloudEvent::Connected => {
                info!("CLOUD_EVT_CONNECTED");
                self.supervisor.on_connected(&mut self.timers);
            }
            CloudEvent::Ready => {
                info!("CLOUD_EVT_READY");
                if !self.supervisor.on_ready() {
                    debug!("Cloud already ready");
                }
                self.publisher.on_ready(&mut self.timers);
                let state = self.supervisor.state();
                let result = self
                    .publisher
                    .announce_status(state, &mut self.transport)
                    .await;
                report("device status", result);
            }
            CloudEvent::Disconnected => {
                info!("CLOUD_EVT_DISCONNECTED");
                self.on_link_lost();
            }
            CloudEvent::Error => {
                warn!("CLOUD_EVT_ERROR");
                self.on_link_lost();
            }
            CloudEvent::DataSent => info!("CLOUD_EVT_DATA_SENT"),
            CloudEvent::DataReceived(payload) => {
                info!("CLOUD_EVT_DATA_RECEIVED");
                info!("Data received from cloud: {}", lossy(payload));
                self.handle_command(payload);
            }
            CloudEvent::PairRequest => info!("CLOUD_EVT_PAIR_REQUEST"),
            CloudEvent::PairDone => info!("CLOUD_EVT_PAIR_DONE"),
            CloudEvent::FotaDone => info!("CLOUD_EVT_FOTA_DONE"),
            CloudEvent::FotaError => warn!("CLOUD_EVT_FOTA_ERROR"),
            CloudEvent::Unknown(code) => info!("Unknown cloud event type: {}", code),
        }
    }

    fn on_link_lost(&mut self) {
        self.supervisor.on_disconnected(&mut self.timers);
        self.publisher.on_disconnected();
    }

    fn handle_command(&mut self, payload: &[u8]) {
        let command = match Command::parse(payload) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!("No command recognized");
                return;
            }
            Err(e) => {
                warn!("Rejected cloud command: {}", Dbg(&e));
                return;
            }
        };

        let result = match command {
            Command::ReadOnce => {
                info!("Temperature read command received");
                self.sampler.trigger_once(&mut self.timers)
            }
            Command::StartPeriodic => {
                info!("Starting continuous temperature readouts");
                let period = self.config.telemetry_period;
                self.sampler.start_periodic(period, &mut self.timers)
            }
            Command::StopPeriodic => {
                info!("Stopping continuous temperature readouts");
                self.sampler.stop_periodic(&mut self.timers);
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("Failed to schedule temperature readout: {}", Dbg(&e));
        }
    }

    async fn publish_sample(&mut self) {
        let payload = match self.sampler.sample().await.and_then(|r| r.format()) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Skipping telemetry publication: {}", Dbg(&e));
                return;
            }
        };

        let state = self.supervisor.state();
        let result = self
            .publisher
            .publish(state, &mut self.transport, payload.as_bytes())
            .await;
        report("telemetry", result);
    }
}

fn report<E: core::fmt::Debug>(what: &str, result: Result<(), CloudError<E>>) {
    match result {
        Ok(()) => {}
        Err(CloudError::NotConnected) => debug!("Dropped {} publication: not connected", what),
        Err(e) => error!("Failed to publish {}: {}", what, Dbg(&e)),
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use embassy_time::Duration;

    use super::*;
    use crate::config::{Backend, PublicationMode};
    use crate::telemetry::SensorValue;
    use crate::testing::{MockClock, MockSensor, MockTransport};
    use crate::transport::Endpoint;

    type Agent = CloudAgent<MockTransport, MockSensor, MockClock>;

    fn secs(s: u64) -> Instant {
        Instant::from_secs(s)
    }

    fn agent_with(config: CloudConfig, sensor: MockSensor) -> Agent {
        CloudAgent::new(
            config,
            MockTransport::default(),
            sensor,
            MockClock::at(1_700_000_000_000),
            secs(0),
        )
        .unwrap()
    }

    fn agent() -> Agent {
        agent_with(
            CloudConfig::default(),
            MockSensor::reading(SensorValue::new(21, 0)),
        )
    }

    fn connect(agent: &mut Agent) {
        block_on(agent.handle_event(CloudEvent::Connected));
        block_on(agent.handle_event(CloudEvent::Ready));
    }

    fn telemetry_sent(agent: &Agent) -> usize {
        agent
            .transport()
            .sent
            .iter()
            .filter(|(_, p)| p.starts_with(b"{\n\"appId\": \"TEMP\""))
            .count()
    }

    #[test]
    fn invalid_config_is_fatal() {
        let config = CloudConfig::default().with_retry_interval(Duration::from_secs(0));
        let result = CloudAgent::<_, _, _>::new(
            config,
            MockTransport::default(),
            MockSensor::failing(),
            MockClock::at(0),
            secs(0),
        );
        assert!(matches!(result, Err(ConfigError::ZeroRetryInterval)));
    }

    #[test]
    fn start_issues_immediate_attempt_then_retries_at_interval() {
        let mut agent = agent();
        agent.start();

        block_on(agent.run_due(secs(0)));
        assert_eq!(agent.transport().connects, 1);
        assert_eq!(agent.state(), ConnectionState::Connecting);

        block_on(agent.run_due(secs(29)));
        assert_eq!(agent.transport().connects, 1);

        block_on(agent.run_due(secs(30)));
        assert_eq!(agent.transport().connects, 2);
    }

    #[test]
    fn no_retry_fires_after_connected() {
        let mut agent = agent();
        agent.start();
        block_on(agent.run_due(secs(0)));
        block_on(agent.handle_event(CloudEvent::Connected));

        block_on(agent.run_due(secs(600)));
        assert_eq!(agent.transport().connects, 1);
        assert_eq!(agent.state(), ConnectionState::Connected);
    }

    #[test]
    fn disconnect_triggers_one_immediate_attempt_then_fixed_interval() {
        let mut agent = agent();
        connect(&mut agent);
        agent.advance_to(secs(100));

        block_on(agent.handle_event(CloudEvent::Disconnected));
        assert_eq!(agent.state(), ConnectionState::Disconnected);

        block_on(agent.run_due(secs(100)));
        assert_eq!(agent.transport().connects, 1);

        block_on(agent.run_due(secs(129)));
        assert_eq!(agent.transport().connects, 1);

        block_on(agent.run_due(secs(130)));
        assert_eq!(agent.transport().connects, 2);

        block_on(agent.handle_event(CloudEvent::Connected));
        block_on(agent.run_due(secs(1000)));
        assert_eq!(agent.transport().connects, 2);
    }

    #[test]
    fn error_event_is_treated_as_link_loss() {
        let mut agent = agent();
        connect(&mut agent);
        block_on(agent.handle_event(CloudEvent::Error));
        assert_eq!(agent.state(), ConnectionState::Disconnected);
        block_on(agent.run_due(secs(0)));
        assert_eq!(agent.transport().connects, 1);
    }

    #[test]
    fn errors_while_offline_do_not_shorten_retry_interval() {
        let mut agent = agent();
        agent.start();
        block_on(agent.run_due(secs(0)));

        for t in 1..=5 {
            block_on(agent.handle_event(CloudEvent::Error));
            block_on(agent.run_due(secs(t)));
        }
        assert_eq!(agent.transport().connects, 1);
        assert_eq!(agent.state(), ConnectionState::Disconnected);

        block_on(agent.run_due(secs(30)));
        assert_eq!(agent.transport().connects, 2);
    }

    #[test]
    fn read_burst_does_not_crowd_out_reconnection() {
        let sensor = MockSensor::reading(SensorValue::new(21, 0));
        let reads = sensor.reads.clone();
        let mut agent = agent_with(CloudConfig::default(), sensor);
        connect(&mut agent);

        for _ in 0..DEFAULT_TIMER_SLOTS {
            block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"read"}"#)));
        }
        assert_eq!(agent.timers().len(), 1);

        block_on(agent.handle_event(CloudEvent::Disconnected));
        block_on(agent.run_due(secs(0)));
        assert_eq!(agent.transport().connects, 1);
        assert_eq!(reads.get(), 1);
        assert_eq!(telemetry_sent(&agent), 0);

        block_on(agent.run_due(secs(30)));
        assert_eq!(agent.transport().connects, 2);
        assert_eq!(agent.timers().len(), 1);
    }

    #[test]
    fn dispatch_runs_jobs_that_came_due() {
        let mut agent = agent();
        agent.start();
        block_on(agent.run_due(secs(0)));
        assert_eq!(agent.transport().connects, 1);

        block_on(agent.dispatch(secs(45), CloudEvent::DataSent));
        assert_eq!(agent.transport().connects, 2);
        assert_eq!(agent.next_deadline(), Some(secs(75)));
    }

    #[test]
    fn status_announced_once_for_repeated_ready() {
        let mut agent = agent();
        connect(&mut agent);
        block_on(agent.handle_event(CloudEvent::Ready));
        assert_eq!(agent.transport().sent_to(Endpoint::State), 1);

        block_on(agent.handle_event(CloudEvent::Disconnected));
        connect(&mut agent);
        assert_eq!(agent.transport().sent_to(Endpoint::State), 2);
    }

    #[test]
    fn command_scenario_controls_cadence() {
        let sensor = MockSensor::reading(SensorValue::new(21, 500_000));
        let reads = sensor.reads.clone();
        let mut agent = agent_with(CloudConfig::default(), sensor);
        connect(&mut agent);

        block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"continuous"}"#)));
        assert!(agent.cadence().enabled);
        assert_eq!(agent.cadence().period, Duration::from_secs(30));
        block_on(agent.run_due(secs(0)));
        block_on(agent.run_due(secs(30)));
        assert_eq!(reads.get(), 2);

        block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"stop"}"#)));
        assert!(!agent.cadence().enabled);
        block_on(agent.run_due(secs(120)));
        assert_eq!(reads.get(), 2);

        block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"read"}"#)));
        block_on(agent.run_due(secs(120)));
        assert_eq!(reads.get(), 3);
        assert_eq!(telemetry_sent(&agent), 3);
        assert!(!agent.cadence().enabled);
    }

    #[test]
    fn read_command_samples_once_while_periodic_is_active() {
        let sensor = MockSensor::reading(SensorValue::new(21, 0));
        let reads = sensor.reads.clone();
        let mut agent = agent_with(CloudConfig::default(), sensor);
        connect(&mut agent);

        block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"timer"}"#)));
        block_on(agent.run_due(secs(0)));
        assert_eq!(reads.get(), 1);

        agent.advance_to(secs(10));
        block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"read"}"#)));
        block_on(agent.run_due(secs(10)));
        assert_eq!(reads.get(), 2);
        assert!(agent.cadence().enabled);
    }

    #[test]
    fn telemetry_is_dropped_while_disconnected() {
        let mut agent = agent();
        block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"read"}"#)));
        block_on(agent.run_due(secs(0)));
        assert!(agent.transport().sent.is_empty());
    }

    #[test]
    fn failed_sample_publishes_nothing() {
        let mut agent = agent_with(CloudConfig::default(), MockSensor::failing());
        connect(&mut agent);
        let before = agent.transport().sent.len();

        block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"read"}"#)));
        block_on(agent.run_due(secs(0)));
        assert_eq!(agent.transport().sent.len(), before);
    }

    #[test]
    fn telemetry_follows_backend_routing() {
        let config = CloudConfig::new(Backend::AzureIotHub).with_status_announcement(false);
        let mut agent = agent_with(config, MockSensor::reading(SensorValue::new(21, 0)));
        connect(&mut agent);

        block_on(agent.handle_event(CloudEvent::DataReceived(br#"{"temp":"read"}"#)));
        block_on(agent.run_due(secs(0)));
        assert_eq!(agent.transport().sent.len(), 1);
        assert_eq!(agent.transport().sent[0].0, Endpoint::State);
    }

    #[test]
    fn sequential_heartbeat_starts_on_ready() {
        let config = CloudConfig::default()
            .with_sequential_publication(Duration::from_secs(10))
            .with_heartbeat_payload("ping")
            .with_status_announcement(false);
        let mut agent = agent_with(config, MockSensor::reading(SensorValue::new(21, 0)));
        connect(&mut agent);

        block_on(agent.run_due(secs(0)));
        block_on(agent.run_due(secs(10)));
        block_on(agent.run_due(secs(20)));
        let heartbeats = agent
            .transport()
            .sent
            .iter()
            .filter(|(_, p)| p.as_slice() == b"ping")
            .count();
        assert_eq!(heartbeats, 3);
        assert_eq!(agent.config().publication, PublicationMode::Sequential {
            interval: Duration::from_secs(10)
        });
    }

    #[test]
    fn requested_publication_sends_heartbeat() {
        let mut agent = agent_with(
            CloudConfig::default()
                .with_heartbeat_payload("ping")
                .with_status_announcement(false),
            MockSensor::reading(SensorValue::new(21, 0)),
        );
        connect(&mut agent);
        agent.request_publication();
        block_on(agent.run_due(secs(0)));
        assert_eq!(
            agent.transport().sent,
            std::vec![(Endpoint::Message, b"ping".to_vec())]
        );
    }

    #[test]
    fn unrelated_and_unknown_events_are_ignored() {
        let mut agent = agent();
        connect(&mut agent);
        let sent = agent.transport().sent.len();

        for event in [
            CloudEvent::DataSent,
            CloudEvent::PairRequest,
            CloudEvent::PairDone,
            CloudEvent::FotaDone,
            CloudEvent::FotaError,
            CloudEvent::Unknown(42),
            CloudEvent::DataReceived(b"not a command"),
        ] {
            block_on(agent.handle_event(event));
        }

        assert_eq!(agent.state(), ConnectionState::Ready);
        assert_eq!(agent.transport().sent.len(), sent);
        assert!(agent.timers().is_empty());
    }
}
