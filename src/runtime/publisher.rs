//! Publication Scheduler.
//!
//! Every outbound message goes through here so it can be gated on the connection
//! state: while the session is down, publications are dropped (and logged), never
//! queued. Besides telemetry this module owns the static heartbeat message, which
//! is republished on a fixed interval in sequential mode, and the device status
//! announcement, which is sent once per Ready transition.

use embassy_time::Duration;

use crate::config::{Backend, PublicationMode};
use crate::error::{CloudError, TimerError};
use crate::fmt::{Dbg, lossy};
use crate::runtime::supervisor::ConnectionState;
use crate::runtime::timer::{Job, Scheduler, TimerHandle};
use crate::status::DeviceStatus;
use crate::transport::{CloudMessage, CloudTransport, Endpoint};

/// Gates and routes outbound messages.
pub struct PublicationScheduler {
    backend: Backend,
    mode: PublicationMode,
    heartbeat_payload: &'static str,
    heartbeat: Option<TimerHandle>,
    status: Option<DeviceStatus>,
    announced: bool,
}

impl PublicationScheduler {
    /// `status` is the announcement to send on Ready, if any.
    pub fn new(
        backend: Backend,
        mode: PublicationMode,
        heartbeat_payload: &'static str,
        status: Option<DeviceStatus>,
    ) -> Self {
        Self {
            backend,
            mode,
            heartbeat_payload,
            heartbeat: None,
            status,
            announced: false,
        }
    }

    /// Endpoint for telemetry and heartbeat data on the configured backend.
    pub fn data_endpoint(&self) -> Endpoint {
        self.backend.data_endpoint()
    }

    /// Whether the status announcement went out since the last disconnect.
    pub fn announced(&self) -> bool {
        self.announced
    }

    /// Sends `payload` to the data endpoint if the session is up.
    pub async fn publish<T: CloudTransport>(
        &mut self,
        state: ConnectionState,
        transport: &mut T,
        payload: &[u8],
    ) -> Result<(), CloudError<T::Error>> {
        let endpoint = self.data_endpoint();
        self.send(state, transport, payload, endpoint).await
    }

    /// Publishes the heartbeat, re-arming it in sequential mode.
    ///
    /// A heartbeat dropped for lack of a connection is not re-armed; the next
    /// Ready event restarts it.
    pub async fn publish_heartbeat<T: CloudTransport>(
        &mut self,
        state: ConnectionState,
        transport: &mut T,
        scheduler: &mut impl Scheduler,
    ) -> Result<(), CloudError<T::Error>> {
        self.heartbeat = None;
        if !state.is_connected() {
            info!("Not connected to cloud, abort cloud publication");
            return Err(CloudError::NotConnected);
        }

        let payload = self.heartbeat_payload;
        let endpoint = self.data_endpoint();
        let result = self
            .send(state, transport, payload.as_bytes(), endpoint)
            .await;

        if let PublicationMode::Sequential { interval } = self.mode {
            self.schedule_heartbeat(interval, scheduler)?;
        }
        result
    }

    /// Runs the heartbeat publication now (e.g. on a button press).
    pub fn request_heartbeat(&mut self, scheduler: &mut impl Scheduler) -> Result<(), TimerError> {
        self.schedule_heartbeat(Duration::from_secs(0), scheduler)
    }

    /// Link became ready: flush the heartbeat in sequential mode.
    pub fn on_ready(&mut self, scheduler: &mut impl Scheduler) {
        if matches!(self.mode, PublicationMode::Sequential { .. }) {
            if let Err(e) = self.schedule_heartbeat(Duration::from_secs(0), scheduler) {
                error!("Failed to schedule heartbeat: {}", Dbg(&e));
            }
        }
    }

    /// Link lost: the next Ready gets a fresh status announcement.
    pub fn on_disconnected(&mut self) {
        self.announced = false;
    }

    /// Sends the device status once per Ready transition.
    ///
    /// The announcement counts as done once attempted; a failed send is
    /// logged and retried only after the next disconnect.
    pub async fn announce_status<T: CloudTransport>(
        &mut self,
        state: ConnectionState,
        transport: &mut T,
    ) -> Result<(), CloudError<T::Error>> {
        let Some(status) = self.status else {
            return Ok(());
        };
        if self.announced {
            debug!("Device status already announced");
            return Ok(());
        }

        let doc = status.encode()?;
        self.announced = true;
        self.send(state, transport, doc.as_bytes(), Endpoint::State)
            .await
    }

    fn schedule_heartbeat(
        &mut self,
        delay: Duration,
        scheduler: &mut impl Scheduler,
    ) -> Result<(), TimerError> {
        if let Some(handle) = self.heartbeat.take() {
            scheduler.cancel(handle);
        }
        self.heartbeat = Some(scheduler.schedule_once(delay, Job::Heartbeat)?);
        Ok(())
    }

    async fn send<T: CloudTransport>(
        &self,
        state: ConnectionState,
        transport: &mut T,
        payload: &[u8],
        endpoint: Endpoint,
    ) -> Result<(), CloudError<T::Error>> {
        if !state.is_connected() {
            info!("Not connected to cloud, abort cloud publication");
            return Err(CloudError::NotConnected);
        }

        info!("Publishing message: {}", lossy(payload));
        let msg = CloudMessage::new(payload, endpoint);
        transport.send(&msg).await.map_err(|e| {
            error!("cloud send failed, error: {}", Dbg(&e));
            CloudError::Transport(e)
        })
    }
}
