//! Configuration of the connectivity manager.

use embassy_time::Duration;

use crate::error::ConfigError;
use crate::transport::Endpoint;

/// Maximum length of any outbound payload built by this crate.
pub const MAX_PAYLOAD_LEN: usize = 256;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_TELEMETRY_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_PAYLOAD: &str =
    "{\"state\":{\"reported\":{\"message\":\"Hello Internet of Things!\"}}}";

/// The cloud backend the device talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Backend {
    NrfCloud,
    AwsIot,
    AzureIotHub,
}

impl Backend {
    /// Looks a backend up by its configuration name (`NRF_CLOUD`, `AWS_IOT`,
    /// `AZURE_IOT_HUB`).
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "NRF_CLOUD" => Ok(Self::NrfCloud),
            "AWS_IOT" => Ok(Self::AwsIot),
            "AZURE_IOT_HUB" => Ok(Self::AzureIotHub),
            _ => Err(ConfigError::UnknownBackend),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NrfCloud => "NRF_CLOUD",
            Self::AwsIot => "AWS_IOT",
            Self::AzureIotHub => "AZURE_IOT_HUB",
        }
    }

    /// Where telemetry and heartbeat messages are addressed.
    ///
    /// nRF Cloud gets the message topic so data shows up in its terminal; the
    /// others get the device shadow/twin.
    pub fn data_endpoint(self) -> Endpoint {
        match self {
            Self::NrfCloud => Endpoint::Message,
            Self::AwsIot | Self::AzureIotHub => Endpoint::State,
        }
    }
}

/// How the static heartbeat message is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationMode {
    /// Only when explicitly requested (and once per Ready).
    OnDemand,
    /// Republished every `interval` after each attempt.
    Sequential { interval: Duration },
}

/// Options for the connectivity manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudConfig {
    pub backend: Backend,
    pub retry_interval: Duration,
    pub publication: PublicationMode,
    pub heartbeat_payload: &'static str,
    pub telemetry_period: Duration,
    pub announce_status: bool,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self::new(Backend::NrfCloud)
    }
}

impl CloudConfig {
    pub const fn new(backend: Backend) -> Self {
        Self {
            backend,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            publication: PublicationMode::OnDemand,
            heartbeat_payload: DEFAULT_HEARTBEAT_PAYLOAD,
            telemetry_period: DEFAULT_TELEMETRY_PERIOD,
            announce_status: true,
        }
    }

    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub const fn with_sequential_publication(mut self, interval: Duration) -> Self {
        self.publication = PublicationMode::Sequential { interval };
        self
    }

    pub const fn with_heartbeat_payload(mut self, payload: &'static str) -> Self {
        self.heartbeat_payload = payload;
        self
    }

    pub const fn with_telemetry_period(mut self, period: Duration) -> Self {
        self.telemetry_period = period;
        self
    }

    pub const fn with_status_announcement(mut self, enabled: bool) -> Self {
        self.announce_status = enabled;
        self
    }

    /// Checks the options. A zero interval would make the dispatch loop spin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_interval.as_ticks() == 0 {
            return Err(ConfigError::ZeroRetryInterval);
        }
        if let PublicationMode::Sequential { interval } = self.publication {
            if interval.as_ticks() == 0 {
                return Err(ConfigError::ZeroHeartbeatInterval);
            }
        }
        if self.telemetry_period.as_ticks() == 0 {
            return Err(ConfigError::ZeroTelemetryPeriod);
        }
        if self.heartbeat_payload.len() > MAX_PAYLOAD_LEN {
            return Err(ConfigError::HeartbeatPayloadTooLarge);
        }
        Ok(())
    }
}
