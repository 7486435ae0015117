//! # Telemetry Sampler
//!
//! Reads the environmental sensor, stamps the reading with wall-clock time and
//! renders it into the fixed JSON template understood by the cloud UI:
//!
//! ```text
//! {
//! "appId": "TEMP",
//! "messageType": "DATA",
//! "data": "21.500000",
//! "ts": 1700000000123
//! }
//! ```
//!
//! Sampling happens either once on request or on a periodic cadence. The cadence
//! is just a recurring `Job::Sample` in the timer queue.

use core::fmt::Write;

use embassy_time::Duration;
use heapless::String;

use crate::config::MAX_PAYLOAD_LEN;
use crate::error::{SampleError, TimerError};
use crate::fmt::Dbg;
use crate::runtime::timer::{Job, Scheduler, TimerHandle};

pub type TelemetryPayload = String<MAX_PAYLOAD_LEN>;

/// A fixed-point sensor value: `integer + micro / 1_000_000`.
///
/// Both parts normally carry the sign of the value, e.g. -1.5 is
/// `{ -1, -500000 }`. Mixed signs are summed, so `{ 1, -500000 }` is 0.5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorValue {
    pub integer: i32,
    pub micro: i32,
}

impl SensorValue {
    pub const fn new(integer: i32, micro: i32) -> Self {
        Self { integer, micro }
    }

    /// The value in millionths.
    pub const fn as_micros(&self) -> i64 {
        self.integer as i64 * 1_000_000 + self.micro as i64
    }
}

impl core::fmt::Display for SensorValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let micros = self.as_micros();
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        write!(f, "{}{}.{:06}", sign, abs / 1_000_000, abs % 1_000_000)
    }
}

/// One reading of the environmental sensor. Only temperature is mandatory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorReading {
    pub temperature: SensorValue,
    pub pressure: Option<SensorValue>,
    pub humidity: Option<SensorValue>,
    pub gas_resistance: Option<SensorValue>,
}

/// Source of sensor readings.
#[allow(async_fn_in_trait)]
pub trait SensorSource {
    type Error: core::fmt::Debug;

    /// Fetches a fresh sample from the sensor.
    async fn read(&mut self) -> Result<SensorReading, Self::Error>;
}

/// Source of wall-clock time.
pub trait Clock {
    type Error: core::fmt::Debug;

    /// Current Unix time in milliseconds.
    fn now(&mut self) -> Result<u64, Self::Error>;
}

/// A timestamped temperature reading, ready to be formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub temperature: SensorValue,
    pub timestamp_ms: u64,
}

impl TelemetryRecord {
    /// Renders the record into the telemetry template.
    pub fn format(&self) -> Result<TelemetryPayload, SampleError> {
        let mut out = TelemetryPayload::new();
        write!(
            out,
            "{{\n\"appId\": \"TEMP\",\n\"messageType\": \"DATA\",\n\"data\": \"{}\",\n\"ts\": {}\n}}",
            self.temperature, self.timestamp_ms
        )
        .map_err(|_| SampleError::Format)?;
        Ok(out)
    }
}

/// Whether periodic sampling is armed, and at what period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryCadence {
    pub enabled: bool,
    pub period: Duration,
}

/// Samples the sensor and owns the periodic cadence.
pub struct TelemetrySampler<S, C> {
    sensor: S,
    clock: C,
    cadence: TelemetryCadence,
    periodic: Option<TimerHandle>,
    once: Option<TimerHandle>,
}

impl<S, C> TelemetrySampler<S, C>
where
    S: SensorSource,
    C: Clock,
{
    pub fn new(sensor: S, clock: C, default_period: Duration) -> Self {
        Self {
            sensor,
            clock,
            cadence: TelemetryCadence {
                enabled: false,
                period: default_period,
            },
            periodic: None,
            once: None,
        }
    }

    pub fn cadence(&self) -> TelemetryCadence {
        self.cadence
    }

    /// Reads time and sensor. Any failure is surfaced; nothing stale is returned.
    pub async fn sample(&mut self) -> Result<TelemetryRecord, SampleError> {
        let timestamp_ms = self.clock.now().map_err(|e| {
            error!("Failed to get time: {}", Dbg(&e));
            SampleError::Clock
        })?;

        let reading = self.sensor.read().await.map_err(|e| {
            error!("Failed to read sensor: {}", Dbg(&e));
            SampleError::Sensor
        })?;

        Ok(TelemetryRecord {
            temperature: reading.temperature,
            timestamp_ms,
        })
    }

    /// Arms the recurring sample job: first sample now, then every `period`.
    ///
    /// Re-arming an active cadence restarts it with the new period. A zero
    /// period is rejected and leaves the current cadence untouched.
    pub fn start_periodic(
        &mut self,
        period: Duration,
        scheduler: &mut impl Scheduler,
    ) -> Result<(), TimerError> {
        if period.as_ticks() == 0 {
            return Err(TimerError::ZeroPeriod);
        }
        if let Some(handle) = self.periodic.take() {
            scheduler.cancel(handle);
        }
        self.periodic = Some(scheduler.schedule_periodic(period, Job::Sample)?);
        self.cadence = TelemetryCadence {
            enabled: true,
            period,
        };
        Ok(())
    }

    pub fn stop_periodic(&mut self, scheduler: &mut impl Scheduler) {
        if let Some(handle) = self.periodic.take() {
            scheduler.cancel(handle);
        }
        self.cadence.enabled = false;
    }

    /// Requests one immediate sample, independent of the cadence.
    ///
    /// Requests arriving while a one-shot sample is still queued are folded
    /// into it.
    pub fn trigger_once(&mut self, scheduler: &mut impl Scheduler) -> Result<(), TimerError> {
        if let Some(handle) = self.once {
            if scheduler.is_pending(handle) {
                debug!("One-shot sample already queued");
                return Ok(());
            }
        }
        self.once = Some(scheduler.schedule_once(Duration::from_secs(0), Job::Sample)?);
        Ok(())
    }
}
