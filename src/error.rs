//! # Error Types
//!
//! This module defines the error taxonomy of the connectivity manager. Steady-state
//! errors (`CloudError` and friends) never escape the event dispatcher: they are
//! logged at the handler boundary. Only `ConfigError` is returned to the caller,
//! and only while the agent is being constructed.

/// Errors produced while handling an event or a scheduled job.
///
/// It is generic over the transport error type `T`, so transport failures keep
/// their original detail for logging.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CloudError<T> {
    /// The transport failed to connect or to send.
    Transport(T),
    /// A publication was attempted while the link was not connected.
    NotConnected,
    /// A telemetry sample could not be produced.
    Sample(SampleError),
    /// A payload did not fit into its fixed-capacity buffer.
    BufferTooSmall,
    /// A job could not be scheduled.
    Timer(TimerError),
}

impl<T> From<SampleError> for CloudError<T> {
    fn from(err: SampleError) -> Self {
        CloudError::Sample(err)
    }
}

impl<T> From<TimerError> for CloudError<T> {
    fn from(err: TimerError) -> Self {
        CloudError::Timer(err)
    }
}

/// Failure to produce a telemetry record.
///
/// A failed sample is never published, not even with zeroed readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleError {
    /// The sensor could not be read.
    Sensor,
    /// The wall clock is not available yet (e.g. time not synchronized).
    Clock,
    /// The formatted record exceeded the payload capacity.
    Format,
}

/// Which half of a command pair overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandField {
    Type,
    Value,
}

/// Failure to extract a command pair from an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// A quoted token was longer than the command buffer capacity.
    FieldTooLong { field: CommandField },
}

/// Errors from the deferred-job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// All timer slots are in use.
    QueueFull,
    /// A periodic job was given a period of zero.
    ZeroPeriod,
}

/// Invalid configuration. Fatal at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The configured backend name doesn't match any known backend.
    UnknownBackend,
    /// The connection retry interval must be non-zero.
    ZeroRetryInterval,
    /// Sequential publication needs a non-zero interval.
    ZeroHeartbeatInterval,
    /// The periodic telemetry interval must be non-zero.
    ZeroTelemetryPeriod,
    /// The heartbeat payload exceeds the maximum payload length.
    HeartbeatPayloadTooLarge,
}
