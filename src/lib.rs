//! # Cloud Connectivity Manager for Embedded Telemetry Devices
//!
//! `myrtio-cloud` keeps a telemetry device connected to its cloud backend over an
//! unreliable link, and turns simple cloud commands into temperature readouts.
//! It is `no_std`, heap-free and built on the [Embassy](https://embassy.dev/)
//! async ecosystem.
//!
//! ## Core Features
//!
//! - **Perpetual reconnection:** connect attempts are retried on a fixed interval
//!   until the backend confirms the session; a lost link is retried immediately.
//! - **Gated publications:** nothing is handed to the transport unless the session
//!   is connected. Publications attempted while offline are dropped, not queued.
//! - **Cloud commands:** `{"temp":"read"}`, `{"temp":"continuous"}` (or `"timer"`)
//!   and `{"temp":"stop"}` control one-shot and periodic temperature telemetry.
//! - **Backend routing:** data goes to the message topic on nRF Cloud and to the
//!   device shadow/twin on AWS IoT and Azure IoT Hub.
//! - **Transport Agnostic:** the `CloudTransport`, `SensorSource` and `Clock`
//!   traits keep modem, sensor and time drivers outside the crate.
//!
//! ## Architecture
//!
//! All mutable state lives in one `CloudAgent`, which receives link-layer events
//! (`CloudEvent`) and due jobs (`Job`) one at a time. `CloudRuntime` is the async
//! loop feeding it from a `CloudEventChannel` and from the agent's timer queue:
//!
//! ```ignore
//! use myrtio_cloud::{CloudAgent, CloudConfig, CloudRuntime, Backend};
//!
//! let config = CloudConfig::new(Backend::NrfCloud)
//!     .with_retry_interval(Duration::from_secs(30));
//! let agent = CloudAgent::new(config, transport, sensor, clock, Instant::now())?;
//!
//! // The modem driver posts events through `CloudEventSender` and raises
//! // `LINK` once registered on the network.
//! let mut runtime = CloudRuntime::new(agent, EVENTS.receiver(), &LINK);
//! runtime.run().await;
//! ```
//!
//! ## Logging
//!
//! Enable one of the `log`, `defmt` or `esp32-log` features to get logs of every
//! state transition, dropped publication and failure.

#![cfg_attr(not(test), no_std)]

// Must stay first so the logging macros are visible to every module below.
mod fmt;

pub mod command;
pub mod config;
pub mod error;
pub mod runtime;
pub mod status;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export key types for easier access at the crate root.
pub use command::{Command, CommandPair, decode};
pub use config::{Backend, CloudConfig, PublicationMode};
pub use error::{CloudError, ConfigError};
pub use runtime::{CloudAgent, CloudRuntime, ConnectionState, LinkSignal};
pub use transport::{
    CloudEvent, CloudEventChannel, CloudEventSender, CloudMessage, CloudTransport, Endpoint, QoS,
};
