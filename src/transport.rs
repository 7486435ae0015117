//! # Cloud Transport Abstraction
//!
//! This module defines the `CloudTransport` trait, which abstracts the cloud backend
//! session (nRF Cloud, AWS IoT, Azure IoT Hub, ...) so the connectivity manager is
//! agnostic of the underlying link layer.
//!
//! The link layer runs independently of the manager: it reports what happens to the
//! session through `CloudEvent`s, posted into the dispatch loop via a
//! `CloudEventChannel`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Vec;

/// Maximum length of an inbound payload carried by an `OwnedCloudEvent`.
pub const MAX_EVENT_PAYLOAD: usize = 256;

/// Delivery guarantee requested for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

/// Where a message is addressed on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Endpoint {
    /// The plain message topic (shown in the nRF Cloud terminal).
    Message,
    /// The device state document (AWS shadow, Azure twin, nRF Cloud shadow).
    State,
}

/// An outbound message. Borrows its payload for the duration of the send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudMessage<'a> {
    pub qos: QoS,
    pub payload: &'a [u8],
    pub endpoint: Endpoint,
}

impl<'a> CloudMessage<'a> {
    pub const fn new(payload: &'a [u8], endpoint: Endpoint) -> Self {
        Self {
            qos: QoS::AtMostOnce,
            payload,
            endpoint,
        }
    }
}

/// A trait representing a session with a cloud backend.
///
/// `connect` only *requests* a connection: success is confirmed later by a
/// `CloudEvent::Connected` arriving through the event channel.
#[allow(async_fn_in_trait)]
pub trait CloudTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Requests a connection to the backend.
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Sends a message to the backend.
    async fn send(&mut self, msg: &CloudMessage<'_>) -> Result<(), Self::Error>;
}

/// An event reported by the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudEvent<'a> {
    Connecting,
    Connected,
    Ready,
    Disconnected,
    Error,
    DataSent,
    DataReceived(&'a [u8]),
    PairRequest,
    PairDone,
    FotaDone,
    FotaError,
    /// An event type this crate doesn't know, carrying the raw type code.
    Unknown(u8),
}

/// An owned copy of a `CloudEvent`, suitable for sending through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedCloudEvent {
    Connecting,
    Connected,
    Ready,
    Disconnected,
    Error,
    DataSent,
    DataReceived(Vec<u8, MAX_EVENT_PAYLOAD>),
    PairRequest,
    PairDone,
    FotaDone,
    FotaError,
    Unknown(u8),
}

impl OwnedCloudEvent {
    /// Copies an event into owned storage.
    ///
    /// Returns `None` if the payload of a `DataReceived` event is larger than
    /// `MAX_EVENT_PAYLOAD`.
    pub fn from_event(event: CloudEvent<'_>) -> Option<Self> {
        let owned = match event {
            CloudEvent::Connecting => Self::Connecting,
            CloudEvent::Connected => Self::Connected,
            CloudEvent::Ready => Self::Ready,
            CloudEvent::Disconnected => Self::Disconnected,
            CloudEvent::Error => Self::Error,
            CloudEvent::DataSent => Self::DataSent,
            CloudEvent::DataReceived(payload) => {
                Self::DataReceived(Vec::from_slice(payload).ok()?)
            }
            CloudEvent::PairRequest => Self::PairRequest,
            CloudEvent::PairDone => Self::PairDone,
            CloudEvent::FotaDone => Self::FotaDone,
            CloudEvent::FotaError => Self::FotaError,
            CloudEvent::Unknown(code) => Self::Unknown(code),
        };
        Some(owned)
    }

    /// Borrows the owned event back as a `CloudEvent`.
    pub fn as_event(&self) -> CloudEvent<'_> {
        match self {
            Self::Connecting => CloudEvent::Connecting,
            Self::Connected => CloudEvent::Connected,
            Self::Ready => CloudEvent::Ready,
            Self::Disconnected => CloudEvent::Disconnected,
            Self::Error => CloudEvent::Error,
            Self::DataSent => CloudEvent::DataSent,
            Self::DataReceived(payload) => CloudEvent::DataReceived(payload.as_slice()),
            Self::PairRequest => CloudEvent::PairRequest,
            Self::PairDone => CloudEvent::PairDone,
            Self::FotaDone => CloudEvent::FotaDone,
            Self::FotaError => CloudEvent::FotaError,
            Self::Unknown(code) => CloudEvent::Unknown(*code),
        }
    }
}

pub type CloudEventChannel<const DEPTH: usize> =
    Channel<CriticalSectionRawMutex, OwnedCloudEvent, DEPTH>;

pub type CloudEventReceiver<'a, const DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, OwnedCloudEvent, DEPTH>;

/// A handle that lets the link layer post events into the dispatch loop.
///
/// It wraps a channel sender and can be copied into interrupt-driven callbacks
/// or other tasks.
#[derive(Clone, Copy)]
pub struct CloudEventSender<'a, const DEPTH: usize> {
    tx: Sender<'a, CriticalSectionRawMutex, OwnedCloudEvent, DEPTH>,
}

impl<'a, const DEPTH: usize> CloudEventSender<'a, DEPTH> {
    /// Create a new `CloudEventSender` from a channel sender.
    pub fn new(tx: Sender<'a, CriticalSectionRawMutex, OwnedCloudEvent, DEPTH>) -> Self {
        Self { tx }
    }

    /// Post an event, waiting if the channel is full.
    ///
    /// Returns `false` if the event payload is too large to be queued.
    pub async fn post(&self, event: CloudEvent<'_>) -> bool {
        match OwnedCloudEvent::from_event(event) {
            Some(owned) => {
                self.tx.send(owned).await;
                true
            }
            None => {
                warn!("Dropping cloud event: payload too large");
                false
            }
        }
    }

    /// Post an event without waiting.
    ///
    /// Returns `false` if the channel is full or the payload is too large.
    pub fn try_post(&self, event: CloudEvent<'_>) -> bool {
        match OwnedCloudEvent::from_event(event) {
            Some(owned) => self.tx.try_send(owned).is_ok(),
            None => {
                warn!("Dropping cloud event: payload too large");
                false
            }
        }
    }
}
