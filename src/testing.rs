//! Recording collaborators for unit tests.

use std::cell::Cell;
use std::rc::Rc;
use std::vec::Vec;

use crate::telemetry::{Clock, SensorReading, SensorSource, SensorValue};
use crate::transport::{CloudMessage, CloudTransport, Endpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// Records every connect request and sent message.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub connects: usize,
    pub sent: Vec<(Endpoint, Vec<u8>)>,
    pub fail_connect: bool,
    pub fail_send: bool,
}

impl MockTransport {
    pub fn sent_to(&self, endpoint: Endpoint) -> usize {
        self.sent.iter().filter(|(e, _)| *e == endpoint).count()
    }
}

impl CloudTransport for MockTransport {
    type Error = MockError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.connects += 1;
        if self.fail_connect { Err(MockError) } else { Ok(()) }
    }

    async fn send(&mut self, msg: &CloudMessage<'_>) -> Result<(), Self::Error> {
        if self.fail_send {
            return Err(MockError);
        }
        self.sent.push((msg.endpoint, msg.payload.to_vec()));
        Ok(())
    }
}

/// A sensor returning a fixed reading, counting reads through a shared cell.
pub struct MockSensor {
    pub reading: Option<SensorReading>,
    pub reads: Rc<Cell<usize>>,
}

impl MockSensor {
    pub fn reading(temperature: SensorValue) -> Self {
        Self {
            reading: Some(SensorReading {
                temperature,
                ..Default::default()
            }),
            reads: Rc::new(Cell::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            reading: None,
            reads: Rc::new(Cell::new(0)),
        }
    }
}

impl SensorSource for MockSensor {
    type Error = MockError;

    async fn read(&mut self) -> Result<SensorReading, Self::Error> {
        self.reads.set(self.reads.get() + 1);
        self.reading.ok_or(MockError)
    }
}

/// A clock stuck at a fixed Unix time, or not synchronized at all.
pub struct MockClock(pub Option<u64>);

impl MockClock {
    pub fn at(unix_ms: u64) -> Self {
        Self(Some(unix_ms))
    }

    pub fn unsynced() -> Self {
        Self(None)
    }
}

impl Clock for MockClock {
    type Error = MockError;

    fn now(&mut self) -> Result<u64, Self::Error> {
        self.0.ok_or(MockError)
    }
}
