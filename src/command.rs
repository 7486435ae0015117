//! # Command Decoder
//!
//! Inbound cloud commands have the shape `{"<type>":"<value>"}`. They are not parsed
//! as JSON: the decoder counts `"` delimiters and copies the bytes after the first
//! delimiter into the type buffer and the bytes after the third into the value
//! buffer. Everything else (including anything between the second and third
//! delimiter, and everything after the fourth) is ignored.
//!
//! A payload with fewer than four delimiters produces empty or partial tokens and
//! simply fails to match anything. A token longer than `FIELD_CAPACITY` is rejected
//! with `DecodeError::FieldTooLong` instead of being truncated.

use heapless::Vec;

use crate::error::{CommandField, DecodeError};

/// Capacity of each command token, in bytes.
pub const FIELD_CAPACITY: usize = 63;

const DELIMITER: u8 = b'"';

/// Command type for temperature telemetry control.
pub const TEMPERATURE_TYPE: &str = "temp";

/// A `(type, value)` pair extracted from an inbound payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPair {
    kind: Vec<u8, FIELD_CAPACITY>,
    value: Vec<u8, FIELD_CAPACITY>,
}

impl CommandPair {
    /// Scans `payload` and extracts the first two quoted tokens.
    pub fn extract(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut pair = Self::default();
        let mut delimiters = 0usize;

        for &byte in payload {
            if byte == DELIMITER {
                delimiters += 1;
                continue;
            }
            match delimiters {
                1 => pair.kind.push(byte).map_err(|_| DecodeError::FieldTooLong {
                    field: CommandField::Type,
                })?,
                3 => pair.value.push(byte).map_err(|_| DecodeError::FieldTooLong {
                    field: CommandField::Value,
                })?,
                _ => {}
            }
        }

        Ok(pair)
    }

    /// The first quoted token.
    pub fn kind(&self) -> &[u8] {
        &self.kind
    }

    /// The second quoted token.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Exact, byte-wise comparison against both targets.
    pub fn matches(&self, target_type: &str, target_value: &str) -> bool {
        self.kind.as_slice() == target_type.as_bytes()
            && self.value.as_slice() == target_value.as_bytes()
    }
}

/// Returns `true` if `payload` carries exactly `target_type` and `target_value`.
///
/// Overflowing tokens never match.
pub fn decode(payload: &[u8], target_type: &str, target_value: &str) -> bool {
    CommandPair::extract(payload)
        .map(|pair| pair.matches(target_type, target_value))
        .unwrap_or(false)
}

/// A recognized telemetry control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `{"temp":"read"}`: take one sample now.
    ReadOnce,
    /// `{"temp":"continuous"}` or `{"temp":"timer"}`: start periodic sampling.
    StartPeriodic,
    /// `{"temp":"stop"}`: stop periodic sampling.
    StopPeriodic,
}

impl Command {
    /// Recognizes a command in `payload`.
    ///
    /// `Ok(None)` is the normal outcome for payloads that aren't commands.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, DecodeError> {
        let pair = CommandPair::extract(payload)?;

        let command = if pair.matches(TEMPERATURE_TYPE, "read") {
            Some(Self::ReadOnce)
        } else if pair.matches(TEMPERATURE_TYPE, "continuous")
            || pair.matches(TEMPERATURE_TYPE, "timer")
        {
            Some(Self::StartPeriodic)
        } else if pair.matches(TEMPERATURE_TYPE, "stop") {
            Some(Self::StopPeriodic)
        } else {
            None
        };

        Ok(command)
    }
}
