//! Device status (capability) announcement.
//!
//! nRF Cloud only graphs temperature data once the device has reported, in its
//! shadow, that it provides a temperature UI. This document is sent once per
//! Ready transition and is always addressed to the state endpoint.

use core::fmt::Write;

use heapless::String;

use crate::config::MAX_PAYLOAD_LEN;
use crate::error::SampleError;

/// Capabilities reported in the device status document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Enables the temperature graph in the cloud UI.
    pub temperature_ui: bool,
    /// Advertises application firmware-over-the-air support.
    pub fota: bool,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            temperature_ui: true,
            fota: false,
        }
    }
}

impl DeviceStatus {
    /// Encodes the shadow update, e.g.
    /// `{"state":{"reported":{"device":{"serviceInfo":{"ui":["TEMP"]}}}}}`.
    pub fn encode(&self) -> Result<String<MAX_PAYLOAD_LEN>, SampleError> {
        let mut out = String::new();
        self.write_to(&mut out).map_err(|_| SampleError::Format)?;
        Ok(out)
    }

    fn write_to(&self, out: &mut impl Write) -> core::fmt::Result {
        out.write_str("{\"state\":{\"reported\":{\"device\":{\"serviceInfo\":{\"ui\":[")?;
        if self.temperature_ui {
            out.write_str("\"TEMP\"")?;
        }
        out.write_str("]")?;
        if self.fota {
            out.write_str(",\"fota_v2\":[\"APP\"]")?;
        }
        out.write_str("}}}}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_enables_temperature_ui() {
        let doc = DeviceStatus::default().encode().unwrap();
        assert_eq!(
            doc.as_str(),
            r#"{"state":{"reported":{"device":{"serviceInfo":{"ui":["TEMP"]}}}}}"#
        );
    }

    #[test]
    fn fota_capability_is_listed() {
        let status = DeviceStatus {
            temperature_ui: false,
            fota: true,
        };
        assert_eq!(
            status.encode().unwrap().as_str(),
            r#"{"state":{"reported":{"device":{"serviceInfo":{"ui":[],"fota_v2":["APP"]}}}}}"#
        );
    }
}
