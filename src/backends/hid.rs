//! EVT response boxes over `hidapi`.
//!
//! EVT ("EventExchanger") firmware exposes a plain HID interface:
//! - **input reports**: the first byte is the current button state, bit `n - 1` for button `n`;
//! - **output reports**: `[report_id = 0][command][args...]`, fixed length.
//!
//! LED colors are staged with `SET_LED_COLOR` (r, g, b, led, trigger code) and latched with
//! `SEND_LED_COLORS`. Commands are written without acknowledgement.

use crate::color::Rgb;
use crate::device::{DeviceBackend, LedTrigger, ResponseDevice};
use crate::error::{EvtError, EvtResult};
use crate::event::DeviceEvent;
use crate::metadata::DeviceDescriptor;
use crate::response::NO_EVENT;
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Output report length including the leading report ID.
const REPORT_LEN: usize = 11;

/// Input buffer size; only the first byte carries button state.
const INPUT_LEN: usize = 64;

/// Upper bound on stale reports drained before a wait.
const MAX_DRAIN: usize = 256;

mod command {
    pub const SET_LED_COLOR: u8 = 61;
    pub const SEND_LED_COLORS: u8 = 62;
}

/// Settle delay before enumerating when preparing a trial.
pub const SETTLE_PREPARE: Duration = Duration::from_millis(100);

/// Settle delay before enumerating for a device choice list.
pub const SETTLE_LIST: Duration = Duration::from_millis(500);

/// Vendor layer backed by `hidapi`.
///
/// The HID context is created lazily on the first scan, so constructing a backend performs
/// no I/O.
pub struct HidBackend {
    api: Option<HidApi>,
    settle: Duration,
}

impl Default for HidBackend {
    fn default() -> Self {
        Self::new(SETTLE_PREPARE)
    }
}

impl HidBackend {
    /// `settle` is slept before each enumeration; listing right after the HID context opens
    /// does not always return every device.
    pub fn new(settle: Duration) -> Self {
        Self { api: None, settle }
    }

    fn api(&mut self) -> EvtResult<&mut HidApi> {
        let api = match self.api.take() {
            Some(api) => api,
            None => HidApi::new().map_err(|e| EvtError::DeviceScan(e.to_string()))?,
        };
        Ok(self.api.insert(api))
    }
}

impl DeviceBackend for HidBackend {
    fn scan(&mut self, group: &str) -> EvtResult<Vec<DeviceDescriptor>> {
        std::thread::sleep(self.settle);
        let api = self.api()?;
        api.refresh_devices()
            .map_err(|e| EvtError::DeviceScan(e.to_string()))?;

        let mut found: Vec<DeviceDescriptor> = Vec::new();
        for info in api.device_list() {
            let Some(product) = info.product_string() else {
                continue;
            };
            let descriptor = DeviceDescriptor::new(
                info.path().to_string_lossy(),
                product,
                info.serial_number().unwrap_or_default(),
            );
            if !descriptor.in_group(group) || found.iter().any(|d| d.path == descriptor.path) {
                continue;
            }
            debug!(
                "Found EVT device: VID={:04X} PID={:04X} product={} path={}",
                info.vendor_id(),
                info.product_id(),
                descriptor.product_string,
                descriptor.path
            );
            found.push(descriptor);
        }
        Ok(found)
    }

    fn attach(&mut self, descriptor: &DeviceDescriptor) -> EvtResult<Box<dyn ResponseDevice>> {
        let attach_err = |reason: String| EvtError::DeviceAttach {
            path: descriptor.path.clone(),
            reason,
        };
        let path = CString::new(descriptor.path.as_str()).map_err(|e| attach_err(e.to_string()))?;
        let api = self.api().map_err(|e| attach_err(e.to_string()))?;
        let raw = api.open_path(&path).map_err(|e| attach_err(e.to_string()))?;
        info!(
            "Device successfully attached as: {} s/n: {}",
            descriptor.product_string, descriptor.serial_number
        );
        Ok(Box::new(EvtHidDevice::new(descriptor, raw)))
    }
}

/// An attached EVT device.
pub struct EvtHidDevice {
    id: String,
    name: String,
    raw: HidDevice,
    buf: [u8; INPUT_LEN],
}

impl EvtHidDevice {
    pub fn new(descriptor: &DeviceDescriptor, raw: HidDevice) -> Self {
        Self {
            id: format!("{}:{}", descriptor.product_string, descriptor.serial_number),
            name: descriptor.product_string.clone(),
            raw,
            buf: [0u8; INPUT_LEN],
        }
    }

    fn send(&self, cmd: u8, args: &[u8]) -> EvtResult<()> {
        let mut report = [0u8; REPORT_LEN];
        report[1] = cmd;
        report[2..2 + args.len()].copy_from_slice(args);
        self.raw.write(&report)?;
        Ok(())
    }

    /// Drop reports queued before the wait so an old press cannot satisfy it.
    fn drain(&mut self) -> EvtResult<()> {
        for _ in 0..MAX_DRAIN {
            if self.raw.read_timeout(&mut self.buf, 0)? == 0 {
                break;
            }
        }
        Ok(())
    }
}

impl ResponseDevice for EvtHidDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_led(&mut self, led: u8, color: Rgb, trigger: LedTrigger) -> EvtResult<()> {
        let (r, g, b) = color.channels();
        self.send(command::SET_LED_COLOR, &[r, g, b, led, trigger.code()])?;
        self.send(command::SEND_LED_COLORS, &[])
    }

    /// The returned mask holds only the lines that intersect `mask`.
    fn wait_for_event(&mut self, mask: u8, timeout: Option<Duration>) -> EvtResult<DeviceEvent> {
        self.drain()?;
        let start = Instant::now();

        loop {
            let wait_ms: i32 = match timeout {
                None => -1,
                Some(limit) => {
                    let remaining = limit.saturating_sub(start.elapsed());
                    if remaining.is_zero() {
                        return Ok(DeviceEvent {
                            raw: NO_EVENT,
                            elapsed: limit,
                        });
                    }
                    // A sub-millisecond remainder still waits 1 ms.
                    remaining.as_millis().max(1).min(i32::MAX as u128) as i32
                }
            };

            let n = self.raw.read_timeout(&mut self.buf, wait_ms)?;
            if n == 0 {
                continue;
            }
            let lines = self.buf[0] & mask;
            if lines != 0 {
                return Ok(DeviceEvent {
                    raw: lines as i32,
                    elapsed: start.elapsed(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_args_fit_report() {
        // report id + command + r, g, b, led, code
        assert!(2 + 5 <= REPORT_LEN);
    }

    #[test]
    fn constructing_backend_does_no_io() {
        let backend = HidBackend::new(Duration::ZERO);
        assert!(backend.api.is_none());
    }
}
