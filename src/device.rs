//! Device abstractions.
//!
//! - [`DeviceBackend`] finds and attaches response boxes (vendor layer).
//! - [`ResponseDevice`] is one attached box: LED commands and blocking waits.
//! - [`KeyboardInput`] is the fallback used when no box is available.
//!
//! Implementations live in [`backends`](crate::backends).

use crate::color::Rgb;
use crate::error::EvtResult;
use crate::event::{DeviceEvent, KeyPress};
use crate::metadata::DeviceDescriptor;
use std::time::Duration;

/// Number of RGB button LEDs on a response box.
pub const LED_COUNT: usize = 4;

/// When an LED color command takes effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedTrigger {
    /// Apply now.
    Immediate,
    /// Apply when button `n` is pressed.
    OnButton(u8),
}

impl LedTrigger {
    /// Event code sent with the LED command.
    pub fn code(self) -> u8 {
        match self {
            LedTrigger::Immediate => 1,
            LedTrigger::OnButton(n) => 10 + n,
        }
    }
}

/// An attached response box.
pub trait ResponseDevice {
    fn name(&self) -> &str;
    fn id(&self) -> &str;

    /// Set LED `led` (1-based) to `color` when `trigger` fires.
    fn set_led(&mut self, led: u8, color: Rgb, trigger: LedTrigger) -> EvtResult<()>;

    /// Block until an event whose mask intersects `mask` arrives, or until `timeout`.
    ///
    /// `None` waits forever. On timeout the returned event carries
    /// [`NO_EVENT`](crate::response::NO_EVENT).
    fn wait_for_event(&mut self, mask: u8, timeout: Option<Duration>) -> EvtResult<DeviceEvent>;
}

/// Vendor layer: enumerate and attach response boxes.
pub trait DeviceBackend {
    /// List attached devices whose product belongs to `group`. An empty list is not an error.
    fn scan(&mut self, group: &str) -> EvtResult<Vec<DeviceDescriptor>>;

    /// Open a handle to the device at `descriptor.path`.
    fn attach(&mut self, descriptor: &DeviceDescriptor) -> EvtResult<Box<dyn ResponseDevice>>;
}

/// Keyboard fallback.
pub trait KeyboardInput {
    /// Block until one of `keylist` is pressed or `timeout` expires (`None` waits forever).
    fn get_key(&mut self, keylist: &[String], timeout: Option<Duration>) -> EvtResult<KeyPress>;
}
