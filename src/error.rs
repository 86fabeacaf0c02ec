//! Error types.
//!
//! Configuration errors are surfaced by [`Session::prepare`](crate::session::Session::prepare)
//! before a trial starts. Hardware errors (`DeviceScan`, `DeviceAttach`, `UnknownSlot`) are
//! reported by the registry but the session downgrades them to keyboard input.

use thiserror::Error;

/// Errors produced by this crate.
#[derive(Error, Debug)]
pub enum EvtError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid timeout {0:?}: expected \"infinite\" or 0..=3600000 ms")]
    InvalidTimeout(String),

    #[error("invalid color {0:?}: expected \"#RRGGBB\"")]
    InvalidColor(String),

    #[error("multiple buttons pressed at once (mask 0b{mask:08b})")]
    MultipleButtonsPressed { mask: u8 },

    #[error("invalid event mask: {0}")]
    InvalidEventMask(i32),

    #[error("device scan failed: {0}")]
    DeviceScan(String),

    #[error("attaching device {path} failed: {reason}")]
    DeviceAttach { path: String, reason: String },

    #[error("no device registered in slot {0}")]
    UnknownSlot(usize),

    #[error("HID error: {0}")]
    Hid(String),

    #[error("keyboard input failed: {0}")]
    Keyboard(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type EvtResult<T> = Result<T, EvtError>;

#[cfg(feature = "hid")]
impl From<hidapi::HidError> for EvtError {
    fn from(e: hidapi::HidError) -> Self {
        EvtError::Hid(e.to_string())
    }
}
