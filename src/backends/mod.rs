//! Backends for `evt-response`.
//!
//! Implementations of the [`device`](crate::device) traits.
//!
//! # Feature flags
//! - **`hid`**: EVT response boxes through `hidapi` ([`hid::HidBackend`]).
//! - **`keyboard`**: terminal keyboard fallback through `crossterm`
//!   ([`keyboard::TerminalKeyboard`]).
//!
//! [`virtual_input`] is always available; it scripts devices and keys for tests and dry runs.

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

#[cfg(feature = "keyboard")]
#[cfg_attr(docsrs, doc(cfg(feature = "keyboard")))]
pub mod keyboard;

pub mod virtual_input;
