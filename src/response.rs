//! Allowed-response masks and event decoding.
//!
//! Buttons on an EVT response box are numbered `1..=8`. Button `n` maps to bit `n - 1`
//! of the one-byte event mask the device reports, so the set of allowed buttons for a trial
//! is the bitwise OR of `1 << (n - 1)` over the set.
//!
//! ```
//! use evt_response::{AllowedResponses, decode_event, Response};
//!
//! let allowed: AllowedResponses = "1;3".parse().unwrap();
//! assert_eq!(allowed.mask(), 0b101);
//! assert_eq!(decode_event(0b100).unwrap(), Response::Button(3));
//! ```

use crate::error::{EvtError, EvtResult};
use crate::event::Response;
use std::fmt;
use std::str::FromStr;

/// Raw value returned by a device when the wait timed out without a qualifying event.
pub const NO_EVENT: i32 = -1;

/// Highest button number a response box can report.
pub const MAX_BUTTONS: u8 = 8;

/// Separator used in the persisted allowed-response list.
pub const LIST_SEPARATOR: char = ';';

/// Bit for a 1-based button number. The caller guarantees `1..=MAX_BUTTONS`.
#[inline]
pub fn button_bit(button: u8) -> u8 {
    1 << (button - 1)
}

/// Validated set of allowed buttons together with its event mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowedResponses {
    buttons: Vec<u8>,
    mask: u8,
}

impl AllowedResponses {
    /// Parse a `;`-separated list such as `"1;2;3"` or a single bare number such as `"2"`.
    ///
    /// Every token must be an integer in `1..=8`. Empty tokens, non-numeric tokens and
    /// out-of-range numbers are rejected with [`EvtError::InvalidConfiguration`].
    /// Repeated buttons are accepted and collapse into a single bit.
    pub fn parse(text: &str) -> EvtResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EvtError::InvalidConfiguration(
                "allowed responses list is empty".into(),
            ));
        }

        let mut buttons = Vec::new();
        for token in text.split(LIST_SEPARATOR) {
            let token = token.trim();
            let button: u8 = token.parse().map_err(|_| {
                EvtError::InvalidConfiguration(format!(
                    "allowed responses {text:?}: {token:?} is not a button number"
                ))
            })?;
            buttons.push(button);
        }
        Self::from_buttons(buttons)
    }

    /// Build from button numbers directly.
    pub fn from_buttons(buttons: impl IntoIterator<Item = u8>) -> EvtResult<Self> {
        let mut out = Vec::new();
        let mut mask = 0u8;
        for button in buttons {
            if !(1..=MAX_BUTTONS).contains(&button) {
                return Err(EvtError::InvalidConfiguration(format!(
                    "button {button} is outside 1..={MAX_BUTTONS}"
                )));
            }
            if mask & button_bit(button) == 0 {
                out.push(button);
            }
            mask |= button_bit(button);
        }
        if out.is_empty() {
            return Err(EvtError::InvalidConfiguration(
                "allowed responses list is empty".into(),
            ));
        }
        Ok(Self { buttons: out, mask })
    }

    /// Event mask with bit `n - 1` set for each allowed button `n`.
    #[inline]
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Allowed buttons in the order they were listed.
    pub fn buttons(&self) -> &[u8] {
        &self.buttons
    }

    pub fn contains(&self, button: u8) -> bool {
        (1..=MAX_BUTTONS).contains(&button) && self.mask & button_bit(button) != 0
    }

    /// Key names accepted by the keyboard fallback (`"1"`, `"3"`, ...).
    pub fn keylist(&self) -> Vec<String> {
        self.buttons.iter().map(|b| b.to_string()).collect()
    }
}

impl FromStr for AllowedResponses {
    type Err = EvtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AllowedResponses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.keylist();
        f.write_str(&parts.join(";"))
    }
}

/// Decode a raw device event into a response.
///
/// - [`NO_EVENT`] passes through as [`Response::NoResponse`].
/// - A single-bit mask with bit `k` set decodes to `Response::Button(k + 1)`.
/// - More than one bit set means simultaneous presses and is rejected with
///   [`EvtError::MultipleButtonsPressed`].
/// - Zero, other negative values, or values wider than a byte are [`EvtError::InvalidEventMask`].
pub fn decode_event(raw: i32) -> EvtResult<Response> {
    if raw == NO_EVENT {
        return Ok(Response::NoResponse);
    }
    let mask = u8::try_from(raw).map_err(|_| EvtError::InvalidEventMask(raw))?;
    match mask.count_ones() {
        0 => Err(EvtError::InvalidEventMask(raw)),
        1 => Ok(Response::Button(mask.trailing_zeros() as u8 + 1)),
        _ => Err(EvtError::MultipleButtonsPressed { mask }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_sets_one_bit_per_button() {
        let allowed = AllowedResponses::parse("1;2;3").unwrap();
        assert_eq!(allowed.mask(), 0b111);
        assert_eq!(allowed.buttons(), &[1, 2, 3]);
    }

    #[test]
    fn bare_number_is_a_one_element_list() {
        let allowed = AllowedResponses::parse("4").unwrap();
        assert_eq!(allowed.mask(), 0b1000);
        assert_eq!(allowed.keylist(), vec!["4".to_string()]);
    }

    #[test]
    fn whitespace_around_tokens_is_ignored() {
        let allowed = AllowedResponses::parse(" 1 ; 8 ").unwrap();
        assert_eq!(allowed.mask(), 0b1000_0001);
    }

    #[test]
    fn duplicates_collapse() {
        let allowed = AllowedResponses::parse("2;2").unwrap();
        assert_eq!(allowed.mask(), 0b10);
        assert_eq!(allowed.buttons(), &[2]);
    }

    #[test]
    fn malformed_lists_are_rejected() {
        for bad in ["", "  ", "1;;2", "1;", "a", "0", "9", "1,2", "-1", "1;x"] {
            let err = AllowedResponses::parse(bad).unwrap_err();
            assert!(
                matches!(err, EvtError::InvalidConfiguration(_)),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn display_uses_separator() {
        let allowed = AllowedResponses::parse("3;1").unwrap();
        assert_eq!(allowed.to_string(), "3;1");
    }

    #[test]
    fn decode_single_bits() {
        assert_eq!(decode_event(0b1).unwrap(), Response::Button(1));
        assert_eq!(decode_event(0b100).unwrap(), Response::Button(3));
        assert_eq!(decode_event(0b1000_0000).unwrap(), Response::Button(8));
    }

    #[test]
    fn decode_sentinel_passes_through() {
        assert_eq!(decode_event(NO_EVENT).unwrap(), Response::NoResponse);
    }

    #[test]
    fn decode_rejects_simultaneous_presses() {
        let err = decode_event(0b101).unwrap_err();
        assert!(matches!(err, EvtError::MultipleButtonsPressed { mask: 0b101 }));
    }

    #[test]
    fn decode_rejects_out_of_range_values() {
        for raw in [0, -2, 256, i32::MAX] {
            assert!(matches!(
                decode_event(raw),
                Err(EvtError::InvalidEventMask(r)) if r == raw
            ));
        }
    }
}
