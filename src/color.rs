//! Color parsing for LED commands.

use crate::error::EvtError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 24-bit RGB color, written as `"#RRGGBB"` in configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(u32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0x000000);
    pub const GREEN: Rgb = Rgb(0x00FF00);
    pub const RED: Rgb = Rgb(0xFF0000);

    /// Build from a packed `0xRRGGBB` value. Bits above 23 are dropped.
    pub const fn from_u32(value: u32) -> Self {
        Rgb(value & 0x00FF_FFFF)
    }

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    #[inline]
    pub const fn r(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    #[inline]
    pub const fn g(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    #[inline]
    pub const fn b(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub const fn channels(self) -> (u8, u8, u8) {
        (self.r(), self.g(), self.b())
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl FromStr for Rgb {
    type Err = EvtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .filter(|h| h.len() == 6 && h.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| EvtError::InvalidColor(s.to_string()))?;
        u32::from_str_radix(hex, 16)
            .map(Rgb)
            .map_err(|_| EvtError::InvalidColor(s.to_string()))
    }
}

impl TryFrom<String> for Rgb {
    type Error = EvtError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channels() {
        let c: Rgb = "#12AbEF".parse().unwrap();
        assert_eq!(c.channels(), (0x12, 0xAB, 0xEF));
        assert_eq!(c.as_u32(), 0x12ABEF);
        assert_eq!("#00FF00".parse::<Rgb>().unwrap(), Rgb::GREEN);
        assert_eq!("#FF0000".parse::<Rgb>().unwrap(), Rgb::RED);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "#", "00FF00", "#00FF0", "#00FF000", "#GG0000", "0x00FF00", "#+0FF00"] {
            assert!(
                matches!(bad.parse::<Rgb>(), Err(EvtError::InvalidColor(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_round_trips() {
        let c = Rgb::new(1, 2, 3);
        assert_eq!(c.to_string(), "#010203");
        assert_eq!(c.to_string().parse::<Rgb>().unwrap(), c);
    }

    #[test]
    fn test_from_u32_masks_high_bits() {
        assert_eq!(Rgb::from_u32(0xFF12_3456).as_u32(), 0x123456);
    }
}
