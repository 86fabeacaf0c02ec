//! Trial configuration.
//!
//! [`TrialConfig`] holds the fields exactly as they are persisted per item (text the user
//! typed, with the plugin's defaults). Loading never fails on field *content*; all checks
//! happen in [`TrialConfig::prepare`], which turns the text into a typed [`TrialPlan`] or
//! returns a descriptive error before any device is touched.
//!
//! A session file groups several trials:
//!
//! ```toml
//! group = "RSP-LT"
//!
//! [[trials]]
//! item = "practice"
//! device = "1: RSP-LT-4 s/n: 00421"
//! correct_response = 3
//! allowed_responses = "1;3"
//! timeout = 2000
//! feedback = "yes"
//! ```

use crate::color::Rgb;
use crate::device::LED_COUNT;
use crate::error::{EvtError, EvtResult};
use crate::response::{AllowedResponses, MAX_BUTTONS};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Product group scanned for by default.
pub const DEFAULT_GROUP: &str = "RSP-LT";

/// Selector text meaning "no response box, use the keyboard".
pub const KEYBOARD_LABEL: &str = "0: Keyboard";

/// Longest finite timeout accepted, in milliseconds (one hour).
pub const MAX_TIMEOUT_MS: u32 = 3_600_000;

// ---------------------------------------------------------------------------
// Timeout
// ---------------------------------------------------------------------------

/// How long a trial waits for a response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Timeout {
    #[default]
    Infinite,
    Millis(u32),
}

impl Timeout {
    /// `None` for an unbounded wait.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Infinite => None,
            Timeout::Millis(ms) => Some(Duration::from_millis(ms as u64)),
        }
    }

    pub fn is_finite(self) -> bool {
        matches!(self, Timeout::Millis(_))
    }

    fn from_millis(ms: i64, text: &str) -> EvtResult<Self> {
        u32::try_from(ms)
            .ok()
            .filter(|ms| *ms <= MAX_TIMEOUT_MS)
            .map(Timeout::Millis)
            .ok_or_else(|| EvtError::InvalidTimeout(text.to_string()))
    }
}

impl FromStr for Timeout {
    type Err = EvtError;

    /// Accepts `"infinite"` (any case) or an integer number of milliseconds in
    /// `0..=3600000`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.eq_ignore_ascii_case("infinite") {
            return Ok(Timeout::Infinite);
        }
        let ms: i64 = text
            .parse()
            .map_err(|_| EvtError::InvalidTimeout(s.to_string()))?;
        Self::from_millis(ms, s)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Infinite => f.write_str("infinite"),
            Timeout::Millis(ms) => write!(f, "{ms}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Device selector
// ---------------------------------------------------------------------------

/// Which input a trial uses, as chosen from the device list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeviceSelector {
    #[default]
    Keyboard,
    /// A discovered device. `label` is the full choice text it was selected from.
    Slot { slot: usize, label: String },
}

impl DeviceSelector {
    pub fn slot(&self) -> Option<usize> {
        match self {
            DeviceSelector::Keyboard => None,
            DeviceSelector::Slot { slot, .. } => Some(*slot),
        }
    }

    pub fn is_keyboard(&self) -> bool {
        matches!(self, DeviceSelector::Keyboard)
    }

    /// Check a persisted selector against the current device choice list.
    ///
    /// If the hardware changed since the selector was saved its label is no longer listed;
    /// the selection then falls back to the keyboard.
    pub fn reconcile(&self, choices: &[String]) -> DeviceSelector {
        match self {
            DeviceSelector::Keyboard => DeviceSelector::Keyboard,
            DeviceSelector::Slot { label, .. } if choices.iter().any(|c| c == label) => {
                self.clone()
            }
            DeviceSelector::Slot { label, .. } => {
                warn!(
                    selector = %label,
                    "Hardware configuration changed since the last run, switching to keyboard"
                );
                DeviceSelector::Keyboard
            }
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = EvtError;

    /// The slot is the integer in front of the first `:`; `0` is the keyboard.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let head = text.split(':').next().unwrap_or_default().trim();
        let slot: usize = head.parse().map_err(|_| {
            EvtError::InvalidConfiguration(format!("device selector {s:?} has no slot number"))
        })?;
        Ok(match slot {
            0 => DeviceSelector::Keyboard,
            slot => DeviceSelector::Slot {
                slot,
                label: text.to_string(),
            },
        })
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Keyboard => f.write_str(KEYBOARD_LABEL),
            DeviceSelector::Slot { label, .. } => f.write_str(label),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted fields
// ---------------------------------------------------------------------------

/// Per-item configuration as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Name the response is recorded under.
    pub item: String,
    /// Device choice text, `"0: Keyboard"` for the keyboard.
    pub device: String,
    #[serde(deserialize_with = "text_or_integer")]
    pub correct_response: String,
    /// `;`-separated button numbers.
    #[serde(deserialize_with = "text_or_integer")]
    pub allowed_responses: String,
    /// `"infinite"` or milliseconds.
    #[serde(deserialize_with = "text_or_integer")]
    pub timeout: String,
    pub button1_color: String,
    pub button2_color: String,
    pub button3_color: String,
    pub button4_color: String,
    /// Milliseconds the feedback colors stay on before the LEDs are switched off.
    pub reset_delay: u64,
    #[serde(deserialize_with = "yes_no")]
    pub feedback: bool,
    pub correct_color: String,
    pub incorrect_color: String,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            item: "rgb_led_control".into(),
            device: KEYBOARD_LABEL.into(),
            correct_response: "1".into(),
            allowed_responses: "1;2;3".into(),
            timeout: "infinite".into(),
            button1_color: "#000000".into(),
            button2_color: "#000000".into(),
            button3_color: "#000000".into(),
            button4_color: "#000000".into(),
            reset_delay: 500,
            feedback: true,
            correct_color: "#00FF00".into(),
            incorrect_color: "#FF0000".into(),
        }
    }
}

/// Accept either a TOML string or integer for fields persisted as text.
fn text_or_integer<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Integer(i64),
    }

    Ok(match Repr::deserialize(d)? {
        Repr::Text(s) => s,
        Repr::Integer(n) => n.to_string(),
    })
}

/// Accept a boolean or the persisted `"yes"` / `"no"` strings.
fn yes_no<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Flag(bool),
        Text(String),
    }

    match Repr::deserialize(d)? {
        Repr::Flag(b) => Ok(b),
        Repr::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Ok(true),
            "no" | "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected \"yes\" or \"no\", got \"{other}\""
            ))),
        },
    }
}

/// Feedback colors armed before the wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedbackColors {
    pub correct: Rgb,
    pub incorrect: Rgb,
}

/// Validated, typed form of a [`TrialConfig`].
#[derive(Clone, Debug, PartialEq)]
pub struct TrialPlan {
    pub item: String,
    pub device: DeviceSelector,
    pub correct_button: u8,
    pub allowed: AllowedResponses,
    pub timeout: Timeout,
    /// Idle color of LEDs 1..=4.
    pub idle_colors: [Rgb; LED_COUNT],
    pub reset_delay: Duration,
    /// `None` when feedback is disabled.
    pub feedback: Option<FeedbackColors>,
}

impl TrialConfig {
    /// Validate every field and build the plan used to run the trial.
    pub fn prepare(&self) -> EvtResult<TrialPlan> {
        let allowed = AllowedResponses::parse(&self.allowed_responses)?;

        let correct_button: u8 = self
            .correct_response
            .trim()
            .parse()
            .ok()
            .filter(|n| (1..=MAX_BUTTONS).contains(n))
            .ok_or_else(|| {
                EvtError::InvalidConfiguration(format!(
                    "correct response {:?} is not a button in 1..={MAX_BUTTONS}",
                    self.correct_response
                ))
            })?;
        if !allowed.contains(correct_button) {
            warn!(
                item = %self.item,
                correct = correct_button,
                allowed = %allowed,
                "Correct response is not an allowed response"
            );
        }

        let timeout: Timeout = self.timeout.parse()?;
        let device: DeviceSelector = self.device.parse()?;

        let idle_colors = [
            self.button1_color.parse()?,
            self.button2_color.parse()?,
            self.button3_color.parse()?,
            self.button4_color.parse()?,
        ];

        let colors = FeedbackColors {
            correct: self.correct_color.parse()?,
            incorrect: self.incorrect_color.parse()?,
        };

        Ok(TrialPlan {
            item: self.item.clone(),
            device,
            correct_button,
            allowed,
            timeout,
            idle_colors,
            reset_delay: Duration::from_millis(self.reset_delay),
            feedback: self.feedback.then_some(colors),
        })
    }
}

/// A session file: product group to scan for and the trials to run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub group: String,
    pub trials: Vec<TrialConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP.into(),
            trials: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> EvtResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> EvtResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
