//! Responses and recorded outcomes.
//!
//! A trial produces one raw reading from whichever input is active:
//! - a response box returns a [`DeviceEvent`] (event mask + elapsed time), decoded with
//!   [`decode_event`](crate::response::decode_event);
//! - the keyboard fallback returns a [`KeyPress`].
//!
//! Both end up as a [`Response`] inside a [`ResponseOutcome`], which is what gets handed to
//! the experiment runner through a [`ResponseSink`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Raw reading from a response box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Event mask, or [`NO_EVENT`](crate::response::NO_EVENT) on timeout.
    pub raw: i32,
    /// Time from the start of the wait to the event (or to the timeout).
    pub elapsed: Duration,
}

/// Raw reading from the keyboard fallback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPress {
    /// Key name, `None` on timeout.
    pub key: Option<String>,
    pub elapsed: Duration,
}

/// Decoded response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    /// 1-based button number.
    Button(u8),
    /// Keyboard key that is not a button number.
    Key(String),
    /// Timed out.
    NoResponse,
}

impl Response {
    /// Interpret a keyboard key. Digits `1..=8` map onto the matching button.
    pub fn from_key(key: Option<&str>) -> Self {
        match key {
            None => Response::NoResponse,
            Some(k) => match k.parse::<u8>() {
                Ok(n) if (1..=crate::response::MAX_BUTTONS).contains(&n) => Response::Button(n),
                _ => Response::Key(k.to_string()),
            },
        }
    }

    pub fn button(&self) -> Option<u8> {
        match self {
            Response::Button(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Button(n) => write!(f, "{n}"),
            Response::Key(k) => f.write_str(k),
            Response::NoResponse => f.write_str("None"),
        }
    }
}

/// Where a response came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Device { slot: usize },
    Keyboard,
}

/// One recorded trial result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseOutcome {
    /// Item name the response is recorded under.
    pub item: String,
    pub response: Response,
    /// Response time in milliseconds.
    pub response_time: f64,
    pub correct: bool,
    pub source: ResponseSource,
}

/// Receiver for recorded outcomes (the experiment runner's response list).
///
/// Receives the response time, correctness, response and item name of each trial,
/// bundled as a [`ResponseOutcome`].
pub trait ResponseSink {
    fn add(&mut self, outcome: &ResponseOutcome);
}

impl ResponseSink for Vec<ResponseOutcome> {
    fn add(&mut self, outcome: &ResponseOutcome) {
        self.push(outcome.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_keys_become_buttons() {
        assert_eq!(Response::from_key(Some("3")), Response::Button(3));
        assert_eq!(Response::from_key(Some("9")), Response::Key("9".into()));
        assert_eq!(Response::from_key(Some("space")), Response::Key("space".into()));
        assert_eq!(Response::from_key(None), Response::NoResponse);
    }

    #[test]
    fn outcome_serializes_as_json() {
        let outcome = ResponseOutcome {
            item: "rsp".into(),
            response: Response::Button(2),
            response_time: 412.0,
            correct: true,
            source: ResponseSource::Device { slot: 1 },
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"button\":2"));
        assert!(json.contains("\"device\":{\"slot\":1}"));
    }
}
