//! evt-response: response-box trials for EVT (EventExchanger) devices.
//!
//! Encodes the allowed buttons of a trial as an event mask, drives the RGB button LEDs of a
//! response box (idle colors, pre-armed correct/incorrect feedback), waits for a qualifying
//! press, decodes it, and scores it. When no box is selected or none can be opened, trials
//! fall back to the keyboard.

pub mod backends;
pub mod color;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod logger;
pub mod metadata;
pub mod registry;
pub mod response;
pub mod sequencer;
pub mod session;

pub use color::Rgb;
pub use config::{DeviceSelector, SessionConfig, Timeout, TrialConfig, TrialPlan};
pub use device::{DeviceBackend, KeyboardInput, LedTrigger, ResponseDevice};
pub use error::{EvtError, EvtResult};
pub use event::{DeviceEvent, KeyPress, Response, ResponseOutcome, ResponseSink, ResponseSource};
pub use logger::ResponseLogger;
pub use metadata::DeviceDescriptor;
pub use registry::DeviceRegistry;
pub use response::{decode_event, AllowedResponses, NO_EVENT};
pub use sequencer::{FeedbackSequencer, TrialState};
pub use session::{ActiveDevice, PreparedTrial, Session, TrialRun};
