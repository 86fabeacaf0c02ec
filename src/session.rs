//! Experiment session.
//!
//! A [`Session`] owns the [`DeviceRegistry`] and the keyboard fallback for the lifetime of
//! one experiment and is passed by `&mut` to every trial. Dropping it (or calling
//! [`Session::close`]) releases every device handle.
//!
//! Per trial:
//! 1. [`Session::prepare`] validates the configuration (errors here are returned) and
//!    resolves which input to use. Hardware problems are not errors: a failed scan, an
//!    empty scan, or a selected slot that did not attach all downgrade to the keyboard.
//! 2. [`Session::run`] drives the response box through the
//!    [`FeedbackSequencer`](crate::sequencer::FeedbackSequencer) (or reads the keyboard),
//!    decodes the response and scores it.
//! 3. [`Session::run_and_record`] additionally hands the outcome to a [`ResponseSink`].

use crate::config::{DeviceSelector, TrialConfig, TrialPlan, DEFAULT_GROUP, KEYBOARD_LABEL};
use crate::device::{DeviceBackend, KeyboardInput};
use crate::error::EvtResult;
use crate::event::{Response, ResponseOutcome, ResponseSink, ResponseSource};
use crate::registry::DeviceRegistry;
use crate::response::decode_event;
use crate::sequencer::{FeedbackSequencer, TrialState};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Devices beyond this many are left out of choice lists so slots stay single-digit.
pub const MAX_LISTED_DEVICES: usize = 9;

/// Input a prepared trial will read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveDevice {
    Device { slot: usize },
    Keyboard,
}

/// A validated trial bound to an input.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedTrial {
    pub plan: TrialPlan,
    pub active: ActiveDevice,
}

/// Result of [`Session::run`]: the outcome plus the LED sequence states visited
/// (empty for keyboard trials).
#[derive(Clone, Debug, PartialEq)]
pub struct TrialRun {
    pub outcome: ResponseOutcome,
    pub states: Vec<TrialState>,
}

pub struct Session {
    group: String,
    registry: DeviceRegistry,
    keyboard: Box<dyn KeyboardInput>,
}

impl Session {
    pub fn new(backend: Box<dyn DeviceBackend>, keyboard: Box<dyn KeyboardInput>) -> Self {
        Self {
            group: DEFAULT_GROUP.to_string(),
            registry: DeviceRegistry::new(backend),
            keyboard,
        }
    }

    /// Scan for a different product group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    /// Choice list for a device selector: the keyboard first, then each device found.
    ///
    /// A failing scan leaves only the keyboard entry.
    pub fn device_choices(&mut self) -> Vec<String> {
        let mut choices = vec![KEYBOARD_LABEL.to_string()];
        match self.registry.discover(&self.group) {
            Ok(found) => choices.extend(
                found
                    .iter()
                    .take(MAX_LISTED_DEVICES)
                    .enumerate()
                    .map(|(i, d)| d.label(i + 1)),
            ),
            Err(e) => warn!(error = %e, "Listing EVT devices failed"),
        }
        choices
    }

    /// Validate `config` and pick the input for the trial.
    pub fn prepare(&mut self, config: &TrialConfig) -> EvtResult<PreparedTrial> {
        let plan = config.prepare()?;
        let active = self.resolve(&plan.device);
        debug!(item = %plan.item, mask = plan.allowed.mask(), ?active, "Prepared trial");
        Ok(PreparedTrial { plan, active })
    }

    /// Map a selector onto an open device, falling back to the keyboard.
    ///
    /// The keyboard selector makes no vendor calls at all.
    pub fn resolve(&mut self, selector: &DeviceSelector) -> ActiveDevice {
        let Some(slot) = selector.slot() else {
            return ActiveDevice::Keyboard;
        };

        match self.registry.populate(&self.group) {
            Err(e) => {
                warn!(error = %e, "Connecting EVT device failed, using keyboard");
                ActiveDevice::Keyboard
            }
            Ok(found) if found.is_empty() => {
                warn!(group = %self.group, "No EVT devices found, using keyboard");
                ActiveDevice::Keyboard
            }
            Ok(found) => {
                // Slots only hold within this scan: the device must be in it and attached.
                let attached = slot
                    .checked_sub(1)
                    .and_then(|i| found.get(i))
                    .is_some_and(|d| self.registry.holds(slot, d));
                if attached {
                    info!(slot, "Current device: {}", selector);
                    ActiveDevice::Device { slot }
                } else {
                    warn!(
                        slot,
                        selector = %selector,
                        "Selected EVT device is not available, using keyboard"
                    );
                    ActiveDevice::Keyboard
                }
            }
        }
    }

    /// Run a prepared trial.
    pub fn run(&mut self, trial: &PreparedTrial) -> EvtResult<TrialRun> {
        let plan = &trial.plan;

        let (response, elapsed, states, source) = match trial.active {
            ActiveDevice::Device { slot } => {
                let device = self.registry.select(slot)?;
                let report = FeedbackSequencer::new(device).run(plan)?;
                let response = decode_event(report.event.raw)?;
                (
                    response,
                    report.event.elapsed,
                    report.states,
                    ResponseSource::Device { slot },
                )
            }
            ActiveDevice::Keyboard => {
                let press = self
                    .keyboard
                    .get_key(&plan.allowed.keylist(), plan.timeout.as_duration())?;
                (
                    Response::from_key(press.key.as_deref()),
                    press.elapsed,
                    Vec::new(),
                    ResponseSource::Keyboard,
                )
            }
        };

        let correct = response.button() == Some(plan.correct_button);
        Ok(TrialRun {
            outcome: ResponseOutcome {
                item: plan.item.clone(),
                response,
                response_time: millis(elapsed),
                correct,
                source,
            },
            states,
        })
    }

    /// Run a prepared trial and add its outcome to `sink`.
    pub fn run_and_record(
        &mut self,
        trial: &PreparedTrial,
        sink: &mut dyn ResponseSink,
    ) -> EvtResult<ResponseOutcome> {
        let run = self.run(trial)?;
        sink.add(&run.outcome);
        Ok(run.outcome)
    }

    /// Release every device handle.
    pub fn close(mut self) {
        self.registry.close_all();
    }
}

fn millis(d: Duration) -> f64 {
    d.as_micros() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::{VirtualBackend, VirtualKeyboard};
    use crate::metadata::DeviceDescriptor;

    fn rsp(path: &str, serial: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(path, "EventExchanger-RSP-LT-4", serial)
    }

    #[test]
    fn choices_list_keyboard_then_devices() {
        let backend = VirtualBackend::new()
            .with_device(rsp("a", "11"))
            .with_device(rsp("b", "22"));
        let mut session = Session::new(Box::new(backend), Box::new(VirtualKeyboard::new()));
        assert_eq!(
            session.device_choices(),
            vec![
                KEYBOARD_LABEL.to_string(),
                "1: RSP-LT-4 s/n: 11".to_string(),
                "2: RSP-LT-4 s/n: 22".to_string(),
            ]
        );
    }

    #[test]
    fn choices_are_capped() {
        let mut backend = VirtualBackend::new();
        for i in 0..12 {
            backend = backend.with_device(rsp(&format!("p{i}"), &i.to_string()));
        }
        let mut session = Session::new(Box::new(backend), Box::new(VirtualKeyboard::new()));
        assert_eq!(session.device_choices().len(), 1 + MAX_LISTED_DEVICES);
    }

    #[test]
    fn choices_on_scan_failure() {
        let backend = VirtualBackend::new().failing_scan();
        let mut session = Session::new(Box::new(backend), Box::new(VirtualKeyboard::new()));
        assert_eq!(session.device_choices(), vec![KEYBOARD_LABEL.to_string()]);
    }

    #[test]
    fn stale_slot_resolves_to_keyboard() {
        let backend = VirtualBackend::new().with_device(rsp("a", "1"));
        let mut session = Session::new(Box::new(backend), Box::new(VirtualKeyboard::new()));
        let selector: DeviceSelector = "3: RSP-LT-4 s/n: 9".parse().unwrap();
        assert_eq!(session.resolve(&selector), ActiveDevice::Keyboard);
    }

    #[test]
    fn custom_group_is_scanned() {
        let backend = VirtualBackend::new()
            .with_device(DeviceDescriptor::new("a", "EventExchanger-EVT-2", "5"));
        let mut session = Session::new(Box::new(backend), Box::new(VirtualKeyboard::new()))
            .with_group("EVT-2");
        assert_eq!(session.group(), "EVT-2");
        let selector: DeviceSelector = "1: EVT-2 s/n: 5".parse().unwrap();
        assert_eq!(session.resolve(&selector), ActiveDevice::Device { slot: 1 });
    }

    #[test]
    fn millis_conversion() {
        assert_eq!(millis(Duration::from_millis(412)), 412.0);
    }
}
