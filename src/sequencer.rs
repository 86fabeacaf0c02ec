//! LED feedback sequencing for one trial.
//!
//! A trial on a response box runs through
//!
//! ```text
//! Idle → ColorsSet → AwaitingResponse ─┬──────────────→ Done
//!                                      ├─→ TimedOut ──┬→ Done
//!                                      │              └→ FeedbackShown → Done
//!                                      └─→ FeedbackShown → Done
//! ```
//!
//! 1. LEDs 1..=4 get their idle colors immediately.
//! 2. With feedback enabled, every LED is pre-armed with the incorrect color to fire when
//!    its own button is pressed, and the correct button's LED is re-armed with the correct
//!    color. The device applies these itself when the press happens.
//! 3. The sequencer blocks in `wait_for_event` with the allowed mask and timeout.
//! 4. With feedback enabled it holds for the reset delay, then switches all LEDs off.
//!
//! LED commands are fire-and-forget: a failed write is logged and the trial continues.
//! Only a failing wait aborts the trial.

use crate::color::Rgb;
use crate::config::TrialPlan;
use crate::device::{LedTrigger, ResponseDevice, LED_COUNT};
use crate::error::EvtResult;
use crate::event::DeviceEvent;
use crate::response::NO_EVENT;
use tracing::{debug, warn};

/// Per-trial state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialState {
    Idle,
    ColorsSet,
    AwaitingResponse,
    TimedOut,
    FeedbackShown,
    Done,
}

impl TrialState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: TrialState) -> bool {
        use TrialState::*;
        matches!(
            (self, next),
            (Idle, ColorsSet)
                | (ColorsSet, AwaitingResponse)
                | (AwaitingResponse, TimedOut | FeedbackShown | Done)
                | (TimedOut, FeedbackShown | Done)
                | (FeedbackShown, Done)
        )
    }
}

/// One LED color command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedCommand {
    /// 1-based LED number.
    pub led: u8,
    pub color: Rgb,
    pub trigger: LedTrigger,
}

fn leds() -> impl Iterator<Item = u8> {
    1..=LED_COUNT as u8
}

/// Idle colors, applied immediately.
pub fn idle_commands(plan: &TrialPlan) -> Vec<LedCommand> {
    leds()
        .zip(plan.idle_colors)
        .map(|(led, color)| LedCommand {
            led,
            color,
            trigger: LedTrigger::Immediate,
        })
        .collect()
}

/// Pre-armed feedback colors; empty when feedback is disabled.
///
/// The correct button's LED is armed last so it overrides the incorrect color. A correct
/// button without an LED (5..=8) only gets the incorrect colors on the others.
pub fn feedback_commands(plan: &TrialPlan) -> Vec<LedCommand> {
    let Some(colors) = plan.feedback else {
        return Vec::new();
    };

    let mut out: Vec<LedCommand> = leds()
        .map(|led| LedCommand {
            led,
            color: colors.incorrect,
            trigger: LedTrigger::OnButton(led),
        })
        .collect();

    if leds().any(|led| led == plan.correct_button) {
        out.push(LedCommand {
            led: plan.correct_button,
            color: colors.correct,
            trigger: LedTrigger::OnButton(plan.correct_button),
        });
    } else {
        debug!(
            correct = plan.correct_button,
            "Correct button has no LED, correct color not armed"
        );
    }
    out
}

/// All LEDs off.
pub fn extinguish_commands() -> Vec<LedCommand> {
    leds()
        .map(|led| LedCommand {
            led,
            color: Rgb::BLACK,
            trigger: LedTrigger::Immediate,
        })
        .collect()
}

/// Result of a sequenced trial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceReport {
    pub event: DeviceEvent,
    /// States visited, starting with `Idle` and ending with `Done`.
    pub states: Vec<TrialState>,
}

/// Drives one trial on a response box.
pub struct FeedbackSequencer<'a> {
    device: &'a mut dyn ResponseDevice,
    states: Vec<TrialState>,
}

impl<'a> FeedbackSequencer<'a> {
    pub fn new(device: &'a mut dyn ResponseDevice) -> Self {
        Self {
            device,
            states: vec![TrialState::Idle],
        }
    }

    pub fn state(&self) -> TrialState {
        self.states.last().copied().unwrap_or(TrialState::Idle)
    }

    fn advance(&mut self, next: TrialState) {
        debug_assert!(
            self.state().can_advance_to(next),
            "illegal trial transition {:?} -> {next:?}",
            self.state()
        );
        self.states.push(next);
    }

    fn send(&mut self, commands: &[LedCommand]) {
        for cmd in commands {
            if let Err(e) = self.device.set_led(cmd.led, cmd.color, cmd.trigger) {
                warn!(
                    device = self.device.id(),
                    led = cmd.led,
                    error = %e,
                    "LED command failed"
                );
            }
        }
    }

    /// Run the whole trial and return the raw event.
    pub fn run(mut self, plan: &TrialPlan) -> EvtResult<SequenceReport> {
        self.send(&idle_commands(plan));
        self.send(&feedback_commands(plan));
        self.advance(TrialState::ColorsSet);

        self.advance(TrialState::AwaitingResponse);
        let event = self
            .device
            .wait_for_event(plan.allowed.mask(), plan.timeout.as_duration())?;
        if event.raw == NO_EVENT && plan.timeout.is_finite() {
            self.advance(TrialState::TimedOut);
        }

        if plan.feedback.is_some() {
            self.advance(TrialState::FeedbackShown);
            std::thread::sleep(plan.reset_delay);
            self.send(&extinguish_commands());
        }
        self.advance(TrialState::Done);

        Ok(SequenceReport {
            event,
            states: self.states,
        })
    }
}
