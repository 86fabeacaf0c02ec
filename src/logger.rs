//! Outcome sink that logs recorded responses.

use crate::event::{ResponseOutcome, ResponseSink};
use tracing::info;

/// A sink that logs every recorded outcome.
#[derive(Debug, Default)]
pub struct ResponseLogger {
    recorded: usize,
}

impl ResponseLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outcomes logged so far.
    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

impl ResponseSink for ResponseLogger {
    fn add(&mut self, outcome: &ResponseOutcome) {
        self.recorded += 1;
        info!(
            item = %outcome.item,
            response = %outcome.response,
            correct = outcome.correct,
            source = ?outcome.source,
            "[Response] {:.0} ms",
            outcome.response_time
        );
    }
}
