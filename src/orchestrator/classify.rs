//! Error classification for the execution state machine.

use crate::venue::VenueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth another attempt, either on the same venue later or on a
    /// different one chosen fresh on the next pass.
    Retriable,
    /// No amount of retrying fixes this; fail the order now.
    Terminal,
}

pub fn classify(error: &VenueError) -> FailureClass {
    if error.is_retriable() {
        FailureClass::Retriable
    } else {
        FailureClass::Terminal
    }
}
