//! Color mapping for task and copy-task states.

use console::{style, StyledObject};

use crate::domain::models::{DelegationState, TaskOutcome};

pub fn colorize_outcome(outcome: TaskOutcome) -> StyledObject<&'static str> {
    let text = outcome.as_str();
    match outcome {
        TaskOutcome::Completed => style(text).green().bold(),
        TaskOutcome::Rejected | TaskOutcome::ReturnedToRejected => style(text).red(),
        TaskOutcome::Withdrawn => style(text).yellow(),
        _ => style(text).dim(),
    }
}

pub fn colorize_delegation(state: DelegationState) -> StyledObject<&'static str> {
    match state {
        DelegationState::Pending => style("pending").yellow(),
        DelegationState::Resolved => style("resolved").cyan(),
        DelegationState::None => style("-").dim(),
    }
}

pub fn colorize_read(is_read: bool) -> StyledObject<&'static str> {
    if is_read {
        style("read").dim()
    } else {
        style("unread").blue().bold()
    }
}
