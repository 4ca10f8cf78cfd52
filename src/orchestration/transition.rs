// Item state machine
// queued -> processing -> success | error, as pure transitions

use super::types::{ItemFailure, ItemResult, ItemState, ItemStatus};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    Start,
    Succeed(ItemResult),
    Fail(ItemFailure),
}

impl ItemEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ItemEvent::Start => "start",
            ItemEvent::Succeed(_) => "succeed",
            ItemEvent::Fail(_) => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot {event} an item that is {}", .from.as_str())]
pub struct InvalidTransition {
    pub from: ItemStatus,
    pub event: &'static str,
}

impl ItemState {
    /// Next state for `event`. Terminal states accept nothing.
    pub fn apply(self, event: ItemEvent) -> Result<ItemState, InvalidTransition> {
        match (self, event) {
            (ItemState::Queued, ItemEvent::Start) => Ok(ItemState::Processing),
            (ItemState::Processing, ItemEvent::Succeed(result)) => Ok(ItemState::Success(result)),
            (ItemState::Processing, ItemEvent::Fail(failure)) => Ok(ItemState::Error(failure)),
            (state, event) => Err(InvalidTransition {
                from: state.status(),
                event: event.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::failure::FailureKind;

    #[test]
    fn test_happy_path() {
        let state = ItemState::Queued.apply(ItemEvent::Start).unwrap();
        assert_eq!(state, ItemState::Processing);
        let state = state
            .apply(ItemEvent::Succeed(ItemResult::Text("ok".into())))
            .unwrap();
        assert_eq!(state.status(), ItemStatus::Success);
    }

    #[test]
    fn test_failure_path() {
        let failure = ItemFailure::new(FailureKind::QuotaExceeded, "quota");
        let state = ItemState::Processing
            .apply(ItemEvent::Fail(failure.clone()))
            .unwrap();
        assert_eq!(state, ItemState::Error(failure));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let done = ItemState::Success(ItemResult::Text("ok".into()));
        let err = done.apply(ItemEvent::Start).unwrap_err();
        assert_eq!(err.from, ItemStatus::Success);
        assert_eq!(err.to_string(), "Cannot start an item that is success");

        let failed = ItemState::Error(ItemFailure::new(FailureKind::Unknown, "x"));
        assert!(failed.apply(ItemEvent::Start).is_err());
    }

    #[test]
    fn test_no_skipping_processing() {
        assert!(ItemState::Queued
            .apply(ItemEvent::Succeed(ItemResult::Text("ok".into())))
            .is_err());
        assert!(ItemState::Processing.apply(ItemEvent::Start).is_err());
    }
}
