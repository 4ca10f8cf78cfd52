// Failure classification
// Decides how a failed item is reported: safety modal or inline banner

use super::types::ItemFailure;
use crate::raster::RasterError;
use imagent::InferenceError;
use serde::{Deserialize, Serialize};

const SAFETY_PHRASE: &str = "blocked by the safety filter";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureKind {
    SafetyBlocked,
    EmptyOrMissingResult,
    ModelRefusedWithText,
    UnsupportedTask,
    InputMissing,
    NetworkUnavailable,
    InvalidCredential,
    QuotaExceeded,
    ServiceBusy,
    Unknown,
}

/// UI surface a failure is shown on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    Modal,
    Banner,
}

impl FailureKind {
    pub fn routing(&self) -> Routing {
        match self {
            FailureKind::SafetyBlocked => Routing::Modal,
            _ => Routing::Banner,
        }
    }

    /// Classify from message text alone, for errors without a typed kind
    pub fn from_message(message: &str) -> Self {
        if message.contains(SAFETY_PHRASE) {
            FailureKind::SafetyBlocked
        } else {
            FailureKind::Unknown
        }
    }
}

impl From<&InferenceError> for FailureKind {
    fn from(err: &InferenceError) -> Self {
        match err {
            InferenceError::BlockedBySafety(_) => FailureKind::SafetyBlocked,
            InferenceError::EmptyResult | InferenceError::EmptyDescription => {
                FailureKind::EmptyOrMissingResult
            }
            InferenceError::ModelRefused(_) => FailureKind::ModelRefusedWithText,
            InferenceError::UnsupportedTask(_) => FailureKind::UnsupportedTask,
            InferenceError::Offline | InferenceError::NetworkUnreachable(_) => {
                FailureKind::NetworkUnavailable
            }
            InferenceError::InvalidCredential => FailureKind::InvalidCredential,
            InferenceError::QuotaExceeded => FailureKind::QuotaExceeded,
            InferenceError::ServiceBusy => FailureKind::ServiceBusy,
            InferenceError::Api { message, .. } => FailureKind::from_message(message),
            InferenceError::Decode(_) => FailureKind::Unknown,
        }
    }
}

impl From<&InferenceError> for ItemFailure {
    fn from(err: &InferenceError) -> Self {
        ItemFailure::new(FailureKind::from(err), err.to_string())
    }
}

impl From<&RasterError> for ItemFailure {
    fn from(err: &RasterError) -> Self {
        let message = err.to_string();
        ItemFailure::new(FailureKind::from_message(&message), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagent::TaskKind;

    #[test]
    fn test_only_safety_goes_to_modal() {
        let safety = ItemFailure::from(&InferenceError::BlockedBySafety("SAFETY".into()));
        assert_eq!(safety.kind, FailureKind::SafetyBlocked);
        assert_eq!(safety.kind.routing(), Routing::Modal);
        assert!(safety.message.contains(SAFETY_PHRASE));

        for err in [
            InferenceError::QuotaExceeded,
            InferenceError::Offline,
            InferenceError::ModelRefused("no".into()),
            InferenceError::UnsupportedTask(TaskKind::Describe),
        ] {
            assert_eq!(FailureKind::from(&err).routing(), Routing::Banner, "{:?}", err);
        }
    }

    #[test]
    fn test_connectivity_kinds() {
        assert_eq!(
            FailureKind::from(&InferenceError::NetworkUnreachable("refused".into())),
            FailureKind::NetworkUnavailable
        );
        assert_eq!(FailureKind::from(&InferenceError::Offline), FailureKind::NetworkUnavailable);
        assert_eq!(FailureKind::from(&InferenceError::ServiceBusy), FailureKind::ServiceBusy);
    }

    #[test]
    fn test_message_fallback() {
        let err = InferenceError::Api {
            status: 500,
            message: "Request blocked by the safety filter upstream".into(),
        };
        assert_eq!(FailureKind::from(&err), FailureKind::SafetyBlocked);
        assert_eq!(FailureKind::from_message("socket hang up"), FailureKind::Unknown);
    }
}
