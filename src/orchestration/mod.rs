// Orchestration - per-item task pipeline around the inference capability

pub mod dispatch;
pub mod failure;
pub mod orchestrator;
pub mod previews;
pub mod transition;
pub mod types;

pub use dispatch::{AuxInputs, ExternalCall, InputMissing};
pub use failure::{FailureKind, Routing};
pub use orchestrator::{artifact_name, Orchestrator, SubmitError};
pub use previews::{DataUrlPreviews, PreviewBackend, PreviewHandle, PreviewRegistry};
pub use transition::{InvalidTransition, ItemEvent};
pub use types::*;
