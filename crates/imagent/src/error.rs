// Error types for imagent

use crate::TaskKind;
use thiserror::Error;

/// Result type for imagent operations
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Errors raised by an inference backend.
///
/// The `Display` text of every variant is the message shown to the user,
/// so callers can surface `err.to_string()` directly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Your request was blocked by the safety filter ({0}). Please modify your prompt or use a different image.")]
    BlockedBySafety(String),

    #[error("The API returned an empty response.")]
    EmptyResult,

    #[error("The API returned an empty description. The image might be unrecognizable.")]
    EmptyDescription,

    #[error("The AI gave a text response instead of an image: \"{0}\"")]
    ModelRefused(String),

    #[error("Invalid or unsupported image processing task: {0}.")]
    UnsupportedTask(TaskKind),

    #[error("You are offline. Please check your internet connection.")]
    Offline,

    #[error("Network error: Could not connect to the AI service. Please check your internet connection and try again.")]
    NetworkUnreachable(String),

    #[error("The provided API key is not valid. Please ensure it is configured correctly.")]
    InvalidCredential,

    #[error("You have exceeded your API quota. Please check your account status or try again later.")]
    QuotaExceeded,

    #[error("The service is currently busy. Please try again in a few moments.")]
    ServiceBusy,

    #[error("An unexpected error occurred while communicating with the AI (status {status}).")]
    Api { status: u16, message: String },

    #[error("Could not decode the returned image: {0}")]
    Decode(String),
}

impl InferenceError {
    /// Map a raw error message from the remote service onto the taxonomy.
    pub fn from_api_message(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if message.contains("SAFETY") {
            InferenceError::BlockedBySafety("SAFETY".to_string())
        } else if message.contains("API key not valid") {
            InferenceError::InvalidCredential
        } else if lower.contains("quota") {
            InferenceError::QuotaExceeded
        } else if lower.contains("resource has been exhausted") {
            InferenceError::ServiceBusy
        } else if message.contains("API_KEY") {
            InferenceError::InvalidCredential
        } else {
            InferenceError::Api { status, message }
        }
    }

    /// True for content-policy refusals, which get their own UI surface.
    pub fn is_safety_block(&self) -> bool {
        matches!(self, InferenceError::BlockedBySafety(_))
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        let detail = err.to_string();
        if err.is_connect() || err.is_timeout() {
            // reqwest folds resolver failures into connect errors
            let chain = format!("{:?}", err).to_lowercase();
            if chain.contains("dns error") || chain.contains("failed to lookup") {
                return InferenceError::Offline;
            }
            return InferenceError::NetworkUnreachable(detail);
        }
        if err.is_decode() {
            return InferenceError::Decode(detail);
        }
        InferenceError::Api {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: detail,
        }
    }
}

impl From<base64::DecodeError> for InferenceError {
    fn from(err: base64::DecodeError) -> Self {
        InferenceError::Decode(err.to_string())
    }
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        InferenceError::Decode(err.to_string())
    }
}
