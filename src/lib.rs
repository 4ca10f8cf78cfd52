// imagecraft - image generation and editing studio
// Raster tools, task orchestration and session bookkeeping around an inference capability

pub mod config;
pub mod orchestration;
pub mod raster;
pub mod session;

pub use imagent::{EncodedImage, InferenceCapability, InferenceError, PromptCategory, TaskKind};
