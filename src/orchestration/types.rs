// Core types for the task orchestrator

use super::failure::FailureKind;
use super::previews::PreviewHandle;
use crate::raster::AdjustmentTriple;
use imagent::EncodedImage;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use imagent::TaskKind;

/// Stable identifier of a work item, unique within a batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<name>-<modified_ms>` for uploaded files
    pub fn for_upload(name: &str, modified_ms: i64) -> Self {
        Self(format!("{}-{}", name, modified_ms))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse item status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Processing,
    Success,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Processing => "processing",
            ItemStatus::Success => "success",
            ItemStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Error)
    }
}

/// What a successful item produced: an image with its preview, or text
#[derive(Debug, Clone, PartialEq)]
pub enum ItemResult {
    Image {
        image: EncodedImage,
        preview: PreviewHandle,
    },
    Text(String),
}

/// Why an item failed
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ItemFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_safety_block(&self) -> bool {
        self.kind == FailureKind::SafetyBlocked
    }
}

/// Per-item state. Results and failures only exist in their terminal states.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemState {
    Queued,
    Processing,
    Success(ItemResult),
    Error(ItemFailure),
}

impl ItemState {
    pub fn status(&self) -> ItemStatus {
        match self {
            ItemState::Queued => ItemStatus::Queued,
            ItemState::Processing => ItemStatus::Processing,
            ItemState::Success(_) => ItemStatus::Success,
            ItemState::Error(_) => ItemStatus::Error,
        }
    }
}

/// One unit of work through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub id: ItemId,
    /// File name the item came from, used for download naming
    pub source_name: String,
    pub source: Option<EncodedImage>,
    pub source_preview: Option<PreviewHandle>,
    pub state: ItemState,
}

impl WorkItem {
    pub fn status(&self) -> ItemStatus {
        self.state.status()
    }

    pub fn result_image(&self) -> Option<&EncodedImage> {
        match &self.state {
            ItemState::Success(ItemResult::Image { image, .. }) => Some(image),
            _ => None,
        }
    }

    pub fn result_preview(&self) -> Option<PreviewHandle> {
        match &self.state {
            ItemState::Success(ItemResult::Image { preview, .. }) => Some(*preview),
            _ => None,
        }
    }

    pub fn result_text(&self) -> Option<&str> {
        match &self.state {
            ItemState::Success(ItemResult::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        match &self.state {
            ItemState::Error(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure().map(|f| f.message.as_str())
    }

    pub fn is_safety_block(&self) -> bool {
        self.failure().is_some_and(ItemFailure::is_safety_block)
    }

    /// Every preview handle the item currently owns
    pub fn preview_handles(&self) -> Vec<PreviewHandle> {
        self.source_preview
            .into_iter()
            .chain(self.result_preview())
            .collect()
    }
}

/// Sub-selector within the Edit task
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    #[default]
    Prompt,
    Enhance,
    Adjust,
    Watermark,
}

impl EditMode {
    pub fn as_str(&self) -> &str {
        match self {
            EditMode::Prompt => "prompt",
            EditMode::Enhance => "enhance",
            EditMode::Adjust => "adjust",
            EditMode::Watermark => "watermark",
        }
    }
}

/// An uploaded file, before it becomes a work item
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    /// Last modification time, milliseconds since the epoch
    pub modified_ms: i64,
    pub image: EncodedImage,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, modified_ms: i64, image: EncodedImage) -> Self {
        Self {
            name: name.into(),
            modified_ms,
            image,
        }
    }

    pub fn is_image(&self) -> bool {
        self.image.mime_type().starts_with("image/")
    }
}

/// Everything the studio shows besides the raster widgets
#[derive(Debug, Clone, Default)]
pub struct StudioState {
    pub task: TaskKind,
    pub edit_mode: EditMode,
    pub items: Vec<WorkItem>,
    pub prompt: String,
    pub mask: Option<EncodedImage>,
    pub sketch: Option<EncodedImage>,
    pub adjustments: AdjustmentTriple,
    pub loading: bool,
    pub enhancing: bool,
    pub loading_message: String,
    /// Inline error banner
    pub banner: Option<String>,
    /// Safety-block modal
    pub safety_warning: Option<String>,
}

impl StudioState {
    /// Generate and sketch produce a single item; Edit+Watermark takes one image
    pub fn is_batch_allowed(&self) -> bool {
        !matches!(self.task, TaskKind::Generate | TaskKind::SketchToImage)
            && !(self.task == TaskKind::Edit && self.edit_mode == EditMode::Watermark)
    }

    pub fn item(&self, id: &ItemId) -> Option<&WorkItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// "Results (k/n)" where k counts finished items
    pub fn results_label(&self) -> String {
        let finished = self
            .items
            .iter()
            .filter(|item| item.status().is_terminal())
            .count();
        format!("Results ({}/{})", finished, self.items.len())
    }
}

/// Notifications emitted while a batch runs
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    BatchStarted { task: TaskKind, total: usize },
    ItemStarted { id: ItemId, index: usize, total: usize, label: String },
    ItemFinished { id: ItemId, status: ItemStatus },
    BatchFinished { succeeded: usize, failed: usize },
}

/// Summary of one submission
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    pub processed: Vec<ItemId>,
    pub succeeded: usize,
    pub failed: usize,
}
