// Orchestrator - drives uploads through the task pipeline, one item at a time

use super::dispatch::{self, AuxInputs, ExternalCall, InputMissing};
use super::failure::Routing;
use super::previews::{PreviewBackend, PreviewHandle, PreviewRegistry};
use super::transition::{InvalidTransition, ItemEvent};
use super::types::{
    BatchReport, EditMode, ItemFailure, ItemId, ItemResult, ItemState, ItemStatus, ProgressEvent,
    SourceFile, StudioState, TaskKind, WorkItem,
};
use crate::raster::{apply_adjustments, AdjustmentTriple};
use crate::session::{Session, SessionError, SessionStore};
use imagent::{EncodedImage, ImagePayload, InferenceCapability, InferenceError, PromptCategory};
use std::sync::Arc;
use tokio::sync::mpsc;

const GENERATE_SOURCE_NAME: &str = "prompt.txt";
const SKETCH_SOURCE_NAME: &str = "sketch.png";

/// Single owner of the studio state, the preview table and the inference backend
pub struct Orchestrator {
    state: StudioState,
    previews: PreviewRegistry,
    backend: Arc<dyn InferenceCapability>,
    sessions: Box<dyn SessionStore>,
    session: Option<Session>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

/// What a finished call handed back, before it becomes an item result
enum CallOutput {
    Payload(ImagePayload),
    Text(String),
}

enum ItemOutput {
    Image(EncodedImage),
    Text(String),
}

impl Orchestrator {
    /// Create an orchestrator; the stored session, if any, is picked up immediately
    pub fn new(backend: Arc<dyn InferenceCapability>, sessions: Box<dyn SessionStore>) -> Self {
        let session = sessions.current_session();
        Self {
            state: StudioState::default(),
            previews: PreviewRegistry::default(),
            backend,
            sessions,
            session,
            progress: None,
        }
    }

    /// Use a different preview backend. Call before anything is uploaded.
    pub fn with_previews(mut self, backend: Box<dyn PreviewBackend>) -> Self {
        self.previews = PreviewRegistry::new(backend);
        self
    }

    /// Receive a `ProgressEvent` for every batch and item transition
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress = Some(tx);
        rx
    }

    pub fn state(&self) -> &StudioState {
        &self.state
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.state.items
    }

    pub fn item(&self, id: &ItemId) -> Option<&WorkItem> {
        self.state.item(id)
    }

    pub fn preview_url(&self, handle: PreviewHandle) -> Option<&str> {
        self.previews.url(handle)
    }

    pub fn live_previews(&self) -> usize {
        self.previews.live_count()
    }

    // ---- session ----

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn sign_in(&mut self) -> Result<&Session, SessionError> {
        let session = self.sessions.sign_in()?;
        Ok(self.session.insert(session))
    }

    pub fn sign_out(&mut self) -> Result<(), SessionError> {
        self.sessions.sign_out()?;
        self.session = None;
        Ok(())
    }

    /// Best-effort: a storage failure never fails the item
    fn bump_request_count(&mut self) {
        let Some(current) = &self.session else {
            return;
        };
        match self.sessions.increment_request_count(current) {
            Ok(updated) => self.session = Some(updated),
            Err(SessionError::NotSignedIn) => self.session = None,
            Err(e) => tracing::warn!("Could not update request counter: {}", e),
        }
    }

    // ---- inputs ----

    /// Switch task. Everything collected for the previous task is discarded.
    pub fn select_task(&mut self, task: TaskKind) {
        self.release_items();
        let state = &mut self.state;
        state.task = task;
        state.mask = None;
        state.sketch = None;
        state.prompt.clear();
        state.banner = None;
        state.safety_warning = None;
        state.loading_message.clear();
        state.adjustments = AdjustmentTriple::default();
        state.edit_mode = EditMode::Prompt;
        tracing::debug!("Selected task {}", task);
    }

    pub fn set_edit_mode(&mut self, mode: EditMode) {
        self.state.edit_mode = mode;
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.state.prompt = prompt.into();
    }

    pub fn set_mask(&mut self, mask: Option<EncodedImage>) {
        self.state.mask = mask;
    }

    pub fn set_sketch(&mut self, sketch: Option<EncodedImage>) {
        self.state.sketch = sketch;
    }

    pub fn set_adjustments(&mut self, adjustments: AdjustmentTriple) {
        self.state.adjustments = adjustments;
    }

    pub fn dismiss_safety_warning(&mut self) {
        self.state.safety_warning = None;
    }

    pub fn dismiss_banner(&mut self) {
        self.state.banner = None;
    }

    // ---- items ----

    /// Add uploaded files. Non-images are dropped. Batch tasks append new ids;
    /// single-image tasks replace the current item. Returns how many were added.
    pub fn upload(&mut self, files: Vec<SourceFile>) -> usize {
        self.state.banner = None;
        let images: Vec<SourceFile> = files
            .into_iter()
            .filter(|file| {
                if !file.is_image() {
                    tracing::debug!("Skipping {} ({})", file.name, file.image.mime_type());
                }
                file.is_image()
            })
            .collect();

        if self.state.is_batch_allowed() {
            let mut added = 0;
            for file in images {
                let id = ItemId::for_upload(&file.name, file.modified_ms);
                if self.state.item(&id).is_some() {
                    continue;
                }
                let item = self.queued_item(id, file.name, Some(file.image));
                self.state.items.push(item);
                added += 1;
            }
            added
        } else {
            self.release_items();
            match images.into_iter().next() {
                Some(file) => {
                    let id = ItemId::for_upload(&file.name, file.modified_ms);
                    let item = self.queued_item(id, file.name, Some(file.image));
                    self.state.items.push(item);
                    1
                }
                None => 0,
            }
        }
    }

    /// Remove one item and release its previews
    pub fn remove(&mut self, id: &ItemId) -> bool {
        let Some(pos) = self.state.items.iter().position(|item| &item.id == id) else {
            return false;
        };
        let item = self.state.items.remove(pos);
        self.previews.release_all_of(item.preview_handles());
        true
    }

    pub fn clear(&mut self) {
        self.release_items();
    }

    fn release_items(&mut self) {
        for item in self.state.items.drain(..) {
            self.previews.release_all_of(item.preview_handles());
        }
    }

    fn queued_item(&mut self, id: ItemId, source_name: String, source: Option<EncodedImage>) -> WorkItem {
        let source_preview = source.as_ref().map(|image| self.previews.acquire(image));
        WorkItem {
            id,
            source_name,
            source,
            source_preview,
            state: ItemState::Queued,
        }
    }

    fn synthetic_item(&self, prefix: &str, source_name: &str, source: Option<EncodedImage>) -> WorkItem {
        WorkItem {
            id: ItemId::new(format!("{}-{}", prefix, chrono::Utc::now().timestamp_millis())),
            source_name: source_name.to_string(),
            source,
            source_preview: None,
            state: ItemState::Queued,
        }
    }

    // ---- labels ----

    pub fn submit_label(&self) -> &'static str {
        match self.state.task {
            TaskKind::Generate => "Generate Image",
            TaskKind::SketchToImage => "Generate from Sketch",
            TaskKind::Describe => "Describe Image(s)",
            TaskKind::Edit => match self.state.edit_mode {
                EditMode::Prompt => "Apply Edits",
                EditMode::Watermark => "Remove Watermark",
                EditMode::Adjust => "Apply Adjustments",
                EditMode::Enhance => "Enhance",
            },
            _ => "Process Image(s)",
        }
    }

    /// Download name for an item's result under the selected task
    pub fn artifact_name(&self, item: &WorkItem) -> String {
        artifact_name(&item.source_name, self.state.task)
    }

    /// Whether the main submit action is available, and if not, why
    pub fn submit_gate(&self) -> Result<(), SubmitError> {
        let s = &self.state;
        let blank_prompt = s.prompt.trim().is_empty();
        let missing = match s.task {
            TaskKind::Generate if blank_prompt => Some(InputMissing::Prompt),
            TaskKind::SketchToImage if s.sketch.is_none() => Some(InputMissing::Sketch),
            TaskKind::Describe | TaskKind::Edit if s.items.is_empty() => Some(InputMissing::Image),
            TaskKind::Edit => match s.edit_mode {
                EditMode::Prompt if blank_prompt => Some(InputMissing::Prompt),
                EditMode::Watermark if s.mask.is_none() => Some(InputMissing::Mask),
                EditMode::Enhance => Some(InputMissing::EnhanceChoice),
                _ => None,
            },
            _ => None,
        };
        match missing {
            Some(missing) => Err(missing.into()),
            None => Ok(()),
        }
    }

    // ---- async work ----

    /// Rewrite the prompt through the inference backend. Blank prompts are left alone.
    pub async fn enhance_prompt(&mut self) -> Result<(), InferenceError> {
        if self.state.prompt.trim().is_empty() {
            return Ok(());
        }
        let category = if self.state.task == TaskKind::Edit {
            PromptCategory::Edit
        } else {
            PromptCategory::Generate
        };

        self.state.enhancing = true;
        self.state.loading_message = "Enhancing prompt...".to_string();
        let backend = Arc::clone(&self.backend);
        let result = backend.enhance_prompt(&self.state.prompt, category).await;
        self.state.enhancing = false;
        self.state.loading_message.clear();

        match result {
            Ok(enhanced) => {
                self.state.prompt = enhanced;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Prompt enhancement failed: {}", e);
                self.state.banner = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Run the current task over its work list.
    ///
    /// `sub_task` overrides the selected task (Upscale/Repair from the Enhance
    /// mode) and skips the main submit gate. Items are processed strictly in
    /// order; a failing item never stops the ones after it.
    ///
    /// `submit` holds `&mut self` for the whole batch, so a second submission
    /// cannot start while one runs. `state.loading` only drives the display.
    pub async fn submit(&mut self, sub_task: Option<TaskKind>) -> Result<BatchReport, SubmitError> {
        if sub_task.is_none() {
            self.submit_gate()?;
        }
        let task = sub_task.unwrap_or(self.state.task);
        self.state.banner = None;
        self.state.safety_warning = None;

        // Materialize the work list
        let synthetic = match task {
            TaskKind::Generate => Some(self.synthetic_item("gen", GENERATE_SOURCE_NAME, None)),
            TaskKind::SketchToImage => match self.state.sketch.clone() {
                Some(sketch) => Some(self.synthetic_item("sketch", SKETCH_SOURCE_NAME, Some(sketch))),
                None => {
                    tracing::warn!("Sketch submission without a sketch, nothing to do");
                    return Ok(BatchReport::default());
                }
            },
            _ => None,
        };

        let aux = AuxInputs {
            prompt: &self.state.prompt,
            mask: self.state.mask.as_ref(),
            sketch: self.state.sketch.as_ref(),
            adjustments: self.state.adjustments,
        };
        let edit_mode = self.state.edit_mode;
        let planned: Result<Vec<(ItemId, ExternalCall)>, InputMissing> = match &synthetic {
            Some(item) => dispatch::plan(item, task, edit_mode, &aux).map(|call| vec![(item.id.clone(), call)]),
            None => self
                .state
                .items
                .iter()
                .filter(|item| item.status() == ItemStatus::Queued)
                .map(|item| dispatch::plan(item, task, edit_mode, &aux).map(|call| (item.id.clone(), call)))
                .collect(),
        };
        let work = match planned {
            Ok(work) if work.is_empty() => Err(InputMissing::Image),
            other => other,
        };
        let work = match work {
            Ok(work) => work,
            Err(missing) => {
                self.state.banner = Some(missing.to_string());
                return Err(missing.into());
            }
        };

        if let Some(item) = synthetic {
            self.release_items();
            let mut item = item;
            item.source_preview = item.source.as_ref().map(|image| self.previews.acquire(image));
            self.state.items.push(item);
        }

        let total = work.len();
        tracing::info!("Submitting {} item(s) for {}", total, task);
        self.state.loading = true;
        self.emit(ProgressEvent::BatchStarted { task, total });

        let mut report = BatchReport::default();
        for (index, (id, call)) in work.into_iter().enumerate() {
            if let Err(e) = self.transition(&id, ItemEvent::Start) {
                tracing::warn!("Skipping {}: {}", id, e);
                continue;
            }
            let label = call.progress_label(index + 1, total);
            self.state.loading_message = label.clone();
            self.emit(ProgressEvent::ItemStarted {
                id: id.clone(),
                index: index + 1,
                total,
                label,
            });

            let event = match self.execute(call).await {
                Ok(ItemOutput::Image(image)) => {
                    let preview = self.previews.acquire(&image);
                    ItemEvent::Succeed(ItemResult::Image { image, preview })
                }
                Ok(ItemOutput::Text(text)) => ItemEvent::Succeed(ItemResult::Text(text)),
                Err(failure) => {
                    tracing::warn!("Item {} failed: {}", id, failure.message);
                    match failure.kind.routing() {
                        Routing::Modal => self.state.safety_warning = Some(failure.message.clone()),
                        Routing::Banner => self.state.banner = Some(failure.message.clone()),
                    }
                    ItemEvent::Fail(failure)
                }
            };

            let status = match self.transition(&id, event) {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!("Item {} left in an unexpected state: {}", id, e);
                    continue;
                }
            };
            match status {
                ItemStatus::Success => report.succeeded += 1,
                _ => report.failed += 1,
            }
            report.processed.push(id.clone());
            self.emit(ProgressEvent::ItemFinished { id, status });
        }

        self.state.loading = false;
        self.state.loading_message.clear();
        self.emit(ProgressEvent::BatchFinished {
            succeeded: report.succeeded,
            failed: report.failed,
        });
        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );
        Ok(report)
    }

    /// Apply an item event. A result preview that cannot be attached is released.
    fn transition(&mut self, id: &ItemId, event: ItemEvent) -> Result<ItemStatus, TransitionError> {
        let orphan = match &event {
            ItemEvent::Succeed(ItemResult::Image { preview, .. }) => Some(*preview),
            _ => None,
        };
        // The work list is planned from live items and nothing removes them mid-batch
        let Some(item) = self.state.items.iter_mut().find(|item| &item.id == id) else {
            if let Some(preview) = orphan {
                self.previews.release(preview);
            }
            return Err(TransitionError::UnknownItem(id.clone()));
        };
        let current = std::mem::replace(&mut item.state, ItemState::Queued);
        match current.clone().apply(event) {
            Ok(next) => {
                item.state = next;
                Ok(item.status())
            }
            Err(e) => {
                item.state = current;
                if let Some(preview) = orphan {
                    self.previews.release(preview);
                }
                Err(e.into())
            }
        }
    }

    /// Perform one planned call
    async fn execute(&mut self, call: ExternalCall) -> Result<ItemOutput, ItemFailure> {
        let backend = Arc::clone(&self.backend);
        let output = match call {
            ExternalCall::LocalAdjust { image, adjustments } => {
                let adjusted = apply_adjustments(&image, &adjustments).map_err(|e| ItemFailure::from(&e))?;
                // Same transport format as network results
                CallOutput::Payload(ImagePayload::from_image(&adjusted))
            }
            ExternalCall::TextToImage { prompt } => {
                let result = backend.text_to_image(&prompt).await;
                CallOutput::Payload(self.track(result)?)
            }
            ExternalCall::SketchToImage { sketch } => {
                let result = backend.sketch_to_image(&sketch).await;
                CallOutput::Payload(self.track(result)?)
            }
            ExternalCall::DescribeImage { image } => {
                let result = backend.describe_image(&image).await;
                CallOutput::Text(self.track(result)?)
            }
            ExternalCall::ImageToImage {
                task,
                image,
                prompt,
                mask,
            } => {
                let result = backend
                    .image_to_image(task, &image, prompt.as_deref(), mask.as_ref())
                    .await;
                CallOutput::Payload(self.track(result)?)
            }
        };

        match output {
            CallOutput::Payload(payload) => payload
                .decode()
                .map(ItemOutput::Image)
                .map_err(|e| ItemFailure::from(&e)),
            CallOutput::Text(text) => Ok(ItemOutput::Text(text)),
        }
    }

    /// Count successful network calls and classify failed ones
    fn track<T>(&mut self, result: imagent::Result<T>) -> Result<T, ItemFailure> {
        match result {
            Ok(value) => {
                self.bump_request_count();
                Ok(value)
            }
            Err(e) => Err(ItemFailure::from(&e)),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            if tx.send(event).is_err() {
                tracing::debug!("Progress subscriber went away");
            }
        }
    }
}

/// `<base>-<task>.jpeg`, task lower-cased with spaces replaced
pub fn artifact_name(original_name: &str, task: TaskKind) -> String {
    let base = match original_name.rfind('.') {
        Some(idx) => &original_name[..idx],
        None => original_name,
    };
    format!("{}-{}.jpeg", base, task.as_str().to_lowercase().replace(' ', "_"))
}

/// Why an item event could not be applied
#[derive(Debug, thiserror::Error, PartialEq)]
enum TransitionError {
    #[error("No item with id {0}")]
    UnknownItem(ItemId),

    #[error(transparent)]
    Invalid(#[from] InvalidTransition),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SubmitError {
    #[error(transparent)]
    InputMissing(#[from] InputMissing),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::failure::FailureKind;
    use crate::orchestration::previews::tests::RecordingPreviews;
    use crate::session::MemorySessionStore;
    use async_trait::async_trait;
    use image::RgbaImage;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays scripted answers and records every call
    #[derive(Default)]
    struct ScriptedBackend {
        images: Mutex<VecDeque<imagent::Result<ImagePayload>>>,
        texts: Mutex<VecDeque<imagent::Result<String>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn with_images(answers: Vec<imagent::Result<ImagePayload>>) -> Self {
            Self {
                images: Mutex::new(answers.into()),
                ..Default::default()
            }
        }

        fn with_texts(answers: Vec<imagent::Result<String>>) -> Self {
            Self {
                texts: Mutex::new(answers.into()),
                ..Default::default()
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn next_image(&self) -> imagent::Result<ImagePayload> {
            self.images
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(InferenceError::EmptyResult))
        }

        fn next_text(&self) -> imagent::Result<String> {
            self.texts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(InferenceError::EmptyResult))
        }
    }

    #[async_trait]
    impl InferenceCapability for ScriptedBackend {
        async fn text_to_image(&self, prompt: &str) -> imagent::Result<ImagePayload> {
            self.record(format!("text_to_image:{}", prompt));
            self.next_image()
        }

        async fn image_to_image(
            &self,
            task: TaskKind,
            _image: &EncodedImage,
            prompt: Option<&str>,
            mask: Option<&EncodedImage>,
        ) -> imagent::Result<ImagePayload> {
            self.record(format!(
                "image_to_image:{}:{}:{}",
                task,
                prompt.unwrap_or(""),
                mask.is_some()
            ));
            self.next_image()
        }

        async fn sketch_to_image(&self, _sketch: &EncodedImage) -> imagent::Result<ImagePayload> {
            self.record("sketch_to_image".to_string());
            self.next_image()
        }

        async fn describe_image(&self, image: &EncodedImage) -> imagent::Result<String> {
            self.record(format!("describe:{}", image.len()));
            self.next_text()
        }

        async fn enhance_prompt(&self, text: &str, category: PromptCategory) -> imagent::Result<String> {
            self.record(format!("enhance:{:?}", category));
            self.next_text().map(|t| format!("{} {}", text, t))
        }
    }

    fn png(w: u32, h: u32) -> EncodedImage {
        EncodedImage::encode_png(&RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]))).unwrap()
    }

    fn ok_image() -> imagent::Result<ImagePayload> {
        Ok(ImagePayload::from_image(&png(2, 2)))
    }

    fn file(name: &str, ms: i64) -> SourceFile {
        SourceFile::new(name, ms, png(4, 4))
    }

    fn studio(backend: Arc<ScriptedBackend>) -> Orchestrator {
        Orchestrator::new(backend, Box::new(MemorySessionStore::signed_in()))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_describe_batch_continues_past_failure() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            Ok("first".into()),
            Err(InferenceError::EmptyDescription),
            Ok("third".into()),
        ]));
        let mut studio = studio(backend.clone());
        studio.select_task(TaskKind::Describe);
        assert_eq!(studio.upload(vec![file("a.png", 1), file("b.png", 2), file("c.png", 3)]), 3);
        let mut rx = studio.subscribe();

        let report = studio.submit(None).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (2, 1));

        let ids: Vec<ItemId> = studio.items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(studio.items()[0].result_text(), Some("first"));
        assert_eq!(studio.items()[1].status(), ItemStatus::Error);
        assert!(!studio.items()[1].is_safety_block());
        assert_eq!(studio.items()[2].result_text(), Some("third"));
        assert_eq!(report.processed, ids);

        // Strictly sequential: each item finishes before the next starts
        let events = drain(&mut rx);
        let expected_second_label = ProgressEvent::ItemStarted {
            id: ids[1].clone(),
            index: 2,
            total: 3,
            label: "Describing image 2 of 3...".to_string(),
        };
        assert_eq!(events[0], ProgressEvent::BatchStarted { task: TaskKind::Describe, total: 3 });
        assert_eq!(
            events[2],
            ProgressEvent::ItemFinished { id: ids[0].clone(), status: ItemStatus::Success }
        );
        assert_eq!(events[3], expected_second_label);
        assert_eq!(
            events[4],
            ProgressEvent::ItemFinished { id: ids[1].clone(), status: ItemStatus::Error }
        );
        assert_eq!(events[7], ProgressEvent::BatchFinished { succeeded: 2, failed: 1 });

        let state = studio.state();
        assert!(!state.loading);
        assert!(state.loading_message.is_empty());
        assert!(state.banner.as_deref().unwrap().contains("empty description"));
        assert!(state.safety_warning.is_none());
        assert_eq!(state.results_label(), "Results (3/3)");
        // Two successful network calls counted
        assert_eq!(studio.session().unwrap().api_count, 2);
        assert_eq!(backend.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_generate_safety_block_goes_to_modal() {
        let backend = Arc::new(ScriptedBackend::with_images(vec![Err(
            InferenceError::BlockedBySafety("SAFETY".into()),
        )]));
        let mut studio = studio(backend.clone());
        studio.select_task(TaskKind::Generate);
        studio.set_prompt("a red cube");

        let report = studio.submit(None).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(studio.items().len(), 1);
        let item = &studio.items()[0];
        assert!(item.id.as_str().starts_with("gen-"));
        assert_eq!(item.status(), ItemStatus::Error);
        assert!(item.is_safety_block());
        assert_eq!(item.failure().unwrap().kind, FailureKind::SafetyBlocked);
        assert!(item.source_preview.is_none());
        assert!(studio.state().safety_warning.is_some());
        assert!(studio.state().banner.is_none());
        assert!(studio.items().iter().all(|i| i.status() != ItemStatus::Processing));
        assert_eq!(studio.session().unwrap().api_count, 0);
        assert_eq!(*backend.calls.lock().unwrap(), vec!["text_to_image:a red cube".to_string()]);

        studio.dismiss_safety_warning();
        assert!(studio.state().safety_warning.is_none());
    }

    #[tokio::test]
    async fn test_watermark_without_mask_is_gated() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = studio(backend.clone());
        studio.select_task(TaskKind::Edit);
        studio.set_edit_mode(EditMode::Watermark);
        studio.upload(vec![file("a.png", 1)]);

        assert_eq!(studio.submit_gate(), Err(SubmitError::InputMissing(InputMissing::Mask)));
        assert_eq!(
            studio.submit(None).await,
            Err(SubmitError::InputMissing(InputMissing::Mask))
        );
        assert_eq!(studio.items()[0].status(), ItemStatus::Queued);
        assert!(backend.calls.lock().unwrap().is_empty());

        // With a mask the same submission goes through with the mask attached
        studio.set_mask(Some(png(4, 4)));
        *backend.images.lock().unwrap() = vec![ok_image()].into();
        studio.submit(None).await.unwrap();
        assert_eq!(
            *backend.calls.lock().unwrap(),
            vec!["image_to_image:Watermark::true".to_string()]
        );
    }

    #[tokio::test]
    async fn test_removing_item_releases_both_previews_once() {
        let recorder = RecordingPreviews::default();
        let backend = Arc::new(ScriptedBackend::with_images(vec![ok_image()]));
        let mut studio = studio(backend).with_previews(Box::new(recorder.clone()));
        studio.select_task(TaskKind::Edit);
        studio.set_edit_mode(EditMode::Enhance);
        studio.upload(vec![file("a.png", 1)]);

        studio.submit(Some(TaskKind::Upscale)).await.unwrap();
        let item = studio.items()[0].clone();
        let source = item.source_preview.unwrap();
        let result = item.result_preview().unwrap();
        assert_eq!(studio.live_previews(), 2);

        assert!(studio.remove(&item.id));
        assert!(!studio.remove(&item.id));
        drop(studio);
        assert_eq!(recorder.revoked_count(source), 1);
        assert_eq!(recorder.revoked_count(result), 1);
    }

    #[tokio::test]
    async fn test_identity_adjust_is_local_and_uncounted() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = studio(backend.clone());
        studio.select_task(TaskKind::Edit);
        studio.set_edit_mode(EditMode::Adjust);
        let source = png(3, 3);
        studio.upload(vec![SourceFile::new("a.png", 1, source.clone())]);

        let mut rx = studio.subscribe();
        studio.submit(None).await.unwrap();
        let item = &studio.items()[0];
        assert_eq!(item.result_image().unwrap().bytes(), source.bytes());
        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(studio.session().unwrap().api_count, 0);
        let labels: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::ItemStarted { label, .. } => Some(label),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["Applying adjustments...".to_string()]);
    }

    #[tokio::test]
    async fn test_adjust_changes_pixels() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = studio(backend);
        studio.select_task(TaskKind::Edit);
        studio.set_edit_mode(EditMode::Adjust);
        studio.set_adjustments(AdjustmentTriple::new(0, 100, 100));
        studio.upload(vec![file("a.png", 1)]);
        studio.submit(None).await.unwrap();
        let out = studio.items()[0].result_image().unwrap().decode().unwrap();
        assert_eq!(*out.get_pixel(0, 0), image::Rgba([0, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_empty_batch_fails_fast() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = studio(backend.clone());
        studio.select_task(TaskKind::Edit);
        studio.set_edit_mode(EditMode::Enhance);

        let err = studio.submit(Some(TaskKind::Repair)).await.unwrap_err();
        assert_eq!(err, SubmitError::InputMissing(InputMissing::Image));
        assert_eq!(
            studio.state().banner.as_deref(),
            Some("Please upload an image to process.")
        );
        assert!(!studio.state().loading);
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resubmission_only_takes_queued_items() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            Ok("one".into()),
            Ok("two".into()),
        ]));
        let mut studio = studio(backend.clone());
        studio.select_task(TaskKind::Describe);
        studio.upload(vec![file("a.png", 1)]);
        studio.submit(None).await.unwrap();

        studio.upload(vec![file("b.png", 2)]);
        assert_eq!(studio.state().results_label(), "Results (1/2)");
        let report = studio.submit(None).await.unwrap();
        assert_eq!(report.processed, vec![ItemId::new("b.png-2")]);
        assert_eq!(studio.items()[0].result_text(), Some("one"));
        assert_eq!(studio.items()[1].result_text(), Some("two"));
    }

    #[tokio::test]
    async fn test_sketch_submission() {
        let backend = Arc::new(ScriptedBackend::with_images(vec![Err(
            InferenceError::ModelRefused("Could not identify the object in the sketch.".into()),
        )]));
        let mut studio = studio(backend.clone());
        studio.select_task(TaskKind::SketchToImage);
        assert_eq!(studio.submit_gate(), Err(SubmitError::InputMissing(InputMissing::Sketch)));

        studio.set_sketch(Some(png(8, 8)));
        studio.submit(None).await.unwrap();
        let item = &studio.items()[0];
        assert!(item.id.as_str().starts_with("sketch-"));
        assert!(item.source_preview.is_some());
        assert_eq!(item.failure().unwrap().kind, FailureKind::ModelRefusedWithText);
        assert!(studio.state().banner.is_some());
        assert_eq!(studio.artifact_name(item), "sketch-sketch_to_image.jpeg");
    }

    #[tokio::test]
    async fn test_upload_rules() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = studio(backend);
        studio.select_task(TaskKind::Describe);
        let text = SourceFile::new("notes.txt", 5, EncodedImage::new(vec![1u8], "text/plain"));
        assert_eq!(studio.upload(vec![file("a.png", 1), text, file("a.png", 1)]), 1);
        assert_eq!(studio.upload(vec![file("a.png", 1), file("b.png", 1)]), 1);
        assert_eq!(studio.items().len(), 2);
        assert_eq!(studio.live_previews(), 2);

        // Single-image mode replaces and releases
        studio.select_task(TaskKind::Edit);
        assert_eq!(studio.live_previews(), 0);
        studio.set_edit_mode(EditMode::Watermark);
        studio.upload(vec![file("x.png", 1), file("y.png", 1)]);
        studio.upload(vec![file("z.png", 1)]);
        assert_eq!(studio.items().len(), 1);
        assert_eq!(studio.items()[0].id.as_str(), "z.png-1");
        assert_eq!(studio.live_previews(), 1);

        studio.clear();
        assert!(studio.items().is_empty());
        assert_eq!(studio.live_previews(), 0);
    }

    #[tokio::test]
    async fn test_select_task_resets_everything() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = studio(backend);
        studio.select_task(TaskKind::Edit);
        studio.set_edit_mode(EditMode::Adjust);
        studio.set_prompt("x");
        studio.set_mask(Some(png(1, 1)));
        studio.set_adjustments(AdjustmentTriple::new(50, 50, 50));
        studio.upload(vec![file("a.png", 1)]);

        studio.select_task(TaskKind::Describe);
        let state = studio.state();
        assert!(state.items.is_empty());
        assert!(state.prompt.is_empty());
        assert!(state.mask.is_none());
        assert_eq!(state.edit_mode, EditMode::Prompt);
        assert!(state.adjustments.is_identity());
    }

    #[tokio::test]
    async fn test_enhance_prompt() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            Ok("with dramatic lighting".into()),
            Err(InferenceError::QuotaExceeded),
        ]));
        let mut studio = studio(backend.clone());
        studio.select_task(TaskKind::Edit);

        studio.enhance_prompt().await.unwrap();
        assert!(backend.calls.lock().unwrap().is_empty());

        studio.set_prompt("make it blue");
        studio.enhance_prompt().await.unwrap();
        assert_eq!(studio.state().prompt, "make it blue with dramatic lighting");
        assert_eq!(backend.calls.lock().unwrap()[0], "enhance:Edit");
        assert!(!studio.state().enhancing);

        assert_eq!(studio.enhance_prompt().await, Err(InferenceError::QuotaExceeded));
        assert_eq!(studio.state().prompt, "make it blue with dramatic lighting");
        assert!(studio.state().banner.is_some());
        assert!(studio.state().loading_message.is_empty());
    }

    #[tokio::test]
    async fn test_signed_out_calls_are_not_counted() {
        let backend = Arc::new(ScriptedBackend::with_images(vec![ok_image()]));
        let mut studio = Orchestrator::new(backend, Box::new(MemorySessionStore::new()));
        assert!(studio.session().is_none());
        studio.set_prompt("a boat");
        studio.submit(None).await.unwrap();
        assert_eq!(studio.items()[0].status(), ItemStatus::Success);
        assert!(studio.session().is_none());

        studio.sign_in().unwrap();
        assert_eq!(studio.session().unwrap().api_count, 0);
        studio.sign_out().unwrap();
        assert!(studio.session().is_none());
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(artifact_name("cat.photo.png", TaskKind::Upscale), "cat.photo-upscale.jpeg");
        assert_eq!(artifact_name("noext", TaskKind::Edit), "noext-edit.jpeg");
        assert_eq!(
            artifact_name("prompt.txt", TaskKind::SketchToImage),
            "prompt-sketch_to_image.jpeg"
        );
    }

    #[test]
    fn test_submit_labels_and_gates() {
        let mut studio = studio(Arc::new(ScriptedBackend::default()));
        assert_eq!(studio.submit_label(), "Generate Image");
        assert_eq!(studio.submit_gate(), Err(SubmitError::InputMissing(InputMissing::Prompt)));
        studio.set_prompt("  ");
        assert!(studio.submit_gate().is_err());
        studio.set_prompt("a cat");
        assert_eq!(studio.submit_gate(), Ok(()));

        studio.select_task(TaskKind::Describe);
        assert_eq!(studio.submit_label(), "Describe Image(s)");
        assert_eq!(studio.submit_gate(), Err(SubmitError::InputMissing(InputMissing::Image)));

        studio.select_task(TaskKind::Edit);
        studio.upload(vec![file("a.png", 1)]);
        assert_eq!(studio.submit_label(), "Apply Edits");
        assert_eq!(studio.submit_gate(), Err(SubmitError::InputMissing(InputMissing::Prompt)));
        studio.set_edit_mode(EditMode::Adjust);
        assert_eq!(studio.submit_label(), "Apply Adjustments");
        assert_eq!(studio.submit_gate(), Ok(()));
        studio.set_edit_mode(EditMode::Enhance);
        assert!(studio.submit_gate().is_err());

        studio.select_task(TaskKind::Upscale);
        assert_eq!(studio.submit_label(), "Process Image(s)");
    }

    #[test]
    fn test_transition_on_unknown_item_releases_result_preview() {
        let recorder = RecordingPreviews::default();
        let mut studio = studio(Arc::new(ScriptedBackend::default())).with_previews(Box::new(recorder.clone()));
        let image = png(2, 2);
        let preview = studio.previews.acquire(&image);

        let missing = ItemId::new("missing-1");
        let err = studio
            .transition(&missing, ItemEvent::Succeed(ItemResult::Image { image, preview }))
            .unwrap_err();
        assert_eq!(err, TransitionError::UnknownItem(missing));
        assert_eq!(err.to_string(), "No item with id missing-1");
        assert_eq!(recorder.revoked_count(preview), 1);
        assert_eq!(studio.live_previews(), 0);
    }

    #[test]
    fn test_transition_from_terminal_state_is_invalid() {
        let mut studio = studio(Arc::new(ScriptedBackend::default()));
        studio.select_task(TaskKind::Describe);
        studio.upload(vec![file("a.png", 1)]);
        let id = studio.items()[0].id.clone();

        assert_eq!(studio.transition(&id, ItemEvent::Start), Ok(ItemStatus::Processing));
        assert_eq!(
            studio.transition(&id, ItemEvent::Succeed(ItemResult::Text("done".into()))),
            Ok(ItemStatus::Success)
        );
        let err = studio.transition(&id, ItemEvent::Start).unwrap_err();
        assert!(matches!(err, TransitionError::Invalid(_)));
        assert_eq!(studio.item(&id).unwrap().status(), ItemStatus::Success);
    }
}
