// Gemini backend - talks to the Generative Language REST API

use crate::prompts;
use crate::{
    EncodedImage, ImagePayload, InferenceCapability, InferenceError, PromptCategory, Result,
    TaskKind,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Configuration for the Gemini backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model used for image edits and sketch rendering
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Model used for descriptions and prompt rewriting
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Model used for text-to-image generation
    #[serde(default = "default_generate_model")]
    pub generate_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_generate_model() -> String {
    "imagen-4.0-generate-001".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            image_model: default_image_model(),
            text_model: default_text_model(),
            generate_model: default_generate_model(),
            api_key: None,
        }
    }
}

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

fn safety_settings() -> Vec<SafetySetting> {
    HARM_CATEGORIES
        .iter()
        .map(|category| SafetySetting {
            category: category.to_string(),
            threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
        })
        .collect()
}

/// Inference capability backed by the Gemini / Imagen REST API
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        if config.api_key.is_none() {
            tracing::warn!("No API key configured; requests will be rejected by the service");
        }
        // No timeout: failures surface only when the service itself rejects
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        model: &str,
        method: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}/models/{}:{}", self.config.endpoint, model, method);
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.header("x-goog-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            tracing::error!("Gemini API error {}: {}", status, message);
            return Err(InferenceError::from_api_message(status.as_u16(), message));
        }

        Ok(response.json::<R>().await?)
    }

    async fn generate_content(&self, model: &str, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        self.post(model, "generateContent", request).await
    }
}

#[async_trait]
impl InferenceCapability for GeminiClient {
    async fn text_to_image(&self, prompt: &str) -> Result<ImagePayload> {
        let request = PredictRequest {
            instances: vec![PredictInstance {
                prompt: prompt.to_string(),
            }],
            parameters: PredictParameters {
                sample_count: 1,
                output_mime_type: "image/jpeg".to_string(),
                aspect_ratio: "1:1".to_string(),
            },
        };
        let response: PredictResponse = self
            .post(&self.config.generate_model, "predict", &request)
            .await?;
        extract_generated_image(response)
    }

    async fn image_to_image(
        &self,
        task: TaskKind,
        image: &EncodedImage,
        prompt: Option<&str>,
        mask: Option<&EncodedImage>,
    ) -> Result<ImagePayload> {
        let mask = if task == TaskKind::Watermark { mask } else { None };
        let instruction = prompts::transform_instruction(task, prompt, mask.is_some())
            .ok_or(InferenceError::UnsupportedTask(task))?;

        let mut parts = vec![Part::inline(image)];
        if let Some(mask) = mask {
            parts.push(Part::inline(mask));
        }
        parts.push(Part::text(instruction));

        let request = GenerateContentRequest::image_output(parts);
        let response = self.generate_content(&self.config.image_model, &request).await?;
        extract_image(response)
    }

    async fn sketch_to_image(&self, sketch: &EncodedImage) -> Result<ImagePayload> {
        let parts = vec![Part::inline(sketch), Part::text(prompts::SKETCH)];
        let request = GenerateContentRequest::image_output(parts);
        let response = self.generate_content(&self.config.image_model, &request).await?;
        extract_sketch_image(response)
    }

    async fn describe_image(&self, image: &EncodedImage) -> Result<String> {
        let parts = vec![Part::inline(image), Part::text(prompts::DESCRIBE)];
        let request = GenerateContentRequest::text_output(parts, None);
        let response = self.generate_content(&self.config.text_model, &request).await?;
        extract_text(response, InferenceError::EmptyDescription)
    }

    async fn enhance_prompt(&self, text: &str, category: PromptCategory) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let request = GenerateContentRequest::text_output(
            vec![Part::text(text)],
            Some(prompts::enhance_instruction(category)),
        );
        let response = self.generate_content(&self.config.text_model, &request).await?;
        extract_text(response, InferenceError::EmptyResult)
    }
}

/// Fail on a blocked prompt or a safety-terminated candidate
fn first_candidate(response: GenerateContentResponse) -> Result<Candidate> {
    let block_reason = response.prompt_feedback.and_then(|f| f.block_reason);
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(match block_reason {
            Some(reason) => InferenceError::BlockedBySafety(reason),
            None => InferenceError::EmptyResult,
        });
    };
    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(InferenceError::BlockedBySafety("SAFETY".to_string()));
    }
    Ok(candidate)
}

fn candidate_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_inline(parts: Vec<Part>) -> Option<ImagePayload> {
    parts
        .into_iter()
        .find_map(|p| p.inline_data)
        .map(|d| ImagePayload::new(d.mime_type, d.data))
}

fn extract_image(response: GenerateContentResponse) -> Result<ImagePayload> {
    let candidate = first_candidate(response)?;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let text = candidate_text(&parts);
    if let Some(payload) = first_inline(parts) {
        return Ok(payload);
    }
    if !text.is_empty() {
        return Err(InferenceError::ModelRefused(text));
    }
    Err(InferenceError::EmptyResult)
}

fn extract_sketch_image(response: GenerateContentResponse) -> Result<ImagePayload> {
    let candidate = first_candidate(response)?;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let text = candidate_text(&parts);
    if text.contains(prompts::SKETCH_ERROR_MARKER) {
        let reason = text.replace("ERROR: ", "");
        return Err(InferenceError::ModelRefused(reason.trim().to_string()));
    }
    first_inline(parts).ok_or(InferenceError::EmptyResult)
}

fn extract_text(response: GenerateContentResponse, when_empty: InferenceError) -> Result<String> {
    let candidate = first_candidate(response)?;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let text = parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        return Err(when_empty);
    }
    Ok(text.to_string())
}

fn extract_generated_image(response: PredictResponse) -> Result<ImagePayload> {
    let mut filtered = None;
    for prediction in response.predictions {
        if let Some(data) = prediction.bytes_base64_encoded {
            let mime = prediction.mime_type.unwrap_or_else(|| "image/jpeg".to_string());
            return Ok(ImagePayload::new(mime, data));
        }
        if prediction.rai_filtered_reason.is_some() {
            filtered = prediction.rai_filtered_reason;
        }
    }
    match filtered {
        Some(reason) => Err(InferenceError::BlockedBySafety(reason)),
        None => Err(InferenceError::EmptyResult),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    fn image_output(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content { parts }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
            }),
            safety_settings: safety_settings(),
        }
    }

    fn text_output(parts: Vec<Part>, system: Option<&str>) -> Self {
        Self {
            contents: vec![Content { parts }],
            system_instruction: system.map(|s| Content {
                parts: vec![Part::text(s)],
            }),
            generation_config: None,
            safety_settings: safety_settings(),
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn inline(image: &EncodedImage) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type().to_string(),
                data: image.to_base64(),
            }),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    output_mime_type: String,
    aspect_ratio: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
    rai_filtered_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}
