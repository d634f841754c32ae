use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, error};

use crate::error::SynthesisError;
use crate::models::{DataUri, ImagePayload};

pub const TEXT_MODEL: &str = "imagen-4.0-generate-001";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const IMAGE_PROMPT: &str = "Transform the person in this image into a vibrant, artistic AI avatar. The style should be a modern digital illustration, suitable for a profile picture, reflecting a creative and abstract interpretation rather than a realistic one.";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("Other: {0}")] Other(String),
    #[error("no images were returned")] NoImages,
    #[error("no image part was returned in the response")] NoImagePart,
}

/// The generative-image collaborator, as the orchestrator sees it.
/// Both operations return a displayable data URI.
#[async_trait]
pub trait AvatarSynthesizer: Send + Sync {
    async fn synthesize_from_text(&self, region: &str) -> Result<String, SynthesisError>;
    async fn synthesize_from_image(&self, payload: &ImagePayload) -> Result<String, SynthesisError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" || key == "bytesBase64Encoded" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn preview(b64: &str) -> String {
    match b64.get(..50) {
        Some(head) if b64.len() > 50 => format!("{}...[{} chars total]", head, b64.len()),
        _ => b64.to_string(),
    }
}

/// Names the image format from the leading bytes of a base64 payload.
fn sniff_format(b64: &str) -> &'static str {
    let Some(head) = b64.get(..b64.len().min(64) / 4 * 4) else { return "unknown" };
    base64::engine::general_purpose::STANDARD
        .decode(head)
        .ok()
        .and_then(|bytes| image::guess_format(&bytes).ok())
        .map(|f| f.extensions_str().first().copied().unwrap_or("unknown"))
        .unwrap_or("unknown")
}

pub fn build_region_prompt(region: &str) -> String {
    format!("Create a vibrant, artistic AI avatar representing the unique culture, landmarks, and natural beauty of {region}. The style should be a modern digital illustration, suitable for a profile picture. Avoid realistic human depictions; focus on abstract and symbolic elements.")
}

pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn api_key(&self) -> Result<&str, SynthesisError> {
        self.api_key.as_deref().ok_or(SynthesisError::MissingCredential)
    }

    async fn perform_api_call(&self, api_key: &str, model: &str, method: &str, body: &serde_json::Value) -> Result<String, GeminiError> {
        let url = format!("{}/models/{}:{}", self.base_url, model, method);
        info!("🔗 Making request to: {}", url);

        let mut logged = body.clone();
        truncate_base64_in_json(&mut logged);
        info!("📤 Request body: {}", serde_json::to_string(&logged).unwrap_or_default());

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ API Error response: {}", error_body);
            return Err(GeminiError::Http(format!("status={} body={}", status, error_body)));
        }

        response.text().await.map_err(|e| GeminiError::Other(e.to_string()))
    }

    async fn predict_region_image(&self, api_key: &str, region: &str) -> Result<String, GeminiError> {
        let body = json!({
            "instances": [{ "prompt": build_region_prompt(region) }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": "1:1",
                "outputOptions": { "mimeType": "image/jpeg" }
            }
        });

        let text = self.perform_api_call(api_key, TEXT_MODEL, "predict", &body).await?;
        let parsed: PredictResponse = serde_json::from_str(&text)
            .map_err(|e| GeminiError::Other(format!("parse error: {}", e)))?;

        let data = parsed.predictions
            .into_iter()
            .find_map(|p| p.bytes_base64_encoded)
            .ok_or(GeminiError::NoImages)?;

        info!("🖼️ Received {} image for '{}': {}", sniff_format(&data), region, preview(&data));
        Ok(DataUri::new("image/jpeg", data).to_string())
    }

    async fn transform_image(&self, api_key: &str, payload: &ImagePayload) -> Result<String, GeminiError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": payload.media_type, "data": payload.data } },
                    { "text": IMAGE_PROMPT }
                ]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"]
            }
        });

        let text = self.perform_api_call(api_key, IMAGE_MODEL, "generateContent", &body).await?;
        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| GeminiError::Other(format!("parse error: {}", e)))?;

        let inline = extract_first_image(parsed).ok_or(GeminiError::NoImagePart)?;
        info!("🖼️ Extracted {} image from API response: {}", sniff_format(&inline.data), preview(&inline.data));
        Ok(DataUri::new(inline.mime_type, inline.data).to_string())
    }
}

#[async_trait]
impl AvatarSynthesizer for GeminiClient {
    async fn synthesize_from_text(&self, region: &str) -> Result<String, SynthesisError> {
        let api_key = self.api_key()?;
        info!("🎯 Generating avatar for region '{}'", region);
        self.predict_region_image(api_key, region).await.map_err(|e| {
            error!("❌ Failed to generate avatar from region: {}", e);
            SynthesisError::FromText(e)
        })
    }

    async fn synthesize_from_image(&self, payload: &ImagePayload) -> Result<String, SynthesisError> {
        let api_key = self.api_key()?;
        info!("🎯 Transforming uploaded {} image ({} chars)", payload.media_type, payload.data.len());
        self.transform_image(api_key, payload).await.map_err(|e| {
            error!("❌ Failed to generate avatar from image: {}", e);
            SynthesisError::FromImage(e)
        })
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded", default)]
    bytes_base64_encoded: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

/// Text and other part kinds deserialize with `inline_data: None`.
#[derive(Debug, Deserialize)]
struct Part {
    #[serde(rename = "inlineData", default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_first_image(resp: GeminiResponse) -> Option<InlineData> {
    for c in resp.candidates {
        for p in c.content.parts {
            if let Some(inline_data) = p.inline_data {
                info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
                return Some(inline_data);
            }
        }
    }
    info!("⚠️ No inline image data found in response structure");
    None
}
