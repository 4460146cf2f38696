use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::models::{b64_preview, DesignRequest};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("Other: {0}")] Other(String),
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        // ASCII check: the byte slice below requires it
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

/// The seam between the session shell and the image service. Handlers call
/// through this trait; tests swap in a scripted engine.
#[async_trait]
pub trait DesignEngine: Send + Sync {
    /// One redesign pass over the source photo, several styled variants.
    async fn generate(&self, request: &DesignRequest) -> Result<Vec<String>, GeminiError>;

    /// One adjustment pass over a single render. `Ok(None)` means the service
    /// answered but returned no image.
    async fn edit(&self, source_image: &str, instruction: &str)
        -> Result<Option<String>, GeminiError>;
}

/// Each generation fans out into this many variants, one API call per variant.
pub const VARIANT_COUNT: usize = 3;

const VARIANT_EMPHASES: [&str; VARIANT_COUNT] = [
    "a faithful rendition that keeps the current furniture arrangement recognizable",
    "a bolder take with a fully reworked furniture arrangement",
    "a light, airy interpretation that maximizes natural light",
];

const DEMO_KEY: &str = "DEMO_KEY";

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("GEMINI_API_BASE").unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    async fn call_image_api(&self, parts: Vec<serde_json::Value>) -> Result<Option<String>, GeminiError> {
        let url = format!(
            "{}/models/gemini-2.5-flash-image-preview:generateContent?key={}",
            self.base_url, self.api_key
        );

        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let request_body = json!({
            "contents": [{
                "parts": parts
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 0.4,
                "topP": 0.95,
                "topK": 64,
                "candidateCount": 1
            }
        });

        let mut body_log = request_body.clone();
        truncate_base64_in_json(&mut body_log);
        info!("📤 Request body: {}", serde_json::to_string_pretty(&body_log).unwrap_or_default());

        let response = self.client
            .post(&url)
            .json(&request_body)
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

        let response_text = response.text().await
            .map_err(|e| GeminiError::Other(e.to_string()))?;

        // Truncate base64 image data for cleaner logging
        let truncated_response = if response_text.len() > 1000 {
            if let Ok(mut json_value) = serde_json::from_str::<serde_json::Value>(&response_text) {
                truncate_base64_in_json(&mut json_value);
                serde_json::to_string_pretty(&json_value).unwrap_or(response_text[..1000].to_string() + "...")
            } else {
                response_text[..1000].to_string() + "..."
            }
        } else {
            response_text.clone()
        };

        info!("📥 Raw Gemini API response: {}", truncated_response);

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Other(format!("parse error: {}: {}", e, response_text)))?;

        let image_result = extract_first_image_b64(&parsed);
        if let Some(ref image_data) = image_result {
            let image_type = if image_data.starts_with("PHN2Zyg") {
                "SVG"
            } else if image_data.starts_with("iVBORw0KGgo") {
                "PNG"
            } else if image_data.starts_with("/9j/") {
                "JPEG"
            } else {
                "Unknown"
            };
            info!("🖼️ Extracted {} image from API response: {}", image_type, b64_preview(image_data));
        } else {
            info!("⚠️ No image data found in API response");
        }

        Ok(image_result)
    }

    async fn render_variant(
        &self,
        request: &DesignRequest,
        source_b64: &str,
        mime: &str,
        slot: usize,
    ) -> Result<Option<String>, GeminiError> {
        let prompt = build_design_prompt(request, VARIANT_EMPHASES[slot]);
        info!("🎯 Variant {} prompt: {}", slot + 1, &prompt[..std::cmp::min(120, prompt.len())]);
        self.call_image_api(vec![
            json!({"text": prompt}),
            json!({"inlineData": {"mimeType": mime, "data": source_b64}}),
        ])
        .await
    }
}

#[async_trait]
impl DesignEngine for GeminiClient {
    async fn generate(&self, request: &DesignRequest) -> Result<Vec<String>, GeminiError> {
        if self.api_key == DEMO_KEY {
            info!("Using demo mode - no real images generated");
            let candidates: Vec<String> = (0..VARIANT_COUNT)
                .map(|slot| placeholder_candidate(slot, request))
                .collect();
            info!("📦 Generated {} placeholder candidates", candidates.len());
            return Ok(candidates);
        }

        info!("Generating {} design variants with Gemini API...", VARIANT_COUNT);
        let source = strip_data_url(&request.source_image);
        let mime = sniff_mime(source).unwrap_or("image/jpeg");

        let (a, b, c) = tokio::join!(
            self.render_variant(request, source, mime, 0),
            self.render_variant(request, source, mime, 1),
            self.render_variant(request, source, mime, 2),
        );

        let mut candidates = Vec::new();
        let mut first_err = None;
        for (slot, outcome) in [a, b, c].into_iter().enumerate() {
            match outcome {
                Ok(Some(image_data)) => {
                    info!("✅ Variant {} rendered: {}", slot + 1, b64_preview(&image_data));
                    candidates.push(image_data);
                }
                Ok(None) => {
                    info!("⚠️ Variant {} came back without an image", slot + 1);
                }
                Err(e) => {
                    error!("❌ Variant {} failed: {}", slot + 1, e);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        if candidates.is_empty() {
            if let Some(e) = first_err {
                return Err(e);
            }
        }
        Ok(candidates)
    }

    async fn edit(&self, source_image: &str, instruction: &str) -> Result<Option<String>, GeminiError> {
        if self.api_key == DEMO_KEY {
            info!("Using demo mode - echoing the adjustment onto a placeholder");
            return Ok(Some(placeholder_edit(instruction)));
        }

        info!("Editing render with Gemini API...");
        let source = strip_data_url(source_image);
        let mime = sniff_mime(source).unwrap_or("image/png");
        let result = self
            .call_image_api(vec![
                json!({"text": build_edit_prompt(instruction)}),
                json!({"inlineData": {"mimeType": mime, "data": source}}),
            ])
            .await;
        match &result {
            Ok(Some(image_data)) => info!("✅ Successfully edited render: {}", b64_preview(image_data)),
            Ok(None) => info!("⚠️ Edit response carried no image"),
            Err(e) => error!("❌ Failed to edit render: {}", e),
        }
        result
    }
}

pub fn build_design_prompt(request: &DesignRequest, emphasis: &str) -> String {
    let styles = request
        .styles
        .iter()
        .map(|s| s.prompt_descriptor())
        .collect::<Vec<_>>()
        .join(" blended with ");
    let budget = request.budget.prompt_descriptor();
    format!(
        "You are an expert interior designer. Redesign the room in the attached photo as {styles}. \
        Keep the room's architecture intact: walls, windows, doors and ceiling stay exactly where they are. \
        Furnish and decorate to a {budget} budget tier. Render {emphasis}. \
        Output a single photorealistic image, no text or watermarks."
    )
}

pub fn build_edit_prompt(instruction: &str) -> String {
    format!(
        "Apply exactly this adjustment to the attached interior render: {instruction}. \
        Change nothing else about the room. \
        Output a single photorealistic image, no text or watermarks."
    )
}

const PLACEHOLDER_COLORS: [&str; VARIANT_COUNT] = [
    "#0F766E", // Teal
    "#B45309", // Amber
    "#6D28D9", // Violet
];

fn placeholder_candidate(slot: usize, request: &DesignRequest) -> String {
    let styles = request
        .styles
        .iter()
        .map(|s| s.label())
        .collect::<Vec<_>>()
        .join(" + ");
    let color = PLACEHOLDER_COLORS[slot % PLACEHOLDER_COLORS.len()];

    let svg = format!(r#"<svg width="512" height="384" xmlns="http://www.w3.org/2000/svg">
            <defs>
                <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
                    <stop offset="0%" style="stop-color:{color};stop-opacity:1" />
                    <stop offset="100%" style="stop-color:{color};stop-opacity:0.55" />
                </linearGradient>
            </defs>
            <rect width="512" height="384" fill="url(#grad)" />
            <text x="256" y="170" font-family="Arial, sans-serif" font-size="28" font-weight="bold"
                  text-anchor="middle" fill="white">
                Phương án {number}
            </text>
            <text x="256" y="210" font-family="Arial, sans-serif" font-size="16"
                  text-anchor="middle" fill="white" opacity="0.85">
                {styles}
            </text>
            <text x="256" y="240" font-family="Arial, sans-serif" font-size="13"
                  text-anchor="middle" fill="white" opacity="0.7">
                {budget}
            </text>
        </svg>"#,
        color = color,
        number = slot + 1,
        styles = xml_escape(&styles),
        budget = xml_escape(request.budget.label()),
    );

    base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
}

fn placeholder_edit(instruction: &str) -> String {
    let shown: String = instruction.chars().take(48).collect();

    let svg = format!(r#"<svg width="512" height="384" xmlns="http://www.w3.org/2000/svg">
            <rect width="512" height="384" fill="{color}" />
            <text x="256" y="180" font-family="Arial, sans-serif" font-size="24" font-weight="bold"
                  text-anchor="middle" fill="white">
                Đã chỉnh sửa
            </text>
            <text x="256" y="220" font-family="Arial, sans-serif" font-size="14"
                  text-anchor="middle" fill="white" opacity="0.85">
                {instruction}
            </text>
        </svg>"#,
        color = "#1E3A5F",
        instruction = xml_escape(&shown),
    );

    base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Drop a `data:image/...;base64,` prefix if the client sent a data URL.
pub fn strip_data_url(b64: &str) -> &str {
    match b64.split_once(";base64,") {
        Some((head, rest)) if head.starts_with("data:") => rest,
        _ => b64,
    }
}

/// Identify the upload from its magic bytes. Only JPEG and PNG are accepted.
pub fn sniff_mime(b64: &str) -> Option<&'static str> {
    let raw = strip_data_url(b64);
    // Whole base64 quads only; a few bytes are enough for the magic numbers.
    let head = raw.get(..raw.len().min(32) & !3)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(head).ok()?;
    match image::guess_format(&bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        _ => None,
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    Other(serde_json::Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_first_image_b64(resp: &GeminiResponse) -> Option<String> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
                return Some(inline_data.data.clone());
            }
        }
    }
    info!("⚠️ No inline image data found in response structure");
    None
}
