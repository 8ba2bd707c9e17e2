//! AI enrichment collaborators.
//!
//! The batch pipeline only sees the two traits here. [`GeminiClient`] talks
//! to the Gemini `generateContent` REST endpoint; [`StockTaglines`] and
//! [`NoEnhancement`] are the offline stand-ins used when no API key is set.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::CardError;
use crate::record::{ImageSource, STOCK_TAGLINE};

pub const TAGLINE_MODEL: &str = "gemini-2.5-flash";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const ENHANCE_PROMPT: &str = "Enhance this portrait photo for an ID card. Improve lighting, \
increase sharpness, and remove any minor blemishes, while keeping the person's appearance \
natural and professional.";

/// Produces a short tagline for an event participant.
#[async_trait]
pub trait TaglineGenerator: Send + Sync {
    async fn tagline(&self, role: &str, event_name: &str) -> Result<String, CardError>;
}

/// Returns an improved copy of a portrait.
#[async_trait]
pub trait PhotoEnhancer: Send + Sync {
    async fn enhance(&self, photo: &ImageSource) -> Result<ImageSource, CardError>;
}

/// Always answers with the stock tagline.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockTaglines;

#[async_trait]
impl TaglineGenerator for StockTaglines {
    async fn tagline(&self, _role: &str, _event_name: &str) -> Result<String, CardError> {
        Ok(STOCK_TAGLINE.to_string())
    }
}

/// Hands the photo back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnhancement;

#[async_trait]
impl PhotoEnhancer for NoEnhancement {
    async fn enhance(&self, photo: &ImageSource) -> Result<ImageSource, CardError> {
        Ok(photo.clone())
    }
}

pub fn tagline_prompt(role: &str, event_name: &str) -> String {
    format!(
        "Generate a short, catchy, and inspiring tagline for a person with the role \"{}\" at an \
         event called \"{}\". The tagline should be under 10 words and should not be in quotes.",
        role, event_name
    )
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> String {
        self.parts().filter_map(|p| p.text.as_deref()).collect()
    }
}

/// Gemini REST client.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn generate(&self, model: &str, body: Value) -> Result<GenerateResponse, CardError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CardError::Enhance(format!("Gemini request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(CardError::Enhance(format!(
                "Gemini returned HTTP {}",
                response.status()
            )));
        }
        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| CardError::Enhance(format!("Invalid Gemini response: {}", e)))
    }

    /// Plain text completion with the tagline model.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, CardError> {
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        Ok(self.generate(TAGLINE_MODEL, body).await?.text())
    }
}

#[async_trait]
impl TaglineGenerator for GeminiClient {
    async fn tagline(&self, role: &str, event_name: &str) -> Result<String, CardError> {
        tracing::debug!(role, event_name, "Generating tagline");
        let text = self.generate_text(&tagline_prompt(role, event_name)).await?;
        let tagline = text.replace('"', "").trim().to_string();
        if tagline.is_empty() {
            return Err(CardError::Enhance("Gemini returned an empty tagline".into()));
        }
        Ok(tagline)
    }
}

#[async_trait]
impl PhotoEnhancer for GeminiClient {
    async fn enhance(&self, photo: &ImageSource) -> Result<ImageSource, CardError> {
        let ImageSource::Embedded { mime, data } = photo else {
            return Err(CardError::Enhance("Invalid image data URL".into()));
        };
        if !mime.starts_with("image/") {
            return Err(CardError::Enhance(format!("Cannot enhance {} content", mime)));
        }
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": mime, "data": STANDARD.encode(data) } },
                    { "text": ENHANCE_PROMPT }
                ]
            }],
            "generationConfig": { "responseModalities": ["IMAGE"] }
        });
        let response = self.generate(IMAGE_MODEL, body).await?;
        let inline = response
            .parts()
            .find_map(|p| p.inline_data.as_ref())
            .ok_or_else(|| CardError::Enhance("Photo enhancement failed: No image data returned.".into()))?;
        let bytes = STANDARD
            .decode(&inline.data)
            .map_err(|e| CardError::Enhance(format!("Invalid image data in response: {}", e)))?;
        tracing::info!(mime = %inline.mime_type, bytes = bytes.len(), "Photo enhanced");
        Ok(ImageSource::embedded(inline.mime_type.clone(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_stock_collaborators() {
        assert_eq!(StockTaglines.tagline("Speaker", "Summit").await.unwrap(), STOCK_TAGLINE);
        let photo = ImageSource::embedded("image/png", vec![1, 2, 3]);
        assert_eq!(NoEnhancement.enhance(&photo).await.unwrap(), photo);
    }

    #[test]
    fn test_tagline_prompt_names_role_and_event() {
        let prompt = tagline_prompt("Speaker", "TechFest 2025");
        assert!(prompt.contains("role \"Speaker\""));
        assert!(prompt.contains("called \"TechFest 2025\""));
    }

    #[test]
    fn test_response_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[
            {"text":"Build "},
            {"inlineData":{"mimeType":"image/png","data":"AQID"}},
            {"text":"boldly"}
        ]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text(), "Build boldly");
        let inline = response.parts().find_map(|p| p.inline_data.as_ref()).unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&inline.data).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_response_has_no_parts() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.parts().count(), 0);
        assert_eq!(response.text(), "");
    }

    #[tokio::test]
    async fn test_enhance_rejects_urls() {
        let client = GeminiClient::new(reqwest::Client::new(), "key");
        let err = client
            .enhance(&ImageSource::Url("https://x/p.png".into()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid image data URL"));
    }
}
