use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::schema::{response_schema, EXTRACTION_PROMPT};
use super::Extractor;
use crate::config::ExtractionConfig;
use crate::error::{CrmError, Result};
use crate::models::ExtractedFields;

/// Request body for `models/{model}:generateContent`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    Text {
        text: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

/// Response from `generateContent`
#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini document extraction client
///
/// Sends the document inline (base64) together with the extraction prompt and a
/// JSON response schema. Without an API key every call fails immediately with a
/// configuration error.
pub struct GeminiExtractor {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiExtractor {
    /// Create a new extractor
    ///
    /// # Arguments
    ///
    /// * `api_key` - Gemini API key, `None` when not configured
    /// * `config` - Model, endpoint and request timeout
    pub fn new(api_key: Option<String>, config: &ExtractionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrmError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(bytes: &[u8], mime_type: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Inline {
                        inline_data: Blob {
                            mime_type: mime_type.to_string(),
                            data: STANDARD.encode(bytes),
                        },
                    },
                    Part::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        }
    }
}

/// Pull the JSON document out of the first candidate
fn parse_response(response: GenerateContentResponse) -> Result<ExtractedFields> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = strip_code_fence(text.trim());
    if text.is_empty() {
        return Err(CrmError::Extraction("Empty response from Gemini API".to_string()));
    }

    serde_json::from_str(text)
        .map_err(|e| CrmError::Extraction(format!("Malformed extraction output: {}", e)))
}

/// Models occasionally wrap JSON in a markdown fence despite the response MIME type
fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[async_trait]
impl Extractor for GeminiExtractor {
    async fn analyze(&self, bytes: &[u8], mime_type: &str) -> Result<ExtractedFields> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            CrmError::Config("AI service not configured (missing API key)".to_string())
        })?;

        let start = std::time::Instant::now();
        let request = Self::build_request(bytes, mime_type);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CrmError::Extraction(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(CrmError::Extraction(format!(
                "Gemini API error {}: {}",
                status, body
            )));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CrmError::Extraction(format!("Failed to parse response: {}", e)))?;

        log::debug!(
            "Extraction of {} bytes ({}) took {:?}",
            bytes.len(),
            mime_type,
            start.elapsed()
        );

        parse_response(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_with_text(text: &str) -> GenerateContentResponse {
        serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        }))
        .unwrap()
    }

    #[test]
    fn test_extractor_new() {
        let config = ExtractionConfig {
            base_url: "http://localhost:9999/v1beta/".to_string(),
            ..Default::default()
        };
        let extractor = GeminiExtractor::new(Some("key".to_string()), &config).unwrap();
        assert!(extractor.is_configured());
        assert_eq!(
            extractor.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let extractor = GeminiExtractor::new(None, &ExtractionConfig::default()).unwrap();
        assert!(!extractor.is_configured());

        let err = extractor.analyze(b"bytes", "image/png").await.unwrap_err();
        assert!(matches!(err, CrmError::Config(_)));
    }

    #[test]
    fn test_request_shape() {
        let request = GeminiExtractor::build_request(b"abc", "application/pdf");
        let json = serde_json::to_value(&request).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[0]["inlineData"]["data"], "YWJj");
        assert!(parts[1]["text"].as_str().unwrap().contains("Port-In"));
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn test_parse_response() {
        let response = response_with_text(
            r#"{"scan_id":"s1","customer_id":"c1","transaction_id":"t1","total_payment_amount":"$20.00"}"#,
        );
        let fields = parse_response(response).unwrap();
        assert_eq!(fields.customer_id, "c1");
        assert_eq!(fields.total_payment_amount.as_deref(), Some("$20.00"));
    }

    #[test]
    fn test_parse_response_with_code_fence() {
        let response = response_with_text("```json\n{\"scan_id\":\"s1\",\"customer_id\":\"c1\",\"transaction_id\":\"t1\"}\n```");
        let fields = parse_response(response).unwrap();
        assert_eq!(fields.transaction_id, "t1");
    }

    #[test]
    fn test_parse_response_rejects_malformed_output() {
        let err = parse_response(response_with_text("not json")).unwrap_err();
        assert!(matches!(err, CrmError::Extraction(_)));

        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(parse_response(empty), Err(CrmError::Extraction(_))));
    }
}
