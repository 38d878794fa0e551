//! Insight model client (Gemini `generateContent`).

use super::{error_for_status, ClientError, InsightSynthesizer, SynthesisInput};
use crate::server::metrics;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SYSTEM_PROMPT: &str = "You are a crypto news analyst writing a daily intelligence briefing. \
Synthesize the provided data into one detailed, no-nonsense brief titled \
\"Your [Topic] Intel Brief - [Date]\", inferring a single topic from the data. \
Use headings, bold text and bullet points. Group related stories, explain why they matter, \
ignore anything unrelated to crypto, and use only the provided data. \
Do not list references, do not tag social media users, and do not add intro or outro text. \
If there is not enough data about the topic, say so briefly instead of writing a report.";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(&self.api_key)
        )
    }

    async fn generate(&self, input: &SynthesisInput) -> Result<String, ClientError> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": SYSTEM_PROMPT },
                    { "text": build_input(input) }
                ]
            }],
            "generationConfig": {
                "temperature": 0.3,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 5000
            }
        });

        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        extract_text(body)
    }
}

fn build_input(input: &SynthesisInput) -> String {
    let mut text = format!("Category: {}\n\nIntel News:\n{}\n\n", input.category.label(), input.intel);
    match input.social.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(social) => text.push_str(&format!("Twitter Content:\n{}\n", social)),
        None => text.push_str("Twitter Content: Not available.\n"),
    }
    text
}

fn extract_text(body: GenerateResponse) -> Result<String, ClientError> {
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::InvalidResponse("no candidates".to_string()))?;

    match candidate.finish_reason.as_deref() {
        Some("SAFETY") => {
            return Err(ClientError::Blocked(
                "content blocked by safety settings".to_string(),
            ))
        }
        Some(reason) if reason != "STOP" && reason != "MAX_TOKENS" => {
            warn!("Insight generation finished with reason {}", reason);
        }
        _ => {}
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ClientError::InvalidResponse("empty candidate".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl InsightSynthesizer for GeminiClient {
    async fn synthesize(&self, input: &SynthesisInput) -> Result<String, ClientError> {
        debug!(
            "Requesting insights for {} using model {}",
            input.category, self.model
        );
        let started = Instant::now();
        let result = self.generate(input).await;
        metrics::record_collaborator_request(
            "gemini",
            "synthesize",
            result.is_ok(),
            started.elapsed(),
        );
        result
    }
}
