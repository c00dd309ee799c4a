//! Gemini scoring client.
//!
//! The scorer is advisory: it rates a finished clip 0-10 and explains the
//! rating. Failures never propagate past the clip worker that called it.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

/// Scorer verdict for one clip.
#[derive(Debug, Clone, Deserialize)]
pub struct ClipScore {
    pub score: u8,
    pub explanation: String,
}

/// Rates a clip's severity.
#[async_trait]
pub trait ClipScorer: Send + Sync {
    async fn score(
        &self,
        clip: &Path,
        metadata: Option<&Map<String, Value>>,
    ) -> EngineResult<ClipScore>;
}

/// Models tried in order until one answers.
const SCORING_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.5-pro",
];

const SCORING_PROMPT: &str = "\
Watch this surveillance clip and determine whether a physical fight or \
violent crime is occurring. Score it from 0 to 10, where 0 means no fight \
and 10 means extremely dangerous to bystanders. Return ONLY a single JSON \
object: {\"score\": <integer 0-10>, \"explanation\": \"<one short sentence>\"}";

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Gemini API client.
pub struct GeminiScorer {
    api_key: String,
    http: Client,
    api_base: String,
}

impl GeminiScorer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> EngineResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| EngineError::config_error("GEMINI_API_KEY not set"))?;
        Ok(Self::new(api_key))
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn build_prompt(metadata: Option<&Map<String, Value>>) -> String {
        match metadata {
            Some(metadata) if !metadata.is_empty() => format!(
                "{}\nCamera context: {}",
                SCORING_PROMPT,
                Value::Object(metadata.clone())
            ),
            _ => SCORING_PROMPT.to_string(),
        }
    }

    async fn call_gemini(&self, model: &str, clip_b64: &str, prompt: &str) -> EngineResult<ClipScore> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: "video/mp4".to_string(),
                            data: clip_b64.to_string(),
                        },
                    },
                    Part::Text {
                        text: prompt.to_string(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::scoring_failed(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::scoring_failed(format!(
                "Gemini returned {}: {}",
                status, body
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| EngineError::scoring_failed(format!("Failed to parse response: {}", e)))?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| EngineError::scoring_failed("No content in Gemini response"))?;

        parse_score_response(text)
    }
}

#[async_trait]
impl ClipScorer for GeminiScorer {
    async fn score(
        &self,
        clip: &Path,
        metadata: Option<&Map<String, Value>>,
    ) -> EngineResult<ClipScore> {
        let bytes = tokio::fs::read(clip).await?;
        let clip_b64 = BASE64.encode(&bytes);
        let prompt = Self::build_prompt(metadata);

        let mut last_error = None;

        for model in SCORING_MODELS {
            info!("Scoring {} with model {}", clip.display(), model);
            match self.call_gemini(model, &clip_b64, &prompt).await {
                Ok(score) => {
                    info!(
                        "Clip {} scored {} ({})",
                        clip.display(),
                        score.score,
                        model
                    );
                    return Ok(score);
                }
                Err(e) => {
                    warn!("Scoring with {} failed: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| EngineError::scoring_failed("All scoring models failed")))
    }
}

/// Parse the scorer's JSON reply, tolerating markdown code fences.
fn parse_score_response(text: &str) -> EngineResult<ClipScore> {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);

    let mut score: ClipScore = serde_json::from_str(text.trim())
        .map_err(|e| EngineError::scoring_failed(format!("Unparseable score reply: {}", e)))?;
    score.score = score.score.min(10);
    Ok(score)
}
