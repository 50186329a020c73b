//! Classification collaborator: touch history → (emotion, message)
//!
//! - `HttpClassifier` prompts a generative model and parses its free text
//! - `OfflineClassifier` applies the local rule table, no network
//!
//! Both reject an empty history.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::inference::WindowStats;
use crate::types::{Classification, Emotion, TouchOperation, UserProfile};
use crate::CLASSIFIER_WINDOW;

/// Emotion used when the model answer has no `emotion:` line
pub const FALLBACK_EMOTION: &str = "curious";

/// Message used when the model answer has no `message:` line
pub const FALLBACK_MESSAGE: &str = "So curious about everything?";

lazy_static! {
    static ref RE_EMOTION_LINE: Regex = Regex::new(r"(?im)^\s*emotion\s*:(.*)$").unwrap();
    static ref RE_MESSAGE_LINE: Regex = Regex::new(r"(?im)^\s*message\s*:(.*)$").unwrap();
}

/// Why a classification call failed
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Nothing to classify
    #[error("operation history is empty")]
    EmptyHistory,

    /// Request never produced a response
    #[error("classifier transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("classifier returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not what we expected
    #[error("could not decode classifier response: {0}")]
    Decode(String),
}

/// Remote (or local) sentiment classification
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    async fn classify(
        &self,
        history: &[TouchOperation],
        profile: &UserProfile,
    ) -> Result<Classification, ClassifyError>;
}

/// Last `CLASSIFIER_WINDOW` operations of `history`
pub fn classifier_window(history: &[TouchOperation]) -> &[TouchOperation] {
    let skip = history.len().saturating_sub(CLASSIFIER_WINDOW);
    &history[skip..]
}

/// Prompt asking for `emotion:` and `message:` lines
pub fn build_prompt(history: &[TouchOperation], profile: &UserProfile) -> String {
    let operations = serde_json::to_string_pretty(classifier_window(history))
        .unwrap_or_else(|_| "[]".to_string());
    let candidates: Vec<&str> = Emotion::ALL.iter().map(|e| e.label()).collect();

    format!(
        "Below is a baby's touch-operation history on a tablet canvas.\n\
         \n\
         [Profile]\n\
         Nickname: {nickname}\n\
         Birth month: {birth_month}\n\
         Gender: {gender}\n\
         \n\
         Using the profile as context, pick the one emotion the behavior most suggests \
         from the candidates and write it as \"emotion: ...\".\n\
         Then write a short reply to the baby that explains why you guessed that emotion, \
         as \"message: ...\".\n\
         \n\
         emotion candidates: {candidates}\n\
         \n\
         Example output:\n\
         emotion: excited\n\
         message: You touched so many times so quickly, are you feeling excited?\n\
         \n\
         Operation history:\n\
         {operations}\n",
        nickname = profile.nickname.as_deref().unwrap_or("not set"),
        birth_month = profile.birth_month.as_deref().unwrap_or("unknown"),
        gender = profile.gender.as_deref().unwrap_or("unknown"),
        candidates = candidates.join(", "),
        operations = operations,
    )
}

/// Extract `emotion:` / `message:` lines; missing or blank lines fall back
pub fn parse_model_response(text: &str) -> Classification {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let emotion = capture(&RE_EMOTION_LINE)
        .map(|e| e.trim_matches(|c: char| c == '*' || c == '"' || c == '.').to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| FALLBACK_EMOTION.to_string());
    let message = capture(&RE_MESSAGE_LINE).unwrap_or_else(|| FALLBACK_MESSAGE.to_string());

    Classification { emotion, message }
}

// =============================================================================
// HTTP MODEL CLASSIFIER
// =============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Classifier backed by a `/api/generate` model endpoint
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpClassifier {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn classify(
        &self,
        history: &[TouchOperation],
        profile: &UserProfile,
    ) -> Result<Classification, ClassifyError> {
        if history.is_empty() {
            return Err(ClassifyError::EmptyHistory);
        }

        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(history, profile),
            stream: false,
        };
        tracing::debug!(url = %self.generate_url(), operations = history.len(), "sending classification prompt");

        let response = self.client.post(self.generate_url()).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Decode(e.to_string()))?;
        tracing::info!(raw = %generated.response, "model response");

        Ok(parse_model_response(&generated.response))
    }
}

// =============================================================================
// OFFLINE CLASSIFIER
// =============================================================================

/// Rule-table classifier for running without a model endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineClassifier;

impl OfflineClassifier {
    pub fn new() -> Self {
        Self
    }

    fn message_for(emotion: Emotion, profile: &UserProfile) -> String {
        let name = profile.nickname.as_deref().unwrap_or("little one");
        match emotion {
            Emotion::Excited => format!("So many taps so fast, {}! Are you excited?", name),
            Emotion::Explorative => format!("Sliding all around, {}, exploring the whole screen?", name),
            Emotion::Calm => format!("Holding nice and still, {}. Feeling calm?", name),
            Emotion::Joyful => format!("What a happy touch, {}!", name),
            Emotion::Surprised => format!("Oh! Did something surprise you, {}?", name),
            Emotion::Curious => format!("Touching here and there, {}, so curious!", name),
        }
    }
}

#[async_trait]
impl Classifier for OfflineClassifier {
    fn name(&self) -> &str {
        "offline"
    }

    async fn classify(
        &self,
        history: &[TouchOperation],
        profile: &UserProfile,
    ) -> Result<Classification, ClassifyError> {
        let stats = WindowStats::from_operations(classifier_window(history))
            .ok_or(ClassifyError::EmptyHistory)?;
        let emotion = stats.matched_rule().emotion();
        Ok(Classification::new(emotion.label(), Self::message_for(emotion, profile)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
