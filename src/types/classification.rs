//! Classification requests, results and the journal record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TouchOperation, UserProfile};

/// Result of one remote classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub emotion: String,
    pub message: String,
}

impl Classification {
    pub fn new(emotion: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            emotion: emotion.into(),
            message: message.into(),
        }
    }
}

/// Emitted by the controller every N qualifying operations
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRequest {
    /// Issue order within the session, starting at 1
    pub seq: u64,
    /// Full history snapshot at trigger time
    pub history: Vec<TouchOperation>,
    pub profile: UserProfile,
}

/// One persisted classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionLogEntry {
    /// Hex digest of the entry content
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub nickname: Option<String>,
    pub birth_month: Option<String>,
    pub gender: Option<String>,
    pub emotion: String,
    pub message: String,
    pub operations: Vec<TouchOperation>,
}

impl EmotionLogEntry {
    /// Build an entry; the id is filled in by the journal
    pub fn new(
        timestamp: DateTime<Utc>,
        profile: &UserProfile,
        classification: &Classification,
        operations: Vec<TouchOperation>,
    ) -> Self {
        Self {
            id: String::new(),
            timestamp,
            nickname: profile.nickname.clone(),
            birth_month: profile.birth_month.clone(),
            gender: profile.gender.clone(),
            emotion: classification.emotion.clone(),
            message: classification.message.clone(),
            operations,
        }
    }

    /// `YYYY-MM-DD` partition key
    pub fn day(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}
