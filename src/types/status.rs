//! Interaction phase, transient message and session status

use serde::{Deserialize, Serialize};

use crate::types::{EmotionMode, FeedbackTuple, Rgb};

/// Pointer state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionPhase {
    /// No pointer down
    #[default]
    Idle,
    /// Pointer down, moves become drags
    Interacting,
}

impl std::fmt::Display for InteractionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InteractionPhase::Idle => "IDLE",
            InteractionPhase::Interacting => "INTERACTING",
        };
        write!(f, "{}", name)
    }
}

/// Identifies one shown message so that only its own timer hides it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageTicket(pub u64);

/// Classification message currently on screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayedMessage {
    pub ticket: MessageTicket,
    pub emotion: String,
    pub text: String,
    /// Wall clock, milliseconds
    pub shown_at: i64,
}

/// Snapshot of a session, published after every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: InteractionPhase,
    pub emotion_mode: EmotionMode,
    /// Emotion shown to the user; starts as `peaceful`
    pub current_emotion: String,
    pub background: Rgb,
    pub history_len: usize,
    pub touches_since_classification: u32,
    pub classifications_requested: u64,
    pub classifications_applied: u64,
    pub classifications_failed: u64,
    pub message: Option<DisplayedMessage>,
    /// Wall clock of the last applied classification
    pub last_classified_at: Option<i64>,
    pub recent_feedback: Vec<FeedbackTuple>,
    pub recent_messages: Vec<String>,
}

impl SessionStatus {
    pub fn message_visible(&self) -> bool {
        self.message.is_some()
    }
}
