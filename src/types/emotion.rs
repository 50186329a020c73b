//! Emotion labels and the engine's inference mode

use serde::{Deserialize, Serialize};

/// The six labels the classifier may answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joyful,
    Excited,
    Calm,
    Curious,
    Surprised,
    Explorative,
}

impl Emotion {
    /// All labels, in prompt order
    pub const ALL: [Emotion; 6] = [
        Emotion::Joyful,
        Emotion::Excited,
        Emotion::Calm,
        Emotion::Surprised,
        Emotion::Curious,
        Emotion::Explorative,
    ];

    /// Lowercase wire label
    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Joyful => "joyful",
            Emotion::Excited => "excited",
            Emotion::Calm => "calm",
            Emotion::Curious => "curious",
            Emotion::Surprised => "surprised",
            Emotion::Explorative => "explorative",
        }
    }

    /// Case-insensitive label lookup
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.label().eq_ignore_ascii_case(label))
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Emotion::Joyful => "😊",
            Emotion::Excited => "🤩",
            Emotion::Calm => "😌",
            Emotion::Curious => "🤔",
            Emotion::Surprised => "😮",
            Emotion::Explorative => "🧭",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which strategy the inference engine uses
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "label", rename_all = "lowercase")]
pub enum EmotionMode {
    /// Live heuristic over recent operations
    #[default]
    Default,
    /// Pinned to a classified label; kept verbatim so unknown labels survive
    Pinned(String),
}

impl EmotionMode {
    /// Mode for a label received from the classifier
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() || label.eq_ignore_ascii_case("default") {
            EmotionMode::Default
        } else {
            EmotionMode::Pinned(label.to_string())
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self, EmotionMode::Pinned(_))
    }

    /// Display label: `default` or the pinned text
    pub fn label(&self) -> &str {
        match self {
            EmotionMode::Default => "default",
            EmotionMode::Pinned(label) => label,
        }
    }
}

impl std::fmt::Display for EmotionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_is_case_insensitive() {
        assert_eq!(Emotion::from_label("Joyful"), Some(Emotion::Joyful));
        assert_eq!(Emotion::from_label("  EXPLORATIVE "), Some(Emotion::Explorative));
        assert_eq!(Emotion::from_label("sleepy"), None);
    }

    #[test]
    fn test_mode_from_label() {
        assert_eq!(EmotionMode::from_label("default"), EmotionMode::Default);
        assert_eq!(EmotionMode::from_label(""), EmotionMode::Default);
        assert_eq!(EmotionMode::from_label("calm"), EmotionMode::Pinned("calm".into()));
        assert_eq!(EmotionMode::from_label("sleepy").label(), "sleepy");
    }
}
