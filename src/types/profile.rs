//! User profile passed through to classification and the journal

use serde::{Deserialize, Serialize};

/// Child profile; none of it is read by inference
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// `YYYY-MM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_month: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl UserProfile {
    pub fn new(
        nickname: Option<String>,
        birth_month: Option<String>,
        gender: Option<String>,
    ) -> Self {
        Self {
            nickname: non_empty(nickname),
            birth_month: non_empty(birth_month),
            gender: non_empty(gender),
        }
    }

    /// Fill fields missing here from `other`
    pub fn or(self, other: UserProfile) -> Self {
        Self {
            nickname: self.nickname.or(other.nickname),
            birth_month: self.birth_month.or(other.birth_month),
            gender: self.gender.or(other.gender),
        }
    }
}

/// Empty strings from forms count as unset
fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
