use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of an exam question.
///
/// Integer ids (`1`) and bare numeric strings (`"1"`) normalize to `"Q1"`, so
/// documents keyed by `question_number` and documents keyed by `"Q1"`-style
/// ids refer to the same question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    /// Creates a normalized question id.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            trimmed
                .parse()
                .map(Self::from_number)
                .unwrap_or_else(|_| Self(trimmed.to_string()))
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Creates the id for a numbered question.
    pub fn from_number(number: u64) -> Self {
        Self(format!("Q{number}"))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the id is empty after trimming.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for QuestionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Either representation found in the wild.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            /// `"question_number": 3`
            Number(u64),
            /// `"question_id": "Q3"`
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self::from_number(n)),
            Raw::Text(s) => Ok(Self::new(s)),
        }
    }
}
