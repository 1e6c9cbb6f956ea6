#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    constants::{INJECTION_PATTERNS, MAX_ANSWER_CHARS, UNKNOWN_STUDENT},
    error::{LoadError, decode_entry, document_entries, parse_json, read_document},
    types::QuestionId,
};

/// One answer as submitted by the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAnswer {
    /// Question the answer belongs to.
    #[serde(alias = "question_number")]
    pub question_id: QuestionId,
    /// The submitted answer, either plain text or a structured value.
    #[serde(alias = "student_answer")]
    pub answer:      Value,
}

impl StudentAnswer {
    /// Creates a plain-text answer.
    pub fn text(question_id: impl AsRef<str>, answer: impl Into<String>) -> Self {
        Self {
            question_id: QuestionId::new(question_id),
            answer:      Value::String(answer.into()),
        }
    }

    /// Renders the answer as text for the prompt and the report.
    ///
    /// Structured answers carrying a `value` string render as that string;
    /// everything else renders as compact JSON.
    pub fn answer_text(&self) -> String {
        match &self.answer {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("value") {
                Some(Value::String(s)) => s.clone(),
                _ => self.answer.to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Applies the input guardrails to this answer.
    pub fn screen(&self) -> Screening {
        if self.answer.is_null() {
            return Screening::Rejected("answer is missing".to_string());
        }

        let text = self.answer_text();
        let length = text.chars().count();
        if text.trim().is_empty() {
            return Screening::Rejected("answer is empty".to_string());
        }
        if length > MAX_ANSWER_CHARS {
            return Screening::Rejected(format!(
                "answer too long ({length} chars, max {MAX_ANSWER_CHARS})"
            ));
        }

        let lowered = text.to_lowercase();
        if let Some(pattern) = INJECTION_PATTERNS.iter().find(|p| lowered.contains(*p)) {
            warn!(question = %self.question_id, pattern, "answer flagged as potential prompt injection");
            return Screening::Flagged(format!(
                "[FLAGGED: potential prompt injection] {}",
                text.trim()
            ));
        }

        Screening::Accepted(text.trim().to_string())
    }
}

/// Outcome of the input guardrails for a single answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Screening {
    /// The answer may be graded; carries the text to show the model.
    Accepted(String),
    /// The answer may be graded but is marked for human review.
    Flagged(String),
    /// The answer cannot be graded; carries the reason.
    Rejected(String),
}

/// A student's full submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Submission {
    /// Name of the student, if the document carries one.
    student_name: Option<String>,
    /// Date of the exam, if the document carries one.
    exam_date:    Option<String>,
    /// Answers in submission order.
    answers:      Vec<StudentAnswer>,
}

/// Envelope accepted around the answer list.
#[derive(Deserialize)]
struct Envelope {
    /// Student display name.
    #[serde(default)]
    student_name: Option<String>,
    /// Exam date as written in the document.
    #[serde(default)]
    exam_date:    Option<String>,
}

impl Submission {
    /// Creates a submission from already-parsed answers.
    pub fn new(answers: Vec<StudentAnswer>) -> Self {
        Self {
            answers,
            ..Self::default()
        }
    }

    /// Reads and parses a submission file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = read_document(path)?;
        Self::parse(&path.display().to_string(), &text)
    }

    /// Parses a submission document.
    ///
    /// Accepts a bare array of answers or an object with an `answers` array
    /// and optional `student_name` / `exam_date`.
    pub fn parse(origin: &str, text: &str) -> Result<Self, LoadError> {
        let document = parse_json(origin, text)?;

        let envelope = match &document {
            Value::Object(_) => serde_json::from_value::<Envelope>(document.clone())
                .map_err(|e| LoadError::schema(origin, e.to_string()))?,
            _ => Envelope {
                student_name: None,
                exam_date:    None,
            },
        };

        let mut seen = HashSet::new();
        let mut answers = Vec::new();
        for (index, entry) in document_entries(origin, document, "answers")?
            .into_iter()
            .enumerate()
        {
            let has_answer = entry
                .as_object()
                .is_some_and(|map| map.contains_key("answer") || map.contains_key("student_answer"));
            if !has_answer {
                return Err(LoadError::schema(
                    origin,
                    format!("answer #{}: missing required field `answer`", index + 1),
                ));
            }
            let answer: StudentAnswer = decode_entry(origin, "answer", index, entry)?;
            if answer.question_id.is_empty() {
                return Err(LoadError::schema(
                    origin,
                    format!("answer #{}: question id is empty", index + 1),
                ));
            }
            if !seen.insert(answer.question_id.clone()) {
                return Err(LoadError::schema(
                    origin,
                    format!("question `{}` is answered more than once", answer.question_id),
                ));
            }
            answers.push(answer);
        }

        Ok(Self {
            student_name: envelope.student_name,
            exam_date: envelope.exam_date,
            answers,
        })
    }

    /// Keeps only the first `limit` answers.
    pub fn truncate(&mut self, limit: usize) {
        self.answers.truncate(limit);
    }

    /// Student display name.
    pub fn student_name(&self) -> &str {
        self.student_name.as_deref().unwrap_or(UNKNOWN_STUDENT)
    }

    /// Exam date, empty when unknown.
    pub fn exam_date(&self) -> &str {
        self.exam_date.as_deref().unwrap_or_default()
    }

    /// Answers in submission order.
    pub fn answers(&self) -> &[StudentAnswer] {
        &self.answers
    }
}
