#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ensure_unique, strings_of, text_of};
use crate::{
    error::{LoadError, decode_entry, document_entries, parse_json, read_document},
    types::QuestionId,
};

/// The authoritative answer to a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundTruthAnswer {
    /// Question the answer belongs to.
    pub question_id:          QuestionId,
    /// Short title of the question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title:                Option<String>,
    /// The correct value or answer.
    pub correct_answer:       Value,
    /// How the answer is obtained.
    pub explanation:          String,
    /// Points a full answer should mention.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_points:           Vec<String>,
    /// Worked calculation, if the document carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_calculation: Option<Value>,
    /// Datasets or rows backing the answer.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supporting_data:      Vec<String>,
}

impl GroundTruthAnswer {
    /// Renders the correct answer as text.
    pub fn correct_answer_text(&self) -> String {
        text_of(&self.correct_answer)
    }
}

/// Ground-truth entry as written in the document.
#[derive(Deserialize)]
struct RawAnswer {
    /// Identifier.
    #[serde(alias = "question_number")]
    question_id:          QuestionId,
    /// Title.
    #[serde(default)]
    title:                Option<String>,
    /// Correct answer.
    #[serde(default)]
    correct_answer:       Value,
    /// Alternative spelling used for multi-part answers.
    #[serde(default)]
    correct_answers:      Value,
    /// Explanation or methodology.
    #[serde(alias = "methodology", default)]
    explanation:          Value,
    /// Key points.
    #[serde(default)]
    key_points:           Value,
    /// Worked calculation.
    #[serde(default)]
    detailed_calculation: Option<Value>,
    /// Supporting data references.
    #[serde(alias = "dataset_used", alias = "supporting_data_references", default)]
    supporting_data:      Value,
}

/// Ground-truth answers for an exam.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    /// Answers in document order.
    answers: Vec<GroundTruthAnswer>,
    /// Position of each answer by question id.
    index:   HashMap<QuestionId, usize>,
}

impl GroundTruth {
    /// Builds the ground truth from answers.
    pub fn new(answers: Vec<GroundTruthAnswer>) -> Result<Self, LoadError> {
        ensure_unique("ground truth", answers.iter().map(|a| &a.question_id))?;
        let index = answers
            .iter()
            .enumerate()
            .map(|(i, a)| (a.question_id.clone(), i))
            .collect();
        Ok(Self { answers, index })
    }

    /// Reads and parses a ground-truth file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = read_document(path)?;
        Self::parse(&path.display().to_string(), &text)
    }

    /// Parses a ground-truth document: an array of answers or
    /// `{ "answers": [...] }`.
    pub fn parse(origin: &str, text: &str) -> Result<Self, LoadError> {
        let document = parse_json(origin, text)?;
        let mut answers = Vec::new();
        for (i, entry) in document_entries(origin, document, "answers")?.into_iter().enumerate() {
            let raw: RawAnswer = decode_entry(origin, "answer", i, entry)?;
            let correct_answer = if raw.correct_answer.is_null() {
                raw.correct_answers
            } else {
                raw.correct_answer
            };
            if correct_answer.is_null() {
                return Err(LoadError::schema(
                    origin,
                    format!("question `{}`: missing required field `correct_answer`", raw.question_id),
                ));
            }

            answers.push(GroundTruthAnswer {
                question_id: raw.question_id,
                title: raw.title,
                correct_answer,
                explanation: text_of(&raw.explanation),
                key_points: strings_of(&raw.key_points),
                detailed_calculation: raw.detailed_calculation,
                supporting_data: strings_of(&raw.supporting_data),
            });
        }
        Self::new(answers)
    }

    /// Looks up the answer for a question.
    pub fn answer(&self, id: &QuestionId) -> Option<&GroundTruthAnswer> {
        self.index.get(id).map(|&i| &self.answers[i])
    }

    /// All answers in document order.
    pub fn answers(&self) -> &[GroundTruthAnswer] {
        &self.answers
    }
}
