#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ensure_unique;
use crate::{
    error::{LoadError, decode_entry, parse_json, read_document},
    types::QuestionId,
};

/// A question of the exam.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    /// Question identifier.
    pub id:      QuestionId,
    /// Prompt text shown to the student.
    pub prompt:  String,
    /// Dataset the question is about, if any.
    pub dataset: Option<String>,
    /// Point value declared by the exam, if any.
    pub points:  Option<f64>,
}

/// Question as written in the exam document.
#[derive(Deserialize)]
struct RawQuestion {
    /// Identifier.
    #[serde(alias = "question_number")]
    question_id: QuestionId,
    /// Prompt text.
    #[serde(alias = "question", alias = "text", default)]
    prompt:      String,
    /// Per-question dataset override.
    #[serde(default)]
    dataset:     Option<String>,
    /// Point value.
    #[serde(default)]
    points:      Option<f64>,
}

/// Section grouping questions that share a dataset.
#[derive(Deserialize)]
struct RawSection {
    /// Dataset shared by the section's questions.
    #[serde(default)]
    dataset:   Option<String>,
    /// Questions of the section.
    #[serde(default)]
    questions: Vec<Value>,
}

/// The set of questions making up an exam.
#[derive(Debug, Clone, Default)]
pub struct ExamDefinition {
    /// Questions in document order.
    questions: Vec<Question>,
    /// Position of each question by id.
    index:     HashMap<QuestionId, usize>,
}

impl ExamDefinition {
    /// Builds an exam definition from questions.
    pub fn new(questions: Vec<Question>) -> Result<Self, LoadError> {
        ensure_unique("exam definition", questions.iter().map(|q| &q.id))?;
        let index = questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.id.clone(), i))
            .collect();
        Ok(Self { questions, index })
    }

    /// Reads and parses an exam definition file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = read_document(path)?;
        Self::parse(&path.display().to_string(), &text)
    }

    /// Parses an exam definition.
    ///
    /// The document holds either `sections`, each with a `dataset` and
    /// `questions`, or a flat `questions` array.
    pub fn parse(origin: &str, text: &str) -> Result<Self, LoadError> {
        let document = parse_json(origin, text)?;
        let Value::Object(mut map) = document else {
            return Err(LoadError::schema(origin, "expected an object with `sections` or `questions`"));
        };

        let mut sections: Vec<RawSection> = Vec::new();
        if let Some(raw) = map.remove("sections") {
            let Value::Array(raw) = raw else {
                return Err(LoadError::schema(origin, "`sections` must be an array"));
            };
            for (i, section) in raw.into_iter().enumerate() {
                sections.push(decode_entry(origin, "section", i, section)?);
            }
        }
        if let Some(raw) = map.remove("questions") {
            let Value::Array(questions) = raw else {
                return Err(LoadError::schema(origin, "`questions` must be an array"));
            };
            sections.push(RawSection {
                dataset: None,
                questions,
            });
        }
        if sections.is_empty() {
            return Err(LoadError::schema(origin, "missing required field `sections` or `questions`"));
        }

        let mut questions = Vec::new();
        for section in sections {
            for entry in section.questions {
                let raw: RawQuestion = decode_entry(origin, "question", questions.len(), entry)?;
                questions.push(Question {
                    id:      raw.question_id,
                    prompt:  raw.prompt,
                    dataset: raw.dataset.or_else(|| section.dataset.clone()),
                    points:  raw.points,
                });
            }
        }

        Self::new(questions)
    }

    /// Looks up a question by id.
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.index.get(id).map(|&i| &self.questions[i])
    }

    /// All questions in document order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}
