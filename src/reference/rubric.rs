#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::ensure_unique;
use crate::{
    constants::POINTS_EPSILON,
    error::{LoadError, decode_entry, document_entries, parse_json, read_document},
    types::QuestionId,
};

/// A single point-weighted grading criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// What the grader checks.
    pub description: String,
    /// Points this criterion is worth.
    pub points:      f64,
}

/// Grading criteria for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RubricEntry {
    /// Question the entry applies to.
    pub question_id:          QuestionId,
    /// Short title of the question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title:                Option<String>,
    /// Point-weighted criteria.
    pub criteria:             Vec<Criterion>,
    /// Maximum points for the question.
    pub total_points:         f64,
    /// Reference answer quoted by the rubric, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_answer:     Option<Value>,
    /// Free-form description of what earns full credit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_credit_criteria: Option<Value>,
    /// Free-form partial credit guidance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_credit:       Option<Value>,
    /// Common mistakes the grader should look for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_errors:        Option<Value>,
}

/// Rubric entry as written in the rubric document.
#[derive(Deserialize)]
struct RawEntry {
    /// Identifier.
    #[serde(alias = "question_number")]
    question_id:          QuestionId,
    /// Title.
    #[serde(default)]
    title:                Option<String>,
    /// Explicit criteria list.
    #[serde(default)]
    criteria:             Option<Vec<Criterion>>,
    /// Total points.
    #[serde(alias = "points", default)]
    total_points:         Option<f64>,
    /// Reference answer.
    #[serde(alias = "correct_answers", alias = "correct_answer", default)]
    reference_answer:     Option<Value>,
    /// Full credit description.
    #[serde(default)]
    full_credit_criteria: Option<Value>,
    /// Partial credit guidance.
    #[serde(default)]
    partial_credit:       Option<Value>,
    /// Common errors.
    #[serde(alias = "common_errors_to_check", default)]
    common_errors:        Option<Value>,
}

impl RawEntry {
    /// Validates the raw entry and derives criteria and totals.
    fn into_entry(self, origin: &str) -> Result<RubricEntry, LoadError> {
        let criteria = match self.criteria {
            Some(criteria) => criteria,
            None => derive_criteria(self.full_credit_criteria.as_ref()),
        };
        if let Some(bad) = criteria.iter().find(|c| c.points < 0.0 || !c.points.is_finite()) {
            return Err(LoadError::schema(
                origin,
                format!("question `{}`: criterion `{}` has invalid points", self.question_id, bad.description),
            ));
        }

        let criteria_sum: f64 = criteria.iter().map(|c| c.points).sum();
        let total_points = match self.total_points {
            Some(total) => total,
            None if !criteria.is_empty() => criteria_sum,
            None => {
                return Err(LoadError::schema(
                    origin,
                    format!("question `{}`: no point value", self.question_id),
                ));
            }
        };
        if total_points <= 0.0 || !total_points.is_finite() {
            return Err(LoadError::schema(
                origin,
                format!("question `{}`: total points must be positive", self.question_id),
            ));
        }
        if !criteria.is_empty() && (criteria_sum - total_points).abs() > POINTS_EPSILON {
            warn!(
                question = %self.question_id,
                criteria_sum,
                total_points,
                "rubric criteria do not add up to the question total"
            );
        }

        Ok(RubricEntry {
            question_id: self.question_id,
            title: self.title,
            criteria,
            total_points,
            reference_answer: self.reference_answer,
            full_credit_criteria: self.full_credit_criteria,
            partial_credit: self.partial_credit,
            common_errors: self.common_errors,
        })
    }
}

/// Turns a `{ "criterion": points, ... }` object into criteria; any other
/// shape carries no weights.
fn derive_criteria(full_credit: Option<&Value>) -> Vec<Criterion> {
    match full_credit {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, points)| {
                points.as_f64().map(|points| Criterion {
                    description: name.replace('_', " "),
                    points,
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// The grading rubric for an exam.
#[derive(Debug, Clone, Default)]
pub struct Rubric {
    /// Entries in document order.
    entries: Vec<RubricEntry>,
    /// Position of each entry by question id.
    index:   HashMap<QuestionId, usize>,
}

impl Rubric {
    /// Builds a rubric from entries.
    pub fn new(entries: Vec<RubricEntry>) -> Result<Self, LoadError> {
        ensure_unique("rubric", entries.iter().map(|e| &e.question_id))?;
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.question_id.clone(), i))
            .collect();
        Ok(Self { entries, index })
    }

    /// Reads and parses a rubric file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = read_document(path)?;
        Self::parse(&path.display().to_string(), &text)
    }

    /// Parses a rubric document: an array of entries or `{ "questions": [...] }`.
    pub fn parse(origin: &str, text: &str) -> Result<Self, LoadError> {
        let document = parse_json(origin, text)?;
        let entries = document_entries(origin, document, "questions")?
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                decode_entry::<RawEntry>(origin, "rubric entry", i, entry)?.into_entry(origin)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(entries)
    }

    /// Looks up the entry for a question.
    pub fn entry(&self, id: &QuestionId) -> Option<&RubricEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    /// All entries in document order.
    pub fn entries(&self) -> &[RubricEntry] {
        &self.entries
    }
}
