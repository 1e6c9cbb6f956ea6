#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Tabular datasets and row queries.
pub mod dataset;
/// Exam definition: question prompts, datasets and point values.
pub mod exam;
/// Ground-truth answers.
pub mod ground_truth;
/// Grading rubric.
pub mod rubric;
/// Cached access to every reference document of a run.
pub mod store;

use std::collections::HashSet;

use serde_json::Value;

pub use dataset::{Aggregate, Cell, Condition, Dataset, DatasetError, QueryError, QueryOutcome, RowQuery};
pub use exam::{ExamDefinition, Question};
pub use ground_truth::{GroundTruth, GroundTruthAnswer};
pub use rubric::{Criterion, Rubric, RubricEntry};
pub use store::{DataLayout, ReferenceStore};

use crate::{error::LoadError, types::QuestionId};

/// Fails when two entries of one document share a question id.
pub(crate) fn ensure_unique<'a>(
    origin: &str,
    ids: impl IntoIterator<Item = &'a QuestionId>,
) -> Result<(), LoadError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(LoadError::schema(origin, format!("question `{id}` appears more than once")));
        }
    }
    Ok(())
}

/// Renders a free-form JSON value as prose: strings as-is, arrays one item
/// per line, everything else as JSON.
pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text_of).collect::<Vec<_>>().join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Collects a string or an array of strings into a list.
pub(crate) fn strings_of(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(text_of).filter(|s| !s.is_empty()).collect(),
        other => {
            let text = text_of(other);
            if text.is_empty() { Vec::new() } else { vec![text] }
        }
    }
}
