#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The tools a model may call while grading, and their dispatch against the
//! [`ReferenceStore`].
//!
//! Every tool is read-only and idempotent. Failures the model can recover
//! from (unknown tool, bad arguments, unknown dataset or column) come back as
//! [`ToolError`]s that the grading loop reports to the model; a dataset file
//! that exists but cannot be read is retried once and then surfaces as
//! [`ToolError::ReadFailure`].

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    reference::{Aggregate, Condition, DatasetError, ReferenceStore, RowQuery},
    types::QuestionId,
};

/// Name of the rubric lookup tool.
pub const GET_RUBRIC: &str = "get_rubric";
/// Name of the ground-truth lookup tool.
pub const GET_GROUND_TRUTH: &str = "get_ground_truth";
/// Name of the dataset query tool.
pub const GET_DATASET_ROWS: &str = "get_dataset_rows";
/// Name of the dataset description tool.
pub const DESCRIBE_DATASET: &str = "describe_dataset";

/// Declaration of a tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Function name.
    pub name:        &'static str,
    /// What the tool does, for the model.
    pub description: &'static str,
    /// JSON schema of the arguments.
    pub parameters:  Value,
}

/// Declarations of every grading tool.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name:        GET_RUBRIC,
            description: "Get the grading rubric for a question: point allocation, criteria, \
                          partial credit guidance and common errors to check for.",
            parameters:  json!({
                "type": "object",
                "properties": {
                    "question_id": { "type": "string", "description": "Question id, e.g. \"Q1\"" }
                },
                "required": ["question_id"]
            }),
        },
        ToolDefinition {
            name:        GET_GROUND_TRUTH,
            description: "Get the correct answer for a question together with its explanation, \
                          key points and the data that supports it.",
            parameters:  json!({
                "type": "object",
                "properties": {
                    "question_id": { "type": "string", "description": "Question id, e.g. \"Q1\"" }
                },
                "required": ["question_id"]
            }),
        },
        ToolDefinition {
            name:        GET_DATASET_ROWS,
            description: "Query a CSV dataset. `filter` maps a column to an exact value or to a \
                          range object with any of gte/lte/gt/lt (numbers, or strings such as ISO \
                          dates). Returns matching rows with their row ids, or a statistic over \
                          numeric columns when `aggregate` is set.",
            parameters:  json!({
                "type": "object",
                "properties": {
                    "dataset_name": { "type": "string", "description": "CSV file name, e.g. \"ecommerce_sales.csv\"" },
                    "filter": { "type": "object", "additionalProperties": true },
                    "columns": { "type": "array", "items": { "type": "string" } },
                    "aggregate": { "type": "string", "enum": ["count", "sum", "mean", "min", "max"] },
                    "limit": { "type": "integer", "minimum": 1 }
                },
                "required": ["dataset_name"]
            }),
        },
        ToolDefinition {
            name:        DESCRIBE_DATASET,
            description: "Describe a CSV dataset: row count, columns, inferred types, missing \
                          values and numeric ranges.",
            parameters:  json!({
                "type": "object",
                "properties": {
                    "dataset_name": { "type": "string" }
                },
                "required": ["dataset_name"]
            }),
        },
    ]
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    /// `get_rubric(question_id)`
    GetRubric {
        /// Question requested.
        question_id: QuestionId,
    },
    /// `get_ground_truth(question_id)`
    GetGroundTruth {
        /// Question requested.
        question_id: QuestionId,
    },
    /// `get_dataset_rows(dataset_name, filter?, columns?, aggregate?, limit?)`
    GetDatasetRows {
        /// Dataset requested.
        dataset_name: String,
        /// The query to run.
        query:        RowQuery,
    },
    /// `describe_dataset(dataset_name)`
    DescribeDataset {
        /// Dataset requested.
        dataset_name: String,
    },
}

/// Arguments of the question lookup tools.
#[derive(Deserialize)]
struct QuestionArgs {
    /// Question requested.
    #[serde(alias = "question_number")]
    question_id: QuestionId,
}

/// Arguments of the dataset tools.
#[derive(Deserialize)]
struct DatasetArgs {
    /// Dataset requested.
    #[serde(alias = "filename", alias = "dataset")]
    dataset_name: String,
    /// Column filters.
    #[serde(default, alias = "filters")]
    filter:       Option<BTreeMap<String, Value>>,
    /// Projection.
    #[serde(default)]
    columns:      Option<Vec<String>>,
    /// Statistic.
    #[serde(default, alias = "calculate")]
    aggregate:    Option<Aggregate>,
    /// Row cap.
    #[serde(default)]
    limit:        Option<usize>,
}

impl ToolCall {
    /// Parses a tool invocation from its name and JSON arguments.
    ///
    /// `row_limit` caps the rows a dataset query may return.
    pub fn parse(name: &str, arguments: &str, row_limit: usize) -> Result<Self, ToolError> {
        let invalid = |e: serde_json::Error| ToolError::InvalidArguments {
            tool:    name.to_string(),
            message: e.to_string(),
        };
        let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };

        match name {
            GET_RUBRIC => {
                let args: QuestionArgs = serde_json::from_str(arguments).map_err(invalid)?;
                Ok(Self::GetRubric {
                    question_id: args.question_id,
                })
            }
            GET_GROUND_TRUTH => {
                let args: QuestionArgs = serde_json::from_str(arguments).map_err(invalid)?;
                Ok(Self::GetGroundTruth {
                    question_id: args.question_id,
                })
            }
            GET_DATASET_ROWS => {
                let args: DatasetArgs = serde_json::from_str(arguments).map_err(invalid)?;
                let mut query = RowQuery::all(args.limit.unwrap_or(row_limit).clamp(1, row_limit));
                for (column, condition) in args.filter.unwrap_or_default() {
                    query = query.with_filter(column, Condition::from_json(condition));
                }
                query.columns = args.columns;
                query.aggregate = args.aggregate;
                Ok(Self::GetDatasetRows {
                    dataset_name: args.dataset_name,
                    query,
                })
            }
            DESCRIBE_DATASET => {
                let args: DatasetArgs = serde_json::from_str(arguments).map_err(invalid)?;
                Ok(Self::DescribeDataset {
                    dataset_name: args.dataset_name,
                })
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Tool name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetRubric { .. } => GET_RUBRIC,
            Self::GetGroundTruth { .. } => GET_GROUND_TRUTH,
            Self::GetDatasetRows { .. } => GET_DATASET_ROWS,
            Self::DescribeDataset { .. } => DESCRIBE_DATASET,
        }
    }
}

/// What a tool returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// JSON text handed back to the model.
    pub content:  String,
    /// Row identifiers (as `dataset:row id`) the result touched.
    pub evidence: Vec<String>,
}

/// Errors raised while running a tool.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// The model asked for a tool that does not exist.
    #[error("Unknown tool `{0}`; available tools: get_rubric, get_ground_truth, get_dataset_rows, describe_dataset")]
    UnknownTool(String),
    /// The arguments did not match the tool's schema.
    #[error("Invalid arguments for `{tool}`: {message}")]
    InvalidArguments {
        /// Tool name.
        tool:    String,
        /// What was wrong.
        message: String,
    },
    /// The requested entry or dataset does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The query referenced something the dataset lacks.
    #[error(transparent)]
    Query(#[from] crate::reference::QueryError),
    /// A dataset file could not be read, even after a retry.
    #[error("Reading dataset failed: {0}")]
    ReadFailure(String),
}

impl ToolError {
    /// Whether the model should simply be told about the failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ReadFailure(_))
    }
}

/// Runs tool calls against the reference store.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    /// Reference data shared by every question of the run.
    store: Arc<ReferenceStore>,
}

impl ToolDispatcher {
    /// Creates a dispatcher over `store`.
    pub fn new(store: Arc<ReferenceStore>) -> Self {
        Self { store }
    }

    /// Runs a tool call.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        debug!(tool = call.name(), ?call, "dispatching tool call");
        match call {
            ToolCall::GetRubric { question_id } => {
                let entry = self.store.rubric_entry(question_id).ok_or_else(|| {
                    ToolError::NotFound(format!("Question {question_id} not found in rubric"))
                })?;
                Ok(ToolOutput {
                    content:  to_json(entry),
                    evidence: Vec::new(),
                })
            }
            ToolCall::GetGroundTruth { question_id } => {
                let answer = self.store.ground_truth(question_id).ok_or_else(|| {
                    ToolError::NotFound(format!("Question {question_id} not found in ground truth"))
                })?;
                Ok(ToolOutput {
                    content:  to_json(answer),
                    evidence: Vec::new(),
                })
            }
            ToolCall::GetDatasetRows {
                dataset_name,
                query,
            } => {
                let dataset = self.dataset(dataset_name).await?;
                let outcome = dataset.query(query)?;
                let evidence = outcome
                    .row_ids
                    .iter()
                    .map(|id| format!("{}:{id}", outcome.dataset))
                    .collect();
                Ok(ToolOutput {
                    content: to_json(&outcome),
                    evidence,
                })
            }
            ToolCall::DescribeDataset { dataset_name } => {
                let dataset = self.dataset(dataset_name).await?;
                Ok(ToolOutput {
                    content:  to_json(&dataset.describe()),
                    evidence: Vec::new(),
                })
            }
        }
    }

    /// Fetches a dataset off the async runtime, retrying one read failure.
    async fn dataset(&self, name: &str) -> Result<Arc<crate::reference::Dataset>, ToolError> {
        let mut last_failure = String::new();
        for attempt in 1..=2 {
            let store = Arc::clone(&self.store);
            let requested = name.to_string();
            let result = tokio::task::spawn_blocking(move || store.dataset(&requested)).await;
            match result {
                Ok(Ok(dataset)) => return Ok(dataset),
                Ok(Err(e @ DatasetError::NotFound { .. })) => {
                    return Err(ToolError::NotFound(e.to_string()));
                }
                Ok(Err(e)) => last_failure = e.to_string(),
                Err(join) => last_failure = join.to_string(),
            }
            warn!(dataset = name, attempt, error = %last_failure, "dataset read failed");
        }
        Err(ToolError::ReadFailure(last_failure))
    }
}

/// Serializes a tool result. Every result type here serializes infallibly.
fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_arguments_accept_original_names() {
        let call = ToolCall::parse(
            GET_DATASET_ROWS,
            r#"{"filename": "sales.csv", "filters": {"category": "Books", "qty": {"gte": 2}}, "calculate": "sum"}"#,
            50,
        )
        .unwrap();

        let ToolCall::GetDatasetRows { dataset_name, query } = call else {
            panic!("wrong variant");
        };
        assert_eq!(dataset_name, "sales.csv");
        assert_eq!(query.filter.len(), 2);
        assert_eq!(query.aggregate, Some(Aggregate::Sum));
        assert!(matches!(query.filter["qty"], Condition::Range { .. }));
    }

    #[test]
    fn row_limit_is_capped() {
        let call = ToolCall::parse(GET_DATASET_ROWS, r#"{"dataset_name": "a", "limit": 500}"#, 50).unwrap();
        let ToolCall::GetDatasetRows { query, .. } = call else {
            panic!("wrong variant");
        };
        assert_eq!(query.limit, 50);
    }

    #[test]
    fn unknown_tools_and_bad_arguments_are_recoverable() {
        let unknown = ToolCall::parse("delete_everything", "{}", 50).unwrap_err();
        let bad = ToolCall::parse(GET_RUBRIC, r#"{"qid": 1}"#, 50).unwrap_err();

        assert!(matches!(unknown, ToolError::UnknownTool(_)));
        assert!(matches!(bad, ToolError::InvalidArguments { .. }));
        assert!(unknown.is_recoverable() && bad.is_recoverable());
    }
}
