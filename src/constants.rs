#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

/// Prompt truncation length for student answers and tool results.
pub const PROMPT_TRUNCATE: usize = 15000;

/// Model used when neither the CLI nor `OPENAI_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI-compatible endpoint used when `OPENAI_ENDPOINT` is unset.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Sampling temperature used when none is configured.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Maximum number of tool-call rounds a single question may use.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Number of times a rejected final grade is re-prompted before the question
/// is reported as ungraded.
pub const DEFAULT_MAX_COMPLETION_RETRIES: usize = 2;

/// Number of questions graded at the same time.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Wall-clock budget for one question's grading loop.
pub const DEFAULT_QUESTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum number of dataset rows returned by a single tool call.
pub const DEFAULT_ROW_LIMIT: usize = 50;

/// Longest answer accepted for grading, in characters.
pub const MAX_ANSWER_CHARS: usize = 5000;

/// Shortest feedback accepted from the model, in characters.
pub const MIN_FEEDBACK_CHARS: usize = 20;

/// Tolerance used when comparing point sums.
pub const POINTS_EPSILON: f64 = 0.01;

/// Phrases that mark an answer as a potential prompt injection.
pub const INJECTION_PATTERNS: &[&str] = &[
    "ignore previous instructions",
    "disregard all",
    "forget everything",
    "system:",
    "assistant:",
];

/// Markers of template text the model forgot to fill in.
pub const PLACEHOLDER_MARKERS: &[&str] = &["[insert", "todo", "fixme"];

/// Student name used when the submission does not carry one.
pub const UNKNOWN_STUDENT: &str = "Unknown Student";
