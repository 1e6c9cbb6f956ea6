#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::{constants::PROMPT_TRUNCATE, types::QuestionId};

/// System message sent at the start of every grading conversation.
pub const SYSTEM_MESSAGE: &str = include_str!("prompts/system_message.md");

/// Template of the per-question grading request.
const USER_MESSAGE: &str = include_str!("prompts/user_message.md");

/// Re-prompt sent when a grade arrives before the rubric or ground truth was
/// consulted.
const EVIDENCE_REMINDER: &str = include_str!("prompts/evidence_reminder.md");

/// Re-prompt sent when a grade fails validation.
const INVALID_VERDICT: &str = include_str!("prompts/invalid_verdict.md");

/// Shortens `text` to at most `limit` characters, marking the cut.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}\n[... truncated ...]", &text[..cut]),
        None => text.to_string(),
    }
}

/// The grading request for one answer.
pub fn user_message(
    question_id: &QuestionId,
    question_text: &str,
    student_answer: &str,
    dataset: Option<&str>,
    max_points: Option<f64>,
) -> String {
    USER_MESSAGE
        .replace("{QUESTION_ID}", question_id.as_str())
        .replace(
            "{MAX_POINTS}",
            &max_points.map_or_else(|| "see rubric".to_string(), |p| format!("{p}")),
        )
        .replace("{DATASET}", dataset.unwrap_or("none specified"))
        .replace("{QUESTION_TEXT}", &truncate(question_text, PROMPT_TRUNCATE))
        .replace("{STUDENT_ANSWER}", &truncate(student_answer, PROMPT_TRUNCATE))
}

/// Reminder naming the lookups still missing for `question_id`.
pub fn evidence_reminder(question_id: &QuestionId, missing: &[&str]) -> String {
    EVIDENCE_REMINDER
        .replace("{MISSING}", &missing.join(" and "))
        .replace("{QUESTION_ID}", question_id.as_str())
}

/// Re-prompt listing why a grade was rejected.
pub fn invalid_verdict(question_id: &QuestionId, problems: &[String]) -> String {
    let problems = problems
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    INVALID_VERDICT
        .replace("{QUESTION_ID}", question_id.as_str())
        .replace("{PROBLEMS}", &problems)
}

/// Extracts the question id from a grading request, for scripted models.
pub fn question_id_in(user_message: &str) -> Option<&str> {
    user_message
        .lines()
        .find_map(|line| line.strip_prefix("Question ID: "))
        .map(str::trim)
}
