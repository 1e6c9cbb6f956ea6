#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The model's final grade: extraction from the reply, validation and
//! consistency checks.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    constants::{MIN_FEEDBACK_CHARS, PLACEHOLDER_MARKERS, POINTS_EPSILON},
    reference::text_of,
    types::QuestionId,
};

/// A final grade as reported by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Verdict {
    /// Question the model believes it graded.
    #[serde(default, alias = "question_number")]
    pub question_id:      Option<QuestionId>,
    /// Points awarded, before clamping.
    pub points_earned:    f64,
    /// Whether the answer is correct.
    pub is_correct:       bool,
    /// Explanation of the grade.
    pub feedback:         String,
    /// Dataset rows and facts cited.
    #[serde(default, alias = "data_references")]
    pub evidence:         Vec<String>,
    /// Points per rubric criterion.
    #[serde(default)]
    pub points_breakdown: BTreeMap<String, f64>,
    /// The verified correct answer.
    #[serde(default)]
    pub correct_answer:   Option<Value>,
    /// Category of the mistake.
    #[serde(default)]
    pub error_type:       Option<String>,
    /// Mistakes found.
    #[serde(default)]
    pub specific_errors:  Vec<String>,
    /// Things the student got right.
    #[serde(default)]
    pub what_was_correct: Vec<String>,
}

impl Verdict {
    /// Parses a verdict from a model reply. The JSON object may stand alone,
    /// sit inside a Markdown code fence, or follow some reasoning text.
    pub fn parse(reply: &str) -> Result<Self, String> {
        let json = extract_json(reply).ok_or_else(|| "the reply contains no JSON object".to_string())?;
        serde_json::from_str(json).map_err(|e| format!("the JSON grade is not valid: {e}"))
    }

    /// Checks the verdict against the output rules; returns every problem
    /// found, or nothing when the verdict is acceptable.
    pub fn problems(&self, expected: &QuestionId) -> Vec<String> {
        let mut problems = Vec::new();

        if let Some(id) = &self.question_id
            && id != expected
        {
            problems.push(format!("the grade names question {id}, but {expected} is being graded"));
        }
        if !self.points_earned.is_finite() {
            problems.push("points_earned must be a finite number".to_string());
        }
        if self.feedback.trim().chars().count() < MIN_FEEDBACK_CHARS {
            problems.push(format!("feedback must be at least {MIN_FEEDBACK_CHARS} characters long"));
        }
        let lowered = self.feedback.to_lowercase();
        if let Some(marker) = PLACEHOLDER_MARKERS.iter().find(|m| lowered.contains(*m)) {
            problems.push(format!("feedback contains placeholder text (`{marker}`)"));
        }
        if !self.points_breakdown.is_empty() {
            let sum = self.breakdown_sum();
            if (sum - self.points_earned).abs() > POINTS_EPSILON {
                problems.push(format!(
                    "points_breakdown sums to {sum:.2} but points_earned is {:.2}",
                    self.points_earned
                ));
            }
        }

        problems
    }

    /// Soft inconsistencies worth logging but not worth a re-prompt.
    pub fn consistency_warnings(&self, max_points: f64) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.is_correct && max_points > 0.0 && self.points_earned < 0.8 * max_points {
            warnings.push(format!(
                "marked correct but awarded only {:.2}/{max_points:.2}",
                self.points_earned
            ));
        }
        if !self.is_correct && self.specific_errors.is_empty() {
            warnings.push("marked incorrect without listing specific errors".to_string());
        }
        if self.points_earned == 0.0 && self.breakdown_sum() > 0.0 {
            warnings.push("zero points awarded but the breakdown is non-zero".to_string());
        }
        warnings
    }

    /// The correct answer the model quoted, as text.
    pub fn correct_answer_text(&self) -> Option<String> {
        self.correct_answer.as_ref().map(text_of)
    }

    /// Sum of the points breakdown.
    fn breakdown_sum(&self) -> f64 {
        self.points_breakdown.values().sum()
    }
}

/// Finds the JSON object in a reply.
fn extract_json(reply: &str) -> Option<&str> {
    let fenced = reply
        .split_once("```json")
        .or_else(|| reply.split_once("```"))
        .and_then(|(_, rest)| rest.split_once("```"))
        .map(|(body, _)| body.trim())
        .filter(|body| body.starts_with('{'));
    if fenced.is_some() {
        return fenced;
    }

    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A verdict that passes every rule for `Q1`.
    const GOOD: &str = r#"{
        "question_id": "Q1",
        "points_earned": 8,
        "is_correct": true,
        "points_breakdown": {"correct answer": 6, "showing work": 2, "interpretation": 0},
        "feedback": "Correct total, but the interpretation is missing.",
        "data_references": ["ecommerce_sales.csv:ORD020"]
    }"#;

    #[test]
    fn parses_fenced_and_bare_json() {
        let fenced = format!("Let me check.\n```json\n{GOOD}\n```\nDone.");
        let bare = format!("Reasoning first. {GOOD}");

        for reply in [fenced.as_str(), bare.as_str(), GOOD] {
            let verdict = Verdict::parse(reply).unwrap();
            assert_eq!(verdict.points_earned, 8.0);
            assert_eq!(verdict.evidence, vec!["ecommerce_sales.csv:ORD020"]);
        }
    }

    #[test]
    fn good_verdict_has_no_problems() {
        let verdict = Verdict::parse(GOOD).unwrap();
        assert!(verdict.problems(&QuestionId::new("Q1")).is_empty());
        assert!(verdict.consistency_warnings(10.0).is_empty());
    }

    #[test]
    fn every_output_rule_is_reported() {
        let verdict = Verdict::parse(
            r#"{"question_number": 2, "points_earned": 5, "is_correct": false,
                "points_breakdown": {"a": 1}, "feedback": "TODO"}"#,
        )
        .unwrap();

        let problems = verdict.problems(&QuestionId::new("Q1"));
        assert_eq!(problems.len(), 4, "{problems:?}");
    }

    #[test]
    fn missing_fields_fail_to_parse() {
        assert!(Verdict::parse(r#"{"points_earned": 3}"#).is_err());
        assert!(Verdict::parse("no json here").is_err());
    }
}
