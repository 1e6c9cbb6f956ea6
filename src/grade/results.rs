#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::BTreeMap, fmt::Display};

use bon::Builder;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::types::QuestionId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Builder, Serialize, Deserialize)]
/// A struct representing a grade
pub struct Grade {
    /// The actual grade received
    #[serde(rename = "score")]
    pub grade:  f64,
    /// The maximum grade possible
    #[serde(rename = "max")]
    pub out_of: f64,
}

impl Grade {
    /// Creates a new grade -
    /// * `grade` - The actual grade received
    /// * `out_of` - The maximum grade possible
    pub fn new(grade: f64, out_of: f64) -> Self {
        Self { grade, out_of }
    }

    /// Share of the maximum that was awarded, in `[0, 1]`; zero when nothing
    /// could be earned.
    pub fn ratio(&self) -> f64 {
        if self.out_of > 0.0 {
            self.grade / self.out_of
        } else {
            0.0
        }
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}/{:.2}", self.grade, self.out_of)
    }
}

/// Whether a question was graded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GradeStatus {
    /// The model produced an accepted grade.
    #[default]
    Graded,
    /// No grade could be produced.
    Ungraded {
        /// What went wrong.
        reason: String,
    },
}

impl Display for GradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graded => f.write_str("graded"),
            Self::Ungraded { .. } => f.write_str("ungraded"),
        }
    }
}

#[derive(Tabled, Clone, Debug, Default, PartialEq, Builder, Serialize)]
#[builder(on(String, into))]
/// The outcome of grading one answer
pub struct GradeResult {
    #[tabled(rename = "Question")]
    /// * `question_id`: the question graded
    #[builder(into)]
    pub(crate) question_id:      QuestionId,
    #[tabled(rename = "Grade")]
    /// * `grade`: points awarded and available
    #[serde(flatten)]
    #[builder(default)]
    pub(crate) grade:            Grade,
    #[tabled(rename = "Correct")]
    /// * `correct`: whether the answer was judged correct
    #[builder(default)]
    pub(crate) correct:          bool,
    #[tabled(rename = "Status")]
    /// * `status`: graded, or ungraded with a reason
    #[serde(flatten)]
    #[builder(default)]
    pub(crate) status:           GradeStatus,
    #[tabled(rename = "Feedback")]
    /// * `feedback`: explanation of the grade
    pub(crate) feedback:         String,
    #[tabled(skip)]
    /// * `evidence`: dataset rows and facts the grade relies on
    #[builder(default)]
    pub(crate) evidence:         Vec<String>,
    #[tabled(skip)]
    /// * `student_answer`: the answer as shown to the grader
    #[builder(default)]
    pub(crate) student_answer:   String,
    #[tabled(skip)]
    /// * `reference_answer`: the ground-truth answer, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reference_answer: Option<String>,
    #[tabled(skip)]
    /// * `points_breakdown`: points per rubric criterion, as reported by the
    ///   model
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    pub(crate) points_breakdown: BTreeMap<String, f64>,
    #[tabled(skip)]
    /// * `error_type`: category of the student's mistake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error_type:       Option<String>,
    #[tabled(skip)]
    /// * `specific_errors`: mistakes found
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub(crate) specific_errors:  Vec<String>,
    #[tabled(skip)]
    /// * `what_was_correct`: things the student got right
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub(crate) what_was_correct: Vec<String>,
}

impl GradeResult {
    /// A result for a question that could not be graded: zero points, not
    /// correct, feedback `ungraded: <reason>`.
    pub fn ungraded(
        question_id: QuestionId,
        max_points: f64,
        reason: impl Into<String>,
        student_answer: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        Self {
            question_id,
            grade: Grade::new(0.0, max_points),
            correct: false,
            feedback: format!("ungraded: {reason}"),
            status: GradeStatus::Ungraded { reason },
            student_answer: student_answer.into(),
            ..Self::default()
        }
    }

    /// Returns the question graded.
    pub fn question_id(&self) -> &QuestionId {
        &self.question_id
    }

    /// Returns the underlying grade struct.
    pub fn grade_struct(&self) -> &Grade {
        &self.grade
    }

    /// Returns the points awarded.
    pub fn score(&self) -> f64 {
        self.grade.grade
    }

    /// Returns the points available.
    pub fn max(&self) -> f64 {
        self.grade.out_of
    }

    /// Returns whether the answer was judged correct.
    pub fn is_correct(&self) -> bool {
        self.correct
    }

    /// Returns whether the question was graded.
    pub fn is_graded(&self) -> bool {
        self.status == GradeStatus::Graded
    }

    /// Returns the grading status.
    pub fn status(&self) -> &GradeStatus {
        &self.status
    }

    /// Returns why the question is ungraded, if it is.
    pub fn ungraded_reason(&self) -> Option<&str> {
        match &self.status {
            GradeStatus::Ungraded { reason } => Some(reason),
            GradeStatus::Graded => None,
        }
    }

    /// Returns the feedback text.
    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    /// Returns the cited evidence.
    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    /// Returns the answer as shown to the grader.
    pub fn student_answer(&self) -> &str {
        &self.student_answer
    }

    /// Returns the ground-truth answer, when known.
    pub fn reference_answer(&self) -> Option<&str> {
        self.reference_answer.as_deref()
    }

    /// Returns the points breakdown reported by the model.
    pub fn points_breakdown(&self) -> &BTreeMap<String, f64> {
        &self.points_breakdown
    }

    /// Returns the mistakes found.
    pub fn specific_errors(&self) -> &[String] {
        &self.specific_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ungraded_results_serialize_flat() {
        let result = GradeResult::ungraded(QuestionId::new("Q3"), 10.0, "rubric not found", "42");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["question_id"], "Q3");
        assert_eq!(json["score"], 0.0);
        assert_eq!(json["max"], 10.0);
        assert_eq!(json["status"], "ungraded");
        assert_eq!(json["reason"], "rubric not found");
        assert_eq!(json["feedback"], "ungraded: rubric not found");
    }

    #[test]
    fn builder_fills_defaults() {
        let result = GradeResult::builder()
            .question_id("Q1")
            .grade(Grade::new(7.5, 10.0))
            .feedback("Method correct, arithmetic slip in the final sum.")
            .build();

        assert!(result.is_graded());
        assert!(!result.is_correct());
        assert_eq!(result.grade_struct().to_string(), "7.50/10.00");
    }
}
