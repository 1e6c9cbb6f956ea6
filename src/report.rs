#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::Serialize;
use tabled::{
    Table,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};
use tracing::warn;

use crate::{constants::UNKNOWN_STUDENT, grade::GradeResult};

/// Letter grade for a percentage.
pub fn letter_grade(percentage: f64) -> &'static str {
    const SCALE: &[(f64, &str)] = &[
        (93.0, "A"),
        (90.0, "A-"),
        (87.0, "B+"),
        (83.0, "B"),
        (80.0, "B-"),
        (77.0, "C+"),
        (73.0, "C"),
        (70.0, "C-"),
        (60.0, "D"),
    ];
    SCALE
        .iter()
        .find(|(floor, _)| percentage >= *floor)
        .map_or("F", |(_, letter)| letter)
}

/// The graded submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeReport {
    /// Student the submission belongs to.
    pub student_name:          String,
    /// Date of the exam, empty when unknown.
    pub exam_date:             String,
    /// Points awarded across all questions.
    pub total_score:           f64,
    /// Points available across all questions.
    pub max_score:             f64,
    /// `total_score / max_score` as a percentage, rounded to two decimals.
    pub percentage:            f64,
    /// Letter grade for `percentage`.
    pub letter_grade:          String,
    /// Questions that received a grade.
    pub graded:                usize,
    /// Questions that could not be graded.
    pub ungraded:              usize,
    /// Questions answered correctly.
    pub correct:               usize,
    /// Questions scored at 80% or more.
    pub strengths:             Vec<String>,
    /// Questions scored at 50% or less, and ungraded ones.
    pub areas_for_improvement: Vec<String>,
    /// One-paragraph summary.
    pub overall_feedback:      String,
    /// Per-question results in submission order.
    pub per_question:          Vec<GradeResult>,
}

impl GradeReport {
    /// Combines per-question results into a report. An empty result list
    /// gives a zero out of zero report.
    pub fn aggregate(student_name: &str, exam_date: &str, results: Vec<GradeResult>) -> Self {
        let (total_score, max_score) = results
            .iter()
            .fold((0f64, 0f64), |acc, r| (acc.0 + r.score(), acc.1 + r.max()));
        let percentage = if max_score > 0.0 {
            round2(total_score / max_score * 100.0)
        } else {
            0.0
        };

        let mut strengths = Vec::new();
        let mut areas_for_improvement = Vec::new();
        for result in &results {
            let ratio = result.grade_struct().ratio();
            match result.ungraded_reason() {
                Some(reason) => areas_for_improvement
                    .push(format!("{} could not be graded ({reason})", result.question_id())),
                None if ratio >= 0.8 => {
                    strengths.push(format!("Strong performance on {}", result.question_id()))
                }
                None if ratio <= 0.5 => {
                    areas_for_improvement.push(format!("Review concepts from {}", result.question_id()))
                }
                None => {}
            }
        }

        let graded = results.iter().filter(|r| r.is_graded()).count();
        let report = Self {
            student_name: if student_name.trim().is_empty() {
                UNKNOWN_STUDENT.to_string()
            } else {
                student_name.to_string()
            },
            exam_date: exam_date.to_string(),
            total_score: round2(total_score),
            max_score: round2(max_score),
            percentage,
            letter_grade: letter_grade(percentage).to_string(),
            graded,
            ungraded: results.len() - graded,
            correct: results.iter().filter(|r| r.is_correct()).count(),
            overall_feedback: overall_feedback(total_score, max_score, percentage, &areas_for_improvement),
            strengths,
            areas_for_improvement,
            per_question: results,
        };

        if let Some(warning) = report.inflation_warning() {
            warn!(student = %report.student_name, %warning, "possible grade inflation");
        }
        report
    }

    /// Flags suspiciously generous grading: an average above 95% over more
    /// than three graded questions, or more than 80% perfect scores over more
    /// than five.
    pub fn inflation_warning(&self) -> Option<String> {
        let graded: Vec<&GradeResult> = self
            .per_question
            .iter()
            .filter(|r| r.is_graded() && r.max() > 0.0)
            .collect();
        let n = graded.len() as f64;

        if graded.len() > 3 {
            let average = graded.iter().map(|r| r.grade_struct().ratio()).sum::<f64>() / n;
            if average > 0.95 {
                return Some(format!("average score {:.1}% over {} questions", average * 100.0, graded.len()));
            }
        }
        if graded.len() > 5 {
            let perfect = graded.iter().filter(|r| r.score() >= r.max()).count() as f64;
            if perfect / n > 0.8 {
                return Some(format!("{:.0}% perfect scores", perfect / n * 100.0));
            }
        }
        None
    }

    /// Renders the per-question table with totals.
    pub fn render_table(&self) -> String {
        Table::new(&self.per_question)
            .with(Panel::header(format!("Grading Overview: {}", self.student_name)))
            .with(Panel::footer(format!(
                "Total: {:.2}/{:.2} ({:.2}%, {})",
                self.total_score, self.max_score, self.percentage, self.letter_grade
            )))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(24).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(
                Modify::new(Rows::last())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
            .to_string()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Summary sentence for the report.
fn overall_feedback(total: f64, max: f64, percentage: f64, areas: &[String]) -> String {
    let verdict = if percentage >= 70.0 {
        "Good job!"
    } else {
        "Consider reviewing the material."
    };
    let focus = if areas.is_empty() {
        "maintaining your performance".to_string()
    } else {
        areas.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
    };
    format!("You scored {total:.2}/{max:.2} points ({percentage:.1}%). {verdict} Focus on: {focus}.")
}

/// Rounds to two decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
