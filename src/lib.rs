//! # gradewise
//!
//! Grades JSON exam submissions by letting a language model consult the
//! course rubric, the ground-truth answers and the raw CSV datasets through
//! tool calls, then aggregates the per-question verdicts into a report.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Environment-derived credentials and grading settings
pub mod config;
/// Default values used throughout the crate
pub mod constants;
/// Load-time error taxonomy shared by every input document
pub mod error;
/// The tool-resolving grading loop and its result types
pub mod grade;
/// Chat model abstraction and its implementations
pub mod llm;
/// Prompt templates embedded in the binary
pub mod prompts;
/// Read-only reference data: exam definition, rubric, ground truth, datasets
pub mod reference;
/// Report aggregation and rendering
pub mod report;
/// Student submission loading and input guardrails
pub mod submission;
/// Tool declarations and dispatch against the reference store
pub mod tools;
/// Small shared types
pub mod types;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    config::GradingSettings,
    grade::Grader,
    llm::ChatModel,
    reference::{DataLayout, ReferenceStore},
    report::GradeReport,
    submission::Submission,
};

/// Grades every answer of `submission` and aggregates the results.
///
/// Question-scoped failures end up as ungraded entries in the report; this
/// function itself never fails once the inputs have been loaded.
pub async fn grade_submission(grader: &Grader, submission: &Submission) -> GradeReport {
    let results = grader.grade_all(submission.answers()).await;
    GradeReport::aggregate(submission.student_name(), submission.exam_date(), results)
}

/// Loads the submission and every reference document, grades the submission
/// and returns the report.
///
/// Malformed input files abort here, before any question is graded.
pub async fn run(
    submission_path: &Path,
    layout: DataLayout,
    model: Arc<dyn ChatModel>,
    settings: GradingSettings,
    limit: Option<usize>,
) -> Result<GradeReport> {
    let mut submission = Submission::load(submission_path)
        .with_context(|| format!("Failed to load submission {}", submission_path.display()))?;
    if let Some(limit) = limit {
        submission.truncate(limit);
    }

    let store = ReferenceStore::load(layout).context("Failed to load reference data")?;
    info!(
        student = submission.student_name(),
        questions = submission.answers().len(),
        model = model.name(),
        "grading submission"
    );

    let grader = Grader::new(model, Arc::new(store), settings);
    Ok(grade_submission(&grader, &submission).await)
}

/// Loads every input document and reports, without calling a model, the
/// answers that could not be graded and the datasets that cannot be read.
///
/// Malformed documents are errors; everything else is returned as findings.
pub fn check(submission_path: &Path, layout: DataLayout) -> Result<Vec<String>> {
    let submission = Submission::load(submission_path)
        .with_context(|| format!("Failed to load submission {}", submission_path.display()))?;
    let store = ReferenceStore::load(layout).context("Failed to load reference data")?;

    let mut findings = Vec::new();
    for answer in submission.answers() {
        let id = &answer.question_id;
        if store.question(id).is_none() {
            findings.push(format!("{id}: question not found in the exam"));
        }
        if store.rubric_entry(id).is_none() {
            findings.push(format!("{id}: rubric not found"));
        }
        if store.ground_truth(id).is_none() {
            findings.push(format!("{id}: ground truth not found"));
        }
        if let submission::Screening::Rejected(reason) = answer.screen() {
            findings.push(format!("{id}: {reason}"));
        }
    }

    let datasets: std::collections::BTreeSet<&str> = store
        .exam()
        .questions()
        .iter()
        .filter_map(|q| q.dataset.as_deref())
        .collect();
    for name in datasets {
        if let Err(e) = store.dataset(name) {
            findings.push(e.to_string());
        }
    }

    info!(
        answers = submission.answers().len(),
        findings = findings.len(),
        "input check finished"
    );
    Ok(findings)
}
