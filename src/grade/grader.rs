#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{info, warn};

use super::{
    results::{Grade, GradeResult},
    session::{GradingError, GradingSession, SessionOutcome},
};
use crate::{
    config::GradingSettings,
    llm::ChatModel,
    prompts,
    reference::ReferenceStore,
    submission::{Screening, StudentAnswer},
    tools::{self, ToolDefinition, ToolDispatcher},
    types::QuestionId,
};

/// Grades answers by running a [`GradingSession`] per question.
pub struct Grader {
    /// Model taking the turns.
    model:      Arc<dyn ChatModel>,
    /// Reference data.
    store:      Arc<ReferenceStore>,
    /// Tool runner over `store`.
    dispatcher: ToolDispatcher,
    /// Tools advertised to the model.
    tools:      Vec<ToolDefinition>,
    /// Budgets and sampling settings.
    settings:   GradingSettings,
}

impl Grader {
    /// Creates a grader.
    pub fn new(model: Arc<dyn ChatModel>, store: Arc<ReferenceStore>, settings: GradingSettings) -> Self {
        Self {
            model,
            dispatcher: ToolDispatcher::new(Arc::clone(&store)),
            store,
            tools: tools::definitions(),
            settings,
        }
    }

    /// Grades every answer, at most `concurrency` at a time. Results come back
    /// in submission order, one per answer.
    pub async fn grade_all(&self, answers: &[StudentAnswer]) -> Vec<GradeResult> {
        stream::iter(answers)
            .map(|answer| self.grade_answer(answer))
            .buffered(self.settings.concurrency())
            .collect()
            .await
    }

    /// Grades one answer. Never fails: anything that prevents a grade yields
    /// an ungraded result carrying the reason.
    pub async fn grade_answer(&self, answer: &StudentAnswer) -> GradeResult {
        let question_id = &answer.question_id;
        let max_points = self.max_points(question_id);
        let answer_text = answer.answer_text();

        let shown = match answer.screen() {
            Screening::Accepted(text) | Screening::Flagged(text) => text,
            Screening::Rejected(reason) => {
                warn!(question = %question_id, %reason, "answer not graded");
                return GradeResult::ungraded(question_id.clone(), max_points, reason, answer_text);
            }
        };

        info!(question = %question_id, "grading started");
        let result = match self.converse(question_id, &shown).await {
            Ok(outcome) => self.graded(question_id, max_points, answer_text, outcome),
            Err(e) => {
                warn!(question = %question_id, error = %e, "question ungraded");
                GradeResult::ungraded(question_id.clone(), max_points, e.reason(), answer_text)
            }
        };
        info!(
            question = %question_id,
            grade = %result.grade_struct(),
            status = %result.status(),
            "grading finished"
        );
        result
    }

    /// Resolves the question's references and runs its conversation under
    /// the wall-clock budget.
    async fn converse(&self, question_id: &QuestionId, answer: &str) -> Result<SessionOutcome, GradingError> {
        let question = self
            .store
            .question(question_id)
            .ok_or_else(|| GradingError::Lookup("question not found".to_string()))?;
        let rubric = self
            .store
            .rubric_entry(question_id)
            .ok_or_else(|| GradingError::Lookup("rubric not found".to_string()))?;
        if self.store.ground_truth(question_id).is_none() {
            return Err(GradingError::Lookup("ground truth not found".to_string()));
        }

        let request = prompts::user_message(
            question_id,
            &question.prompt,
            answer,
            question.dataset.as_deref(),
            Some(rubric.total_points),
        );
        let session = GradingSession::new(
            question_id.clone(),
            request,
            self.model.as_ref(),
            &self.dispatcher,
            &self.tools,
            &self.settings,
        );

        let budget = self.settings.question_timeout();
        tokio::time::timeout(budget, session.run())
            .await
            .map_err(|_| GradingError::Timeout(format!("no grade within {budget:?}")))?
    }

    /// Turns an accepted verdict into a result, clamping the points.
    fn graded(
        &self,
        question_id: &QuestionId,
        max_points: f64,
        answer_text: String,
        outcome: SessionOutcome,
    ) -> GradeResult {
        let SessionOutcome {
            verdict,
            rows_touched,
            rounds,
            rejections,
        } = outcome;

        for warning in verdict.consistency_warnings(max_points) {
            warn!(question = %question_id, %warning, "inconsistent grade");
        }
        let points = verdict.points_earned.clamp(0.0, max_points);
        if points != verdict.points_earned {
            warn!(
                question = %question_id,
                reported = verdict.points_earned,
                awarded = points,
                "points clamped to the question range"
            );
        }

        let evidence = if verdict.evidence.is_empty() {
            rows_touched
        } else {
            verdict.evidence.clone()
        };
        let reference_answer = verdict.correct_answer_text().or_else(|| {
            self.store
                .ground_truth(question_id)
                .map(|truth| truth.correct_answer_text())
        });
        info!(question = %question_id, rounds, rejections, "grade accepted");

        GradeResult::builder()
            .question_id(question_id.clone())
            .grade(Grade::new(points, max_points))
            .correct(verdict.is_correct)
            .feedback(verdict.feedback)
            .evidence(evidence)
            .student_answer(answer_text)
            .maybe_reference_answer(reference_answer)
            .points_breakdown(verdict.points_breakdown)
            .maybe_error_type(verdict.error_type)
            .specific_errors(verdict.specific_errors)
            .what_was_correct(verdict.what_was_correct)
            .build()
    }

    /// Points available for a question: the rubric total, else the exam's
    /// point value, else zero.
    fn max_points(&self, question_id: &QuestionId) -> f64 {
        self.store
            .rubric_entry(question_id)
            .map(|entry| entry.total_points)
            .or_else(|| self.store.question(question_id).and_then(|q| q.points))
            .unwrap_or(0.0)
    }
}
