#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The per-question grading conversation as an explicit state machine.
//!
//! ```text
//! AwaitingModel --tool calls--> ToolResults --results sent--> AwaitingModel
//! AwaitingModel --accepted grade--> Concluded
//! AwaitingModel --rejected grade--> AwaitingModel (re-prompted)
//! ```
//!
//! A grade is accepted only after `get_rubric` and `get_ground_truth` have
//! both returned data for the question being graded, and only when it passes
//! [`Verdict::problems`]. Tool rounds and rejections are both bounded.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::verdict::Verdict;
use crate::{
    config::GradingSettings,
    constants::PROMPT_TRUNCATE,
    llm::{ChatMessage, ChatModel, ChatRequest, ModelTurn, ToolInvocation},
    prompts,
    tools::{GET_GROUND_TRUTH, GET_RUBRIC, ToolCall, ToolDefinition, ToolDispatcher, ToolError},
    types::QuestionId,
};

/// Reasons a question ends up ungraded.
#[derive(thiserror::Error, Debug)]
pub enum GradingError {
    /// A reference entry the question needs does not exist, or a dataset
    /// could not be read.
    #[error("{0}")]
    Lookup(String),
    /// The round budget or the wall-clock budget ran out.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Every completion was rejected.
    #[error("no acceptable grade after {attempts} attempts: {last_problem}")]
    Rejected {
        /// Completions that were rejected.
        attempts:     usize,
        /// Why the last one was rejected.
        last_problem: String,
    },
    /// The model could not be reached.
    #[error("model request failed: {0}")]
    Model(String),
}

impl GradingError {
    /// Text used after `ungraded: ` in the report.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl From<ToolError> for GradingError {
    fn from(error: ToolError) -> Self {
        Self::Lookup(error.to_string())
    }
}

/// Where the conversation stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Waiting for the model's next turn.
    AwaitingModel,
    /// The model asked for these tool calls.
    ToolResults(Vec<ToolInvocation>),
    /// An accepted grade was produced.
    Concluded(Verdict),
}

/// An accepted grade and what the conversation touched to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// The accepted verdict.
    pub verdict:      Verdict,
    /// Dataset rows returned by tools, as `dataset:row id`, in first-seen order.
    pub rows_touched: Vec<String>,
    /// Tool-call rounds used.
    pub rounds:       usize,
    /// Completions rejected on the way.
    pub rejections:   usize,
}

/// The grading conversation for one answer.
pub struct GradingSession<'a> {
    /// Question being graded.
    question_id:            QuestionId,
    /// Conversation so far.
    messages:               Vec<ChatMessage>,
    /// Current state.
    state:                  SessionState,
    /// `get_rubric` returned this question's entry.
    rubric_consulted:       bool,
    /// `get_ground_truth` returned this question's answer.
    ground_truth_consulted: bool,
    /// Tool-call rounds used.
    rounds:                 usize,
    /// Completions rejected.
    rejections:             usize,
    /// Rows returned by tools, in first-seen order.
    rows_touched:           Vec<String>,
    /// Dedup set for `rows_touched`.
    seen_rows:              BTreeSet<String>,
    /// Model taking the turns.
    model:                  &'a dyn ChatModel,
    /// Tool runner.
    dispatcher:             &'a ToolDispatcher,
    /// Tools advertised to the model.
    tools:                  &'a [ToolDefinition],
    /// Budgets and sampling settings.
    settings:               &'a GradingSettings,
}

impl<'a> GradingSession<'a> {
    /// Starts a conversation with the system message and the grading request.
    pub fn new(
        question_id: QuestionId,
        request: String,
        model: &'a dyn ChatModel,
        dispatcher: &'a ToolDispatcher,
        tools: &'a [ToolDefinition],
        settings: &'a GradingSettings,
    ) -> Self {
        Self {
            question_id,
            messages: vec![
                ChatMessage::System(prompts::SYSTEM_MESSAGE.to_string()),
                ChatMessage::User(request),
            ],
            state: SessionState::AwaitingModel,
            rubric_consulted: false,
            ground_truth_consulted: false,
            rounds: 0,
            rejections: 0,
            rows_touched: Vec::new(),
            seen_rows: BTreeSet::new(),
            model,
            dispatcher,
            tools,
            settings,
        }
    }

    /// Drives the conversation until a grade is accepted or a budget runs out.
    pub async fn run(mut self) -> Result<SessionOutcome, GradingError> {
        loop {
            match std::mem::replace(&mut self.state, SessionState::AwaitingModel) {
                SessionState::AwaitingModel => self.state = self.await_model().await?,
                SessionState::ToolResults(calls) => {
                    self.run_tools(calls).await?;
                    self.state = SessionState::AwaitingModel;
                }
                SessionState::Concluded(verdict) => {
                    return Ok(SessionOutcome {
                        verdict,
                        rows_touched: self.rows_touched,
                        rounds: self.rounds,
                        rejections: self.rejections,
                    });
                }
            }
        }
    }

    /// Asks the model for its next turn and decides the next state.
    async fn await_model(&mut self) -> Result<SessionState, GradingError> {
        let request = ChatRequest {
            messages:    &self.messages,
            tools:       self.tools,
            temperature: self.settings.temperature(),
        };
        let turn = self
            .model
            .complete(request)
            .await
            .map_err(|e| GradingError::Model(format!("{e:#}")))?;

        match turn {
            ModelTurn::ToolCalls { content, calls } => {
                if self.rounds >= self.settings.max_tool_rounds() {
                    return Err(GradingError::Timeout(format!(
                        "tool-call round budget of {} exhausted",
                        self.settings.max_tool_rounds()
                    )));
                }
                self.rounds += 1;
                self.messages.push(ChatMessage::Assistant {
                    content,
                    tool_calls: calls.clone(),
                });
                Ok(SessionState::ToolResults(calls))
            }
            ModelTurn::Final(reply) => {
                self.messages.push(ChatMessage::Assistant {
                    content:    Some(reply.clone()),
                    tool_calls: Vec::new(),
                });
                self.review(&reply)
            }
        }
    }

    /// Accepts a final reply or re-prompts the model about it.
    fn review(&mut self, reply: &str) -> Result<SessionState, GradingError> {
        let mut missing = Vec::new();
        if !self.rubric_consulted {
            missing.push(GET_RUBRIC);
        }
        if !self.ground_truth_consulted {
            missing.push(GET_GROUND_TRUTH);
        }
        if !missing.is_empty() {
            let problem = format!("grade given before calling {}", missing.join(" and "));
            let reprompt = prompts::evidence_reminder(&self.question_id, &missing);
            return self.reject(problem, reprompt);
        }

        let problems = match Verdict::parse(reply) {
            Ok(verdict) => {
                let problems = verdict.problems(&self.question_id);
                if problems.is_empty() {
                    return Ok(SessionState::Concluded(verdict));
                }
                problems
            }
            Err(problem) => vec![problem],
        };
        let reprompt = prompts::invalid_verdict(&self.question_id, &problems);
        self.reject(problems.join("; "), reprompt)
    }

    /// Counts a rejection against the retry budget and re-prompts.
    fn reject(&mut self, problem: String, reprompt: String) -> Result<SessionState, GradingError> {
        self.rejections += 1;
        warn!(question = %self.question_id, attempt = self.rejections, %problem, "grade rejected");
        if self.rejections > self.settings.max_completion_retries() {
            return Err(GradingError::Rejected {
                attempts:     self.rejections,
                last_problem: problem,
            });
        }
        self.messages.push(ChatMessage::User(reprompt));
        Ok(SessionState::AwaitingModel)
    }

    /// Runs the requested tools in order and records their results.
    async fn run_tools(&mut self, calls: Vec<ToolInvocation>) -> Result<(), GradingError> {
        for invocation in calls {
            let content = match ToolCall::parse(
                &invocation.name,
                &invocation.arguments,
                self.settings.row_limit(),
            ) {
                Ok(call) => match self.dispatcher.dispatch(&call).await {
                    Ok(output) => {
                        self.note_consulted(&call);
                        for row in output.evidence {
                            if self.seen_rows.insert(row.clone()) {
                                self.rows_touched.push(row);
                            }
                        }
                        prompts::truncate(&output.content, PROMPT_TRUNCATE)
                    }
                    Err(e) if e.is_recoverable() => format!("Error: {e}"),
                    Err(e) => return Err(e.into()),
                },
                Err(e) => format!("Error: {e}"),
            };
            debug!(
                question = %self.question_id,
                tool = %invocation.name,
                round = self.rounds,
                "tool result sent"
            );
            self.messages.push(ChatMessage::Tool {
                call_id: invocation.id,
                content,
            });
        }
        Ok(())
    }

    /// Marks the rubric or ground truth as consulted when the lookup was for
    /// the question being graded.
    fn note_consulted(&mut self, call: &ToolCall) {
        match call {
            ToolCall::GetRubric { question_id } if *question_id == self.question_id => {
                self.rubric_consulted = true;
            }
            ToolCall::GetGroundTruth { question_id } if *question_id == self.question_id => {
                self.ground_truth_consulted = true;
            }
            _ => {}
        }
    }
}
