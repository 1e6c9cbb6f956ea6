#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Chat model abstraction used by the grading loop.
//!
//! The loop only ever sees [`ChatMessage`]s and [`ModelTurn`]s, so the
//! OpenAI-backed model and the deterministic [`scripted::ScriptedModel`] are
//! interchangeable.

/// OpenAI-compatible chat completion backend
pub mod openai;
/// Deterministic model driven by a script or a policy function
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use self::{openai::OpenAiModel, scripted::ScriptedModel};
use crate::tools::ToolDefinition;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    /// Identifier used to pair the call with its result.
    pub id:        String,
    /// Tool name.
    pub name:      String,
    /// Raw JSON arguments.
    pub arguments: String,
}

impl ToolInvocation {
    /// Creates an invocation.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id:        id.into(),
            name:      name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One message of a grading conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    /// Instructions for the model.
    System(String),
    /// The grading request and any re-prompts.
    User(String),
    /// A model turn, echoed back so tool results can be paired with it.
    Assistant {
        /// Text the model produced alongside its calls.
        content:    Option<String>,
        /// Tool calls the model requested.
        tool_calls: Vec<ToolInvocation>,
    },
    /// The result of one tool call.
    Tool {
        /// Id of the call this answers.
        call_id: String,
        /// Tool output or error text.
        content: String,
    },
}

/// What the model did with its turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// The model wants tool results before continuing.
    ToolCalls {
        /// Text produced alongside the calls.
        content: Option<String>,
        /// Calls to run, in order.
        calls:   Vec<ToolInvocation>,
    },
    /// The model produced a final answer.
    Final(String),
}

impl ModelTurn {
    /// A turn requesting a single tool call.
    pub fn call(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::ToolCalls {
            content: None,
            calls:   vec![ToolInvocation::new(id, name, arguments)],
        }
    }

    /// A final answer.
    pub fn answer(text: impl Into<String>) -> Self {
        Self::Final(text.into())
    }
}

/// A chat completion request.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    /// Conversation so far.
    pub messages:    &'a [ChatMessage],
    /// Tools the model may call.
    pub tools:       &'a [ToolDefinition],
    /// Sampling temperature.
    pub temperature: f32,
}

/// A language model that can take a turn in a grading conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Name of the model, for logs.
    fn name(&self) -> &str;

    /// Produces the model's next turn.
    async fn complete(&self, request: ChatRequest<'_>) -> Result<ModelTurn>;
}
