#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::{ChatMessage, ChatModel, ChatRequest, ModelTurn};

/// Function deciding the next turn from the conversation so far.
type Policy = Box<dyn Fn(&[ChatMessage]) -> Result<ModelTurn> + Send + Sync>;

/// How a [`ScriptedModel`] picks its turns.
enum Script {
    /// Fixed turns, handed out in order.
    Sequence(Mutex<VecDeque<ModelTurn>>),
    /// Turns computed from the conversation.
    Policy(Policy),
}

/// A deterministic model for offline runs and tests.
///
/// A sequence model hands out pre-recorded turns in order and fails once they
/// run out. A policy model computes each turn from the conversation, which
/// keeps it deterministic under concurrent questions.
pub struct ScriptedModel {
    /// Turn source.
    script: Script,
    /// Number of completions served.
    calls:  AtomicUsize,
}

impl ScriptedModel {
    /// A model replaying `turns` in order.
    pub fn sequence(turns: impl IntoIterator<Item = ModelTurn>) -> Self {
        Self {
            script: Script::Sequence(Mutex::new(turns.into_iter().collect())),
            calls:  AtomicUsize::new(0),
        }
    }

    /// A model answering with `policy(conversation)`.
    pub fn policy<F>(policy: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<ModelTurn> + Send + Sync + 'static,
    {
        Self {
            script: Script::Policy(Box::new(policy)),
            calls:  AtomicUsize::new(0),
        }
    }

    /// Number of completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<ModelTurn> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Sequence(turns) => turns
                .lock()
                .map_err(|_| anyhow!("scripted model lock poisoned"))?
                .pop_front()
                .ok_or_else(|| anyhow!("scripted model ran out of turns")),
            Script::Policy(policy) => policy(request.messages),
        }
    }
}
