//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use gradewise::{
    llm::{ChatMessage, ModelTurn},
    prompts,
    reference::{DataLayout, ReferenceStore},
    types::QuestionId,
};
use serde_json::json;
use uuid::Uuid;

pub fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(path)
}

pub fn data_root() -> PathBuf {
    fixture("data")
}

pub fn sample_submission() -> PathBuf {
    fixture("submissions/sample.json")
}

pub fn store() -> Arc<ReferenceStore> {
    Arc::new(ReferenceStore::load(DataLayout::new(data_root())).expect("load fixture store"))
}

pub fn temp_root(prefix: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("gradewise-{prefix}-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

/// Copies the fixture data directory into a fresh temp directory.
pub fn temp_data_dir(prefix: &str) -> PathBuf {
    let root = temp_root(prefix);
    copy_dir(&data_root(), &root);
    root
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).expect("create dir");
    for entry in fs::read_dir(from).expect("read dir") {
        let entry = entry.expect("dir entry");
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).expect("copy file");
        }
    }
}

/// The question a conversation is about, read from its grading request.
pub fn question_of(messages: &[ChatMessage]) -> QuestionId {
    messages
        .iter()
        .find_map(|m| match m {
            ChatMessage::User(text) => prompts::question_id_in(text),
            _ => None,
        })
        .map(QuestionId::new)
        .expect("grading request names a question")
}

/// Number of tool results the model has received so far.
pub fn tool_results(messages: &[ChatMessage]) -> usize {
    messages.iter().filter(|m| matches!(m, ChatMessage::Tool { .. })).count()
}

/// Text of the most recent tool result.
pub fn last_tool_result(messages: &[ChatMessage]) -> Option<&str> {
    messages.iter().rev().find_map(|m| match m {
        ChatMessage::Tool { content, .. } => Some(content.as_str()),
        _ => None,
    })
}

/// True when the last message is a re-prompt from the grader.
pub fn was_reprompted(messages: &[ChatMessage]) -> bool {
    matches!(messages.last(), Some(ChatMessage::User(text)) if text.contains("not accepted"))
}

pub fn rubric_call(id: &QuestionId) -> ModelTurn {
    ModelTurn::call("call-rubric", "get_rubric", json!({ "question_id": id.as_str() }).to_string())
}

pub fn ground_truth_call(id: &QuestionId) -> ModelTurn {
    ModelTurn::call(
        "call-truth",
        "get_ground_truth",
        json!({ "question_id": id.as_str() }).to_string(),
    )
}

/// Query for Electronics orders placed in Q4 2024.
pub fn electronics_q4_call(aggregate: Option<&str>) -> ModelTurn {
    let mut args = json!({
        "dataset_name": "ecommerce_sales.csv",
        "filter": {
            "category": "Electronics",
            "order_date": { "gte": "2024-10-01", "lte": "2024-12-31" }
        }
    });
    if let Some(aggregate) = aggregate {
        args["aggregate"] = json!(aggregate);
        args["columns"] = json!(["total_amount"]);
    }
    ModelTurn::call("call-rows", "get_dataset_rows", args.to_string())
}

/// A verdict reply for `id`.
pub fn verdict(id: &QuestionId, points: f64, correct: bool, feedback: &str) -> ModelTurn {
    let mut body = json!({
        "question_id": id.as_str(),
        "points_earned": points,
        "is_correct": correct,
        "feedback": feedback,
    });
    if !correct {
        body["specific_errors"] = json!(["answer does not match the data"]);
    }
    ModelTurn::answer(format!("```json\n{body}\n```"))
}

/// A model that consults the rubric, the ground truth and the dataset, then
/// answers with `decide(question, conversation)`.
pub fn diligent(
    decide: impl Fn(&QuestionId, &[ChatMessage]) -> ModelTurn + Send + Sync + 'static,
) -> impl Fn(&[ChatMessage]) -> Result<ModelTurn> + Send + Sync + 'static {
    move |messages| {
        let id = question_of(messages);
        Ok(match tool_results(messages) {
            0 => rubric_call(&id),
            1 => ground_truth_call(&id),
            2 => electronics_q4_call(Some("sum")),
            _ => decide(&id, messages),
        })
    }
}
