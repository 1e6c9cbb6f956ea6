//! Tests for tool parsing and dispatch against the fixture data.

mod support;

use std::fs;

use gradewise::{
    reference::{DataLayout, ReferenceStore},
    tools::{self, ToolCall, ToolDispatcher, ToolError},
};
use serde_json::{Value, json};
use support::*;

fn parse(name: &str, arguments: Value) -> ToolCall {
    ToolCall::parse(name, &arguments.to_string(), 50).expect("valid tool call")
}

#[test]
fn every_tool_is_advertised_with_a_schema() {
    let names: Vec<&str> = tools::definitions().iter().map(|d| d.name).collect();
    assert_eq!(names, [
        tools::GET_RUBRIC,
        tools::GET_GROUND_TRUTH,
        tools::GET_DATASET_ROWS,
        tools::DESCRIBE_DATASET,
    ]);
    for definition in tools::definitions() {
        assert_eq!(definition.parameters["type"], "object", "{}", definition.name);
        assert!(!definition.description.is_empty());
    }
}

#[tokio::test]
async fn rubric_and_ground_truth_lookups() {
    let dispatcher = ToolDispatcher::new(store());

    let rubric = dispatcher
        .dispatch(&parse(tools::GET_RUBRIC, json!({ "question_number": 1 })))
        .await
        .unwrap();
    let rubric: Value = serde_json::from_str(&rubric.content).unwrap();
    assert_eq!(rubric["total_points"], 10.0);

    let truth = dispatcher
        .dispatch(&parse(tools::GET_GROUND_TRUTH, json!({ "question_id": "Q2" })))
        .await
        .unwrap();
    assert!(truth.content.contains("\"correct_answer\": 5"), "{}", truth.content);
    assert!(truth.evidence.is_empty());
}

#[tokio::test]
async fn missing_rubric_entry_is_recoverable() {
    let dispatcher = ToolDispatcher::new(store());
    let err = dispatcher
        .dispatch(&parse(tools::GET_RUBRIC, json!({ "question_id": "Q3" })))
        .await
        .unwrap_err();

    assert!(matches!(err, ToolError::NotFound(_)));
    assert_eq!(err.to_string(), "Question Q3 not found in rubric");
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn dataset_rows_carry_row_evidence() {
    let dispatcher = ToolDispatcher::new(store());
    let call = parse(
        tools::GET_DATASET_ROWS,
        json!({
            "filename": "ecommerce_sales",
            "filters": {
                "category": "Electronics",
                "order_date": { "gte": "2024-10-01", "lte": "2024-12-31" }
            },
            "columns": ["total_amount"],
            "calculate": "sum"
        }),
    );

    let output = dispatcher.dispatch(&call).await.unwrap();
    let content: Value = serde_json::from_str(&output.content).unwrap();
    assert_eq!(content["aggregates"]["total_amount"], 7398.53);
    assert_eq!(output.evidence, [
        "ecommerce_sales.csv:ORD020",
        "ecommerce_sales.csv:ORD021",
        "ecommerce_sales.csv:ORD023",
        "ecommerce_sales.csv:ORD025",
        "ecommerce_sales.csv:ORD027",
    ]);
}

#[tokio::test]
async fn describe_dataset_reports_columns() {
    let dispatcher = ToolDispatcher::new(store());
    let output = dispatcher
        .dispatch(&parse(tools::DESCRIBE_DATASET, json!({ "dataset_name": "ecommerce_sales.csv" })))
        .await
        .unwrap();
    let summary: Value = serde_json::from_str(&output.content).unwrap();

    assert_eq!(summary["row_count"], 16);
    assert_eq!(summary["columns"].as_array().map(Vec::len), Some(8));
}

#[tokio::test]
async fn query_mistakes_are_recoverable() {
    let dispatcher = ToolDispatcher::new(store());

    let unknown_dataset = dispatcher
        .dispatch(&parse(tools::DESCRIBE_DATASET, json!({ "dataset_name": "orders.csv" })))
        .await
        .unwrap_err();
    assert!(unknown_dataset.is_recoverable());
    assert!(unknown_dataset.to_string().contains("available datasets: ecommerce_sales.csv"));

    let unknown_column = dispatcher
        .dispatch(&parse(
            tools::GET_DATASET_ROWS,
            json!({ "dataset_name": "ecommerce_sales.csv", "filter": { "region": "EU" } }),
        ))
        .await
        .unwrap_err();
    assert!(matches!(unknown_column, ToolError::Query(_)));
    assert!(unknown_column.is_recoverable());
}

#[tokio::test]
async fn unreadable_dataset_is_a_read_failure() {
    let root = temp_data_dir("unreadable-dataset");
    let mut bytes = b"a,b\n".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe, b',', b'1', b'\n']);
    fs::write(root.join("datasets").join("broken.csv"), bytes).unwrap();

    let store = ReferenceStore::load(DataLayout::new(&root)).unwrap();
    let dispatcher = ToolDispatcher::new(store.into());
    let err = dispatcher
        .dispatch(&parse(tools::DESCRIBE_DATASET, json!({ "dataset_name": "broken.csv" })))
        .await
        .unwrap_err();

    assert!(matches!(err, ToolError::ReadFailure(_)));
    assert!(!err.is_recoverable());
    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
async fn large_results_list_only_the_returned_rows() {
    let root = temp_data_dir("large-dataset");
    let mut csv = String::from("order_id,region,amount\n");
    for n in 1..=3000 {
        csv.push_str(&format!("ORD{n:05},north,{}.50\n", n % 90));
    }
    fs::write(root.join("datasets").join("big.csv"), csv).unwrap();
    let dispatcher = ToolDispatcher::new(ReferenceStore::load(DataLayout::new(&root)).unwrap().into());

    let output = dispatcher
        .dispatch(&parse(
            tools::GET_DATASET_ROWS,
            json!({ "dataset_name": "big.csv", "filter": { "region": "north" }, "limit": 5 }),
        ))
        .await
        .unwrap();
    let content: Value = serde_json::from_str(&output.content).expect("complete JSON");
    assert_eq!(content["matched"], 3000);
    assert_eq!(content["rows"].as_array().map(Vec::len), Some(5));
    assert_eq!(content["row_ids"][0], "ORD00001");
    assert_eq!(content["truncated"], true);
    assert_eq!(output.evidence.len(), 5);

    let counted = dispatcher
        .dispatch(&parse(
            tools::GET_DATASET_ROWS,
            json!({ "dataset_name": "big.csv", "aggregate": "count", "limit": 3 }),
        ))
        .await
        .unwrap();
    let content: Value = serde_json::from_str(&counted.content).unwrap();
    assert_eq!(content["aggregates"]["count"], 3000.0);
    assert_eq!(counted.evidence, ["big.csv:ORD00001", "big.csv:ORD00002", "big.csv:ORD00003"]);
    let _ = fs::remove_dir_all(root);
}
