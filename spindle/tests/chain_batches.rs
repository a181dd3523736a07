//! Tool-chain batching end to end: detection, batching, concurrent batch
//! dispatch through the MCP client.

mod init_logging;

use std::sync::Arc;

use serde_json::json;
use spindle::{
    McpClient, McpTransport, MockOracle, MockTransport, PolicyEngine, Settings, ToolChain,
    SERVER_TERMINAL,
};

async fn client_with(transport: Arc<MockTransport>) -> McpClient {
    McpClient::connect(
        transport as Arc<dyn McpTransport>,
        Arc::new(MockOracle::new("unused")),
        PolicyEngine::new(false),
        Settings::default(),
    )
    .await
    .expect("connect")
}

/// **Scenario**: "list the current directory and get system info"
/// yields one batch of two parallel-safe nodes; both dispatch and both
/// results are present when the batch returns.
#[tokio::test]
async fn parallel_batch_dispatches_together() {
    let transport = Arc::new(
        MockTransport::new()
            .with_tool("list_directory", "List files", &["path"])
            .with_tool("system_info", "System info", &[]),
    );
    transport.push_tool_result(
        "list_directory",
        json!({"success": true, "entries": ["a.txt", "b.txt"]}),
    );
    transport.push_tool_result("system_info", json!({"success": true, "os": "linux"}));
    let client = client_with(Arc::clone(&transport)).await;

    let detection = json!({
        "tool_chain": [
            {"tool": "list_directory", "arguments": {"path": "."}, "dependencies": []},
            {"tool": "system_info", "arguments": {}, "dependencies": []}
        ]
    });
    let chain = ToolChain::new(Arc::new(MockOracle::new(detection.to_string())), 5);

    let nodes = chain.detect("List the current directory and get system info").await;
    let batches = chain.optimize(nodes);
    assert_eq!(batches.len(), 1, "one batch of parallel-safe reads");
    assert_eq!(batches[0].len(), 2);

    let results = chain.execute_batch(&client, SERVER_TERMINAL, &batches[0]).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    let names: Vec<&str> = results.iter().map(|r| r.tool_name.as_str()).collect();
    assert!(names.contains(&"list_directory"));
    assert!(names.contains(&"system_info"));
    assert_eq!(transport.tool_call_count("list_directory"), 1);
    assert_eq!(transport.tool_call_count("system_info"), 1);
}

/// **Scenario**: A failing node does not cancel its batch siblings.
#[tokio::test]
async fn sibling_failure_does_not_cancel_batch() {
    let transport = Arc::new(
        MockTransport::new()
            .with_tool("list_directory", "List files", &["path"])
            .with_tool("git_status", "Git status", &[]),
    );
    transport.push_tool_result("list_directory", json!({"success": true, "entries": []}));
    transport.push_tool_result("git_status", json!({"success": false, "error": "not a repo"}));
    let client = client_with(Arc::clone(&transport)).await;

    let detection = json!({
        "tool_chain": [
            {"tool": "list_directory", "arguments": {"path": "."}, "dependencies": []},
            {"tool": "git_status", "arguments": {}, "dependencies": []}
        ]
    });
    let chain = ToolChain::new(Arc::new(MockOracle::new(detection.to_string())), 5);
    let batches = chain.optimize(chain.detect("status and listing").await);
    let results = chain.execute_batch(&client, SERVER_TERMINAL, &batches[0]).await;

    assert_eq!(results.len(), 2);
    let git = results.iter().find(|r| r.tool_name == "git_status").unwrap();
    assert!(!git.success);
    let ls = results.iter().find(|r| r.tool_name == "list_directory").unwrap();
    assert!(ls.success);
}

/// **Scenario**: Mixed chains interleave parallel batches and sequential
/// singletons in dependency order.
#[tokio::test]
async fn mixed_chain_orders_batches() {
    let detection = json!({
        "tool_chain": [
            {"tool": "list_directory", "arguments": {"path": "."}, "dependencies": []},
            {"tool": "read_file", "arguments": {"path": "a.txt"}, "dependencies": ["list_directory"]},
            {"tool": "write_file", "arguments": {"path": "out.txt", "content": "x"},
             "dependencies": ["read_file"]}
        ]
    });
    let chain = ToolChain::new(Arc::new(MockOracle::new(detection.to_string())), 5);
    let batches = chain.optimize(chain.detect("read then write").await);

    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0][0].name, "list_directory");
    assert_eq!(batches[1][0].name, "read_file");
    assert_eq!(batches[2][0].name, "write_file");
    assert!(!batches[2][0].can_run_parallel);
}
