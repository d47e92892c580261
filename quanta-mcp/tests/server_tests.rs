mod common;

use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use common::{Harness, MockBackend};
use quanta_config::ServerConfig;
use quanta_mcp::McpServer;

/// Feed `requests` to the server as one stdio session and collect every response line
async fn exchange(server: &McpServer, requests: &[String]) -> Vec<Value> {
    let (client, server_end) = tokio::io::duplex(1 << 16);
    let (server_read, server_write) = tokio::io::split(server_end);
    let (mut client_read, mut client_write) = tokio::io::split(client);

    let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
    let client_side = async move {
        client_write.write_all(input.as_bytes()).await.unwrap();
        client_write.shutdown().await.unwrap();
        let mut output = String::new();
        client_read.read_to_string(&mut output).await.unwrap();
        output
    };

    let (served, output) = tokio::join!(server.serve(server_read, server_write), client_side);
    served.unwrap();

    output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn by_id(responses: Vec<Value>) -> HashMap<String, Value> {
    responses
        .into_iter()
        .map(|r| (r["id"].to_string(), r))
        .collect()
}

fn request(id: u64, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

async fn server() -> (Harness, McpServer) {
    let harness = Harness::new(MockBackend::new(|method, params| {
        Ok(json!({"method": method, "echo": params}))
    }))
    .await;
    let config = ServerConfig {
        instructions: Some("Use cas for symbolic math".to_string()),
        ..Default::default()
    };
    let server = McpServer::new(harness.service.clone(), config);
    (harness, server)
}

#[tokio::test]
async fn test_initialize_negotiates_and_reports_identity() {
    let (_harness, server) = server().await;

    let responses = exchange(
        &server,
        &[
            request(
                1,
                "initialize",
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": {"name": "test-client", "version": "1.0"}
                }),
            ),
            request(2, "initialize", json!({"protocolVersion": "1.0"})),
        ],
    )
    .await;
    let responses = by_id(responses);

    let first = &responses["1"]["result"];
    assert_eq!(first["protocolVersion"], "2025-03-26");
    assert_eq!(first["serverInfo"]["name"], "quanta");
    assert_eq!(first["capabilities"]["tools"]["listChanged"], false);
    assert_eq!(first["instructions"], "Use cas for symbolic math");

    assert_eq!(responses["2"]["result"]["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_tools_list_comes_from_the_catalog() {
    let (_harness, server) = server().await;

    let responses = exchange(&server, &[request(7, "tools/list", json!({}))]).await;
    assert_eq!(responses.len(), 1);

    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let cas = tools.iter().find(|t| t["name"] == "cas").unwrap();
    let methods = cas["inputSchema"]["properties"]["method"]["enum"]
        .as_array()
        .unwrap();
    assert!(methods.contains(&json!("solve_ode")));
    assert!(tools.iter().any(|t| t["name"] == "statmech_partition"));
    // legacy names are accepted but not advertised
    assert!(!tools.iter().any(|t| t["name"] == "compute_evaluate"));
}

#[tokio::test]
async fn test_tools_call_returns_text_and_session() {
    let (harness, server) = server().await;

    let responses = exchange(
        &server,
        &[
            request(
                1,
                "tools/call",
                json!({
                    "name": "compute",
                    "arguments": {"method": "evaluate", "expr": "2+2"},
                    "session_id": "stdio-session"
                }),
            ),
            request(
                2,
                "tools/call",
                json!({"name": "compute", "arguments": {"method": "null"}}),
            ),
        ],
    )
    .await;
    let responses = by_id(responses);

    let ok = &responses["1"]["result"];
    assert_eq!(ok["isError"], false);
    assert_eq!(ok["session_id"], "stdio-session");
    assert_eq!(ok["content"][0]["type"], "text");
    let text: Value = serde_json::from_str(ok["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(text["method"], "cas_evaluate");
    assert_eq!(text["echo"], json!({"expr": "2+2"}));

    let rejected = &responses["2"]["result"];
    assert_eq!(rejected["isError"], true);
    assert_eq!(rejected["error"]["kind"], "placeholder_method");
    assert!(rejected["session_id"].as_str().unwrap().starts_with("session_"));

    let events = harness.events("stdio-session").await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_protocol_errors_use_json_rpc_codes() {
    let (_harness, server) = server().await;

    let responses = exchange(
        &server,
        &[
            "{not json".to_string(),
            request(3, "resources/list", json!({})),
            request(4, "tools/call", json!({"arguments": {}})),
            json!({"jsonrpc": "2.0", "id": 5}).to_string(),
        ],
    )
    .await;
    assert_eq!(responses.len(), 4);
    let responses = by_id(responses);

    assert_eq!(responses["null"]["error"]["code"], -32700);
    assert_eq!(responses["3"]["error"]["code"], -32601);
    assert_eq!(responses["4"]["error"]["code"], -32602);
    assert_eq!(responses["5"]["error"]["code"], -32600);
}

#[tokio::test]
async fn test_notifications_get_no_reply() {
    let (_harness, server) = server().await;

    let responses = exchange(
        &server,
        &[
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
            String::new(),
            request(9, "ping", json!({})),
        ],
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 9);
    assert_eq!(responses[0]["result"], json!({}));
    assert!(server.handler().is_initialized());
}

#[tokio::test]
async fn test_concurrent_calls_are_all_answered() {
    let (harness, server) = server().await;

    let requests: Vec<String> = (0..20)
        .map(|i| {
            request(
                i,
                "tools/call",
                json!({
                    "name": "units_convert",
                    "arguments": {"value": i},
                    "session_id": "bulk"
                }),
            )
        })
        .collect();
    let responses = by_id(exchange(&server, &requests).await);

    assert_eq!(responses.len(), 20);
    for i in 0..20 {
        let text = responses[&i.to_string()]["result"]["content"][0]["text"]
            .as_str()
            .unwrap();
        let echoed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(echoed["echo"]["value"], i);
    }
    assert_eq!(harness.backend.calls().len(), 20);
    assert_eq!(
        harness.events("bulk").await.len(),
        20
    );
}
