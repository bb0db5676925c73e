#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::{json, Value};
use tau_mcp_proxy::{
    build_proxy, build_runtime_config, run_proxy_session, session_timeouts, Cli, SessionEnd,
};
use tau_snapshot::parse_page_block;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

const UPSTREAM_SCRIPT: &str = r#"dir="$1"
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$dir/received.log"
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  if [ -n "$id" ] && [ -f "$dir/response_$id.json" ]; then
    cat "$dir/response_$id.json"
  fi
done
exit 0
"#;

const SUMMARIZER_SCRIPT: &str = r#"cat >/dev/null
printf '%s\n' '- button "Checkout" [ref=e42]' '- listitem "Product 0" [ref=p0]' '+ 57 more similar items'
"#;

fn page_text() -> String {
    let rows = (0..60)
        .map(|index| format!("  - listitem \"Product {index}\" [ref=p{index}]:\n    - img \"thumbnail\""))
        .collect::<Vec<_>>()
        .join("\n");
    let favicon = "- [ERROR] Failed to load resource: 404 @ https://shop.test/favicon.ico";
    format!(
        "### Ran Playwright code\n```js\nawait page.goto('https://shop.test/cart');\n```\n### Page\n- Page URL: https://shop.test/cart\n- Page Title: Cart | Shop\n- Console: 4 errors\n### Snapshot\n```yaml\n- list \"Products\" [ref=e2]:\n{rows}\n- button \"Checkout\" [ref=e42]\n```\n### Events\n{favicon}\n{favicon}\n{favicon}\n{favicon}\n- [LOG] cart ready"
    )
}

fn write_line(path: &Path, value: Value) {
    let mut encoded = serde_json::to_string(&value).expect("encode");
    encoded.push('\n');
    std::fs::write(path, encoded).expect("write fixture");
}

fn request(id: u64, method: &str, params: Value) -> Vec<u8> {
    let mut encoded = serde_json::to_vec(&json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    }))
    .expect("encode");
    encoded.push(b'\n');
    encoded
}

fn text_response(id: u64, text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"content": [{"type": "text", "text": text}]}
    })
}

#[tokio::test]
async fn integration_proxy_session_compacts_aliases_and_preserves_order() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let dir = workspace.path();
    let upstream_script = dir.join("upstream.sh");
    let summarizer_script = dir.join("summarizer.sh");
    std::fs::write(&upstream_script, UPSTREAM_SCRIPT).expect("write upstream");
    std::fs::write(&summarizer_script, SUMMARIZER_SCRIPT).expect("write summarizer");

    write_line(
        &dir.join("response_1.json"),
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"tools": [
                {"name": "browser_click", "description": "Click", "inputSchema": {"type": "object"}},
                {"name": "browser_snapshot", "description": "Capture accessibility snapshot of the current page", "inputSchema": {"type": "object"}}
            ]}
        }),
    );
    write_line(&dir.join("response_2.json"), text_response(2, &page_text()));
    write_line(&dir.join("response_3.json"), text_response(3, &page_text()));
    write_line(
        &dir.join("response_4.json"),
        text_response(4, "### Result\nClicked \"Checkout\""),
    );

    let summarizer_command = format!("sh {}", summarizer_script.display());
    let cli = Cli::try_parse_from([
        "tau-mcp-proxy".to_string(),
        "--summarizer".to_string(),
        "command".to_string(),
        "--summarizer-command".to_string(),
        summarizer_command,
        "--summarizer-timeout-ms".to_string(),
        "10000".to_string(),
        "--".to_string(),
        "sh".to_string(),
        upstream_script.display().to_string(),
        dir.display().to_string(),
    ])
    .expect("parse cli");
    let config = build_runtime_config(&cli).expect("config");
    let proxy = Arc::new(build_proxy(&config).expect("proxy"));

    let (mut client_in, proxy_reader) = duplex(1 << 20);
    let (proxy_writer, client_out) = duplex(1 << 20);
    client_in
        .write_all(&request(1, "tools/list", json!({})))
        .await
        .expect("write");
    client_in
        .write_all(&request(
            2,
            "tools/call",
            json!({"name": "browser_navigate", "arguments": {"url": "https://shop.test/cart"}}),
        ))
        .await
        .expect("write");
    client_in
        .write_all(&request(
            3,
            "tools/call",
            json!({"name": "browser_snapshot_full", "arguments": {}}),
        ))
        .await
        .expect("write");
    client_in
        .write_all(&request(
            4,
            "tools/call",
            json!({"name": "browser_click", "arguments": {"ref": "e42"}}),
        ))
        .await
        .expect("write");
    client_in.shutdown().await.expect("close client");

    let report = tokio::time::timeout(
        Duration::from_secs(30),
        run_proxy_session(
            proxy.clone(),
            &config.upstream,
            BufReader::new(proxy_reader),
            proxy_writer,
            std::future::pending::<()>(),
            session_timeouts(&config),
        ),
    )
    .await
    .expect("session finishes")
    .expect("session");

    assert!(matches!(
        report.end,
        SessionEnd::ClientClosed | SessionEnd::UpstreamExited
    ));
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.client.lines, 4);
    assert_eq!(report.client.rewritten, 1);
    assert_eq!(report.upstream.lines, 4);
    assert_eq!(report.upstream.errors, 0);
    assert_eq!(proxy.pending_calls(), 0);

    let received = std::fs::read_to_string(dir.join("received.log")).expect("received log");
    let received = received
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("upstream json"))
        .collect::<Vec<_>>();
    assert_eq!(received.len(), 4);
    assert_eq!(received[2]["params"]["name"], "browser_snapshot");
    assert_eq!(received[3]["params"]["arguments"]["ref"], "e42");

    let mut lines = BufReader::new(client_out).lines();
    let mut responses = Vec::new();
    while let Some(line) = lines.next_line().await.expect("read client output") {
        responses.push(serde_json::from_str::<Value>(&line).expect("client json"));
    }
    let ids = responses
        .iter()
        .map(|response| response["id"].as_u64().expect("id"))
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    let tools = responses[0]["result"]["tools"].as_array().expect("tools");
    assert_eq!(tools.len(), 3);
    assert_eq!(tools[2]["name"], "browser_snapshot_full");
    assert_eq!(
        tools[1]["description"],
        "Capture accessibility snapshot of the current page"
    );

    let original = page_text();
    let compacted = responses[1]["result"]["content"][0]["text"]
        .as_str()
        .expect("compacted text");
    assert!(compacted.len() < original.len());
    assert!(compacted.contains("### Snapshot (summarized)"));
    assert!(compacted.contains("- Page URL: https://shop.test/cart"));
    assert!(compacted.contains("- Page Title: Cart | Shop"));
    assert!(compacted.contains("[ref=e42]"));
    assert!(compacted.contains("  [repeated 4 times]\n- [LOG] cart ready"));
    assert!(compacted.starts_with("### Ran Playwright code\n```js\n"));
    assert!(parse_page_block(compacted).is_none());

    assert_eq!(responses[2]["result"]["content"][0]["text"], original.as_str());
    assert_eq!(
        responses[3]["result"]["content"][0]["text"],
        "### Result\nClicked \"Checkout\""
    );
}

#[tokio::test]
async fn integration_proxy_session_turns_summarizer_failure_into_jsonrpc_error() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let dir = workspace.path();
    let upstream_script = dir.join("upstream.sh");
    std::fs::write(&upstream_script, UPSTREAM_SCRIPT).expect("write upstream");
    write_line(&dir.join("response_7.json"), text_response(7, &page_text()));

    let cli = Cli::try_parse_from([
        "tau-mcp-proxy".to_string(),
        "--summarizer".to_string(),
        "command".to_string(),
        "--summarizer-command".to_string(),
        "sh -c 'cat >/dev/null; echo quota exceeded >&2; exit 2'".to_string(),
        "--".to_string(),
        "sh".to_string(),
        upstream_script.display().to_string(),
        dir.display().to_string(),
    ])
    .expect("parse cli");
    let config = build_runtime_config(&cli).expect("config");
    let proxy = Arc::new(build_proxy(&config).expect("proxy"));

    let (mut client_in, proxy_reader) = duplex(1 << 20);
    let (proxy_writer, client_out) = duplex(1 << 20);
    client_in
        .write_all(&request(
            7,
            "tools/call",
            json!({"name": "browser_navigate", "arguments": {}}),
        ))
        .await
        .expect("write");
    client_in.shutdown().await.expect("close client");

    let report = run_proxy_session(
        proxy,
        &config.upstream,
        BufReader::new(proxy_reader),
        proxy_writer,
        std::future::pending::<()>(),
        session_timeouts(&config),
    )
    .await
    .expect("session");
    assert_eq!(report.upstream.errors, 1);

    let mut lines = BufReader::new(client_out).lines();
    let line = lines
        .next_line()
        .await
        .expect("read")
        .expect("error response");
    let response: Value = serde_json::from_str(&line).expect("json");
    assert_eq!(response["id"], 7);
    assert_eq!(response["error"]["code"], -32603);
    assert!(response["error"]["message"]
        .as_str()
        .expect("message")
        .contains("quota exceeded"));
    assert!(lines.next_line().await.expect("read").is_none());
}
