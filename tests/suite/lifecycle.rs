use std::time::Duration;

use saga_lsp::{ServerOptions, TransportError};
use serde_json::{Value, json};

use crate::common::Client;

#[tokio::test]
async fn initialize_advertises_capabilities() {
    let mut client = Client::start(ServerOptions::default());
    let response = client.request("initialize", json!({})).await;

    let result = &response["result"];
    assert_eq!(result["serverInfo"]["name"], "saga-lsp");
    let caps = &result["capabilities"];
    assert_eq!(caps["definitionProvider"], true);
    assert_eq!(caps["hoverProvider"], true);
    assert_eq!(caps["semanticTokensProvider"]["full"], true);
    assert_eq!(caps["semanticTokensProvider"]["range"], true);
    assert_eq!(
        caps["executeCommandProvider"]["commands"],
        json!(["saga.revealEntity", "saga.reloadEntities", "saga.refreshDiagnostics"])
    );

    client.notify("initialized", json!({})).await;
    let end = client.shutdown_and_exit().await;
    assert!(end.clean);
}

#[tokio::test]
async fn requests_before_initialize_are_rejected() {
    let mut client = Client::start(ServerOptions::default());
    let response = client
        .request(
            "textDocument/hover",
            json!({
                "textDocument": { "uri": "file:///a.md" },
                "position": { "line": 0, "character": 0 }
            }),
        )
        .await;
    assert_eq!(response["error"]["code"], -32002);

    // The session is still usable.
    let response = client.request("initialize", json!({})).await;
    assert!(response["result"].is_object());
}

#[tokio::test]
async fn exit_without_shutdown_is_unclean() {
    let mut client = Client::initialized(None).await;
    client.notify("exit", Value::Null).await;
    let end = client.finish().await.unwrap();
    assert!(!end.clean);
}

#[tokio::test]
async fn end_of_input_ends_the_session() {
    let mut client = Client::initialized(None).await;
    client.close_input().await;
    let end = client.finish().await.unwrap();
    assert!(!end.clean);
}

#[tokio::test]
async fn invalid_json_body_is_answered_and_session_continues() {
    let mut client = Client::initialized(None).await;
    client.send_raw(b"Content-Length: 5\r\n\r\n{oops").await;

    let error = client.recv().await;
    assert_eq!(error["error"]["code"], -32700);
    assert_eq!(error["id"], Value::Null);

    let response = client.request("textDocument/rename", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn truncated_frame_fails_the_session() {
    let mut client = Client::initialized(None).await;
    client
        .send_raw(b"Content-Length: 100\r\n\r\n{\"jsonrpc\":\"2.0\"")
        .await;
    client.close_input().await;

    let err = client.finish().await.unwrap_err();
    assert!(
        matches!(err, TransportError::Truncated { expected: 100, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn missing_content_length_fails_the_session() {
    let mut client = Client::initialized(None).await;
    client.send_raw(b"Content-Type: application/json\r\n\r\n{}").await;

    let err = client.finish().await.unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)), "{err}");
}

#[tokio::test]
async fn unimplemented_navigation_methods_return_empty() {
    let mut client = Client::initialized(None).await;
    for method in [
        "textDocument/references",
        "textDocument/documentHighlight",
        "textDocument/implementation",
        "textDocument/typeDefinition",
        "textDocument/declaration",
        "textDocument/foldingRange",
        "textDocument/documentLink",
        "textDocument/inlayHint",
    ] {
        let response = client.request(method, json!({})).await;
        assert_eq!(response["result"], json!([]), "{method}");
    }
    assert!(client.is_quiet_for(Duration::from_millis(50)).await);
}

#[tokio::test]
async fn requests_after_shutdown_are_invalid() {
    let mut client = Client::initialized(None).await;
    client.request("shutdown", Value::Null).await;
    let response = client.request("textDocument/documentSymbol", json!({})).await;
    assert_eq!(response["error"]["code"], -32600);
    client.notify("exit", Value::Null).await;
    assert!(client.finish().await.unwrap().clean);
}
