use std::time::Duration;

use serde_json::json;

use crate::common::{Client, Project};

#[tokio::test]
async fn did_open_publishes_low_confidence_mentions() {
    let project = Project::new();
    let mut client = Client::initialized(Some(&project.root)).await;
    let uri = project.uri("draft/ch1.md");

    client.open(&uri, "勇者は剣を抜いた。").await;
    let diagnostics = client.diagnostics_for(&uri).await;

    // 勇者 is a full-name match and is not reported.
    assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic["severity"], 4);
    assert_eq!(diagnostic["source"], "saga");
    assert_eq!(diagnostic["code"], "low-confidence-item");
    assert_eq!(
        diagnostic["range"],
        json!({
            "start": { "line": 0, "character": 3 },
            "end": { "line": 0, "character": 4 }
        })
    );
    let message = diagnostic["message"].as_str().unwrap();
    assert!(message.contains("80%"), "{message}");
    assert!(message.contains("entities/items/sword.toml"), "{message}");
    assert_eq!(
        diagnostic["relatedInformation"][0]["location"]["uri"],
        project.uri("entities/items/sword.toml")
    );
}

#[tokio::test]
async fn rapid_changes_publish_only_the_last_set() {
    let project = Project::new();
    let mut client = Client::initialized_with(
        Some(&project.root),
        json!({ "diagnosticsDebounceMs": 200 }),
    )
    .await;
    let uri = project.uri("draft/ch1.md");
    client.open(&uri, "勇者。").await;
    assert!(client.diagnostics_for(&uri).await.is_empty());

    for (version, text) in [(2, "剣"), (3, "剣と剣"), (4, "剣と剣と剣")] {
        client
            .notify(
                "textDocument/didChange",
                json!({
                    "textDocument": { "uri": uri, "version": version },
                    "contentChanges": [{ "text": text }]
                }),
            )
            .await;
    }

    let diagnostics = client.diagnostics_for(&uri).await;
    assert_eq!(diagnostics.len(), 3);
    assert!(client.is_quiet_for(Duration::from_millis(400)).await);
}

#[tokio::test]
async fn incremental_change_is_applied_before_detection() {
    let project = Project::new();
    let mut client = Client::initialized(Some(&project.root)).await;
    let uri = project.uri("draft/ch1.md");
    client.open(&uri, "勇者は歩いた。").await;
    assert!(client.diagnostics_for(&uri).await.is_empty());

    client
        .notify(
            "textDocument/didChange",
            json!({
                "textDocument": { "uri": uri, "version": 2 },
                "contentChanges": [{
                    "range": {
                        "start": { "line": 0, "character": 3 },
                        "end": { "line": 0, "character": 4 }
                    },
                    "text": "剣を抜"
                }]
            }),
        )
        .await;

    let diagnostics = client.diagnostics_for(&uri).await;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["range"]["start"]["character"], 3);
}

#[tokio::test]
async fn did_close_clears_diagnostics() {
    let project = Project::new();
    let mut client = Client::initialized(Some(&project.root)).await;
    let uri = project.uri("draft/ch1.md");
    client.open(&uri, "剣").await;
    assert_eq!(client.diagnostics_for(&uri).await.len(), 1);

    client
        .notify("textDocument/didClose", json!({ "textDocument": { "uri": uri } }))
        .await;
    assert!(client.diagnostics_for(&uri).await.is_empty());
}

#[tokio::test]
async fn refresh_command_republishes_open_documents() {
    let project = Project::new();
    let mut client = Client::initialized(Some(&project.root)).await;
    let first = project.uri("draft/ch1.md");
    let second = project.uri("draft/ch2.md");
    client.open(&first, "剣").await;
    client.open(&second, "勇者").await;
    client.diagnostics_for(&first).await;
    client.diagnostics_for(&second).await;

    let response = client
        .request(
            "workspace/executeCommand",
            json!({ "command": "saga.refreshDiagnostics" }),
        )
        .await;
    assert!(response.get("error").is_none(), "{response}");
    assert_eq!(client.diagnostics_for(&first).await.len(), 1);
    assert!(client.diagnostics_for(&second).await.is_empty());
}

#[tokio::test]
async fn documents_outside_any_project_get_no_entity_diagnostics() {
    let mut client = Client::initialized(None).await;
    let outside = tempfile::tempdir().unwrap();
    let uri = crate::common::file_uri(&outside.path().join("notes.md"));
    client.open(&uri, "剣と聖剣").await;
    assert!(client.diagnostics_for(&uri).await.is_empty());
}
