use serde_json::{Value, json};

use crate::common::{Client, Project};

async fn watching(text: &str) -> (Project, Client, String) {
    watching_with(text, json!({ "diagnosticsDebounceMs": 20, "watchDebounceMs": 20 })).await
}

async fn watching_with(text: &str, options: Value) -> (Project, Client, String) {
    let project = Project::new();
    let mut client = Client::initialized_with(Some(&project.root), options).await;
    let uri = project.uri("draft/ch1.md");
    client.open(&uri, text).await;
    (project, client, uri)
}

async fn files_changed(client: &mut Client, changes: &[(String, u8)]) {
    let changes: Vec<_> = changes
        .iter()
        .map(|(uri, kind)| json!({ "uri": uri, "type": kind }))
        .collect();
    client
        .notify(
            "workspace/didChangeWatchedFiles",
            json!({ "changes": changes }),
        )
        .await;
}

#[tokio::test]
async fn new_entity_file_is_picked_up() {
    let (project, mut client, uri) = watching("魔導士は剣を掲げた。").await;
    assert_eq!(client.diagnostics_for(&uri).await.len(), 1);

    project.write(
        "entities/characters/mage.toml",
        "id = \"mage\"\nname = \"大魔導士\"\naliases = [\"魔導士\"]\n",
    );
    files_changed(
        &mut client,
        &[(project.uri("entities/characters/mage.toml"), 1)],
    )
    .await;

    let diagnostics = client.diagnostics_for(&uri).await;
    assert_eq!(diagnostics.len(), 2, "{diagnostics:?}");
    assert_eq!(diagnostics[0]["code"], "low-confidence-character");
    client
        .server_request("workspace/semanticTokens/refresh")
        .await;
}

#[tokio::test]
async fn deleted_entity_file_is_dropped() {
    let (project, mut client, uri) = watching("剣を抜いた。").await;
    assert_eq!(client.diagnostics_for(&uri).await.len(), 1);

    std::fs::remove_file(project.root.join("entities/items/sword.toml")).unwrap();
    files_changed(&mut client, &[(project.uri("entities/items/sword.toml"), 3)]).await;

    assert!(client.diagnostics_for(&uri).await.is_empty());
    client
        .server_request("workspace/semanticTokens/refresh")
        .await;
}

#[tokio::test]
async fn broken_entity_file_keeps_previous_entities() {
    let (project, mut client, uri) = watching("剣を抜いた。").await;
    assert_eq!(client.diagnostics_for(&uri).await.len(), 1);

    project.write("entities/items/sword.toml", "id = \"sword\"\nname = ");
    files_changed(&mut client, &[(project.uri("entities/items/sword.toml"), 2)]).await;

    assert_eq!(client.diagnostics_for(&uri).await.len(), 1);
}

#[tokio::test]
async fn burst_of_changes_is_handled_once() {
    let (project, mut client, uri) =
        watching_with("槍と剣", json!({ "watchDebounceMs": 150 })).await;
    assert_eq!(client.diagnostics_for(&uri).await.len(), 1);

    project.write(
        "entities/items/spear.toml",
        "id = \"spear\"\nname = \"長槍\"\naliases = [\"槍\"]\n",
    );
    files_changed(&mut client, &[(project.uri("entities/items/spear.toml"), 1)]).await;
    files_changed(&mut client, &[(project.uri("saga.toml"), 2)]).await;

    assert_eq!(client.diagnostics_for(&uri).await.len(), 2);
    client
        .server_request("workspace/semanticTokens/refresh")
        .await;
    assert!(
        client
            .is_quiet_for(std::time::Duration::from_millis(200))
            .await
    );
}

#[tokio::test]
async fn reload_command_rereads_every_project() {
    let (project, mut client, uri) = watching("剣を抜いた。").await;
    assert_eq!(client.diagnostics_for(&uri).await.len(), 1);

    project.write("entities/items/sword.toml", "id = \"sword\"\nname = \"剣\"\n");
    let response = client
        .request(
            "workspace/executeCommand",
            json!({ "command": "saga.reloadEntities" }),
        )
        .await;
    assert!(response.get("error").is_none(), "{response}");

    assert!(client.diagnostics_for(&uri).await.is_empty());
    client
        .server_request("workspace/semanticTokens/refresh")
        .await;
}
