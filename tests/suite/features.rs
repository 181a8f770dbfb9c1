use std::sync::Arc;

use saga_lsp::ServerOptions;
use saga_lsp::features::{DefaultFeatureProvider, DocumentView, FeatureProvider, ProviderError};
use saga_lsp::types::{
    CodeAction, CodeLens, CompletionItem, DocumentSymbol, Hover, SemanticTokens,
};
use saga_types::{Location, Position, Range};
use serde_json::{Value, json};

use crate::common::{Client, Project};

async fn opened(text: &str) -> (Project, Client, String) {
    let project = Project::new();
    let mut client = Client::initialized(Some(&project.root)).await;
    let uri = project.uri("draft/ch1.md");
    client.open(&uri, text).await;
    client.diagnostics_for(&uri).await;
    (project, client, uri)
}

fn at(uri: &str, line: u32, character: u32) -> Value {
    json!({
        "textDocument": { "uri": uri },
        "position": { "line": line, "character": character }
    })
}

#[tokio::test]
async fn definition_resolves_the_mention_under_the_cursor() {
    let (project, mut client, uri) = opened("勇者は剣を抜いた。").await;

    let response = client.request("textDocument/definition", at(&uri, 0, 0)).await;
    assert_eq!(
        response["result"],
        json!({
            "uri": project.uri("entities/characters/hero.toml"),
            "range": {
                "start": { "line": 0, "character": 0 },
                "end": { "line": 0, "character": 0 }
            }
        })
    );

    let response = client.request("textDocument/definition", at(&uri, 0, 2)).await;
    assert_eq!(response["result"], Value::Null);

    let response = client.request("textDocument/definition", at(&uri, 0, 3)).await;
    assert_eq!(
        response["result"]["uri"],
        project.uri("entities/items/sword.toml")
    );
}

#[tokio::test]
async fn definition_follows_inline_file_references() {
    let project = Project::new();
    project.write("notes/world.md", "# 世界\n");
    let mut client = Client::initialized(Some(&project.root)).await;
    let uri = project.uri("draft/ch1.md");
    client.open(&uri, "設定は {file: \"notes/world.md\"} を参照").await;

    let response = client.request("textDocument/definition", at(&uri, 0, 10)).await;
    assert_eq!(response["result"]["uri"], project.uri("notes/world.md"));

    let response = client.request("textDocument/hover", at(&uri, 0, 10)).await;
    let value = response["result"]["contents"]["value"].as_str().unwrap();
    assert!(value.contains("**File:**"), "{value}");
    assert!(value.contains("# 世界"), "{value}");
}

#[tokio::test]
async fn hover_shows_entity_information() {
    let (_project, mut client, uri) = opened("アレンは剣を抜いた。").await;

    let response = client.request("textDocument/hover", at(&uri, 0, 1)).await;
    let result = &response["result"];
    assert_eq!(
        result["range"],
        json!({
            "start": { "line": 0, "character": 0 },
            "end": { "line": 0, "character": 3 }
        })
    );
    assert_eq!(result["contents"]["kind"], "markdown");
    let value = result["contents"]["value"].as_str().unwrap();
    assert!(value.contains("### 勇者"), "{value}");
    assert!(value.contains("90%"), "{value}");
    assert!(value.contains("辺境の村から来た若者。"), "{value}");
    assert!(value.contains("- **age**: 17"), "{value}");
    assert!(value.contains("entities/characters/hero.toml"), "{value}");

    let response = client.request("textDocument/hover", at(&uri, 0, 3)).await;
    assert_eq!(response["result"], Value::Null);
}

#[tokio::test]
async fn code_action_offers_explicit_reference() {
    let (_project, mut client, uri) = opened("勇者は剣を抜いた。").await;

    let response = client
        .request(
            "textDocument/codeAction",
            json!({
                "textDocument": { "uri": uri },
                "range": {
                    "start": { "line": 0, "character": 3 },
                    "end": { "line": 0, "character": 4 }
                },
                "context": { "diagnostics": [] }
            }),
        )
        .await;
    let actions = response["result"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    let action = &actions[0];
    assert_eq!(action["kind"], "quickfix");
    assert_eq!(action["isPreferred"], true);
    assert_eq!(
        action["edit"]["changes"][uri.as_str()],
        json!([{
            "range": {
                "start": { "line": 0, "character": 3 },
                "end": { "line": 0, "character": 4 }
            },
            "newText": "@sword"
        }])
    );
}

#[tokio::test]
async fn semantic_tokens_are_delta_encoded() {
    let (_project, mut client, uri) = opened("勇者と村で聖剣\n剣").await;

    let response = client
        .request(
            "textDocument/semanticTokens/full",
            json!({ "textDocument": { "uri": uri } }),
        )
        .await;
    // 勇者: character, high; 聖剣: item, high (the overlapping 剣 is dropped);
    // line 1 剣: same match, so same tier.
    assert_eq!(
        response["result"]["data"],
        json!([0, 0, 2, 0, 1, 0, 5, 2, 2, 1, 1, 0, 1, 2, 1])
    );

    let response = client
        .request(
            "textDocument/semanticTokens/range",
            json!({
                "textDocument": { "uri": uri },
                "range": {
                    "start": { "line": 1, "character": 0 },
                    "end": { "line": 2, "character": 0 }
                }
            }),
        )
        .await;
    assert_eq!(response["result"]["data"], json!([0, 0, 1, 2, 1]));
}

#[tokio::test]
async fn document_symbols_nest_headers_and_entities() {
    let (_project, mut client, uri) =
        opened("# 第一章\n勇者が旅立つ。\n## 村\n剣を拾った。\n# 第二章\n静かな夜。").await;

    let response = client
        .request(
            "textDocument/documentSymbol",
            json!({ "textDocument": { "uri": uri } }),
        )
        .await;
    let symbols = response["result"].as_array().unwrap();
    let names: Vec<&str> = symbols.iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["第一章", "第二章"]);

    let children: Vec<&str> = symbols[0]["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(children, vec!["勇者", "村"]);
    assert_eq!(symbols[0]["children"][1]["children"][0]["name"], "聖剣");
    assert_eq!(symbols[0]["children"][1]["children"][0]["kind"], 19);
}

#[tokio::test]
async fn completion_after_at_sign_offers_ids() {
    let (_project, mut client, uri) = opened("ここで@").await;

    let response = client.request("textDocument/completion", at(&uri, 0, 4)).await;
    let labels: Vec<&str> = response["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["@hero", "@sword"]);
    assert_eq!(response["result"][0]["insertText"], "hero");
}

#[tokio::test]
async fn code_lens_counts_mentions() {
    let (project, mut client, uri) = opened("勇者と勇者\n剣").await;

    let response = client
        .request(
            "textDocument/codeLens",
            json!({ "textDocument": { "uri": uri } }),
        )
        .await;
    let lenses = response["result"].as_array().unwrap();
    assert_eq!(lenses.len(), 2);
    assert_eq!(lenses[0]["command"]["title"], "勇者: 2 mentions");
    assert_eq!(lenses[0]["command"]["command"], "saga.revealEntity");
    assert_eq!(
        lenses[0]["command"]["arguments"][0],
        project.uri("entities/characters/hero.toml")
    );
    assert_eq!(lenses[1]["command"]["title"], "聖剣: 1 mention");
}

#[tokio::test]
async fn reveal_command_asks_client_to_show_document() {
    let (project, mut client, _uri) = opened("").await;
    let target = project.uri("entities/items/sword.toml");

    let response = client
        .request(
            "workspace/executeCommand",
            json!({ "command": "saga.revealEntity", "arguments": [target] }),
        )
        .await;
    assert_eq!(response["result"], Value::Null);

    let show = client.server_request("window/showDocument").await;
    assert_eq!(show["params"]["uri"], target);
    assert_eq!(show["params"]["takeFocus"], true);

    let response = client
        .request(
            "workspace/executeCommand",
            json!({ "command": "saga.missing" }),
        )
        .await;
    assert_eq!(response["error"]["code"], -32602);
}

/// Delegates to the built-in providers but blows up on hover.
struct PanickingHover(DefaultFeatureProvider);

impl FeatureProvider for PanickingHover {
    fn definition(
        &self,
        view: &DocumentView<'_>,
        position: Position,
    ) -> Result<Option<Location>, ProviderError> {
        self.0.definition(view, position)
    }

    fn hover(
        &self,
        _view: &DocumentView<'_>,
        _position: Position,
    ) -> Result<Option<Hover>, ProviderError> {
        panic!("hover exploded");
    }

    fn code_actions(
        &self,
        view: &DocumentView<'_>,
        range: Range,
    ) -> Result<Vec<CodeAction>, ProviderError> {
        self.0.code_actions(view, range)
    }

    fn semantic_tokens(
        &self,
        view: &DocumentView<'_>,
        range: Option<Range>,
    ) -> Result<SemanticTokens, ProviderError> {
        self.0.semantic_tokens(view, range)
    }

    fn document_symbols(
        &self,
        view: &DocumentView<'_>,
    ) -> Result<Vec<DocumentSymbol>, ProviderError> {
        self.0.document_symbols(view)
    }

    fn completion(
        &self,
        view: &DocumentView<'_>,
        position: Position,
    ) -> Result<Vec<CompletionItem>, ProviderError> {
        self.0.completion(view, position)
    }

    fn code_lens(&self, view: &DocumentView<'_>) -> Result<Vec<CodeLens>, ProviderError> {
        self.0.code_lens(view)
    }
}

#[tokio::test]
async fn panicking_provider_does_not_end_the_session() {
    let project = Project::new();
    let server = ServerOptions {
        features: Some(Arc::new(PanickingHover(DefaultFeatureProvider::new(500)))),
        ..ServerOptions::default()
    };
    let mut client = Client::initialized_server(Some(&project.root), server).await;
    let uri = project.uri("draft/ch1.md");
    client.open(&uri, "勇者は剣を抜いた。").await;
    client.diagnostics_for(&uri).await;

    let response = client.request("textDocument/hover", at(&uri, 0, 0)).await;
    assert_eq!(response["error"]["code"], -32603);

    let response = client.request("textDocument/definition", at(&uri, 0, 0)).await;
    assert_eq!(
        response["result"]["uri"],
        project.uri("entities/characters/hero.toml")
    );

    let end = client.shutdown_and_exit().await;
    assert!(end.clean);
}
