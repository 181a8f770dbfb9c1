use saga_config::ServerSettings;
use serde_json::{Value, json};

use crate::features::{REVEAL_ENTITY_COMMAND, TOKEN_MODIFIERS, token_types};

pub const RELOAD_ENTITIES_COMMAND: &str = "saga.reloadEntities";
pub const REFRESH_DIAGNOSTICS_COMMAND: &str = "saga.refreshDiagnostics";

pub const WATCHED_FILES_REGISTRATION_ID: &str = "saga.watchedFiles";

/// Commands accepted by `workspace/executeCommand`.
pub const COMMANDS: [&str; 3] = [
    REVEAL_ENTITY_COMMAND,
    RELOAD_ENTITIES_COMMAND,
    REFRESH_DIAGNOSTICS_COMMAND,
];

/// The `initialize` result.
#[must_use]
pub fn initialize_result() -> Value {
    json!({
        "capabilities": server_capabilities(),
        "serverInfo": {
            "name": "saga-lsp",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

#[must_use]
pub fn server_capabilities() -> Value {
    json!({
        "textDocumentSync": {
            "openClose": true,
            "change": 1,
            "save": { "includeText": false },
        },
        "definitionProvider": true,
        "hoverProvider": true,
        "codeActionProvider": { "codeActionKinds": ["quickfix"] },
        "documentSymbolProvider": true,
        "semanticTokensProvider": {
            "legend": {
                "tokenTypes": token_types(),
                "tokenModifiers": TOKEN_MODIFIERS,
            },
            "full": true,
            "range": true,
        },
        "completionProvider": { "triggerCharacters": ["@"] },
        "codeLensProvider": { "resolveProvider": false },
        "executeCommandProvider": { "commands": COMMANDS },
    })
}

/// `client/registerCapability` params asking the client to report changes
/// to entity definitions and project markers.
#[must_use]
pub fn watched_files_registration(settings: &ServerSettings) -> Value {
    let mut watchers = vec![json!({ "globPattern": "**/*.toml" })];
    watchers.extend(
        settings
            .root_markers
            .iter()
            .filter(|marker| !marker.ends_with(".toml"))
            .map(|marker| json!({ "globPattern": format!("**/{marker}") })),
    );
    json!({
        "registrations": [{
            "id": WATCHED_FILES_REGISTRATION_ID,
            "method": "workspace/didChangeWatchedFiles",
            "registerOptions": { "watchers": watchers },
        }]
    })
}
