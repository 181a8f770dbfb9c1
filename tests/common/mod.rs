//! Shared test utilities and fixtures
//!
//! A [`Client`] drives one server session over an in-memory pipe; a
//! [`Project`] is a throwaway novel on disk.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use saga_lsp::{FrameReader, FrameWriter, ServerOptions, SessionEnd, TransportError};
use serde_json::{Value, json};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Client end of a running session.
pub struct Client {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    session: JoinHandle<Result<SessionEnd, TransportError>>,
    inbox: VecDeque<Value>,
    next_id: u64,
}

impl Client {
    pub fn start(options: ServerOptions) -> Self {
        let (client_io, server_io) = tokio::io::duplex(1 << 16);
        let (server_read, server_write) = tokio::io::split(server_io);
        let session = tokio::spawn(saga_lsp::serve(server_read, server_write, options));
        let (client_read, client_write) = tokio::io::split(client_io);
        Self {
            reader: FrameReader::new(client_read),
            writer: client_write,
            session,
            inbox: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Start a session and complete the handshake. Debounce delays are
    /// shortened so tests stay fast.
    pub async fn initialized(root: Option<&Path>) -> Self {
        Self::initialized_with(
            root,
            json!({ "diagnosticsDebounceMs": 20, "watchDebounceMs": 20 }),
        )
        .await
    }

    pub async fn initialized_with(root: Option<&Path>, options: Value) -> Self {
        Self::handshake(Self::start(ServerOptions::default()), root, options).await
    }

    /// Like [`Client::initialized`], with custom server collaborators.
    pub async fn initialized_server(root: Option<&Path>, server: ServerOptions) -> Self {
        Self::handshake(
            Self::start(server),
            root,
            json!({ "diagnosticsDebounceMs": 20, "watchDebounceMs": 20 }),
        )
        .await
    }

    async fn handshake(mut client: Self, root: Option<&Path>, options: Value) -> Self {
        let root_uri = root.map(file_uri);
        let response = client
            .request(
                "initialize",
                json!({ "rootUri": root_uri, "initializationOptions": options }),
            )
            .await;
        assert!(response["result"]["capabilities"].is_object(), "{response}");
        client.notify("initialized", json!({})).await;
        client
    }

    pub async fn send(&mut self, message: &Value) {
        FrameWriter::new(&mut self.writer)
            .write_frame(message)
            .await
            .expect("write frame");
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write raw bytes");
        self.writer.flush().await.expect("flush");
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(&json!({ "jsonrpc": "2.0", "method": method, "params": params }))
            .await;
    }

    /// Send a request and wait for its response, keeping anything else
    /// that arrives meanwhile.
    pub async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;
        self.response(&json!(id)).await
    }

    pub async fn response(&mut self, id: &Value) -> Value {
        self.take_matching(|m| m.get("method").is_none() && m.get("id") == Some(id))
            .await
    }

    pub async fn notification(&mut self, method: &str) -> Value {
        self.take_matching(|m| m["method"] == method && m.get("id").is_none())
            .await
    }

    /// Next server-initiated request for `method`.
    pub async fn server_request(&mut self, method: &str) -> Value {
        self.take_matching(|m| m["method"] == method && m.get("id").is_some())
            .await
    }

    /// Next `publishDiagnostics` for `uri`.
    pub async fn diagnostics_for(&mut self, uri: &str) -> Vec<Value> {
        let published = self
            .take_matching(|m| {
                m["method"] == "textDocument/publishDiagnostics" && m["params"]["uri"] == uri
            })
            .await;
        published["params"]["diagnostics"]
            .as_array()
            .cloned()
            .unwrap_or_default()
    }

    async fn take_matching(&mut self, matches: impl Fn(&Value) -> bool) -> Value {
        if let Some(index) = self.inbox.iter().position(&matches) {
            return self.inbox.remove(index).expect("index in bounds");
        }
        loop {
            let message = self.recv().await;
            if matches(&message) {
                return message;
            }
            self.inbox.push_back(message);
        }
    }

    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(RECV_TIMEOUT, self.reader.read_frame())
            .await
            .expect("timed out waiting for the server")
            .expect("read frame")
            .expect("server closed the stream")
    }

    /// Whether anything arrives within `wait`.
    pub async fn is_quiet_for(&mut self, wait: Duration) -> bool {
        self.inbox.is_empty()
            && tokio::time::timeout(wait, self.reader.read_frame())
                .await
                .is_err()
    }

    pub async fn open(&mut self, uri: &str, text: &str) {
        self.notify(
            "textDocument/didOpen",
            json!({ "textDocument": {
                "uri": uri,
                "languageId": "markdown",
                "version": 1,
                "text": text,
            }}),
        )
        .await;
    }

    pub async fn shutdown_and_exit(mut self) -> SessionEnd {
        let response = self.request("shutdown", Value::Null).await;
        assert_eq!(response["result"], Value::Null);
        self.notify("exit", Value::Null).await;
        self.finish().await.expect("session result")
    }

    /// Wait for the server task to end.
    pub async fn finish(self) -> Result<SessionEnd, TransportError> {
        tokio::time::timeout(RECV_TIMEOUT, self.session)
            .await
            .expect("session did not end")
            .expect("session task panicked")
    }

    /// Close the client's write side.
    pub async fn close_input(&mut self) {
        self.writer.shutdown().await.expect("shutdown writer");
    }
}

pub fn file_uri(path: &Path) -> String {
    url::Url::from_file_path(path)
        .expect("absolute path")
        .to_string()
}

/// A novel project on disk with a root marker and a few entities.
pub struct Project {
    _dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("novel");
        let project = Self { _dir: dir, root };
        project.write("saga.toml", "");
        project.write(
            "entities/characters/hero.toml",
            "id = \"hero\"\nname = \"勇者\"\ndisplay_names = [\"アレン\"]\nsummary = \"辺境の村から来た若者。\"\n\n[details]\nage = 17\n",
        );
        project.write(
            "entities/items/sword.toml",
            "id = \"sword\"\nname = \"聖剣\"\naliases = [\"剣\"]\n",
        );
        project
    }

    pub fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        std::fs::write(&path, text).expect("write file");
        path
    }

    pub fn uri(&self, relative: &str) -> String {
        file_uri(&self.root.join(relative))
    }
}
