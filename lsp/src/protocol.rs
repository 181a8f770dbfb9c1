//! JSON-RPC envelope types and file URI helpers.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// JSON-RPC and protocol error codes the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerNotInitialized,
}

impl ErrorCode {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerNotInitialized => -32002,
        }
    }
}

/// A request that is answered with a JSON-RPC error. The connection
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({})", code.code())]
pub struct RequestError {
    pub code: ErrorCode,
    pub message: String,
}

impl RequestError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn server_not_initialized() -> Self {
        Self::new(ErrorCode::ServerNotInitialized, "Server not initialized")
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    fn to_json(&self) -> Value {
        serde_json::json!({
            "code": self.code.code(),
            "message": self.message,
        })
    }
}

/// Server-to-client request.
#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

pub(crate) fn success_response(id: Value, result: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub(crate) fn error_response(id: Value, error: &RequestError) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": error.to_json(),
    })
}

/// A decoded inbound frame.
#[derive(Debug)]
pub(crate) enum IncomingFrame {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// The client's answer to a server-initiated request.
    Response { id: Value },
    /// Not a valid JSON-RPC message. Carries the id when one was present.
    Invalid { id: Option<Value> },
}

pub(crate) fn parse_incoming(frame: &Value) -> IncomingFrame {
    let id = frame.get("id").filter(|id| id.is_number() || id.is_string());
    let method = frame.get("method").and_then(Value::as_str).map(String::from);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();
    let params = frame.get("params").cloned().unwrap_or(Value::Null);

    match (id, method) {
        (Some(id), Some(method)) => IncomingFrame::Request {
            id: id.clone(),
            method,
            params,
        },
        (None, Some(method)) if frame.get("id").is_none() => {
            IncomingFrame::Notification { method, params }
        }
        (Some(id), None) if has_result_or_error => IncomingFrame::Response { id: id.clone() },
        (id, _) => IncomingFrame::Invalid { id: id.cloned() },
    }
}

pub(crate) fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

pub(crate) fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
}
