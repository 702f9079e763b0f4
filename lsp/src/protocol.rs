//! JSON-RPC message shapes for the session's method surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ContentChange, Diagnostic, DocumentId, TextDocumentItem, VersionedDocumentId};

pub(crate) const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";

/// Full-document synchronization.
pub const TEXT_DOCUMENT_SYNC_FULL: u8 = 1;

pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// A decoded client message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// Has a method and an `id`, but the id is neither an integer nor a
    /// string. Answered with `InvalidRequest` and a `null` id.
    InvalidRequest { method: String },
    /// Reply to a server-initiated request. The session never issues any,
    /// so these are only logged.
    Response { id: Option<RequestId> },
}

impl Message {
    /// Classify a raw JSON-RPC frame. Returns `None` for frames that are
    /// neither a request, a notification, nor a response.
    #[must_use]
    pub fn parse(frame: &Value) -> Option<Self> {
        let id = frame.get("id");
        let method = frame
            .get("method")
            .and_then(Value::as_str)
            .map(String::from);
        let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

        match (id, method, has_result_or_error) {
            (Some(id), Some(method), _) => match serde_json::from_value(id.clone()) {
                Ok(id) => Some(Self::Request {
                    id,
                    method,
                    params: frame.get("params").cloned(),
                }),
                Err(_) => Some(Self::InvalidRequest { method }),
            },
            (None, Some(method), _) => Some(Self::Notification {
                method,
                params: frame.get("params").cloned(),
            }),
            (id, None, true) => Some(Self::Response {
                id: id.and_then(|id| serde_json::from_value(id.clone()).ok()),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

impl ResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(method: &str, err: &serde_json::Error) -> Self {
        Self::new(
            error_codes::INVALID_PARAMS,
            format!("Invalid params for {method}: {err}"),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_REQUEST, message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
enum ResponsePayload {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(ResponseError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    jsonrpc: &'static str,
    /// `null` when the request id could not be determined.
    id: Option<RequestId>,
    #[serde(flatten)]
    payload: ResponsePayload,
}

impl Response {
    #[must_use]
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            payload: ResponsePayload::Result(result),
        }
    }

    #[must_use]
    pub fn error(id: Option<RequestId>, error: ResponseError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(value) => Some(value),
            ResponsePayload::Error(_) => None,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> Option<i64> {
        match &self.payload {
            ResponsePayload::Result(_) => None,
            ResponsePayload::Error(e) => Some(e.code),
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

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    /// Signed on the wire; values that are not a valid pid are ignored.
    pub process_id: Option<i64>,
    #[serde(default)]
    pub root_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    pub text_document_sync: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

impl InitializeResult {
    pub(crate) fn full_sync() -> Self {
        Self {
            capabilities: ServerCapabilities {
                text_document_sync: TEXT_DOCUMENT_SYNC_FULL,
            },
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeParams {
    pub text_document: VersionedDocumentId,
    pub content_changes: Vec<ContentChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseParams {
    pub text_document: DocumentId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveParams {
    pub file_name: String,
    pub doc_path: String,
    pub resolve_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}
