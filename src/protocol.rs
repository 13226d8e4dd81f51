//! Wire contract between host and sandbox.
//!
//! The duplex protocol has three channels:
//! ```text
//! ┌─────────────────────────┬──────────────────────────────────────────┐
//! │ stdout sentinel lines   │ __PTC_TOOL_REQUEST__<id>                 │
//! │ (sandbox → host)        │ __PTC_FINAL__<json>  __PTC_ERROR__<json> │
//! ├─────────────────────────┼──────────────────────────────────────────┤
//! │ request files           │ /ptc/requests/<id>.json (sandbox writes) │
//! ├─────────────────────────┼──────────────────────────────────────────┤
//! │ response files          │ /ptc/responses/<id>.json (host writes,   │
//! │                         │ sandbox reads then deletes)              │
//! └─────────────────────────┴──────────────────────────────────────────┘
//! ```
//! Sentinels are pure notifications; payloads ride in the file pair so large
//! arguments are not constrained by line length. `/ptc/cache.json` is owned
//! entirely by the in-sandbox runtime and never read by the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool request is ready; the id follows the marker on the same line.
pub const TOOL_REQUEST_SENTINEL: &str = "__PTC_TOOL_REQUEST__";
/// The program finished; the JSON-encoded result follows the marker.
pub const FINAL_SENTINEL: &str = "__PTC_FINAL__";
/// The program failed; a JSON `{"message": ...}` payload follows the marker.
pub const ERROR_SENTINEL: &str = "__PTC_ERROR__";

/// Root of the generated program and protocol files inside the sandbox.
pub const PTC_DIR: &str = "/ptc";
/// Directory of request files written by the sandbox.
pub const REQUESTS_DIR: &str = "/ptc/requests";
/// Directory of response files written by the host.
pub const RESPONSES_DIR: &str = "/ptc/responses";
/// Generated stub module.
pub const INDEX_FILE: &str = "/ptc/index.ts";
/// Generated RPC runtime module.
pub const RUNTIME_FILE: &str = "/ptc/runtime.ts";
/// Generated entry program wrapping the agent source.
pub const MAIN_FILE: &str = "/ptc/main.ts";
/// In-sandbox result cache, keyed by [`crate::cache_key::cache_key`].
pub const CACHE_FILE: &str = "/ptc/cache.json";

/// Path of the request file for a request id.
pub fn request_path(request_id: &str) -> String {
    format!("{}/{}.json", REQUESTS_DIR, request_id)
}

/// Path of the response file for a request id.
pub fn response_path(request_id: &str) -> String {
    format!("{}/{}.json", RESPONSES_DIR, request_id)
}

// =============================================================================
// Wire structures
// =============================================================================

/// A tool invocation request, produced in the sandbox and consumed on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    /// Unique per call within one execution; minted by the in-sandbox runtime
    /// as `<nonce>-<millis>-<rand>`.
    pub request_id: String,
    /// Tool name to invoke.
    pub tool: String,
    /// Arguments, validated against the tool's input schema before dispatch.
    pub args: Value,
    /// Digest computed in the sandbox; the host does not trust it.
    #[serde(default)]
    pub cache_key: String,
}

/// A tool invocation response, produced by the host and consumed in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    /// Successful response carrying the tool's result.
    pub fn ok(request_id: impl Into<String>, result: Value) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response carrying an agent-readable error message.
    pub fn err(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Payload of an `__PTC_ERROR__` sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}
