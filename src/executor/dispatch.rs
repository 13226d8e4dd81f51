//! Host-side tool dispatch.
//!
//! One task per request sentinel: read the request file, validate, invoke,
//! write exactly one response file. Every failure mode becomes a
//! `success: false` response surfaced back into the sandbox, where the
//! agent's code can catch it; dispatch never fails the execution itself.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::protocol::{request_path, response_path, ToolRequest, ToolResponse};
use crate::sandbox::Sandbox;

/// Service one tool request end to end.
pub async fn dispatch_request(sandbox: Arc<dyn Sandbox>, catalog: Arc<Catalog>, request_id: String) {
    let response = build_response(&sandbox, &catalog, &request_id).await;

    let payload = match serde_json::to_string(&response) {
        Ok(payload) => payload,
        Err(error) => {
            // A tool returned something serde_json cannot re-encode. Degrade
            // to an error response rather than leaving the sandbox polling.
            tracing::warn!(%request_id, %error, "tool response not serializable");
            serde_json::to_string(&ToolResponse::err(
                &request_id,
                format!("Tool response could not be serialized: {}", error),
            ))
            .expect("error responses always serialize")
        }
    };

    if let Err(error) = sandbox
        .write_file(&response_path(&request_id), &payload)
        .await
    {
        tracing::warn!(%request_id, %error, "failed to write tool response file");
    }
}

async fn build_response(
    sandbox: &Arc<dyn Sandbox>,
    catalog: &Catalog,
    request_id: &str,
) -> ToolResponse {
    let raw = match sandbox.read_file(&request_path(request_id)).await {
        Ok(raw) => raw,
        Err(error) => {
            return ToolResponse::err(
                request_id,
                format!("Failed to read tool request file: {}", error),
            );
        }
    };

    let request: ToolRequest = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(error) => {
            return ToolResponse::err(request_id, format!("Malformed tool request: {}", error));
        }
    };

    let Some(tool) = catalog.by_name(&request.tool) else {
        return ToolResponse::err(
            request_id,
            format!(
                "Unknown tool \"{}\". Available tools: {}",
                request.tool,
                catalog.names().join(", ")
            ),
        );
    };

    let failures = tool.input_schema.validate(&request.args);
    if !failures.is_empty() {
        let detail: Vec<String> = failures.iter().map(ToString::to_string).collect();
        return ToolResponse::err(
            request_id,
            format!(
                "Invalid arguments for tool \"{}\": {}",
                request.tool,
                detail.join("; ")
            ),
        );
    }

    tracing::debug!(tool = %request.tool, %request_id, "invoking tool");
    match tool.invoke(request.args).await {
        Ok(result) => ToolResponse::ok(request_id, result),
        Err(error) => ToolResponse::err(
            request_id,
            format!("Tool \"{}\" execution failed: {}", request.tool, error),
        ),
    }
}

// =============================================================================
// Tests
// =============================================================================
