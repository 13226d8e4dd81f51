//! The executor exposed as a tool.
//!
//! Agent frameworks integrate the host by handing the model one tool,
//! `ptc_executor`, whose single argument is the program source. The tool's
//! result is the execution outcome in its public wire shape, so the model
//! sees the same `{success, result|error}` object either way.

use std::sync::Arc;

use crate::catalog::Tool;
use crate::schema::{Field, Schema};

use super::{Client, ExecuteRequest};

/// Wrap a client as the `ptc_executor` tool.
pub fn executor_tool(client: Arc<Client>) -> Tool {
    Tool::new(
        "ptc_executor",
        "Execute a program that can call the available tools and return a final value",
        Schema::object(vec![Field::required("code", Schema::String)]),
        move |args| {
            let client = Arc::clone(&client);
            async move {
                let code = args
                    .get("code")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if code.trim().is_empty() {
                    return Err("\"code\" must be a non-empty string".to_string());
                }

                let result = client
                    .execute(ExecuteRequest {
                        code: code.to_string(),
                    })
                    .await;
                serde_json::to_value(&result).map_err(|e| e.to_string())
            }
        },
    )
}
