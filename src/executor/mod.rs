//! Sandbox orchestrator — the single-shot execution lifecycle.
//!
//! `Client::execute` owns one execution from assembly to teardown:
//!
//! 1. Assemble the program files (failure short-circuits, no sandbox yet)
//! 2. Provision a fresh sandbox and upload the files
//! 3. Launch the entry command with streamed output
//! 4. Multiplex stdout: dispatch tool requests, stop on a terminal sentinel
//! 5. On command completion without a sentinel, classify the output
//! 6. Race everything against the host timeout
//! 7. Always kill the command and destroy the sandbox
//!
//! The host side of each execution is one `tokio::select!` loop; tool
//! dispatches run as concurrent tasks so a slow tool never stalls stdout
//! parsing.

pub mod dispatch;
pub mod stream;
mod tool;

pub use tool::executor_tool;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::assembler::{assemble, AssembledProgram};
use crate::catalog::{Catalog, ToolSpec};
use crate::protocol::{CACHE_FILE, INDEX_FILE, MAIN_FILE, RUNTIME_FILE};
use crate::sandbox::{OutputChunk, Sandbox, SandboxProvider};
use crate::types::{Error, ExecutionId, ExecutorConfig, Result};

use dispatch::dispatch_request;
use stream::{StdoutScanner, StreamEvent};

/// One request to run agent-authored code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
}

// =============================================================================
// Execution result
// =============================================================================

/// Public outcome of an execution.
///
/// Serialized as `{"success": true, "result": ...}` or
/// `{"success": false, "error": "..."}`, the same shape the agent framework
/// consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success { result: Value },
    Failure { error: String },
}

impl ExecutionResult {
    pub fn success(result: Value) -> Self {
        Self::Success { result }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            Self::Success { result } => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("result", result)?;
            }
            Self::Failure { error } => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExecutionResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            success: bool,
            #[serde(default)]
            result: Option<Value>,
            #[serde(default)]
            error: Option<String>,
        }

        let wire = Wire::deserialize(deserializer)?;
        if wire.success {
            Ok(Self::Success {
                result: wire.result.unwrap_or(Value::Null),
            })
        } else {
            let error = wire
                .error
                .ok_or_else(|| D::Error::custom("failure result is missing \"error\""))?;
            Ok(Self::Failure { error })
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// The PTC host client: a tool catalog bound to a sandbox provider.
#[derive(Clone)]
pub struct Client {
    catalog: Arc<Catalog>,
    provider: Arc<dyn SandboxProvider>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tools", &self.catalog.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client over a normalized tool catalog. Fails on duplicate or
    /// invalid tool names.
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        tools: impl IntoIterator<Item = ToolSpec>,
        config: ExecutorConfig,
    ) -> Result<Self> {
        Ok(Self {
            catalog: Arc::new(Catalog::new(tools)?),
            provider,
            config,
        })
    }

    /// The normalized catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Prompt text describing the available tools.
    pub fn catalog_text(&self) -> String {
        self.catalog.catalog_text()
    }

    /// Run one agent program to completion.
    ///
    /// Never fails at the type level: every error collapses into
    /// [`ExecutionResult::Failure`] with an agent-readable message.
    pub async fn execute(&self, request: ExecuteRequest) -> ExecutionResult {
        let execution_id = ExecutionId::new();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let start = Instant::now();
        tracing::info!(%execution_id, code_len = request.code.len(), "starting execution");

        // 1. Assemble. Failure here never creates a sandbox.
        let program = match assemble(&self.catalog, &request.code, &nonce) {
            Ok(program) => program,
            Err(error) => {
                tracing::debug!(%execution_id, %error, "assembly failed");
                return ExecutionResult::failure(error.to_string());
            }
        };

        // 2. Provision.
        let sandbox = match self.provider.create().await {
            Ok(sandbox) => sandbox,
            Err(error) => {
                tracing::warn!(%execution_id, %error, "sandbox provisioning failed");
                return sandbox_failure(error);
            }
        };

        let outcome = self.run(&sandbox, &nonce, program).await;

        // 8. Teardown always runs and never overrides the outcome.
        if let Err(error) = sandbox.kill().await {
            tracing::warn!(%execution_id, %error, "sandbox teardown failed");
        }

        tracing::info!(
            %execution_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            success = outcome.is_success(),
            "execution finished"
        );
        outcome
    }

    async fn run(
        &self,
        sandbox: &Arc<dyn Sandbox>,
        nonce: &str,
        program: AssembledProgram,
    ) -> ExecutionResult {
        // Upload program files; the empty cache completes the /ptc layout.
        let files = [
            (INDEX_FILE, program.index.as_str()),
            (RUNTIME_FILE, program.runtime.as_str()),
            (MAIN_FILE, program.main.as_str()),
            (CACHE_FILE, "{}"),
        ];
        for (path, content) in files {
            if let Err(error) = sandbox.write_file(path, content).await {
                return sandbox_failure(error);
            }
        }

        // Launch the entry program in the background.
        let (output_tx, mut output_rx) = mpsc::channel::<OutputChunk>(64);
        let command = match sandbox.start(&self.config.entry_command, output_tx).await {
            Ok(command) => command,
            Err(error) => return sandbox_failure(error),
        };

        let mut execution = Execution::new(
            Arc::clone(sandbox),
            Arc::clone(&self.catalog),
            nonce,
            self.config.max_recursion_limit,
        );

        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                // 7. Host timeout is authoritative over everything else.
                _ = &mut deadline => {
                    break ExecutionResult::failure(
                        Error::timeout(format!(
                            "Execution timed out after {}ms",
                            self.config.timeout.as_millis()
                        ))
                        .to_string(),
                    );
                }
                chunk = output_rx.recv() => match chunk {
                    Some(OutputChunk::Stdout(text)) => {
                        if let Some(result) = execution.on_stdout(&text) {
                            break result;
                        }
                    }
                    Some(OutputChunk::Stderr(text)) => execution.on_stderr(&text),
                    // Stream closed: the command is done. Flush the tail,
                    // then fall back to exit-status handling.
                    None => {
                        if let Some(result) = execution.flush() {
                            break result;
                        }
                        break execution.completion_outcome(command.wait().await);
                    }
                }
            }
        };

        // Stop in-flight dispatches and the command; stream callbacks are
        // already no-ops once the receiver is dropped.
        execution.dispatches.abort_all();
        if let Err(error) = command.kill().await {
            tracing::debug!(%error, "command kill after completion failed");
        }

        outcome
    }
}

/// Collapse a provisioning/transport error into the public failure shape
/// without double-prefixing errors that already carry the sandbox context.
fn sandbox_failure(error: Error) -> ExecutionResult {
    match error {
        e @ Error::Sandbox(_) => ExecutionResult::failure(e.to_string()),
        e => ExecutionResult::failure(format!("sandbox error: {}", e)),
    }
}

// =============================================================================
// Execution state
// =============================================================================

/// Mutable state of one live execution. Created at `execute` entry,
/// destroyed before it returns; never shared across calls.
struct Execution {
    sandbox: Arc<dyn Sandbox>,
    catalog: Arc<Catalog>,
    scanner: StdoutScanner,
    stdout: String,
    stderr: String,
    tool_calls: u32,
    max_tool_calls: u32,
    dispatches: JoinSet<()>,
}

impl Execution {
    fn new(
        sandbox: Arc<dyn Sandbox>,
        catalog: Arc<Catalog>,
        nonce: &str,
        max_tool_calls: u32,
    ) -> Self {
        Self {
            sandbox,
            catalog,
            scanner: StdoutScanner::new(nonce),
            stdout: String::new(),
            stderr: String::new(),
            tool_calls: 0,
            max_tool_calls,
            dispatches: JoinSet::new(),
        }
    }

    /// Feed a stdout chunk. Returns the final outcome once a terminal event
    /// is reached.
    fn on_stdout(&mut self, text: &str) -> Option<ExecutionResult> {
        self.stdout.push_str(text);
        let events = self.scanner.push(text);
        self.apply(events)
    }

    fn on_stderr(&mut self, text: &str) {
        self.stderr.push_str(text);
    }

    /// Flush the scanner tail after the stream ends.
    fn flush(&mut self) -> Option<ExecutionResult> {
        let events = self.scanner.finish();
        self.apply(events)
    }

    /// Apply events in arrival order. The first terminal event wins; later
    /// buffered request sentinels are discarded with it.
    fn apply(&mut self, events: Vec<StreamEvent>) -> Option<ExecutionResult> {
        for event in events {
            match event {
                StreamEvent::ToolRequest(request_id) => {
                    // Counted before dispatch so a runaway loop is cut off
                    // at the sentinel, not after N tool invocations.
                    self.tool_calls += 1;
                    if self.tool_calls > self.max_tool_calls {
                        return Some(ExecutionResult::failure(
                            Error::RecursionLimit(self.max_tool_calls).to_string(),
                        ));
                    }
                    tracing::debug!(%request_id, call = self.tool_calls, "tool request");
                    self.dispatches.spawn(dispatch_request(
                        Arc::clone(&self.sandbox),
                        Arc::clone(&self.catalog),
                        request_id,
                    ));
                }
                StreamEvent::Final(payload) => {
                    return Some(match serde_json::from_str::<Value>(&payload) {
                        Ok(result) => ExecutionResult::success(result),
                        Err(error) => ExecutionResult::failure(
                            Error::protocol(format!("malformed final result payload: {}", error))
                                .to_string(),
                        ),
                    });
                }
                StreamEvent::ErrorReport(payload) => {
                    match serde_json::from_str::<crate::protocol::ErrorPayload>(&payload) {
                        Ok(report) => return Some(ExecutionResult::failure(report.message)),
                        Err(error) => {
                            // Unparseable error payload: fall through to
                            // exit-status classification.
                            tracing::warn!(%error, "malformed error sentinel payload");
                        }
                    }
                }
            }
        }
        None
    }

    /// The command finished without a terminal sentinel.
    fn completion_outcome(&self, status: Result<i32>) -> ExecutionResult {
        match status {
            Err(error) => sandbox_failure(error),
            Ok(code) if code != 0 => {
                ExecutionResult::failure(crate::classify::classify(&self.stderr, &self.stdout))
            }
            Ok(_) => {
                let head: String = self.stdout.chars().take(1024).collect();
                ExecutionResult::failure(format!(
                    "Execution finished without emitting a result. First kilobyte of stdout: {}",
                    head
                ))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
