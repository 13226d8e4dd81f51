//! In-memory stub sandbox for end-to-end tests.
//!
//! `StubSandbox` implements the provider contract over a shared file map and
//! runs a scripted program that follows the emitted runtime's protocol
//! faithfully: per-execution cache keyed by the canonical digest, request
//! files plus stdout sentinels, response polling, and terminal sentinels.
//! The execution nonce is extracted from the uploaded `/ptc/runtime.ts`, so
//! the tests exercise the real provisioning order.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use ptc_host::cache_key::cache_key;
use ptc_host::protocol::{
    request_path, response_path, ToolResponse, CACHE_FILE, ERROR_SENTINEL, FINAL_SENTINEL,
    RUNTIME_FILE, TOOL_REQUEST_SENTINEL,
};
use ptc_host::types::{Error, Result};
use ptc_host::{OutputChunk, Sandbox, SandboxCommand, SandboxProvider};

pub type CallResult = std::result::Result<Value, String>;
pub type FinalizeFn = Arc<dyn Fn(&[CallResult]) -> Value + Send + Sync>;

type FileMap = Arc<Mutex<HashMap<String, String>>>;

/// One scripted tool call.
#[derive(Clone)]
pub struct StubCall {
    pub tool: String,
    pub args: Value,
    /// When true, an error response is collected instead of aborting the
    /// program (models agent code with a try/catch around the call).
    pub catch_error: bool,
}

impl StubCall {
    pub fn new(tool: &str, args: Value) -> Self {
        Self {
            tool: tool.to_string(),
            args,
            catch_error: false,
        }
    }

    pub fn caught(tool: &str, args: Value) -> Self {
        Self {
            tool: tool.to_string(),
            args,
            catch_error: true,
        }
    }
}

/// Scripted behavior of the in-sandbox program.
#[derive(Clone)]
pub enum StubProgram {
    /// Run the calls through the tool-call protocol, then emit the final
    /// sentinel with `finalize(results)`.
    Run {
        calls: Vec<StubCall>,
        finalize: FinalizeFn,
    },
    /// Emit an error sentinel with this message and exit non-zero.
    EmitError(String),
    /// Never finish; used for host-timeout tests.
    Hang,
    /// Print some output and exit zero without any terminal sentinel.
    ExitSilently(String),
    /// Write transpiler diagnostics to stderr and exit non-zero.
    CompileFail(String),
}

impl StubProgram {
    /// Program that makes no calls and returns a fixed value.
    pub fn finish(value: Value) -> Self {
        StubProgram::Run {
            calls: Vec::new(),
            finalize: Arc::new(move |_| value.clone()),
        }
    }

    /// Program that runs the calls and finalizes with the closure.
    pub fn calls(
        calls: Vec<StubCall>,
        finalize: impl Fn(&[CallResult]) -> Value + Send + Sync + 'static,
    ) -> Self {
        StubProgram::Run {
            calls,
            finalize: Arc::new(finalize),
        }
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Provider handing out one fresh `StubSandbox` per execution.
pub struct StubProvider {
    program: StubProgram,
    pub created: AtomicUsize,
    sandboxes: Mutex<Vec<Arc<StubSandbox>>>,
}

impl StubProvider {
    pub fn new(program: StubProgram) -> Arc<Self> {
        Arc::new(Self {
            program,
            created: AtomicUsize::new(0),
            sandboxes: Mutex::new(Vec::new()),
        })
    }

    /// Files of the most recently provisioned sandbox.
    pub fn last_files(&self) -> HashMap<String, String> {
        let sandboxes = self.sandboxes.lock().unwrap();
        let last = sandboxes.last().expect("no sandbox was provisioned");
        let files = last.files.lock().unwrap().clone();
        files
    }
}

#[async_trait]
impl SandboxProvider for StubProvider {
    async fn create(&self) -> Result<Arc<dyn Sandbox>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let sandbox = Arc::new(StubSandbox {
            files: Arc::new(Mutex::new(HashMap::new())),
            program: self.program.clone(),
        });
        self.sandboxes.lock().unwrap().push(Arc::clone(&sandbox));
        Ok(sandbox)
    }
}

// =============================================================================
// Sandbox
// =============================================================================

pub struct StubSandbox {
    files: FileMap,
    program: StubProgram,
}

#[async_trait]
impl Sandbox for StubSandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::sandbox(format!("no such file: {}", path)))
    }

    async fn start(
        &self,
        _command: &str,
        output: mpsc::Sender<OutputChunk>,
    ) -> Result<Arc<dyn SandboxCommand>> {
        let files = Arc::clone(&self.files);
        let program = self.program.clone();
        let (exit_tx, exit_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let code = run_program(program, files, output).await;
            let _ = exit_tx.send(code);
        });

        Ok(Arc::new(StubCommand {
            abort: handle.abort_handle(),
            exit_rx: tokio::sync::Mutex::new(Some(exit_rx)),
            exit_code: tokio::sync::Mutex::new(None),
        }))
    }

    async fn kill(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Command
// =============================================================================

pub struct StubCommand {
    abort: tokio::task::AbortHandle,
    exit_rx: tokio::sync::Mutex<Option<oneshot::Receiver<i32>>>,
    exit_code: tokio::sync::Mutex<Option<i32>>,
}

#[async_trait]
impl SandboxCommand for StubCommand {
    async fn wait(&self) -> Result<i32> {
        if let Some(code) = *self.exit_code.lock().await {
            return Ok(code);
        }
        let rx = self.exit_rx.lock().await.take();
        let code = match rx {
            Some(rx) => rx.await.unwrap_or(-1),
            None => -1,
        };
        *self.exit_code.lock().await = Some(code);
        Ok(code)
    }

    async fn kill(&self) -> Result<()> {
        self.abort.abort();
        Ok(())
    }
}

// =============================================================================
// Scripted program — the in-sandbox half of the protocol
// =============================================================================

async fn run_program(
    program: StubProgram,
    files: FileMap,
    output: mpsc::Sender<OutputChunk>,
) -> i32 {
    match program {
        StubProgram::Hang => loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
        },

        StubProgram::EmitError(message) => {
            let line = format!("{}{}\n", ERROR_SENTINEL, json!({ "message": message }));
            let _ = output.send(OutputChunk::Stdout(line)).await;
            1
        }

        StubProgram::ExitSilently(stdout) => {
            let _ = output.send(OutputChunk::Stdout(stdout)).await;
            0
        }

        StubProgram::CompileFail(stderr) => {
            let _ = output.send(OutputChunk::Stderr(stderr)).await;
            1
        }

        StubProgram::Run { calls, finalize } => {
            let nonce = extract_nonce(&files);
            let mut results: Vec<CallResult> = Vec::new();

            for (seq, call) in calls.iter().enumerate() {
                match perform_call(&files, &output, &nonce, seq, call).await {
                    Ok(result) => results.push(Ok(result)),
                    Err(error) if call.catch_error => results.push(Err(error)),
                    Err(error) => {
                        // Mirrors the generated entry wrapper: the throw
                        // escapes the agent body and becomes the error
                        // sentinel, verbatim for tool call errors.
                        let message = format!("Tool call error: {}", error);
                        let line =
                            format!("{}{}\n", ERROR_SENTINEL, json!({ "message": message }));
                        let _ = output.send(OutputChunk::Stdout(line)).await;
                        return 1;
                    }
                }
            }

            let value = finalize(&results);
            let line = format!("{}{}\n", FINAL_SENTINEL, value);
            let _ = output.send(OutputChunk::Stdout(line)).await;
            0
        }
    }
}

/// One `callTool` round trip: cache check, request file, sentinel, response
/// polling, cache update. Returns the tool result or the error string from
/// an unsuccessful response.
async fn perform_call(
    files: &FileMap,
    output: &mpsc::Sender<OutputChunk>,
    nonce: &str,
    seq: usize,
    call: &StubCall,
) -> std::result::Result<Value, String> {
    let key = cache_key(&call.tool, &call.args);

    let mut cache = read_cache(files);
    if let Some(hit) = cache.get(&key) {
        return Ok(hit.clone());
    }

    let request_id = format!("{}-{}-{}", nonce, seq, "stub");
    let request = json!({
        "requestId": request_id,
        "tool": call.tool,
        "args": call.args,
        "cacheKey": key,
    });
    files
        .lock()
        .unwrap()
        .insert(request_path(&request_id), request.to_string());

    let line = format!("{}{}\n", TOOL_REQUEST_SENTINEL, request_id);
    let _ = output.send(OutputChunk::Stdout(line)).await;

    // Poll for the response like the real runtime; the test deadline is
    // generous because the host answers in milliseconds.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let response: ToolResponse = loop {
        if tokio::time::Instant::now() > deadline {
            files.lock().unwrap().remove(&request_path(&request_id));
            return Err(format!("Tool request timeout: no response for \"{}\"", call.tool));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        let raw = files.lock().unwrap().get(&response_path(&request_id)).cloned();
        if let Some(raw) = raw {
            match serde_json::from_str(&raw) {
                Ok(response) => break response,
                Err(_) => continue, // partially written
            }
        }
    };

    {
        let mut files = files.lock().unwrap();
        files.remove(&request_path(&request_id));
        files.remove(&response_path(&request_id));
    }

    if !response.success {
        return Err(response.error.unwrap_or_else(|| "unknown error".to_string()));
    }

    let result = response.result.unwrap_or(Value::Null);
    cache.insert(key, result.clone());
    write_cache(files, &cache);
    Ok(result)
}

/// The host bakes the execution nonce into `/ptc/runtime.ts`; the stub reads
/// it back out, proving provisioning happened before launch.
fn extract_nonce(files: &FileMap) -> String {
    let files = files.lock().unwrap();
    let runtime = files
        .get(RUNTIME_FILE)
        .expect("runtime.ts must be uploaded before the command starts");
    let marker = "const NONCE = \"";
    let start = runtime.find(marker).expect("runtime.ts carries the nonce") + marker.len();
    let end = runtime[start..].find('"').expect("nonce is terminated") + start;
    runtime[start..end].to_string()
}

fn read_cache(files: &FileMap) -> HashMap<String, Value> {
    let files = files.lock().unwrap();
    files
        .get(CACHE_FILE)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

fn write_cache(files: &FileMap, cache: &HashMap<String, Value>) {
    if let Ok(encoded) = serde_json::to_string(cache) {
        files.lock().unwrap().insert(CACHE_FILE.to_string(), encoded);
    }
}
