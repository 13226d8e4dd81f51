//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. At the executor boundary every variant
//! collapses into the public `{success: false, error: String}` shape, so the
//! messages are written to be read by the agent, not just by an operator.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the PTC host.
#[derive(Error, Debug)]
pub enum Error {
    /// The agent source failed assembly (sanitization or structural check).
    #[error("{0}")]
    Assembly(String),

    /// The in-sandbox transpiler rejected the assembled program.
    #[error("compilation error: {0}")]
    Compilation(String),

    /// The program threw inside the sandbox.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Tool-side failure (validation or execution), surfaced back into the
    /// sandbox so the agent's code can observe it.
    #[error("tool call error: {0}")]
    ToolCall(String),

    /// Malformed sentinel payload or request/response file.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The execution emitted more tool-call sentinels than allowed.
    #[error("maximum iteration limit ({0}) reached")]
    RecursionLimit(u32),

    /// Host deadline or in-sandbox poll budget elapsed.
    #[error("{0}")]
    Timeout(String),

    /// Sandbox provisioning or transport failure.
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// Validation of caller-supplied values (tool names, config).
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal errors (emission bugs, impossible states).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience constructors
impl Error {
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    pub fn compilation(msg: impl Into<String>) -> Self {
        Self::Compilation(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn tool_call(msg: impl Into<String>) -> Self {
        Self::ToolCall(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn sandbox(msg: impl Into<String>) -> Self {
        Self::Sandbox(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
