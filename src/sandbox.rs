//! Sandbox provider contract.
//!
//! The host treats the sandbox provider as an external collaborator: an
//! ephemeral, network-isolated environment that can hold files and run one
//! background command with streamed output. The host only ever needs the
//! operations below; everything provider-specific (credentials, VM pools,
//! transport) stays behind the trait.
//!
//! Output streaming uses an [`mpsc`] channel instead of callbacks: the
//! provider sends [`OutputChunk`]s as they arrive and drops the sender when
//! the command finishes, which gives the executor a single ordered stream to
//! select on.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::types::Result;

/// One chunk of streamed command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// Factory for fresh sandboxes. One sandbox per execution, never shared.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision a fresh, empty sandbox.
    async fn create(&self) -> Result<Arc<dyn Sandbox>>;
}

/// A live sandbox instance.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Write a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Read a file's contents as UTF-8.
    async fn read_file(&self, path: &str) -> Result<String>;

    /// Start a background command with streamed stdout/stderr.
    ///
    /// The provider must drop `output` once the command exits so the stream
    /// ends; [`SandboxCommand::wait`] then yields the exit status.
    async fn start(
        &self,
        command: &str,
        output: mpsc::Sender<OutputChunk>,
    ) -> Result<Arc<dyn SandboxCommand>>;

    /// Destroy the sandbox and release its resources.
    async fn kill(&self) -> Result<()>;
}

/// Handle to a running background command.
#[async_trait]
pub trait SandboxCommand: Send + Sync {
    /// Wait for the command to finish and return its exit status.
    async fn wait(&self) -> Result<i32>;

    /// Kill the command. Idempotent; killing a finished command is a no-op.
    async fn kill(&self) -> Result<()>;
}
