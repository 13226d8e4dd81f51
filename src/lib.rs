//! # PTC Host - Programmatic Tool Calling Orchestrator
//!
//! Rust implementation of a programmatic tool calling (PTC) host providing:
//! - Assembly of agent-authored source into a sandboxed entry program
//! - Typed stub generation from declarative tool schemas
//! - A duplex stdout/file protocol between host and sandbox
//! - Argument validation before any real tool is invoked
//! - Recursion, timeout, and shape limits on untrusted executions
//!
//! ## Architecture
//!
//! The host is the only trusted party; the sandbox can request tool calls
//! but never perform them:
//! ```text
//!   agent source ──► Assembler ──► /ptc/{index,runtime,main}.ts
//!                                        │
//!                    ┌───────────────────▼──────────────────┐
//!   Executor ◄──────►│              Sandbox                 │
//!     │ stdout        │  runtime writes requests/<id>.json   │
//!     │ sentinels     │  and polls responses/<id>.json       │
//!     ▼               └──────────────────────────────────────┘
//!   Catalog ── validate args ── invoke tool ── write response
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod assembler;
pub mod cache_key;
pub mod catalog;
pub mod classify;
pub mod executor;
pub mod protocol;
pub mod sandbox;
pub mod schema;
pub mod types;

// Internal utilities
pub mod observability;

pub use catalog::{Catalog, Tool, ToolInfo, ToolSpec};
pub use executor::{executor_tool, Client, ExecuteRequest, ExecutionResult};
pub use sandbox::{OutputChunk, Sandbox, SandboxCommand, SandboxProvider};
pub use schema::Schema;
pub use types::{Config, Error, ExecutorConfig, Result};
