//! Core types for the PTC host.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ExecutionId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the executor and observability

mod config;
mod errors;
mod ids;

pub use config::{Config, ExecutorConfig, ObservabilityConfig};
pub use errors::{Error, Result};
pub use ids::ExecutionId;
