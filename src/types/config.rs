//! Configuration structures.
//!
//! Configuration is loaded from environment variables and config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Executor configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of tool-call sentinels one execution may emit.
    pub max_recursion_limit: u32,

    /// Host-side deadline for a whole execution.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Command launched inside the sandbox to run the entry program.
    pub entry_command: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_recursion_limit: 100,
            timeout: Duration::from_millis(30_000),
            entry_command: "bun run /ptc/main.ts".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
