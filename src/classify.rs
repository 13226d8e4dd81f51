//! Error classification for raw transpiler/runner output.
//!
//! When an execution dies without a terminal sentinel, all the host has is
//! stderr and stdout. This module turns that soup into one agent-readable
//! message. Classification is pure and deterministic: same input, same
//! message, no I/O.
//!
//! Priority order:
//! 1. esbuild-style `Transform failed with N error(s):` + positional line
//! 2. standalone `<path>:<line>:<col>: ERROR: <msg>` line
//! 3. `SyntaxError` / `TypeError` / `ReferenceError` with optional location
//! 4. any `Error: <msg>` line, verbatim
//! 5. first meaningful stderr lines, else a generic fallback

use regex::Regex;
use std::sync::OnceLock;

/// Positional transpiler diagnostic: `<path>:<line>:<col>: ERROR: <msg>`.
fn positional_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*([^\s:]+):(\d+):(\d+):\s*ERROR:\s*(.+?)\s*$").expect("valid regex")
    })
}

/// esbuild transform failure header.
fn transform_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Transform failed with \d+ errors?:").expect("valid regex"))
}

/// Named runtime error kinds.
fn kind_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)\b(SyntaxError|TypeError|ReferenceError):\s*(.+?)\s*$")
            .expect("valid regex")
    })
}

/// Generic `Error: <msg>` line, not preceded by an identifier character (so
/// `SyntaxError:` does not match twice).
fn generic_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)(?:^|[^A-Za-z0-9_])Error:\s*(.+?)\s*$").expect("valid regex")
    })
}

/// Stack-frame / file location, e.g. `at run (/ptc/main.ts:12:9)`.
fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^\s():]+\.[a-z]+:\d+:\d+)").expect("valid regex"))
}

/// Classify combined runner output into one agent-readable message.
pub fn classify(stderr: &str, stdout: &str) -> String {
    let combined = format!("{}\n{}", stderr, stdout);

    // 1. Transform failure with a positional diagnostic.
    if transform_re().is_match(&combined) {
        if let Some(caps) = positional_re().captures(&combined) {
            return compilation_message(&caps);
        }
    }

    // 2. Standalone positional diagnostic.
    if let Some(caps) = positional_re().captures(&combined) {
        return compilation_message(&caps);
    }

    // 3. Named runtime error kinds, with a nearby location when present.
    if let Some(caps) = kind_re().captures(&combined) {
        let kind = &caps[1];
        let msg = &caps[2];
        let location = location_re()
            .captures(&combined[caps.get(0).expect("whole match").end()..])
            .map(|loc| format!(" (at {})", &loc[1]))
            .unwrap_or_default();
        return format!("runtime error: {}: {}{}", kind, msg, location);
    }

    // 4. Any other `Error:` line, verbatim.
    if let Some(caps) = generic_error_re().captures(&combined) {
        return format!("Error: {}", &caps[1]);
    }

    // 5. First meaningful stderr lines.
    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_noise(line))
        .take(3)
        .collect();
    if !meaningful.is_empty() {
        return meaningful.join("; ");
    }

    "code execution failed".to_string()
}

fn compilation_message(caps: &regex::Captures<'_>) -> String {
    let (path, line, col, msg) = (&caps[1], &caps[2], &caps[3], &caps[4]);
    let mut message = format!("compilation error at {}:{}:{}: {}", path, line, col, msg);
    if needs_brace_hint(msg) {
        message.push_str(". Hint: this usually means braces are unbalanced in the submitted code");
    }
    message
}

/// Diagnostics that in practice mean the agent dropped or doubled a brace.
fn needs_brace_hint(msg: &str) -> bool {
    let unexpected_catch = msg.contains("Unexpected") && msg.contains("catch");
    let unexpected_close = msg.contains("Unexpected") && msg.contains('}');
    unexpected_catch || unexpected_close || msg.contains("Expected")
}

/// Package-manager chatter and stack frames carry no signal for the agent.
fn is_noise(line: &str) -> bool {
    line.starts_with("at ")
        || line.starts_with("npm")
        || line.starts_with("pnpm")
        || line.starts_with("yarn")
        || line.starts_with("bun install")
        || line.starts_with('$')
        || line.starts_with("warn")
        || line.contains("node_modules")
}

// =============================================================================
// Tests
// =============================================================================
