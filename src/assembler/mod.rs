//! Code assembler — from agent-authored source to sandbox program files.
//!
//! The assembler never trusts the agent's text. It rewrites only two
//! conservative syntactic patterns (top-level imports, the `main` wrapper),
//! checks brace balance outside string literals, and emits the three files
//! the sandbox executes. All semantic checking is left to the in-sandbox
//! transpiler; the brace check exists because the transpiler's positional
//! diagnostics are a poor self-repair signal for the agent.

pub mod emit;
pub mod sanitize;

use crate::catalog::Catalog;
use crate::types::{Error, Result};

pub use emit::{emit_index, emit_main, emit_runtime};
pub use sanitize::{brace_balance, sanitize};

/// The three generated file contents for one execution.
#[derive(Debug, Clone)]
pub struct AssembledProgram {
    /// `/ptc/index.ts` — typed tool stubs.
    pub index: String,
    /// `/ptc/runtime.ts` — the RPC runtime with the execution nonce baked in.
    pub runtime: String,
    /// `/ptc/main.ts` — entry program wrapping the sanitized agent source.
    pub main: String,
}

/// Sanitize, check, and emit. Fails without side effects; no sandbox exists
/// yet when assembly runs.
pub fn assemble(catalog: &Catalog, source: &str, nonce: &str) -> Result<AssembledProgram> {
    let sanitized = sanitize(source);
    check_braces(&sanitized)?;

    Ok(AssembledProgram {
        index: emit_index(catalog),
        runtime: emit_runtime(nonce),
        main: emit_main(catalog, &sanitized),
    })
}

/// Reject source whose braces (outside strings) do not balance, with a
/// message that names the missing side and count.
pub fn check_braces(source: &str) -> Result<()> {
    let (open, close) = brace_balance(source);
    if open == close {
        return Ok(());
    }

    let message = if open > close {
        let missing = open - close;
        format!(
            "unbalanced braces in code: Missing {} closing {} ('}}'): found {} '{{' but only {} '}}'",
            missing,
            plural_brace(missing),
            open,
            close
        )
    } else {
        let missing = close - open;
        format!(
            "unbalanced braces in code: Missing {} opening {} ('{{'): found {} '}}' but only {} '{{'",
            missing,
            plural_brace(missing),
            close,
            open
        )
    };
    Err(Error::assembly(message))
}

fn plural_brace(n: usize) -> &'static str {
    if n == 1 {
        "brace"
    } else {
        "braces"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Tool};
    use crate::schema::Schema;
    use serde_json::json;

    fn catalog() -> Catalog {
        let tool = Tool::new("echo", "Echo the input", Schema::Any, |args| async move {
            Ok(args)
        });
        Catalog::new(vec![tool.into()]).unwrap()
    }

    #[test]
    fn test_assemble_produces_three_files() {
        let program = assemble(&catalog(), "return { ok: true };", "nonce1").unwrap();
        assert!(program.index.contains("export async function echo"));
        assert!(program.runtime.contains("const NONCE = \"nonce1\";"));
        assert!(program.main.contains("return { ok: true };"));
    }

    #[test]
    fn test_assemble_rejects_missing_closing_brace() {
        let err = assemble(&catalog(), "const x = {;", "n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unbalanced braces"), "{message}");
        assert!(message.contains("Missing 1 closing brace"), "{message}");
    }

    #[test]
    fn test_assemble_rejects_missing_opening_braces() {
        let err = assemble(&catalog(), "}}", "n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Missing 2 opening braces"), "{message}");
    }

    #[test]
    fn test_braces_inside_strings_do_not_fail_assembly() {
        let source = r#"const s = "{{{"; return s;"#;
        assert!(assemble(&catalog(), source, "n").is_ok());
    }

    #[test]
    fn test_assemble_sanitizes_before_checking() {
        // The import line and wrapper disappear; what remains is balanced.
        let source = "import { echo } from \"/ptc/index\";\nasync function main() {\n  return await echo({ x: 1 });\n}\nexport default main();\n";
        let program = assemble(&catalog(), source, "n").unwrap();
        assert!(!program.main.contains("export default"));
        assert!(program.main.contains("await echo({ x: 1 })"));
    }
}
