//! Sanitization of agent-authored source.
//!
//! Agents routinely emit two constructs that break the generated entry
//! wrapper: their own `import ... from "..."` statements (the stubs are
//! already in scope) and an `async function main() { ... }` wrapper with an
//! `export default main();` suffix. Both are removed by conservative string
//! rewriting. No parsing is attempted; a small lexer state machine tracks
//! `"`, `'` and backtick strings with backslash escapes so contents inside
//! string literals are never rewritten.

/// Lexer state for the string-aware scanners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    Single,
    Double,
    Template,
}

impl LexState {
    /// Advance over one character. `escaped` is the pending-backslash flag.
    fn step(self, c: char, escaped: &mut bool) -> LexState {
        if *escaped {
            *escaped = false;
            return self;
        }
        match (self, c) {
            (LexState::Normal, '\'') => LexState::Single,
            (LexState::Normal, '"') => LexState::Double,
            (LexState::Normal, '`') => LexState::Template,
            (LexState::Single, '\'') => LexState::Normal,
            (LexState::Single, '\n') => LexState::Normal, // unterminated line string
            (LexState::Double, '"') => LexState::Normal,
            (LexState::Double, '\n') => LexState::Normal,
            (LexState::Template, '`') => LexState::Normal,
            (state, '\\') if state != LexState::Normal => {
                *escaped = true;
                state
            }
            (state, _) => state,
        }
    }
}

/// Count `{` and `}` outside string literals. Returns `(open, close)`.
pub fn brace_balance(source: &str) -> (usize, usize) {
    let mut state = LexState::Normal;
    let mut escaped = false;
    let mut open = 0usize;
    let mut close = 0usize;

    for c in source.chars() {
        if state == LexState::Normal {
            match c {
                '{' => open += 1,
                '}' => close += 1,
                _ => {}
            }
        }
        state = state.step(c, &mut escaped);
    }
    (open, close)
}

/// Remove constructs the generated wrapper cannot tolerate.
///
/// Idempotent: a source with no imports and no `main` wrapper is returned
/// unchanged, byte for byte.
pub fn sanitize(source: &str) -> String {
    let without_imports = strip_imports(source);
    unwrap_main(&without_imports)
}

// =============================================================================
// Import stripping
// =============================================================================

/// Drop top-level `import` statements. Works line by line with the lexer
/// state carried across lines, so an `import` inside a template literal
/// survives.
fn strip_imports(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut state = LexState::Normal;
    let mut escaped = false;
    let mut in_import = false;
    let mut changed = false;

    for line in source.split_inclusive('\n') {
        let at_top_level = state == LexState::Normal;

        if in_import {
            changed = true;
            if import_terminates(line) {
                in_import = false;
            }
            continue;
        }

        if at_top_level && is_import_start(line) {
            changed = true;
            if !import_terminates(line) {
                in_import = true;
            }
            continue;
        }

        for c in line.chars() {
            state = state.step(c, &mut escaped);
        }
        out.push_str(line);
    }

    if changed {
        out
    } else {
        source.to_string()
    }
}

/// Does this line begin an import statement?
fn is_import_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    let Some(rest) = trimmed.strip_prefix("import") else {
        return false;
    };
    matches!(
        rest.chars().next(),
        None | Some(' ') | Some('\t') | Some('{') | Some('"') | Some('\'') | Some('*')
    )
}

/// Does this line complete the import statement? An import ends on the line
/// carrying its quoted module specifier.
fn import_terminates(line: &str) -> bool {
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '"' || c == '\'' {
            let quote = c;
            for c in chars.by_ref() {
                if c == quote {
                    return true;
                }
            }
            return false; // unterminated specifier
        }
    }
    false
}

// =============================================================================
// main-wrapper unwrapping
// =============================================================================

/// Remove a surrounding `async function main() { ... }` wrapper together
/// with its `export default main();` (or bare `main();`) suffix. The wrapper
/// is only unwrapped when it encloses the entire source; a `main` defined
/// among other top-level code is left alone.
fn unwrap_main(source: &str) -> String {
    let Some((kw_start, body_start)) = find_main_header(source) else {
        return source.to_string();
    };
    let Some(body_end) = find_matching_close(source, body_start) else {
        return source.to_string();
    };

    let prefix = &source[..kw_start];
    let body = &source[body_start..body_end];
    let suffix = &source[body_end + 1..];

    if !prefix.trim().is_empty() {
        return source.to_string();
    }

    let mut rest = suffix.trim().to_string();
    for call in ["export default main();", "export default main()", "main();", "main()"] {
        if let Some(stripped) = rest.strip_prefix(call) {
            rest = stripped.trim().to_string();
            break;
        }
    }
    if !rest.is_empty() {
        return source.to_string();
    }

    body.trim_matches('\n').to_string()
}

/// Find `async function main ( ) {` outside strings. Returns the keyword
/// start and the index just past the opening brace.
fn find_main_header(source: &str) -> Option<(usize, usize)> {
    let bytes = source.as_bytes();
    let mut state = LexState::Normal;
    let mut escaped = false;

    for (i, c) in source.char_indices() {
        if state == LexState::Normal
            && c == 'a'
            && source[i..].starts_with("async")
            && is_boundary(bytes, i)
        {
            if let Some(body_start) = match_main_header(&source[i..]) {
                return Some((i, i + body_start));
            }
        }
        state = state.step(c, &mut escaped);
    }
    None
}

/// Match `async function main ( ) {` at the start of `rest`, returning the
/// offset just past the `{`.
fn match_main_header(rest: &str) -> Option<usize> {
    let mut pos = 0;
    for token in ["async", "function", "main"] {
        let after_ws = rest[pos..].len() - rest[pos..].trim_start().len();
        pos += after_ws;
        if !rest[pos..].starts_with(token) {
            return None;
        }
        pos += token.len();
    }
    for token in ["(", ")", "{"] {
        let after_ws = rest[pos..].len() - rest[pos..].trim_start().len();
        pos += after_ws;
        if !rest[pos..].starts_with(token) {
            return None;
        }
        pos += token.len();
    }
    Some(pos)
}

/// Is position `i` at a word boundary (start of source or after a
/// non-identifier character)?
fn is_boundary(bytes: &[u8], i: usize) -> bool {
    if i == 0 {
        return true;
    }
    let prev = bytes[i - 1] as char;
    !(prev.is_ascii_alphanumeric() || prev == '_' || prev == '$')
}

/// Find the `}` matching the `{` just before `from`, honoring strings.
/// Returns the index of the closing brace.
fn find_matching_close(source: &str, from: usize) -> Option<usize> {
    let mut state = LexState::Normal;
    let mut escaped = false;
    let mut depth = 1usize;

    for (i, c) in source[from..].char_indices() {
        if state == LexState::Normal {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(from + i);
                    }
                }
                _ => {}
            }
        }
        state = state.step(c, &mut escaped);
    }
    None
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_is_noop_on_clean_source() {
        let source = "const x = 1;\nreturn { x };\n";
        assert_eq!(sanitize(source), source);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let source = r#"import { get_weather } from "/ptc/index";
async function main() {
  const w = await get_weather({ city: "london" });
  return { w };
}
export default main();
"#;
        let once = sanitize(source);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_strips_single_line_imports() {
        let source = "import { a } from \"mod\";\nimport \"side-effect\";\nconst x = a;\n";
        assert_eq!(sanitize(source), "const x = a;\n");
    }

    #[test]
    fn test_strips_multi_line_import() {
        let source = "import {\n  a,\n  b,\n} from \"mod\";\nconst x = a + b;\n";
        assert_eq!(sanitize(source), "const x = a + b;\n");
    }

    #[test]
    fn test_import_inside_string_survives() {
        let source = "const s = `\nimport { a } from \"mod\";\n`;\nreturn s;\n";
        assert_eq!(sanitize(source), source);
    }

    #[test]
    fn test_unwraps_main_and_export_default() {
        let source = "async function main() {\n  const x = 1;\n  return { x };\n}\nexport default main();\n";
        assert_eq!(sanitize(source), "  const x = 1;\n  return { x };");
    }

    #[test]
    fn test_unwraps_main_with_bare_call_suffix() {
        let source = "async function main() {\n  return 1;\n}\nmain();\n";
        assert_eq!(sanitize(source), "  return 1;");
    }

    #[test]
    fn test_main_with_sibling_code_is_left_alone() {
        let source = "const helper = 1;\nasync function main() {\n  return helper;\n}\nexport default main();\n";
        assert_eq!(sanitize(source), source);
    }

    #[test]
    fn test_main_mentioned_in_string_is_left_alone() {
        let source = "const s = \"async function main() {\";\nreturn s.length;\n";
        assert_eq!(sanitize(source), source);
    }

    #[test]
    fn test_nested_braces_in_main_body() {
        let source =
            "async function main() {\n  if (true) {\n    return { deep: { x: 1 } };\n  }\n}\nexport default main();\n";
        let sanitized = sanitize(source);
        assert!(sanitized.contains("deep"));
        assert!(!sanitized.contains("async function main"));
        let (open, close) = brace_balance(&sanitized);
        assert_eq!(open, close);
    }

    #[test]
    fn test_import_and_wrapper_together() {
        let source = r#"import { get_weather } from "/ptc/index";

async function main() {
  const w = await get_weather({ city: "london" });
  return { w };
}
export default main();
"#;
        let sanitized = sanitize(source);
        assert!(!sanitized.contains("import"));
        assert!(!sanitized.contains("export default"));
        assert!(sanitized.contains("await get_weather"));
    }

    // =========================================================================
    // Brace balance
    // =========================================================================

    #[test]
    fn test_brace_balance_counts_outside_strings() {
        assert_eq!(brace_balance("{ { } }"), (2, 2));
        assert_eq!(brace_balance("const x = {;"), (1, 0));
        assert_eq!(brace_balance("\"{{{\" + '}'"), (0, 0));
        assert_eq!(brace_balance("`${}`"), (0, 0));
    }

    #[test]
    fn test_brace_balance_honors_escapes() {
        // The escaped quote does not terminate the string, so the brace
        // after it is still inside.
        assert_eq!(brace_balance(r#"const s = "a\"{"; const t = {};"#), (1, 1));
    }

    #[test]
    fn test_unterminated_single_quote_recovers_at_newline() {
        // An apostrophe in a comment-like line must not swallow the rest of
        // the program.
        let source = "// it's fine\nconst x = { a: 1 };\n";
        assert_eq!(brace_balance(source), (1, 1));
    }
}
