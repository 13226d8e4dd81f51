//! Emission of the three sandbox program files.
//!
//! - `index.ts`: typed async stubs, one per catalog tool, forwarding to the
//!   runtime RPC.
//! - `runtime.ts`: the file-pair RPC runtime (`callTool`), with the
//!   per-execution nonce baked in.
//! - `main.ts`: the entry program wrapping the sanitized agent source and
//!   reporting its outcome through the terminal sentinels.

use crate::catalog::Catalog;
use crate::protocol::{
    CACHE_FILE, ERROR_SENTINEL, FINAL_SENTINEL, REQUESTS_DIR, RESPONSES_DIR, TOOL_REQUEST_SENTINEL,
};
use crate::schema::Schema;

/// Generate `index.ts`: re-exported typed stubs for every tool.
pub fn emit_index(catalog: &Catalog) -> String {
    let mut out = String::new();
    out.push_str("// Generated tool stubs. Do not edit; the host owns the real tools.\n");
    out.push_str("import { callTool } from \"/ptc/runtime.ts\";\n");

    for tool in catalog.list() {
        let input = tool.input_schema.render();
        let output = tool
            .output_schema
            .as_ref()
            .map(Schema::render)
            .unwrap_or_else(|| "any".to_string());
        out.push_str("\n");
        out.push_str(&format!("/** {} */\n", tool.description.replace("*/", "*\\/")));
        out.push_str(&format!(
            "export async function {name}(input: {input}): Promise<{output}> {{\n  return (await callTool({name_str}, input)) as {output};\n}}\n",
            name = tool.name,
            input = input,
            output = output,
            name_str = js_string(&tool.name),
        ));
    }
    out
}

/// Generate `runtime.ts`: the in-sandbox half of the tool-call protocol.
///
/// Per call: canonical cache-key lookup, request file write, sentinel print,
/// exponential-backoff response polling, cache update, cleanup. Strictly
/// serial per request.
pub fn emit_runtime(nonce: &str) -> String {
    RUNTIME_TEMPLATE
        .replace("{nonce}", nonce)
        .replace("{request_sentinel}", TOOL_REQUEST_SENTINEL)
        .replace("{requests_dir}", REQUESTS_DIR)
        .replace("{responses_dir}", RESPONSES_DIR)
        .replace("{cache_file}", CACHE_FILE)
}

/// Generate `main.ts`: imports the stubs, runs the sanitized agent source,
/// prints exactly one terminal sentinel.
pub fn emit_main(catalog: &Catalog, sanitized_source: &str) -> String {
    let mut out = String::new();
    out.push_str("// Generated entry program.\n");

    if !catalog.is_empty() {
        let names: Vec<&str> = catalog.list().iter().map(|t| t.name.as_str()).collect();
        out.push_str(&format!(
            "import {{ {} }} from \"/ptc/index.ts\";\n\n",
            names.join(", ")
        ));
    }

    out.push_str("const __ptcMain = async () => {\n");
    out.push_str(sanitized_source);
    if !sanitized_source.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("};\n\n");

    out.push_str(&format!(
        r#"function __ptcFail(message) {{
  console.log({error_sentinel} + JSON.stringify({{ message }}));
  process.exit(1);
}}

try {{
  const result = await __ptcMain();
  let payload;
  try {{
    payload = JSON.stringify(result === undefined ? null : result);
  }} catch (error) {{
    const detail = error instanceof Error ? error.message : String(error);
    __ptcFail("Runtime error: result is not JSON-serializable (circular structure or unsupported value): " + detail);
  }}
  console.log({final_sentinel} + (payload === undefined ? "null" : payload));
  process.exit(0);
}} catch (error) {{
  const message = error instanceof Error ? error.message : String(error);
  if (message.startsWith("Tool call error:") || message.startsWith("Tool request timeout")) {{
    __ptcFail(message);
  }} else {{
    __ptcFail("Runtime error: " + message);
  }}
}}
"#,
        error_sentinel = js_string(ERROR_SENTINEL),
        final_sentinel = js_string(FINAL_SENTINEL),
    ));
    out
}

/// Encode a string as a JS string literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).expect("strings always encode")
}

const RUNTIME_TEMPLATE: &str = r#"// Generated RPC runtime. The sandbox can only request tool calls; the host
// performs them and answers through response files.
import { createHash } from "node:crypto";
import { mkdir, readFile, rm, writeFile } from "node:fs/promises";

const NONCE = "{nonce}";
const REQUESTS_DIR = "{requests_dir}";
const RESPONSES_DIR = "{responses_dir}";
const CACHE_FILE = "{cache_file}";

const POLL_INITIAL_MS = 10;
const POLL_FACTOR = 1.5;
const POLL_MAX_MS = 1000;
const POLL_BUDGET_MS = 60000;

function canonicalJson(value) {
  if (value === null || typeof value !== "object") return JSON.stringify(value);
  if (Array.isArray(value)) return "[" + value.map(canonicalJson).join(",") + "]";
  const keys = Object.keys(value).sort();
  return "{" + keys.map((k) => JSON.stringify(k) + ":" + canonicalJson(value[k])).join(",") + "}";
}

function cacheKey(tool, args) {
  return createHash("sha256").update(tool + ":" + canonicalJson(args)).digest("hex");
}

async function readCache() {
  try {
    const parsed = JSON.parse(await readFile(CACHE_FILE, "utf8"));
    return parsed && typeof parsed === "object" && !Array.isArray(parsed) ? parsed : {};
  } catch {
    return {};
  }
}

async function writeCache(cache) {
  try {
    await writeFile(CACHE_FILE, JSON.stringify(cache));
  } catch {
    // cache is best-effort
  }
}

function sleep(ms) {
  return new Promise((resolve) => setTimeout(resolve, ms));
}

let requestCounter = 0;

function nextRequestId() {
  requestCounter += 1;
  const rand = Math.random().toString(36).slice(2, 8);
  return NONCE + "-" + Date.now() + "-" + requestCounter + "-" + rand;
}

export async function callTool(tool, args) {
  const key = cacheKey(tool, args);
  const cache = await readCache();
  if (Object.prototype.hasOwnProperty.call(cache, key)) {
    return cache[key];
  }

  const requestId = nextRequestId();
  const requestPath = REQUESTS_DIR + "/" + requestId + ".json";
  const responsePath = RESPONSES_DIR + "/" + requestId + ".json";

  await mkdir(REQUESTS_DIR, { recursive: true });
  await mkdir(RESPONSES_DIR, { recursive: true });
  await writeFile(requestPath, JSON.stringify({ requestId, tool, args, cacheKey: key }));
  console.log("{request_sentinel}" + requestId);

  const deadline = Date.now() + POLL_BUDGET_MS;
  let delay = POLL_INITIAL_MS;
  let response;
  while (response === undefined) {
    if (Date.now() > deadline) {
      await rm(requestPath, { force: true }).catch(() => {});
      throw new Error("Tool request timeout: no response for \"" + tool + "\" within " + POLL_BUDGET_MS + "ms");
    }
    await sleep(delay);
    delay = Math.min(delay * POLL_FACTOR, POLL_MAX_MS);
    try {
      response = JSON.parse(await readFile(responsePath, "utf8"));
    } catch {
      // absent or partially written; keep polling
    }
  }

  await rm(requestPath, { force: true }).catch(() => {});
  await rm(responsePath, { force: true }).catch(() => {});

  if (response.success === false) {
    throw new Error("Tool call error: " + response.error);
  }

  const result = response.result === undefined ? null : response.result;
  cache[key] = result;
  await writeCache(cache);
  return result;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Tool};
    use crate::schema::{Field, Schema};
    use serde_json::json;

    fn sample_catalog() -> Catalog {
        let weather = Tool::new(
            "get_weather",
            "Get current weather",
            Schema::object(vec![Field::required("city", Schema::String)]),
            |_| async { Ok(json!({})) },
        )
        .with_output_schema(Schema::object(vec![
            Field::required("weather", Schema::String),
            Field::required("city", Schema::String),
        ]));
        let calculate = Tool::new(
            "calculate",
            "Apply an arithmetic operation",
            Schema::object(vec![
                Field::required("a", Schema::Number),
                Field::required("b", Schema::Number),
                Field::required("operation", Schema::string_enum(["add", "sub"])),
            ]),
            |_| async { Ok(json!(0)) },
        );
        Catalog::new(vec![weather, calculate.into()]).unwrap()
    }

    #[test]
    fn test_index_has_one_typed_stub_per_tool() {
        let index = emit_index(&sample_catalog());
        assert!(index.contains("import { callTool } from \"/ptc/runtime.ts\""));
        assert!(index.contains(
            "export async function get_weather(input: { city: string }): Promise<{ weather: string; city: string }>"
        ));
        assert!(index.contains("callTool(\"get_weather\", input)"));
        assert!(index.contains(
            "export async function calculate(input: { a: number; b: number; operation: \"add\" | \"sub\" }): Promise<any>"
        ));
    }

    #[test]
    fn test_runtime_embeds_nonce_and_protocol_constants() {
        let runtime = emit_runtime("abc123");
        assert!(runtime.contains("const NONCE = \"abc123\";"));
        assert!(runtime.contains("__PTC_TOOL_REQUEST__"));
        assert!(runtime.contains("/ptc/requests"));
        assert!(runtime.contains("/ptc/responses"));
        assert!(runtime.contains("/ptc/cache.json"));
        assert!(runtime.contains("sha256"));
        // No leftover template holes.
        assert!(!runtime.contains("{nonce}"));
        assert!(!runtime.contains("{requests_dir}"));
    }

    #[test]
    fn test_main_wraps_source_and_imports_stubs() {
        let main = emit_main(&sample_catalog(), "const x = 1;\nreturn { x };");
        assert!(main.contains("import { get_weather, calculate } from \"/ptc/index.ts\";"));
        assert!(main.contains("const __ptcMain = async () => {\nconst x = 1;\nreturn { x };\n};"));
        assert!(main.contains("__PTC_FINAL__"));
        assert!(main.contains("__PTC_ERROR__"));
        assert!(main.contains("Tool call error:"));
        assert!(main.contains("Runtime error: "));
        assert!(main.contains("circular structure"));
    }

    #[test]
    fn test_main_without_tools_has_no_import() {
        let catalog = Catalog::new(vec![]).unwrap();
        let main = emit_main(&catalog, "return 1;");
        assert!(!main.contains("from \"/ptc/index.ts\""));
    }

    #[test]
    fn test_emitted_files_have_balanced_braces() {
        use crate::assembler::sanitize::brace_balance;

        let catalog = sample_catalog();
        for content in [
            emit_index(&catalog),
            emit_runtime("n"),
            emit_main(&catalog, "return { ok: true };"),
        ] {
            let (open, close) = brace_balance(&content);
            assert_eq!(open, close, "unbalanced emission:\n{content}");
        }
    }
}
