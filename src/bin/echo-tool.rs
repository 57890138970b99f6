// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Minimal stdio MCP server used for local trials and integration tests.
//!
//! Tools:
//! - `echo`  - returns `arguments.text`
//! - `list`  - returns a fixed list of items, one per line
//! - `fail`  - always reports `isError`
//! - `flaky` - answers with a JSON-RPC error for the first `failures` calls
//! - `image` - returns an image item with a `data:` URI
//! - `slow`  - sleeps `ms` milliseconds, then echoes
//!
//! Flags:
//! - `--banner`         print a non-JSON line before serving
//! - `--page-size N`    paginate `tools/list` with `nextCursor`
//! - `--name NAME`      server name reported in `initialize`

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

const ITEMS: [&str; 3] = ["alpha", "beta", "gamma"];

struct Options {
    banner: bool,
    page_size: Option<usize>,
    name: String,
}

impl Options {
    fn from_args() -> Self {
        let mut options = Options {
            banner: false,
            page_size: None,
            name: "echo-tool".to_string(),
        };
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--banner" => options.banner = true,
                "--page-size" => options.page_size = args.next().and_then(|v| v.parse().ok()).filter(|n| *n > 0),
                "--name" => {
                    if let Some(name) = args.next() {
                        options.name = name;
                    }
                }
                _ => {}
            }
        }
        options
    }
}

struct Server {
    options: Options,
    flaky_calls: u64,
}

fn tool_catalog() -> Vec<Value> {
    let text_input = json!({
        "type": "object",
        "properties": {"text": {"type": "string"}},
    });
    vec![
        json!({"name": "echo", "description": "Echo the given text", "inputSchema": text_input}),
        json!({"name": "list", "description": "List items", "inputSchema": {"type": "object"}}),
        json!({"name": "fail", "description": "Always fails", "inputSchema": {"type": "object"}}),
        json!({
            "name": "flaky",
            "description": "Fails the first N calls",
            "inputSchema": {"type": "object", "properties": {"failures": {"type": "integer"}}}
        }),
        json!({"name": "image", "description": "Return a tiny image", "inputSchema": {"type": "object"}}),
        json!({
            "name": "slow",
            "description": "Sleep, then echo",
            "inputSchema": {"type": "object", "properties": {"ms": {"type": "integer"}}}
        }),
    ]
}

fn text_result(text: impl Into<String>) -> Value {
    json!({"content": [{"type": "text", "text": text.into()}]})
}

impl Server {
    fn handle(&mut self, request: &Value) -> Option<Value> {
        let id = request.get("id").cloned();
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        // Notifications get no reply.
        let id = id?;

        let outcome = match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": self.options.name, "version": env!("CARGO_PKG_VERSION")}
            })),
            "tools/list" => Ok(self.list_tools(&params)),
            "tools/call" => self.call_tool(&params),
            _ => Err((-32601, format!("Method not found: {}", method))),
        };

        Some(match outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err((code, message)) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": code, "message": message}
            }),
        })
    }

    fn list_tools(&self, params: &Value) -> Value {
        let tools = tool_catalog();
        let Some(page_size) = self.options.page_size else {
            return json!({"tools": tools});
        };

        let start = params
            .get("cursor")
            .and_then(Value::as_str)
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0)
            .min(tools.len());
        let end = (start + page_size).min(tools.len());
        let mut result = json!({"tools": tools[start..end].to_vec()});
        if end < tools.len() {
            result["nextCursor"] = json!(end.to_string());
        }
        result
    }

    fn call_tool(&mut self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match name {
            "echo" => Ok(text_result(args.get("text").and_then(Value::as_str).unwrap_or_default())),
            "list" => Ok(text_result(ITEMS.join("\n"))),
            "fail" => Ok(json!({
                "content": [{"type": "text", "text": "this tool always fails"}],
                "isError": true
            })),
            "flaky" => {
                let failures = args.get("failures").and_then(Value::as_u64).unwrap_or(1);
                self.flaky_calls += 1;
                if self.flaky_calls <= failures {
                    Err((-32000, format!("flaky failure {} of {}", self.flaky_calls, failures)))
                } else {
                    Ok(text_result(format!("ok after {} calls", self.flaky_calls)))
                }
            }
            "image" => Ok(json!({
                "content": [{"type": "image", "data": "iVBORw0KGgo=", "mimeType": "image/png"}]
            })),
            "slow" => {
                let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(1000);
                thread::sleep(Duration::from_millis(ms));
                Ok(text_result(format!("slept {}ms", ms)))
            }
            _ => Err((-32602, format!("Unknown tool: {}", name))),
        }
    }
}

fn main() -> io::Result<()> {
    let mut server = Server {
        options: Options::from_args(),
        flaky_calls: 0,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    if server.options.banner {
        writeln!(stdout, "{} ready", server.options.name)?;
        stdout.flush()?;
    }

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Value>(&line) {
            Ok(request) => server.handle(&request),
            Err(e) => Some(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": format!("Parse error: {}", e)}
            })),
        };
        if let Some(reply) = reply {
            writeln!(stdout, "{}", reply)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
