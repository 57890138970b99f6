// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Append-only JSON-lines record of tool call attempts.
//!
//! One file per run, `<logs_dir>/run_<unix_millis>[_<n>].jsonl`, one [`LogRecord`]
//! per line. Every record is flushed before `write` returns, so a crashed
//! run still leaves a complete log up to the last attempt.
//!
//! This is an audit trail and is kept apart from `tracing` output.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Argument keys whose values never reach the log (matched case-insensitively).
pub const REDACTED_KEYS: &[&str] = &["api_key", "token", "authorization", "password", "secret"];

/// Replacement for redacted values.
pub const REDACTION: &str = "***";

/// Maximum characters of output kept in a record.
pub const SUMMARY_CHARS: usize = 700;

/// One tool call attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Local wall-clock time, second precision.
    pub ts: String,

    /// Record kind, `tool_call` for attempts that reached a server.
    pub kind: String,

    pub server: String,
    pub tool: String,

    /// Call arguments after redaction.
    pub args: Value,

    /// Output (or error text) truncated to [`SUMMARY_CHARS`].
    pub output_summary: String,

    /// Wall time of the attempt in seconds, rounded to milliseconds.
    pub elapsed_s: f64,

    pub success: bool,
}

impl LogRecord {
    /// Build a record, redacting `args` and summarizing `output`.
    pub fn new(
        kind: impl Into<String>,
        server: impl Into<String>,
        tool: impl Into<String>,
        args: &Value,
        output: &str,
        elapsed: Duration,
        success: bool,
    ) -> Self {
        Self {
            ts: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            kind: kind.into(),
            server: server.into(),
            tool: tool.into(),
            args: redact(args),
            output_summary: summarize(output, SUMMARY_CHARS),
            elapsed_s: (elapsed.as_secs_f64() * 1000.0).round() / 1000.0,
            success,
        }
    }

    /// Record for an attempt that reached a server.
    pub fn tool_call(
        server: &str,
        tool: &str,
        args: &Value,
        output: &str,
        elapsed: Duration,
        success: bool,
    ) -> Self {
        Self::new("tool_call", server, tool, args, output, elapsed, success)
    }
}

/// Replace sensitive values at any depth.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let lower = k.to_lowercase();
                    if REDACTED_KEYS.contains(&lower.as_str()) {
                        (k.clone(), Value::String(REDACTION.to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Truncate to `max_chars` characters, appending `…` when cut.
pub fn summarize(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Destination for log records.
pub trait LogSink: Send + Sync {
    /// Append one record.
    fn write(&self, record: &LogRecord) -> io::Result<()>;
}

/// JSON-lines file sink for one run.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Create a fresh `<dir>/run_<unix_millis>.jsonl`, creating `dir` if needed.
    ///
    /// A run never shares a file with an earlier one: when the name is taken,
    /// `_1`, `_2`, ... is appended to the stem.
    pub fn create(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let stem = format!("run_{}", chrono::Utc::now().timestamp_millis());

        let mut attempt = 0u32;
        loop {
            let path = if attempt == 0 {
                dir.join(format!("{}.jsonl", stem))
            } else {
                dir.join(format!("{}_{}.jsonl", stem, attempt))
            };
            match OpenOptions::new().create_new(true).append(true).open(&path) {
                Ok(file) => {
                    return Ok(Self {
                        path,
                        file: Mutex::new(file),
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back from a log file.
    pub fn read_records(path: impl AsRef<Path>) -> io::Result<Vec<LogRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            records.push(record);
        }
        Ok(records)
    }
}

impl LogSink for RunLog {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

/// In-memory sink, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records written so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LogSink for MemoryLog {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}
