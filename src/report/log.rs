//! Append-only JSON-lines run log
//!
//! Every run writes one file (`deployment-<timestamp>.jsonl` or
//! `test-results-<timestamp>.jsonl`) with one JSON object per event. A write
//! failure mid-run is reported once and then the sink goes quiet; it never
//! stops the run.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::{ChainrollError, Result};

/// Run log sink owned by the orchestration run
#[derive(Debug)]
pub struct RunLog {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl RunLog {
    /// Create a new log file named `<prefix>-<timestamp>.jsonl` under `dir`
    pub fn create(dir: &Path, prefix: &str) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| ChainrollError::LogWriteFailed {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let stamp = Utc::now().format("%Y%m%d-%H%M%S%.3f");
        Self::append_to(&dir.join(format!("{prefix}-{stamp}.jsonl")))
    }

    /// Open `path` for appending, creating it if needed
    pub fn append_to(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ChainrollError::LogWriteFailed {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ChainrollError::LogWriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self {
            path: None,
            writer: None,
            written: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of events written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Append one event; object fields are merged next to `ts` and `event`
    pub fn event(&mut self, kind: &str, fields: Value) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let mut line = Map::new();
        line.insert("ts".to_string(), Value::String(Utc::now().to_rfc3339()));
        line.insert("event".to_string(), Value::String(kind.to_string()));
        match fields {
            Value::Object(map) => line.extend(map),
            Value::Null => {}
            other => {
                line.insert("data".to_string(), other);
            }
        }

        let result = serde_json::to_writer(&mut *writer, &Value::Object(line))
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());

        match result {
            Ok(()) => self.written += 1,
            Err(e) => {
                tracing::warn!(
                    path = ?self.path,
                    error = %e,
                    "run log write failed, further events are dropped"
                );
                self.writer = None;
            }
        }
    }
}
