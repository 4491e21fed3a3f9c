use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSONL trace of one or more export jobs. Cloning shares the same file.
#[derive(Clone)]
pub struct CaptureTrace {
    inner: Arc<Mutex<TraceState>>,
}

struct TraceState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl CaptureTrace {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(TraceState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    /// Writes one event line. `event` must be a JSON object; `type` is added.
    pub fn event(&self, kind: &str, mut event: Value) {
        if let Some(map) = event.as_object_mut() {
            map.insert("type".to_string(), Value::String(kind.to_string()));
        }
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{event}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Drains the counters into an `export.summary` line.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counts = std::mem::take(&mut state.counters);
            let line = json!({
                "type": "export.summary",
                "context": context,
                "counts": counts,
            });
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_and_summary_are_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let trace = CaptureTrace::create(&path).unwrap();
        trace.event("capture.section", json!({ "section_id": "kpi", "succeeded": true }));
        trace.increment("sections.succeeded", 1);
        trace.increment("sections.succeeded", 2);
        trace.emit_summary("job");
        trace.flush();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "capture.section");
        assert_eq!(lines[0]["section_id"], "kpi");
        assert_eq!(lines[1]["type"], "export.summary");
        assert_eq!(lines[1]["counts"]["sections.succeeded"], 3);
    }
}
