//! Transcript sink — one JSONL line per routed text.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct TranscriptLine<'a> {
    ts: String,
    seq: u64,
    source_lang: &'a str,
    source_text: &'a str,
    target_lang: &'a str,
    text: &'a str,
}

/// Appends routed lines to a JSONL file. Failures are logged and swallowed;
/// a broken transcript must never stall the pipeline.
pub struct TranscriptWriter {
    path: PathBuf,
    // Serializes appends so concurrent writers cannot interleave lines.
    lock: Mutex<()>,
}

impl TranscriptWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn append(
        &self,
        seq: u64,
        source_lang: &str,
        source_text: &str,
        target_lang: &str,
        text: &str,
    ) {
        let line = TranscriptLine {
            ts: Utc::now().to_rfc3339(),
            seq,
            source_lang,
            source_text,
            target_lang,
            text,
        };
        let json = match serde_json::to_string(&line) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "transcript line serialization failed");
                return;
            }
        };

        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{json}"));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "transcript append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        let writer = TranscriptWriter::new(&path);

        writer.append(0, "ja-JP", "こんにちは", "zh-CN", "你好");
        writer.append(1, "ja-JP", "おはよう", "en-US", "Good morning");

        let data = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = data.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["seq"], 0);
        assert_eq!(first["source_text"], "こんにちは");
        assert_eq!(first["text"], "你好");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["target_lang"], "en-US");
    }

    #[test]
    fn creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/transcript.jsonl");
        let writer = TranscriptWriter::new(&path);
        writer.append(0, "ja-JP", "テスト", "", "テスト");
        assert!(path.exists());
    }
}
