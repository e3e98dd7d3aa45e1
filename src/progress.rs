//! Ingestion progress reporting.
//!
//! Per-file outcomes and upload progress for `ragdesk ingest`, emitted on
//! **stderr** so the stdout summary stays parseable for scripts.

use std::io::Write;

/// What happened to one candidate file during the scan phase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileOutcome {
    /// Content hash already recorded; nothing to do.
    Skipped,
    /// Same bytes as an earlier candidate (`of`) in this run.
    Duplicate { of: String },
    HashFailed(String),
    LoadFailed(String),
    /// Loaded, but no text survived splitting (likely a scanned image).
    Empty,
    Loaded { pages: usize },
}

impl FileOutcome {
    fn label(&self) -> &'static str {
        match self {
            FileOutcome::Skipped => "skipped",
            FileOutcome::Duplicate { .. } => "duplicate",
            FileOutcome::HashFailed(_) => "hash-failed",
            FileOutcome::LoadFailed(_) => "load-failed",
            FileOutcome::Empty => "empty",
            FileOutcome::Loaded { .. } => "loaded",
        }
    }
}

#[derive(Clone, Debug)]
pub enum IngestEvent {
    /// Candidate scan finished.
    Scanned { files: u64 },
    File { name: String, outcome: FileOutcome },
    /// `n` of `total` chunks uploaded so far.
    Uploading { n: u64, total: u64 },
    /// File moved to the archive and recorded as processed.
    Committed { name: String },
    /// Upload succeeded but archiving or recording did not.
    CommitFailed { name: String, reason: String },
}

pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly lines: "ingest report.pdf  loaded (12 pages)".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Scanned { files } => {
                format!("ingest  found {} PDF file(s)\n", format_number(*files))
            }
            IngestEvent::File { name, outcome } => match outcome {
                FileOutcome::Loaded { pages } => {
                    format!("ingest {}  loaded ({} pages)\n", name, pages)
                }
                FileOutcome::HashFailed(reason) | FileOutcome::LoadFailed(reason) => {
                    format!("ingest {}  {}: {}\n", name, outcome.label(), reason)
                }
                FileOutcome::Empty => {
                    format!("ingest {}  empty (no extractable text)\n", name)
                }
                FileOutcome::Skipped => format!("ingest {}  skipped\n", name),
                FileOutcome::Duplicate { of } => {
                    format!("ingest {}  duplicate of {}\n", name, of)
                }
            },
            IngestEvent::Uploading { n, total } => format!(
                "ingest  uploading  {} / {} chunks\n",
                format_number(*n),
                format_number(*total)
            ),
            IngestEvent::Committed { name } => format!("ingest {}  archived\n", name),
            IngestEvent::CommitFailed { name, reason } => {
                format!("ingest {}  commit-failed: {}\n", name, reason)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &IngestEvent) -> serde_json::Value {
    match event {
        IngestEvent::Scanned { files } => serde_json::json!({
            "event": "scanned",
            "files": files
        }),
        IngestEvent::File { name, outcome } => {
            let mut obj = serde_json::json!({
                "event": "file",
                "file": name,
                "outcome": outcome.label()
            });
            match outcome {
                FileOutcome::Loaded { pages } => obj["pages"] = serde_json::json!(pages),
                FileOutcome::HashFailed(reason) | FileOutcome::LoadFailed(reason) => {
                    obj["reason"] = serde_json::json!(reason)
                }
                FileOutcome::Duplicate { of } => obj["duplicate_of"] = serde_json::json!(of),
                FileOutcome::Skipped | FileOutcome::Empty => {}
            }
            obj
        }
        IngestEvent::Uploading { n, total } => serde_json::json!({
            "event": "progress",
            "phase": "uploading",
            "n": n,
            "total": total
        }),
        IngestEvent::Committed { name } => serde_json::json!({
            "event": "committed",
            "file": name
        }),
        IngestEvent::CommitFailed { name, reason } => serde_json::json!({
            "event": "commit-failed",
            "file": name,
            "reason": reason
        }),
    }
}

pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human lines when stderr is a TTY, JSON lines otherwise. Per-file
    /// outcomes are always reported unless `--progress off` is given.
    pub fn default_for_tty() -> Self {
        Self::default_for(atty::is(atty::Stream::Stderr))
    }

    fn default_for(stderr_is_tty: bool) -> Self {
        if stderr_is_tty {
            ProgressMode::Human
        } else {
            ProgressMode::Json
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_file_event_carries_reason() {
        let obj = event_json(&IngestEvent::File {
            name: "bad.pdf".to_string(),
            outcome: FileOutcome::LoadFailed("not a PDF".to_string()),
        });
        assert_eq!(obj["outcome"], "load-failed");
        assert_eq!(obj["reason"], "not a PDF");
        assert_eq!(obj["file"], "bad.pdf");
    }

    #[test]
    fn default_mode_never_silences_file_outcomes() {
        assert_eq!(ProgressMode::default_for(true), ProgressMode::Human);
        assert_eq!(ProgressMode::default_for(false), ProgressMode::Json);
    }

    #[test]
    fn json_duplicate_event_names_first_copy() {
        let obj = event_json(&IngestEvent::File {
            name: "a-copy.pdf".to_string(),
            outcome: FileOutcome::Duplicate {
                of: "a.pdf".to_string(),
            },
        });
        assert_eq!(obj["outcome"], "duplicate");
        assert_eq!(obj["duplicate_of"], "a.pdf");
    }

    #[test]
    fn json_loaded_event_carries_pages() {
        let obj = event_json(&IngestEvent::File {
            name: "a.pdf".to_string(),
            outcome: FileOutcome::Loaded { pages: 3 },
        });
        assert_eq!(obj["pages"], 3);
        assert!(obj.get("reason").is_none());
    }
}
