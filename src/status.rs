//! `ragdesk status`: what the state tracker knows and what is waiting.
//!
//! Needs no credentials and makes no network calls.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::loader::scan_pdfs;
use crate::state::{LoadStatus, StateTracker};

pub fn render_status(tracker: &StateTracker, data_dir: &Path, pending: Option<usize>) -> String {
    let mut out = String::new();
    out.push_str("ragdesk: ingestion state\n");
    out.push_str("========================\n\n");

    let size = std::fs::metadata(tracker.path())
        .map(|m| m.len())
        .unwrap_or(0);
    out.push_str(&format!("  State file:  {}\n", tracker.path().display()));
    out.push_str(&format!("  Size:        {}\n", format_bytes(size)));
    let status = match tracker.load_status() {
        LoadStatus::Fresh => "not created yet".to_string(),
        LoadStatus::Empty => "empty".to_string(),
        LoadStatus::Loaded(n) => format!("loaded ({} records)", n),
        LoadStatus::Corrupt(reason) => format!("corrupt, treated as empty ({})", reason),
        LoadStatus::Unreadable(reason) => format!("unreadable, treated as empty ({})", reason),
    };
    out.push_str(&format!("  Status:      {}\n\n", status));

    out.push_str(&format!("  Data folder: {}\n", data_dir.display()));
    match pending {
        Some(n) => out.push_str(&format!("  Pending:     {} PDF file(s)\n", n)),
        None => out.push_str("  Pending:     folder missing\n"),
    }
    out.push_str(&format!("  Tracked:     {} file(s)\n", tracker.len()));

    if !tracker.is_empty() {
        out.push('\n');
        out.push_str(&format!("  {:<12}  {}\n", "HASH", "FILE"));
        out.push_str(&format!("  {}\n", "-".repeat(40)));
        for (digest, filename) in tracker.records() {
            let short: String = digest.chars().take(12).collect();
            out.push_str(&format!("  {:<12}  {}\n", short, filename));
        }
    }
    out
}

pub fn run_status(config: &Config) -> Result<()> {
    let tracker = StateTracker::open(config.state_path());
    let data_dir = &config.ingest.data_dir;
    let pending = if data_dir.is_dir() {
        Some(scan_pdfs(data_dir)?.len())
    } else {
        None
    };
    print!("{}", render_status(&tracker, data_dir, pending));
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_tracker_status() {
        let tmp = TempDir::new().unwrap();
        let tracker = StateTracker::open(tmp.path().join("state.json"));
        let out = render_status(&tracker, &tmp.path().join("data"), None);
        assert!(out.contains("not created yet"));
        assert!(out.contains("folder missing"));
        assert!(out.contains("Tracked:     0 file(s)"));
        assert!(!out.contains("HASH"));
    }

    #[test]
    fn records_listed_with_short_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        let mut tracker = StateTracker::open(&path);
        tracker
            .record_processed("abcdef0123456789abcdef", "report.pdf")
            .unwrap();

        let reopened = StateTracker::open(&path);
        let out = render_status(&reopened, tmp.path(), Some(2));
        assert!(out.contains("loaded (1 records)"));
        assert!(out.contains("abcdef012345  report.pdf"));
        assert!(out.contains("Pending:     2 PDF file(s)"));
    }

    #[test]
    fn corrupt_state_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();

        let tracker = StateTracker::open(&path);
        let out = render_status(&tracker, tmp.path(), Some(0));
        assert!(out.contains("corrupt, treated as empty"));
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(12), "12 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
