//! Append-only progress log under `.ralphy/progress.txt`.
//!
//! Writes are best-effort product output, not diagnostics: they happen only
//! when the file already exists (opting in is creating the file), and write
//! failures are swallowed so a read-only log never fails a run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::io::config::ralphy_dir;

/// Append a `- [✓|✗] YYYY-MM-DD HH:MM - <task>` line, if the log exists.
pub fn append_progress(root: &Path, succeeded: bool, task: &str) {
    let path = ralphy_dir(root).join("progress.txt");
    if !path.exists() {
        return;
    }
    let mark = if succeeded { "✓" } else { "✗" };
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M");
    let line = format!("- [{mark}] {stamp} - {task}\n");
    let result = OpenOptions::new()
        .append(true)
        .open(&path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(err) = result {
        debug!(path = %path.display(), %err, "progress write failed");
    }
}
