//! Naming and housekeeping for files in the transfer directory.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ofxfetch_api::timestamp::format_timestamp;
use rand::Rng;

/// Characters that never make it into a file name.
const UNSAFE_NAME_CHARS: &[char] = &[' ', '&', '\\', '/', ':', '*', '?', '"', '<', '>', '|', '(', ')'];

pub const STATEMENT_EXTENSION: &str = "ofx";
pub const QUOTE_HISTORY_FILE: &str = "QuoteHistory.csv";

/// The site name with file-system-hostile characters removed.
pub fn sanitize_site_name(name: &str) -> String {
    name.chars().filter(|c| !UNSAFE_NAME_CHARS.contains(c)).collect()
}

/// `<dir>/<SITE><timestamp><6 random digits>.ofx`
pub fn statement_path(dir: &Path, site_name: &str, now: NaiveDateTime) -> PathBuf {
    unique_path(dir, &sanitize_site_name(site_name), now)
}

/// `<dir>/quotes<timestamp><6 random digits>.ofx`
pub fn quote_path(dir: &Path, now: NaiveDateTime) -> PathBuf {
    unique_path(dir, "quotes", now)
}

fn unique_path(dir: &Path, prefix: &str, now: NaiveDateTime) -> PathBuf {
    let mut rng = rand::thread_rng();
    loop {
        let suffix: u32 = rng.gen_range(100_000..1_000_000);
        let path = dir.join(format!(
            "{}{}{}.{}",
            prefix,
            format_timestamp(now),
            suffix,
            STATEMENT_EXTENSION
        ));
        if !path.exists() {
            return path;
        }
    }
}

/// Creates the transfer directory when it does not exist yet.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Deletes statement files left over from an earlier run. Returns how many
/// were removed. A missing directory counts as empty.
pub fn clear_stale_statements(dir: &Path) -> std::io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        let is_statement = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(STATEMENT_EXTENSION));
        if is_statement && path.is_file() {
            std::fs::remove_file(&path)?;
            tracing::debug!(path = %path.display(), "removed stale statement");
            removed += 1;
        }
    }
    Ok(removed)
}
