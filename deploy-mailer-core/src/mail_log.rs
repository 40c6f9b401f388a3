//! Plain-text log of every email that left the tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use tracing::info;

use crate::contract::EmailDraft;
use crate::error::Result;

pub const DEFAULT_LOG_DIR: &str = "logs";

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("file name pattern is valid"))
}

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    unsafe_chars().replace_all(name, "_").into_owned()
}

/// `job_email_<YYYYmmdd-HHMMSS>.txt` for the given moment.
pub fn log_file_name(at: DateTime<Local>) -> String {
    sanitize_file_name(&format!("job_email_{}.txt", at.format("%Y%m%d-%H%M%S")))
}

pub fn render_entry(draft: &EmailDraft, to: &str, from: &str) -> String {
    format!(
        "To: {to}\nFrom: {from}\nSubject: {}\n\n{}",
        draft.subject, draft.body
    )
}

/// Writes the entry into `log_dir`, creating the directory if needed.
pub fn write_entry_at(
    log_dir: &Path,
    draft: &EmailDraft,
    to: &str,
    from: &str,
    at: DateTime<Local>,
) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file_name(at));
    fs::write(&path, render_entry(draft, to, from))?;
    info!(path = %path.display(), "Email logged");
    Ok(path)
}

pub fn write_entry(log_dir: &Path, draft: &EmailDraft, to: &str, from: &str) -> Result<PathBuf> {
    write_entry_at(log_dir, draft, to, from, Local::now())
}
