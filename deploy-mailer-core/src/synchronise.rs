//! High-level pipeline: push every file of a local folder to a remote repository.
//!
//! [`push_folder`] walks a directory tree and calls
//! [`RepositoryHost::upsert_file`] once per regular file, strictly one after
//! the other, collecting a [`PushResult`] for each.
//!
//! # Failure policy
//! Continue-and-report. Target validation happens before any network call and
//! aborts the whole push. After that, nothing aborts the walk: a rejected file
//! (non-2xx status), a transport failure or an unreadable local file is
//! recorded in the report and the next file is pushed. Files already pushed
//! stay pushed; there is no rollback.
//!
//! # Navigation
//! - Main entrypoint: [`push_folder`]
//! - Supporting types: [`PushTarget`], [`SyncReport`]

use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::contract::{PushResult, RemoteFile, RepositoryHost};
use crate::error::{CoreError, Result};
use crate::validation::{require_non_empty, validate_repo_name};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Add folder contents";

/// Where a folder is pushed to.
#[derive(Debug, Clone, PartialEq)]
pub struct PushTarget {
    pub repo: String,
    pub branch: String,
    pub message: String,
}

impl PushTarget {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_repo_name(&self.repo)?;
        require_non_empty("Branch", &self.branch)?;
        require_non_empty("Commit message", &self.message)?;
        Ok(())
    }
}

/// Per-file outcomes of one folder push.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub results: Vec<PushResult>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// `(path, "OK" | "ERR: <message>")` rows for display.
    pub fn rows(&self) -> Vec<(String, String)> {
        self.results
            .iter()
            .map(|r| {
                let outcome = if r.is_success() {
                    "OK".to_string()
                } else {
                    format!("ERR: {}", r.failure_message())
                };
                (r.path.clone(), outcome)
            })
            .collect()
    }
}

/// Path of `path` relative to `root`, joined with `/` whatever the platform.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().replace('\\', "/"))
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

fn local_failure(path: String, message: String) -> PushResult {
    PushResult {
        path,
        status: None,
        body: json!({ "message": message }),
    }
}

/// Pushes every file under `root` to `target`, in filesystem traversal order.
pub async fn push_folder<H>(host: &H, root: &Path, target: &PushTarget) -> Result<SyncReport>
where
    H: RepositoryHost + ?Sized,
{
    target.validate()?;
    if !root.is_dir() {
        return Err(CoreError::Validation(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    info!(
        root = %root.display(),
        repo = %target.repo,
        branch = %target.branch,
        "[SYNC] Starting folder push"
    );
    let mut report = SyncReport::default();

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| relative_slash_path(root, p))
                    .unwrap_or_else(|| root.display().to_string());
                error!(path = %path, error = %e, "[SYNC][ERROR] Failed to walk directory entry");
                report.results.push(local_failure(path, e.to_string()));
                continue;
            }
        };
        if !entry.path().is_file() {
            continue;
        }
        let Some(rel_path) = relative_slash_path(root, entry.path()) else {
            continue;
        };

        let content = match std::fs::read(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %rel_path, error = %e, "[SYNC][ERROR] Failed to read local file");
                report.results.push(local_failure(rel_path, e.to_string()));
                continue;
            }
        };
        debug!(path = %rel_path, bytes = content.len(), "[SYNC] Pushing file");

        let file = RemoteFile {
            repo: target.repo.clone(),
            branch: target.branch.clone(),
            path: rel_path.clone(),
            content,
            message: target.message.clone(),
            sha: None,
        };
        let result = match host.upsert_file(file).await {
            Ok((status, body)) => PushResult {
                path: rel_path,
                status: Some(status),
                body,
            },
            Err(e) => {
                error!(path = %rel_path, error = %e, "[SYNC][ERROR] Upload failed");
                local_failure(rel_path, e.to_string())
            }
        };
        if !result.is_success() {
            warn!(path = %result.path, status = ?result.status, "[SYNC] File not pushed");
        }
        report.results.push(result);
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "[SYNC] Folder push finished"
    );
    Ok(report)
}
