//! Input checks run before any network call.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::error::{CoreError, Result};

fn repo_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.-]{1,100}$").expect("repository name pattern is valid")
    })
}

/// Letters, digits, `-`, `_` and `.`, 1 to 100 characters.
pub fn is_valid_repo_name(name: &str) -> bool {
    repo_name_pattern().is_match(name)
}

pub fn validate_repo_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Please provide a repository name.".into(),
        ));
    }
    if !is_valid_repo_name(name) {
        warn!(repo = %name, "Rejected repository name");
        return Err(CoreError::Validation(
            "Repository name contains invalid characters. Use letters, numbers, -, _, or .".into(),
        ));
    }
    Ok(())
}

/// Fails with a message naming `field` when `value` is blank.
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty.")));
    }
    Ok(())
}

/// Fails when `value` contains a line break, which would split a mail header.
pub fn require_single_line(field: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        warn!(field, "Rejected header value with a line break");
        return Err(CoreError::Validation(format!(
            "{field} must not contain line breaks."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        assert!(is_valid_repo_name("my-repo_1.0"));
        assert!(is_valid_repo_name("a"));
        assert!(is_valid_repo_name(&"x".repeat(100)));
    }

    #[test]
    fn rejects_bad_names() {
        assert!(!is_valid_repo_name("my repo!"));
        assert!(!is_valid_repo_name(""));
        assert!(!is_valid_repo_name("owner/repo"));
        assert!(!is_valid_repo_name(&"x".repeat(101)));
    }

    #[test]
    fn validate_repo_name_reports_validation_errors() {
        assert!(validate_repo_name("ok-name").is_ok());
        assert!(validate_repo_name("").unwrap_err().is_validation());
        assert!(validate_repo_name("bad name").unwrap_err().is_validation());
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert!(require_non_empty("branch", "main").is_ok());
        let err = require_non_empty("commit message", "   ").unwrap_err();
        assert!(err.to_string().contains("commit message"));
    }

    #[test]
    fn line_breaks_are_rejected() {
        assert!(require_single_line("Subject", "Backend role").is_ok());
        for value in ["Hi\r\nBcc: x@y.z", "a@b.c\nCc: x@y.z", "tail\r"] {
            let err = require_single_line("Subject", value).unwrap_err();
            assert!(err.is_validation());
            assert!(err.to_string().contains("Subject must not contain line breaks"));
        }
    }
}
