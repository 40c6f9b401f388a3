//! # contract: domain types and the async seams of deploy-mailer
//!
//! Everything the pipelines exchange lives here: the per-file upload request
//! ([`RemoteFile`]), its outcome ([`PushResult`]), the email draft and its
//! attachment, plus the traits the rest of the crate is written against:
//!
//! - [`ApiTransport`]: one HTTP request in, one response out. Production code
//!   uses [`crate::transport::ReqwestTransport`]; tests script it.
//! - [`RepositoryHost`]: the remote repository operations the folder sync and
//!   the front-end need. Implemented by [`crate::github::GitHubClient`].
//! - [`ConsentPrompt`]: the interactive half of the OAuth consent flow.
//! - [`TokenSource`]: hands out a bearer token for the mail API.
//!
//! All traits are annotated for `mockall` so consumers can generate
//! deterministic mocks (exported with the `test-export-mocks` feature).

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// HTTP verbs used by the remote APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// `application/x-www-form-urlencoded` pairs (OAuth token endpoint).
    Form(Vec<(String, String)>),
}

/// A transport-agnostic HTTP request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(pairs));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The JSON body, if any.
    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            Some(RequestBody::Json(v)) => Some(v),
            _ => None,
        }
    }
}

/// A response with its body already decoded.
///
/// JSON bodies are parsed; a non-JSON body is kept as `Value::String`, and an
/// empty body (e.g. `204 No Content`) is `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body rendered as text, for error messages.
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Sends a single HTTP request. No retries, no timeouts beyond library defaults.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// One file to create or update in a remote repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    /// Repository name (owner comes from the client).
    pub repo: String,
    pub branch: String,
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    pub content: Vec<u8>,
    pub message: String,
    /// Content hash of the existing file, when known.
    pub sha: Option<String>,
}

/// Outcome of pushing one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushResult {
    /// Path relative to the pushed folder, `/`-separated.
    pub path: String,
    /// HTTP status, or `None` when no response was received.
    pub status: Option<u16>,
    pub body: Value,
}

impl PushResult {
    /// Created (201) or updated (200).
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200) | Some(201))
    }

    /// The remote's `message` field if present, otherwise the raw payload.
    pub fn failure_message(&self) -> String {
        match self.body.get("message").and_then(Value::as_str) {
            Some(msg) => msg.to_string(),
            None => match &self.body {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }
    }
}

/// Remote repository operations.
///
/// `upsert_file` only errors when no HTTP response was obtained; any status,
/// including non-2xx, is returned to the caller untouched.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Create or update a file, returning the PUT status and response body.
    async fn upsert_file(&self, file: RemoteFile) -> Result<(u16, Value)>;

    /// Names of the authenticated user's repositories (single page of 100).
    /// Empty on any failure.
    async fn list_repositories(&self) -> Vec<String>;

    /// True iff the remote confirmed the deletion.
    async fn delete_repository(&self, name: &str) -> bool;

    /// Login of the token's owner, if the token is accepted.
    async fn authenticated_user(&self) -> Option<String>;
}

/// Drives the user through the OAuth consent screen and returns the
/// authorization code delivered to `redirect_uri`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    fn redirect_uri(&self) -> String;

    async fn obtain_code(&self, authorize_url: &str, state: &str) -> Result<String>;
}

/// Supplies a bearer token for the mail API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A file attached to an outgoing email.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// An editable email draft. Serialised to YAML between `generate` and `send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    #[serde(default = "default_subject")]
    pub subject: String,
    pub body: String,
    /// Path of a file to attach when sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<std::path::PathBuf>,
}

pub const DEFAULT_SUBJECT: &str = "Job Application";

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

impl EmailDraft {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            subject: default_subject(),
            body: body.into(),
            attachment: None,
        }
    }
}

/// Gmail's acknowledgement of a sent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendConfirmation {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_result_success_is_200_or_201_only() {
        let mk = |status| PushResult {
            path: "a.txt".into(),
            status,
            body: Value::Null,
        };
        assert!(mk(Some(200)).is_success());
        assert!(mk(Some(201)).is_success());
        assert!(!mk(Some(204)).is_success());
        assert!(!mk(Some(422)).is_success());
        assert!(!mk(None).is_success());
    }

    #[test]
    fn failure_message_prefers_message_field() {
        let res = PushResult {
            path: "a.txt".into(),
            status: Some(404),
            body: json!({"message": "Not Found", "documentation_url": "x"}),
        };
        assert_eq!(res.failure_message(), "Not Found");

        let raw = PushResult {
            path: "a.txt".into(),
            status: Some(500),
            body: Value::String("upstream down".into()),
        };
        assert_eq!(raw.failure_message(), "upstream down");
    }

    #[test]
    fn draft_yaml_defaults_subject() {
        let draft: EmailDraft = serde_yaml::from_str("body: Hello\n").unwrap();
        assert_eq!(draft.subject, DEFAULT_SUBJECT);
        assert_eq!(draft.body, "Hello");
        assert!(draft.attachment.is_none());
    }

    #[test]
    fn request_header_lookup_is_case_insensitive() {
        let req = ApiRequest::new(HttpMethod::Get, "https://x").header("Authorization", "token t");
        assert_eq!(req.header_value("authorization"), Some("token t"));
        assert!(req.header_value("accept").is_none());
    }
}
