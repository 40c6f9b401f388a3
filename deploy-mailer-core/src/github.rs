//! # github: Remote Repository Client
//!
//! Thin wrapper over the GitHub REST endpoints the tool needs:
//!
//! - `GET/PUT /repos/{owner}/{repo}/contents/{path}` for create-or-update
//! - `GET /user/repos?per_page=100` for listing
//! - `DELETE /repos/{owner}/{repo}` for deletion
//! - `GET /user` to check the token
//!
//! Every call is a single request, authenticated with `Authorization: token <TOKEN>`.
//! Nothing is retried and no pagination beyond the first page is attempted.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::contract::{ApiRequest, ApiTransport, HttpMethod, RemoteFile, RepositoryHost};
use crate::error::Result;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "deploy-mailer";
const REPOS_PAGE_SIZE: u32 = 100;

pub struct GitHubClient<T> {
    transport: T,
    api_base: String,
    owner: String,
    token: String,
}

impl<T: ApiTransport> GitHubClient<T> {
    /// `owner` is the account that owns the repositories being written to or deleted.
    pub fn new(
        transport: T,
        api_base: impl Into<String>,
        owner: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            transport,
            api_base,
            owner: owner.into(),
            token: token.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn request(&self, method: HttpMethod, url: String) -> ApiRequest {
        ApiRequest::new(method, url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
    }

    fn contents_url(&self, repo: &str, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            repo,
            encode_path(path)
        )
    }

    /// Looks up the content hash of `path` on `branch`, if the file exists.
    async fn existing_sha(&self, repo: &str, branch: &str, path: &str) -> Result<Option<String>> {
        let req = self
            .request(HttpMethod::Get, self.contents_url(repo, path))
            .query("ref", branch);
        let res = self.transport.send(req).await?;
        if res.status != 200 {
            debug!(repo, path, status = res.status, "No existing file found");
            return Ok(None);
        }
        Ok(res.body.get("sha").and_then(Value::as_str).map(str::to_string))
    }
}

/// Percent-encodes each segment of a `/`-separated path.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl<T: ApiTransport> RepositoryHost for GitHubClient<T> {
    async fn upsert_file(&self, file: RemoteFile) -> Result<(u16, Value)> {
        info!(
            repo = %file.repo,
            branch = %file.branch,
            path = %file.path,
            bytes = file.content.len(),
            "Upserting file"
        );

        // A freshly fetched hash wins over one supplied by the caller.
        let sha = self
            .existing_sha(&file.repo, &file.branch, &file.path)
            .await?
            .or(file.sha);

        let mut body = json!({
            "message": file.message,
            "content": BASE64.encode(&file.content),
            "branch": file.branch,
        });
        if let Some(sha) = &sha {
            body["sha"] = Value::String(sha.clone());
        }

        let req = self
            .request(HttpMethod::Put, self.contents_url(&file.repo, &file.path))
            .json(body);
        let res = self.transport.send(req).await?;

        if res.is_success() {
            info!(path = %file.path, status = res.status, updated = sha.is_some(), "File pushed");
        } else {
            warn!(path = %file.path, status = res.status, body = %res.body_text(), "File push rejected");
        }
        Ok((res.status, res.body))
    }

    async fn list_repositories(&self) -> Vec<String> {
        let req = self
            .request(HttpMethod::Get, format!("{}/user/repos", self.api_base))
            .query("per_page", REPOS_PAGE_SIZE.to_string());

        match self.transport.send(req).await {
            Ok(res) if res.status == 200 => {
                let names: Vec<String> = res
                    .body
                    .as_array()
                    .map(|repos| {
                        repos
                            .iter()
                            .filter_map(|r| r.get("name").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                info!(count = names.len(), "Listed repositories");
                names
            }
            Ok(res) => {
                warn!(status = res.status, "Listing repositories failed");
                Vec::new()
            }
            Err(e) => {
                error!(error = %e, "Listing repositories failed");
                Vec::new()
            }
        }
    }

    async fn delete_repository(&self, name: &str) -> bool {
        let url = format!("{}/repos/{}/{}", self.api_base, self.owner, name);
        match self.transport.send(self.request(HttpMethod::Delete, url)).await {
            Ok(res) if res.status == 204 => {
                info!(repo = name, "Repository deleted");
                true
            }
            Ok(res) => {
                warn!(repo = name, status = res.status, body = %res.body_text(), "Repository deletion refused");
                false
            }
            Err(e) => {
                error!(repo = name, error = %e, "Repository deletion failed");
                false
            }
        }
    }

    async fn authenticated_user(&self) -> Option<String> {
        let url = format!("{}/user", self.api_base);
        match self.transport.send(self.request(HttpMethod::Get, url)).await {
            Ok(res) if res.status == 200 => res
                .body
                .get("login")
                .and_then(Value::as_str)
                .map(str::to_string),
            Ok(res) => {
                warn!(status = res.status, "GitHub token rejected");
                None
            }
            Err(e) => {
                error!(error = %e, "GitHub token check failed");
                None
            }
        }
    }
}
