//! Test utilities: an in-memory GitHub contents store speaking the
//! [`ApiTransport`] protocol.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::contract::{ApiRequest, ApiResponse, ApiTransport, HttpMethod};
use crate::error::Result;

#[derive(Default)]
struct Store {
    /// contents path (as it appears in the URL) -> current sha
    files: HashMap<String, String>,
    puts: Vec<Value>,
    requests: Vec<ApiRequest>,
}

/// Emulates `GET`/`PUT /repos/{owner}/{repo}/contents/{path}`.
///
/// A PUT without the current sha for an existing file is rejected with 422,
/// like the real API; a PUT with a stale sha gets 409.
#[derive(Clone, Default)]
pub struct FakeGitHub {
    store: Arc<Mutex<Store>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON bodies of every PUT received, in order.
    pub fn puts(&self) -> Vec<Value> {
        self.store.lock().unwrap().puts.clone()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.store.lock().unwrap().requests.clone()
    }

    pub fn file_count(&self) -> usize {
        self.store.lock().unwrap().files.len()
    }

    /// Paths stored, relative to `contents/`.
    pub fn paths(&self) -> Vec<String> {
        let store = self.store.lock().unwrap();
        let mut paths: Vec<String> = store
            .files
            .keys()
            .filter_map(|k| k.split_once("/contents/").map(|(_, p)| p.to_string()))
            .collect();
        paths.sort();
        paths
    }
}

fn blob_sha(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl ApiTransport for FakeGitHub {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut store = self.store.lock().unwrap();
        store.requests.push(request.clone());
        let key = request.url.clone();

        let response = match request.method {
            HttpMethod::Get => match store.files.get(&key) {
                Some(sha) => ApiResponse::new(200, json!({ "sha": sha, "type": "file" })),
                None => ApiResponse::new(404, json!({ "message": "Not Found" })),
            },
            HttpMethod::Put => {
                let body = request.json_body().cloned().unwrap_or(Value::Null);
                store.puts.push(body.clone());
                let sent_sha = body.get("sha").and_then(Value::as_str).map(str::to_string);
                let content = body
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let new_sha = blob_sha(&content);
                let existing = store.files.get(&key).cloned();
                match (existing, sent_sha) {
                    (None, _) => {
                        store.files.insert(key, new_sha.clone());
                        ApiResponse::new(201, json!({ "content": { "sha": new_sha } }))
                    }
                    (Some(_), None) => ApiResponse::new(
                        422,
                        json!({ "message": "Invalid request.\n\n\"sha\" wasn't supplied." }),
                    ),
                    (Some(current), Some(sent)) if current == sent => {
                        store.files.insert(key, new_sha.clone());
                        ApiResponse::new(200, json!({ "content": { "sha": new_sha } }))
                    }
                    (Some(_), Some(_)) => {
                        ApiResponse::new(409, json!({ "message": "sha does not match" }))
                    }
                }
            }
            HttpMethod::Post | HttpMethod::Delete => {
                ApiResponse::new(405, json!({ "message": "Method not supported by fake" }))
            }
        };
        Ok(response)
    }
}
