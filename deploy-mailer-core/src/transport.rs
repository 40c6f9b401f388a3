//! Production [`ApiTransport`] backed by `reqwest`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use crate::contract::{ApiRequest, ApiResponse, ApiTransport, HttpMethod, RequestBody};
use crate::error::Result;

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            Some(RequestBody::Json(body)) => builder.json(body),
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, url = %request.url, "HTTP request failed");
            e
        })?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        debug!(status, url = %request.url, bytes = text.len(), "HTTP response received");

        Ok(ApiResponse {
            status,
            body: decode_body(&text),
        })
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_body_handles_json_text_and_empty() {
        assert_eq!(decode_body(""), Value::Null);
        assert_eq!(decode_body("  \n"), Value::Null);
        assert_eq!(decode_body(r#"{"sha":"abc"}"#), json!({"sha": "abc"}));
        assert_eq!(
            decode_body("Bad credentials"),
            Value::String("Bad credentials".into())
        );
    }
}
