//! Loopback server for the OAuth consent redirect.
//!
//! Binds `127.0.0.1` on an OS-assigned port, prints the consent URL and waits
//! for the browser to be redirected back with `?code=...&state=...`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::contract::ConsentPrompt;
use crate::error::{CoreError, Result};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_REQUEST_BYTES: usize = 8192;

const SUCCESS_PAGE: &str = "<html><body><h3>The authentication flow has completed. You may close this window.</h3></body></html>";
const FAILURE_PAGE: &str = "<html><body><h3>Authorization failed. Return to the terminal for details.</h3></body></html>";

pub struct LoopbackConsent {
    listener: TcpListener,
    port: u16,
    timeout: Duration,
}

impl LoopbackConsent {
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        info!(port, "OAuth loopback server listening");
        Ok(Self {
            listener,
            port,
            timeout: CALLBACK_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn wait_for_callback(&self, expected_state: &str) -> Result<String> {
        loop {
            let (stream, _) = self.listener.accept().await?;
            // Browsers sometimes request /favicon.ico first; keep waiting for the callback.
            match handle_connection(stream, expected_state).await {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Dropped a broken loopback connection"),
            }
        }
    }
}

#[async_trait]
impl ConsentPrompt for LoopbackConsent {
    fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    async fn obtain_code(&self, authorize_url: &str, state: &str) -> Result<String> {
        eprintln!("Please visit this URL to authorize this application:\n{authorize_url}");
        match tokio::time::timeout(self.timeout, self.wait_for_callback(state)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Auth("OAuth callback timed out".into())),
        }
    }
}

/// Returns `None` for requests that are not the OAuth callback.
async fn handle_connection(
    mut stream: TcpStream,
    expected_state: &str,
) -> Result<Option<Result<String>>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buffer);
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");
    let params = parse_query(target);

    if !params.contains_key("code") && !params.contains_key("error") {
        respond(&mut stream, "404 Not Found", "").await?;
        return Ok(None);
    }

    let outcome = if let Some(error) = params.get("error") {
        Err(CoreError::Auth(format!("consent denied: {error}")))
    } else if params.get("state").map(String::as_str) != Some(expected_state) {
        warn!("OAuth callback state mismatch");
        Err(CoreError::Auth("state mismatch in OAuth callback".into()))
    } else {
        Ok(params.get("code").cloned().unwrap_or_default())
    };

    let page = if outcome.is_ok() {
        SUCCESS_PAGE
    } else {
        FAILURE_PAGE
    };
    respond(&mut stream, "200 OK", page).await?;
    Ok(Some(outcome))
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Decoded query parameters of a request target such as `/?code=a%2Fb&state=x`.
pub fn parse_query(target: &str) -> HashMap<String, String> {
    let Some((_, query)) = target.split_once('?') else {
        return HashMap::new();
    };
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = value.replace('+', " ");
            let key = urlencoding::decode(key).ok()?.into_owned();
            let value = urlencoding::decode(&value).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}
