//! # gmail: Mail Dispatcher
//!
//! Builds a `multipart/mixed` RFC-822 message (plain-text body plus an optional
//! binary attachment), base64url-encodes it and submits it to
//! `users/me/messages/send`. Any failure is returned as an error; nothing is retried.

use std::path::Path;

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE},
    Engine,
};
use serde_json::json;
use tracing::{error, info};

use crate::contract::{
    ApiRequest, ApiTransport, Attachment, EmailDraft, HttpMethod, SendConfirmation, TokenSource,
};
use crate::error::{CoreError, Result};
use crate::validation::{require_non_empty, require_single_line};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
const LINE_WIDTH: usize = 76;

/// Reads a file to attach, named after its file name.
pub fn load_attachment(path: &Path) -> Result<Attachment> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CoreError::Validation(format!("{} has no file name", path.display())))?;
    let data = std::fs::read(path)?;
    Ok(Attachment { filename, data })
}

/// Encodes a header value as an RFC 2047 word when it is not plain ASCII.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?b?{}?=", BASE64.encode(value.as_bytes()))
    }
}

fn wrapped_base64(data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    encoded
        .as_bytes()
        .chunks(LINE_WIDTH)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Quoted filename for MIME parameters; quotes and line breaks are dropped.
fn quote_param(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '"' | '\r' | '\n' | '\\'))
        .collect()
}

/// Renders the full RFC-822 message. `boundary` must not occur in the payload,
/// which holds for any boundary because every part is base64-encoded. Header
/// values are written as given; [`MailDispatcher::send`] rejects line breaks first.
pub fn build_message(
    draft: &EmailDraft,
    to: &str,
    from: &str,
    attachment: Option<&Attachment>,
    boundary: &str,
) -> String {
    let mut msg = String::new();
    msg.push_str(&format!("Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n"));
    msg.push_str("MIME-Version: 1.0\r\n");
    msg.push_str(&format!("to: {to}\r\n"));
    msg.push_str(&format!("from: {from}\r\n"));
    msg.push_str(&format!("subject: {}\r\n", encode_header(&draft.subject)));
    msg.push_str("\r\n");

    msg.push_str(&format!("--{boundary}\r\n"));
    msg.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n");
    msg.push_str("MIME-Version: 1.0\r\n");
    msg.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    msg.push_str(&wrapped_base64(draft.body.as_bytes()));
    msg.push_str("\r\n");

    if let Some(att) = attachment {
        let name = quote_param(&att.filename);
        msg.push_str(&format!("--{boundary}\r\n"));
        msg.push_str(&format!(
            "Content-Type: application/octet-stream; name=\"{name}\"\r\n"
        ));
        msg.push_str("MIME-Version: 1.0\r\n");
        msg.push_str("Content-Transfer-Encoding: base64\r\n");
        msg.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{name}\"\r\n\r\n"
        ));
        msg.push_str(&wrapped_base64(&att.data));
        msg.push_str("\r\n");
    }

    msg.push_str(&format!("--{boundary}--\r\n"));
    msg
}

pub struct MailDispatcher<T, S> {
    transport: T,
    tokens: S,
    api_base: String,
}

impl<T: ApiTransport, S: TokenSource> MailDispatcher<T, S> {
    pub fn new(transport: T, tokens: S, api_base: impl Into<String>) -> Self {
        Self {
            transport,
            tokens,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Sends `draft` from `from` to `to`, with an optional attachment.
    pub async fn send(
        &self,
        draft: &EmailDraft,
        to: &str,
        from: &str,
        attachment: Option<&Attachment>,
    ) -> Result<SendConfirmation> {
        require_non_empty("Recipient address", to)?;
        require_non_empty("Sender address", from)?;
        require_single_line("Recipient address", to)?;
        require_single_line("Sender address", from)?;
        require_single_line("Subject", &draft.subject)?;

        let boundary = format!("==============={}==", uuid::Uuid::new_v4().simple());
        let raw = URL_SAFE.encode(build_message(draft, to, from, attachment, &boundary));

        let token = self.tokens.access_token().await?;
        let url = format!("{}/gmail/v1/users/me/messages/send", self.api_base);
        info!(
            to,
            from,
            attachment = attachment.map(|a| a.filename.as_str()).unwrap_or("none"),
            "Sending email"
        );
        let res = self
            .transport
            .send(
                ApiRequest::new(HttpMethod::Post, url)
                    .header("Authorization", format!("Bearer {token}"))
                    .json(json!({ "raw": raw })),
            )
            .await?;

        if !res.is_success() {
            error!(status = res.status, body = %res.body_text(), "Gmail send failed");
            return Err(CoreError::Api {
                status: res.status,
                body: res.body_text(),
            });
        }
        let confirmation: SendConfirmation = serde_json::from_value(res.body)?;
        info!(message_id = %confirmation.id, "Email sent");
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ApiResponse, MockApiTransport, MockTokenSource};

    fn draft() -> EmailDraft {
        EmailDraft::new("Dear team,\nI am applying.")
    }

    fn decode_raw(raw: &str) -> String {
        String::from_utf8(URL_SAFE.decode(raw).unwrap()).unwrap()
    }

    #[test]
    fn message_without_attachment_has_single_text_part() {
        let msg = build_message(&draft(), "hr@corp.test", "me@mail.test", None, "BOUND");
        assert!(msg.contains("to: hr@corp.test\r\n"));
        assert!(msg.contains("from: me@mail.test\r\n"));
        assert!(msg.contains("subject: Job Application\r\n"));
        assert_eq!(msg.matches("--BOUND\r\n").count(), 1);
        assert!(msg.ends_with("--BOUND--\r\n"));
        assert!(msg.contains(&BASE64.encode("Dear team,\nI am applying.")));
    }

    #[test]
    fn attachment_part_is_base64_with_disposition() {
        let att = Attachment {
            filename: "resume.pdf".into(),
            data: vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xff],
        };
        let msg = build_message(&draft(), "a@b.c", "d@e.f", Some(&att), "BOUND");
        assert_eq!(msg.matches("--BOUND\r\n").count(), 2);
        assert!(msg.contains("Content-Disposition: attachment; filename=\"resume.pdf\""));
        assert!(msg.contains(&BASE64.encode(&att.data)));
    }

    #[test]
    fn non_ascii_subject_is_encoded_and_long_bodies_wrapped() {
        let mut d = EmailDraft::new("x".repeat(200));
        d.subject = "Candidature – Ingénieur".into();
        let msg = build_message(&d, "a@b.c", "d@e.f", None, "B");
        assert!(msg.contains("subject: =?utf-8?b?"));
        assert!(msg.lines().all(|l| l.len() <= LINE_WIDTH));
    }

    #[tokio::test]
    async fn send_posts_raw_message_with_bearer_token() {
        let mut tokens = MockTokenSource::new();
        tokens
            .expect_access_token()
            .times(1)
            .returning(|| Ok("ya29.t".to_string()));

        let mut transport = MockApiTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                let raw = req
                    .json_body()
                    .and_then(|b| b["raw"].as_str())
                    .map(decode_raw)
                    .unwrap_or_default();
                req.url == "https://mail.test/gmail/v1/users/me/messages/send"
                    && req.header_value("Authorization") == Some("Bearer ya29.t")
                    && raw.contains("to: hr@corp.test")
                    && raw.contains("filename=\"cv.txt\"")
            })
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::new(
                    200,
                    serde_json::json!({"id": "18c0", "threadId": "18c0", "labelIds": ["SENT"]}),
                ))
            });

        let dispatcher = MailDispatcher::new(transport, tokens, "https://mail.test/");
        let att = Attachment {
            filename: "cv.txt".into(),
            data: b"cv".to_vec(),
        };
        let sent = dispatcher
            .send(&draft(), "hr@corp.test", "me@mail.test", Some(&att))
            .await
            .unwrap();
        assert_eq!(sent.id, "18c0");
        assert_eq!(sent.label_ids, vec!["SENT"]);
    }

    #[tokio::test]
    async fn missing_addresses_fail_before_authentication() {
        let mut tokens = MockTokenSource::new();
        tokens.expect_access_token().never();
        let dispatcher = MailDispatcher::new(MockApiTransport::new(), tokens, GMAIL_API_BASE);
        let err = dispatcher
            .send(&draft(), "", "me@mail.test", None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn line_breaks_in_headers_are_rejected_before_authentication() {
        let mut injected_subject = draft();
        injected_subject.subject = "Hello\r\nBcc: attacker@evil.test".into();
        let cases = [
            (injected_subject, "hr@corp.test", "me@mail.test", "Subject"),
            (draft(), "hr@corp.test\r\nCc: x@y.z", "me@mail.test", "Recipient address"),
            (draft(), "hr@corp.test", "me@mail.test\nBcc: x@y.z", "Sender address"),
        ];
        for (d, to, from, field) in cases {
            let mut tokens = MockTokenSource::new();
            tokens.expect_access_token().never();
            let mut transport = MockApiTransport::new();
            transport.expect_send().never();
            let dispatcher = MailDispatcher::new(transport, tokens, GMAIL_API_BASE);

            let err = dispatcher.send(&d, to, from, None).await.unwrap_err();
            assert!(err.is_validation());
            assert!(err.to_string().contains(field));
        }
    }

    #[tokio::test]
    async fn rejected_send_is_an_error() {
        let mut tokens = MockTokenSource::new();
        tokens.expect_access_token().returning(|| Ok("t".to_string()));
        let mut transport = MockApiTransport::new();
        transport.expect_send().returning(|_| {
            Ok(ApiResponse::new(
                403,
                serde_json::json!({"error": {"message": "Insufficient Permission"}}),
            ))
        });
        let dispatcher = MailDispatcher::new(transport, tokens, GMAIL_API_BASE);
        let err = dispatcher
            .send(&draft(), "a@b.c", "d@e.f", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Api { status: 403, .. }));
    }
}
