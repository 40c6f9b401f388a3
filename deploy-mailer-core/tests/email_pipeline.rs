use std::fs;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{Duration, Utc};
use deploy_mailer_core::contract::{
    ApiResponse, EmailDraft, HttpMethod, MockApiTransport, MockConsentPrompt,
};
use deploy_mailer_core::credentials::{save_token, CredentialProvider, StoredToken};
use deploy_mailer_core::generator::{combine_skills, EmailDraftGenerator, GeminiSettings};
use deploy_mailer_core::gmail::{load_attachment, MailDispatcher};
use deploy_mailer_core::mail_log;
use serde_json::json;
use tempfile::tempdir;

#[tokio::test]
async fn generated_draft_contains_no_markdown_markers() {
    let mut transport = MockApiTransport::new();
    transport
        .expect_send()
        .withf(|req| {
            let prompt = req.json_body().unwrap()["contents"][0]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            prompt.contains("Backend Engineer, 3 yrs Python")
                && prompt.contains("Built REST APIs, PostgreSQL please mention remote work")
        })
        .returning(|_| {
            Ok(ApiResponse::new(
                200,
                json!({"candidates": [{"content": {"parts": [{
                    "text": "**Subject: Application for Backend Engineer**\n\nDear __Hiring__ Manager,\n\nI have **built REST APIs** with PostgreSQL."
                }]}}]}),
            ))
        });

    let generator = EmailDraftGenerator::new(transport, GeminiSettings::new("key"));
    let skills = combine_skills(
        "Built REST APIs, PostgreSQL",
        Some("please mention remote work"),
    );
    let draft = generator
        .generate_draft("Backend Engineer, 3 yrs Python", &skills)
        .await
        .unwrap();

    assert!(!draft.body.contains("**"));
    assert!(!draft.body.contains("__"));
    assert!(draft.body.contains("Dear Hiring Manager"));
}

#[tokio::test]
async fn stored_token_is_used_to_send_and_entry_is_logged() {
    let dir = tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    save_token(
        &token_path,
        &StoredToken {
            token: "ya29.stored".into(),
            refresh_token: Some("1//r".into()),
            token_uri: "https://oauth2.test/token".into(),
            client_id: "cid".into(),
            client_secret: Some("secret".into()),
            scopes: vec!["https://www.googleapis.com/auth/gmail.send".into()],
            expiry: Some(Utc::now() + Duration::hours(1)),
        },
    )
    .unwrap();

    let mut consent = MockConsentPrompt::new();
    consent.expect_obtain_code().never();
    let provider = CredentialProvider::new(
        MockApiTransport::new(),
        consent,
        dir.path().join("credentials.json"),
        token_path.clone(),
    );

    let mut gmail = MockApiTransport::new();
    gmail
        .expect_send()
        .withf(|req| {
            let raw = req.json_body().unwrap()["raw"].as_str().unwrap_or_default();
            let message = String::from_utf8(URL_SAFE.decode(raw).unwrap()).unwrap();
            req.method == HttpMethod::Post
                && req.header_value("Authorization") == Some("Bearer ya29.stored")
                && message.contains("filename=\"resume.txt\"")
        })
        .times(1)
        .returning(|_| Ok(ApiResponse::new(200, json!({"id": "m-1", "labelIds": ["SENT"]}))));
    let dispatcher = MailDispatcher::new(gmail, provider, "https://gmail.test");

    let resume = dir.path().join("resume.txt");
    fs::write(&resume, "Jane Doe, engineer").unwrap();
    let attachment = load_attachment(&resume).unwrap();
    let draft = EmailDraft::new("Dear team, please find my resume attached.");

    let sent = dispatcher
        .send(&draft, "hr@corp.test", "me@mail.test", Some(&attachment))
        .await
        .unwrap();
    assert_eq!(sent.id, "m-1");

    let log_dir = dir.path().join("logs");
    let path = mail_log::write_entry(&log_dir, &draft, "hr@corp.test", "me@mail.test").unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("job_email_") && name.ends_with(".txt"));
    assert!(fs::read_to_string(path)
        .unwrap()
        .starts_with("To: hr@corp.test\nFrom: me@mail.test\nSubject: Job Application\n\n"));
}
