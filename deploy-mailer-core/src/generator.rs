//! Email Draft Generator backed by the Gemini `generateContent` endpoint.
//!
//! One prompt, one request, first candidate wins. No retries, streaming or
//! conversation state. Failures never escape as errors: they come back as a
//! [`Generation`] variant whose text is an explicit placeholder.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::contract::{ApiRequest, ApiTransport, EmailDraft, HttpMethod};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const NO_RESPONSE: &str = "No response generated.";

/// Gemini generateContent request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini generateContent response
#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

/// Result of one generation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    /// The provider answered but returned zero candidates.
    NoResponse,
    /// Non-2xx status (`None` when the request never got a response).
    Failed { status: Option<u16>, body: String },
}

impl Generation {
    /// The user-facing text: the generated email, the placeholder, or the error line.
    pub fn into_text(self) -> String {
        match self {
            Generation::Text(text) => text,
            Generation::NoResponse => NO_RESPONSE.to_string(),
            Generation::Failed {
                status: Some(status),
                body,
            } => format!("Error: {status} - {body}"),
            Generation::Failed { status: None, body } => format!("Error: {body}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub api_key: String,
}

impl GeminiSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: GEMINI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            api_key: api_key.into(),
        }
    }
}

/// Builds the application-email prompt around the job description and skills.
pub fn build_prompt(job_description: &str, skills: &str) -> String {
    format!(
        "You are an expert career assistant. Write a professional job application email based on the following:\n\
         \n\
         Job Description:\n\
         {job_description}\n\
         \n\
         Candidate Skills/Experience:\n\
         {skills}\n\
         \n\
         Make it polite, enthusiastic, and easy to edit.\n"
    )
}

/// Skills text with the optional extra instructions appended after a space.
pub fn combine_skills(skills: &str, extra_notes: Option<&str>) -> String {
    format!("{} {}", skills, extra_notes.unwrap_or_default())
}

/// Removes bold/underline markdown markers (`**`, `__`).
pub fn strip_markdown(text: &str) -> String {
    text.replace("**", "").replace("__", "")
}

pub struct EmailDraftGenerator<T> {
    transport: T,
    settings: GeminiSettings,
}

impl<T: ApiTransport> EmailDraftGenerator<T> {
    pub fn new(transport: T, settings: GeminiSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.model
        )
    }

    /// Sends the prompt and classifies the answer.
    pub async fn generate(&self, job_description: &str, skills: &str) -> Generation {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(job_description, skills),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
            },
        };
        let body = match serde_json::to_value(&body) {
            Ok(v) => v,
            Err(e) => {
                return Generation::Failed {
                    status: None,
                    body: e.to_string(),
                }
            }
        };

        let req = ApiRequest::new(HttpMethod::Post, self.generate_url())
            .header("Content-Type", "application/json")
            .query("key", self.settings.api_key.clone())
            .json(body);

        info!(model = %self.settings.model, "Requesting email draft");
        let res = match self.transport.send(req).await {
            Ok(res) => res,
            Err(e) => {
                error!(error = %e, "Generation request failed");
                return Generation::Failed {
                    status: None,
                    body: e.to_string(),
                };
            }
        };

        if res.status != 200 {
            warn!(status = res.status, "Generation endpoint returned an error");
            return Generation::Failed {
                status: Some(res.status),
                body: res.body_text(),
            };
        }

        first_candidate_text(res.body)
    }

    /// The generated text, or the placeholder / error line. Never fails.
    pub async fn generate_email(&self, job_description: &str, skills: &str) -> String {
        self.generate(job_description, skills).await.into_text()
    }

    /// Generates and post-processes a draft. When nothing usable came back the
    /// error carries the placeholder or error text to show the user.
    pub async fn generate_draft(
        &self,
        job_description: &str,
        skills: &str,
    ) -> std::result::Result<EmailDraft, String> {
        match self.generate(job_description, skills).await {
            Generation::Text(text) => {
                let cleaned = strip_markdown(&text);
                if cleaned.trim().is_empty() {
                    return Err("The model returned an empty response.".to_string());
                }
                Ok(EmailDraft::new(cleaned))
            }
            other => Err(other.into_text()),
        }
    }
}

fn first_candidate_text(body: Value) -> Generation {
    let parsed: GenerateContentResponse = match serde_json::from_value(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Unexpected generation response shape");
            return Generation::NoResponse;
        }
    };
    let candidates = parsed.candidates.unwrap_or_default();
    debug!(count = candidates.len(), "Generation candidates received");
    candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|p| p.into_iter().next())
        .map(|p| Generation::Text(p.text))
        .unwrap_or(Generation::NoResponse)
}
