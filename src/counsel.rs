use crate::models::{Category, CounselConfig, EligibleEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Rows of a reference table forwarded with a free-form request.
pub const REFERENCE_ROWS: usize = 10;

#[derive(Debug, Error)]
pub enum CounselError {
    #[error("text generation is not configured (set {0} in the environment or .env)")]
    NotConfigured(String),

    #[error("text generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("text generation API error: status={status}, body={body}")]
    Api { status: u16, body: String },

    #[error("text generation returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> Result<String, CounselError>;
}

/// Result of a best-effort counseling request.
#[derive(Debug)]
pub enum CounselNote {
    Generated(String),
    Unavailable(CounselError),
}

pub async fn request_note(generator: &dyn TextGenerator, prompt: &str) -> CounselNote {
    match generator.generate(prompt).await {
        Ok(text) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                CounselNote::Unavailable(CounselError::EmptyResponse)
            } else {
                CounselNote::Generated(text)
            }
        }
        Err(e) => {
            tracing::warn!(provider = generator.name(), error = %e, "counseling note unavailable");
            CounselNote::Unavailable(e)
        }
    }
}

/// Prompt for a counseling note about the top eligible colleges.
pub fn counsel_prompt(
    entries: &[EligibleEntry],
    program: &str,
    category: Category,
    score: f64,
    max_colleges: usize,
) -> String {
    let colleges: Vec<&str> = entries
        .iter()
        .take(max_colleges)
        .map(|entry| entry.college.as_str())
        .collect();

    format!(
        "You are a friendly Delhi University admissions counsellor.\n\
         The student scored {} (category: {}) for the program {} and is eligible for these colleges:\n\
         {}\n\n\
         Give a short (3-4 sentences) practical counseling note about:\n\
         1) Why these colleges are good fits,\n\
         2) Short next-step advice for the student.\n\
         Tone: encouraging and concise.",
        score,
        category,
        program,
        colleges.join(", ")
    )
}

/// Prompt for free-form suggestions, optionally grounded in a reference table.
pub fn suggestion_prompt(goal: &str, reference: Option<&str>) -> String {
    let context = reference
        .map(|table| format!("Reference dataset (first {} rows):\n{}\n\n", REFERENCE_ROWS, table.trim_end()))
        .unwrap_or_default();

    format!(
        "You are an experienced DU admissions counselor. The user's goal is:\n\
         {}\n\n\
         {}\
         Provide:\n\
         1) Top 3 preference suggestions (college + why),\n\
         2) 2 concrete next steps the student can take.\n\
         Keep it concise (4-6 short paragraphs).",
        goal.trim(),
        context
    )
}

/// First `REFERENCE_ROWS` data rows of a CSV (plus its header) as plain text.
pub fn reference_excerpt(csv_text: &str) -> String {
    csv_text
        .lines()
        .take(REFERENCE_ROWS + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone)]
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CounselError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            client,
        })
    }

    /// Build from config, reading the API key from the environment (and `.env`).
    pub fn from_config(config: &CounselConfig) -> Result<Self, CounselError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CounselError::NotConfigured(config.api_key_env.clone()))?;

        Self::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String, CounselError> {
        let payload = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "requesting generated text");

        let res = self.client.post(self.generate_url()).json(&payload).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(CounselError::Api { status, body });
        }

        let parsed: GenerateResponse = res.json().await?;
        parsed.text().ok_or(CounselError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|part| part.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Result<&'static str, u16>);

    #[async_trait]
    impl TextGenerator for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, CounselError> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(CounselError::Api {
                    status,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }

    fn entry(rank: usize, college: &str) -> EligibleEntry {
        EligibleEntry {
            rank,
            college: college.to_string(),
            program: "B.Com".to_string(),
            category: Category::OBC,
            cutoff: 500.0,
            margin: 10.0,
        }
    }

    #[test]
    fn counsel_prompt_is_bounded_to_max_colleges() {
        let entries: Vec<EligibleEntry> = (1..=8).map(|i| entry(i, &format!("College{}", i))).collect();
        let prompt = counsel_prompt(&entries, "B.Com", Category::OBC, 612.5, 6);

        assert!(prompt.contains("scored 612.5 (category: OBC)"));
        assert!(prompt.contains("B.Com"));
        assert!(prompt.contains("College1, College2, College3, College4, College5, College6"));
        assert!(!prompt.contains("College7"));
    }

    #[test]
    fn suggestion_prompt_includes_reference_only_when_given() {
        let bare = suggestion_prompt("I want B.Sc. CS", None);
        assert!(bare.contains("I want B.Sc. CS"));
        assert!(!bare.contains("Reference dataset"));

        let with_ref = suggestion_prompt("goal", Some("COLLEGE NAME,UR\nA,500\n"));
        assert!(with_ref.contains("Reference dataset (first 10 rows):\nCOLLEGE NAME,UR\nA,500\n\n"));
    }

    #[test]
    fn reference_excerpt_keeps_header_and_ten_rows() {
        let csv: String = std::iter::once("H".to_string())
            .chain((0..20).map(|i| format!("row{}", i)))
            .collect::<Vec<_>>()
            .join("\n");
        let excerpt = reference_excerpt(&csv);

        assert_eq!(excerpt.lines().count(), 11);
        assert!(excerpt.ends_with("row9"));
    }

    #[tokio::test]
    async fn failure_degrades_to_unavailable_note() {
        let note = request_note(&Canned(Err(503)), "prompt").await;
        assert!(matches!(note, CounselNote::Unavailable(CounselError::Api { status: 503, .. })));
    }

    #[tokio::test]
    async fn generated_text_is_trimmed_and_blank_is_unavailable() {
        match request_note(&Canned(Ok("  Great picks.\n")), "prompt").await {
            CounselNote::Generated(text) => assert_eq!(text, "Great picks."),
            other => panic!("unexpected note: {:?}", other),
        }
        assert!(matches!(
            request_note(&Canned(Ok("   ")), "prompt").await,
            CounselNote::Unavailable(CounselError::EmptyResponse)
        ));
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let config = CounselConfig {
            api_key_env: "COLLEGE_PREFERENCE_TEST_UNSET_KEY".to_string(),
            ..CounselConfig::default()
        };
        assert!(matches!(
            GeminiGenerator::from_config(&config),
            Err(CounselError::NotConfigured(_))
        ));
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let response = GenerateResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: vec![
                        Part { text: "Hello ".to_string() },
                        Part { text: "there".to_string() },
                    ],
                }),
            }],
        };
        assert_eq!(response.text().as_deref(), Some("Hello there"));
        assert_eq!(GenerateResponse { candidates: vec![] }.text(), None);
    }
}
