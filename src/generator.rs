//! AI content generator contract (spec §6.4) for `mode = personalized`
//! sections, grounded in `campaign-runner/prompts.py`'s section-to-prompt
//! shape (generation itself is out of scope; the contract and a stub are
//! what the core depends on).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{RecipientMetadata, Section, SectionMode};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("transient generation failure: {0}")]
    Transient(String),
    #[error("permanent generation failure: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generates text for every `mode = personalized` section in
    /// `sections`, keyed by section id. A section with no corresponding key
    /// in the returned map is rendered as a placeholder by the caller.
    async fn generate(
        &self,
        sections: &[Section],
        metadata: &RecipientMetadata,
    ) -> Result<HashMap<String, String>, GenerationError>;
}

/// Production generator backed by the Gemini API.
pub struct GeminiGenerator {
    http: reqwest::Client,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a valid timeout");
        Self { http, api_key }
    }

    fn prompt_for(section: &Section, metadata: &RecipientMetadata) -> String {
        let fields: Vec<String> = section
            .reference_fields
            .iter()
            .filter_map(|f| metadata.get(f).map(|v| format!("{f}: {v}")))
            .collect();
        format!(
            "Write the \"{}\" section of a cold outreach email.\nRecipient fields:\n{}",
            section.name,
            fields.join("\n")
        )
    }
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    async fn generate(
        &self,
        sections: &[Section],
        metadata: &RecipientMetadata,
    ) -> Result<HashMap<String, String>, GenerationError> {
        let personalized: Vec<&Section> = sections
            .iter()
            .filter(|s| s.mode == SectionMode::Personalized)
            .collect();

        let mut generated = HashMap::with_capacity(personalized.len());

        for section in personalized {
            let prompt = Self::prompt_for(section, metadata);
            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key={}",
                self.api_key
            );
            let body = serde_json::json!({
                "contents": [{"parts": [{"text": prompt}]}]
            });

            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| GenerationError::Transient(e.to_string()))?;

            if response.status().as_u16() == 429 || response.status().as_u16() >= 500 {
                return Err(GenerationError::Transient(format!(
                    "gemini returned {}",
                    response.status()
                )));
            }
            if !response.status().is_success() {
                return Err(GenerationError::Permanent(format!(
                    "gemini returned {}",
                    response.status()
                )));
            }

            let parsed: GeminiResponse = response
                .json()
                .await
                .map_err(|e| GenerationError::Permanent(e.to_string()))?;

            let text = parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().next())
                .map(|p| p.text)
                .unwrap_or_default();

            generated.insert(section.id.clone(), text);
        }

        Ok(generated)
    }
}

/// Deterministic generator for tests: echoes the section name so assertions
/// don't depend on network access or prompt wording.
pub struct StubGenerator;

#[async_trait]
impl ContentGenerator for StubGenerator {
    async fn generate(
        &self,
        sections: &[Section],
        _metadata: &RecipientMetadata,
    ) -> Result<HashMap<String, String>, GenerationError> {
        Ok(sections
            .iter()
            .filter(|s| s.mode == SectionMode::Personalized)
            .map(|s| (s.id.clone(), format!("generated: {}", s.name)))
            .collect())
    }
}
