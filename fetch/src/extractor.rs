use crate::config::ExtractorConfig;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use shared::types::Sentence;

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("extractor request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("extractor responded with status {0}")]
    Status(u16),

    #[error("no text to extract phrases from")]
    NoText,
}

/// Phrases and sentences pulled out of an alert's text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    pub tags: Vec<String>,
    pub sentences: Vec<Sentence>,
    pub top_sentence: String,
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Extraction, ExtractError>;
}

#[derive(Deserialize)]
struct ExtractorResponse {
    #[serde(default)]
    noun_phrases: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    sentences: Vec<Sentence>,
    #[serde(default)]
    top_sentence: String,
}

impl From<ExtractorResponse> for Extraction {
    fn from(response: ExtractorResponse) -> Self {
        let mut tags: Vec<String> = Vec::with_capacity(response.noun_phrases.len());
        for phrase in response.noun_phrases.keys() {
            let phrase = normalize(phrase);
            if !phrase.is_empty() && !tags.contains(&phrase) {
                tags.push(phrase);
            }
        }

        let sentences = response
            .sentences
            .into_iter()
            .map(|s| Sentence {
                value: s.value,
                phrases: s.phrases.iter().map(|p| normalize(p)).collect(),
            })
            .collect();

        Extraction {
            tags,
            sentences,
            top_sentence: response.top_sentence,
        }
    }
}

/// Replaces non-breaking spaces and trims the phrase.
pub fn normalize(phrase: &str) -> String {
    phrase.replace('\u{a0}', " ").trim().to_string()
}

/// Client for the noun phrase extraction service
pub struct HttpExtractor {
    client: reqwest::Client,
    url: url::Url,
}

impl HttpExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(HttpExtractor {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl TextExtractor for HttpExtractor {
    async fn extract(&self, text: &str) -> Result<Extraction, ExtractError> {
        if text.trim().is_empty() {
            return Err(ExtractError::NoText);
        }

        let response = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(text.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExtractError::Status(response.status().as_u16()));
        }

        let response = response.json::<ExtractorResponse>().await?;
        Ok(response.into())
    }
}
