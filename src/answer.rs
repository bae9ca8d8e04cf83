//! Answer generation from retrieved passages.
//!
//! | `answer.provider` | Generator |
//! |-------------------|-----------|
//! | `"extractive"` | [`ExtractiveAnswerer`]: the best passages, verbatim |
//! | `"openai"` | [`OpenAIAnswerer`]: chat completion grounded in the passages |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use gtc_qa_core::index::Passage;

use crate::config::AnswerConfig;
use crate::http::{send_with_retry, RetryPolicy};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You answer questions about an insurance general terms and conditions document. \
Use only the passages provided in the context. \
If the context does not contain the answer, say explicitly that the document does not say. \
Answer in the language of the question.";

/// Turns a question and its ranked passages into answer text.
///
/// Called only with at least one passage.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, passages: &[Passage]) -> Result<String>;
}

pub fn create_answerer(config: &AnswerConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveAnswerer)),
        "openai" => Ok(Arc::new(OpenAIAnswerer::new(config)?)),
        other => bail!("Unknown answer provider: {}", other),
    }
}

/// Answers with the retrieved passages themselves, best first.
pub struct ExtractiveAnswerer;

#[async_trait]
impl AnswerGenerator for ExtractiveAnswerer {
    async fn generate(&self, _question: &str, passages: &[Passage]) -> Result<String> {
        Ok(passages
            .iter()
            .map(|p| p.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Chat-completion answerer. Requires `OPENAI_API_KEY`.
pub struct OpenAIAnswerer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAIAnswerer {
    pub fn new(config: &AnswerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("answer.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model,
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIAnswerer {
    async fn generate(&self, question: &str, passages: &[Passage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(question, passages)},
            ],
        });
        let response = send_with_retry(self.retry, "OpenAI chat", || {
            self.client
                .post(OPENAI_CHAT_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

fn user_prompt(question: &str, passages: &[Passage]) -> String {
    let context = passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}", i + 1, p.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Context:\n{}\n\nQuestion: {}", context, question)
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;
    let content = content.trim();
    if content.is_empty() {
        bail!("OpenAI returned an empty answer");
    }
    Ok(content.to_string())
}
