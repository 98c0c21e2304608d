//! Message summarization and classification through a text-generation backend.
//!
//! The backend sits behind [`TextGenerator`], so the prompt and the response
//! parser can be exercised without a live model.

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::models::Classification;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PROMPT_PREAMBLE: &str = "You are an experienced customer support agent. \
Summarize the email below, then decide its category and the sender's sentiment. \
Answer with exactly three lines in this form:\n\
summary: <one or two sentences>\n\
category: <a short category name>\n\
sentiment: <positive, neutral or negative>";

pub fn build_prompt(body: &str) -> String {
    format!("{}\n\nEmail:\n{}", PROMPT_PREAMBLE, body)
}

/// Recovers `label: value` pairs from free text.
///
/// Each line is split at its first colon and both sides are trimmed. Lines
/// without a colon are skipped; a repeated label keeps its last value.
pub fn parse_labels(text: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(':') {
            result.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    result
}

/// A single-shot, non-streaming completion backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, api_key: &SecretString, prompt: &str) -> Result<String, ClassifyError>;
}

pub struct Classifier {
    generator: Arc<dyn TextGenerator>,
    api_key: Option<SecretString>,
}

impl Classifier {
    /// Without an API key the classifier never calls `generator` and
    /// always yields empty fields.
    pub fn new(generator: Arc<dyn TextGenerator>, api_key: Option<SecretString>) -> Self {
        if api_key.is_none() {
            tracing::info!("No completion API key configured; classification disabled");
        }
        Self { generator, api_key }
    }

    /// The OpenAI-backed classifier.
    pub fn from_config(config: &ClassifierConfig, api_key: Option<SecretString>) -> Result<Self, ClassifyError> {
        Ok(Self::new(Arc::new(OpenAiGenerator::new(config)?), api_key))
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn classify(&self, body: &str) -> Result<Classification, ClassifyError> {
        let Some(api_key) = &self.api_key else {
            return Ok(Classification::empty());
        };

        let text = self.generator.complete(api_key, &build_prompt(body)).await?;
        let fields = parse_labels(&text);
        debug!(labels = fields.len(), "Parsed classification response");
        Ok(Classification { fields })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat completions with temperature pinned to zero.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    model: String,
    endpoint: String,
}

impl OpenAiGenerator {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        }
    }
}

fn first_choice(response: ChatResponse) -> Result<String, ClassifyError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or(ClassifyError::EmptyResponse)
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, api_key: &SecretString, prompt: &str) -> Result<String, ClassifyError> {
        debug!(model = %self.model, "Sending completion request");
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .json(&self.request(prompt))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ClassifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        first_choice(res.json::<ChatResponse>().await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    pub fn test_key() -> Option<SecretString> {
        Some(SecretString::from("sk-test"))
    }

    /// Returns a canned reply and counts how often it was asked.
    pub struct CannedGenerator {
        pub reply: Result<String, String>,
        pub calls: AtomicUsize,
    }

    impl CannedGenerator {
        pub fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(reason.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn complete(&self, _api_key: &SecretString, _prompt: &str) -> Result<String, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(ClassifyError::Request)
        }
    }

    /// Signals `entered` when a completion starts, then waits for `release`.
    #[derive(Default)]
    pub struct GatedGenerator {
        pub entered: Notify,
        pub release: Notify,
    }

    #[async_trait]
    impl TextGenerator for GatedGenerator {
        async fn complete(&self, _api_key: &SecretString, _prompt: &str) -> Result<String, ClassifyError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("summary: done".to_string())
        }
    }

    #[test]
    fn parses_labels_in_any_order() {
        let a = parse_labels("summary: order delay\ncategory: Shipping\nsentiment: negative");
        let b = parse_labels("sentiment: negative\nsummary: order delay\ncategory: Shipping");
        assert_eq!(a, b);
        assert_eq!(a["summary"], "order delay");
        assert_eq!(a["category"], "Shipping");
        assert_eq!(a["sentiment"], "negative");
    }

    #[test]
    fn last_duplicate_label_wins() {
        let fields = parse_labels("category: Billing\ncategory: Shipping");
        assert_eq!(fields["category"], "Shipping");
    }

    #[test]
    fn splits_on_first_colon_only() {
        let fields = parse_labels("summary: meeting at 10:30: bring notes");
        assert_eq!(fields["summary"], "meeting at 10:30: bring notes");
    }

    #[test]
    fn ignores_lines_without_colon() {
        let fields = parse_labels("Here is my answer\n\nsummary: late order\nThanks!");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["summary"], "late order");
    }

    #[test]
    fn keeps_unrecognized_labels() {
        let fields = parse_labels("urgency: high\nsummary: x");
        assert_eq!(fields["urgency"], "high");
    }

    #[tokio::test]
    async fn no_colon_lines_yield_empty_fields() {
        let generator = CannedGenerator::replying("I could not classify this message.");
        let classifier = Classifier::new(generator.clone(), test_key());
        let c = classifier.classify("body").await.unwrap();
        assert_eq!(c.summary(), "");
        assert_eq!(c.category(), None);
        assert_eq!(c.sentiment(), "");
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_key_makes_no_calls() {
        let generator = CannedGenerator::replying("summary: should not appear");
        let classifier = Classifier::new(generator.clone(), None);
        let c = classifier.classify("body").await.unwrap();
        assert_eq!(c, Classification::empty());
        assert_eq!(generator.call_count(), 0);
        assert!(!classifier.is_enabled());
    }

    #[tokio::test]
    async fn missing_key_disables_openai_classifier() {
        let classifier = Classifier::from_config(&ClassifierConfig::default(), None).unwrap();
        assert!(!classifier.is_enabled());
        assert_eq!(classifier.classify("body").await.unwrap(), Classification::empty());
    }

    #[tokio::test]
    async fn configured_key_calls_generator_once() {
        let generator = CannedGenerator::replying("summary: order delay");
        let classifier = Classifier::new(generator.clone(), test_key());
        assert!(classifier.is_enabled());
        let c = classifier.classify("body").await.unwrap();
        assert_eq!(c.summary(), "order delay");
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let classifier = Classifier::new(CannedGenerator::failing("connection reset"), test_key());
        let err = classifier.classify("body").await.unwrap_err();
        assert!(matches!(err, ClassifyError::Request(_)));
    }

    #[test]
    fn prompt_embeds_body() {
        let prompt = build_prompt("My order is late");
        assert!(prompt.ends_with("Email:\nMy order is late"));
        assert!(prompt.contains("category:"));
    }

    #[test]
    fn request_pins_temperature() {
        let generator = OpenAiGenerator::new(&ClassifierConfig::default()).unwrap();
        let json = serde_json::to_value(generator.request("hello")).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn reads_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"summary: hi"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "summary: hi");
    }

    #[test]
    fn empty_choices_is_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_choice(response), Err(ClassifyError::EmptyResponse)));
    }
}
