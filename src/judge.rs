//! LLM-as-judge for RAG answer quality.
//!
//! The judge first asks the model to answer the question from the retrieved
//! contexts, then asks it to grade that answer. Grades come back on a 1-5
//! scale and are mapped onto [0, 1].

use crate::config::LlmConfig;
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One question with the contexts retrieved for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSample {
    pub question: String,
    pub contexts: Vec<String>,
    pub expected_answer: Option<String>,
}

/// Scores in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RagAssessment {
    /// Answer is supported by the contexts.
    pub faithfulness: f64,
    /// Answer addresses the question.
    pub answer_relevance: f64,
    /// Contexts are useful for the question.
    pub context_relevance: f64,
}

#[async_trait]
pub trait RagJudge: Send + Sync {
    async fn assess(&self, sample: &RagSample) -> Result<RagAssessment>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: Role,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Minimal OpenAI-compatible chat completion client.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    config: LlmConfig,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(config.timeout_secs),
            config,
        }
    }

    /// Time limit applied to every request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = system {
            messages.push(Message {
                role: Role::System,
                content: sys.to_string(),
            });
        }
        messages.push(Message {
            role: Role::User,
            content: user.to_string(),
        });

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }
        let response = builder.send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(BenchError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(BenchError::LlmApi(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BenchError::LlmApi("No choices in response".to_string()))
    }
}

const ANSWER_SYSTEM: &str =
    "Answer the question using only the provided context. If the context is insufficient, say so.";

/// RAG judge backed by a chat model.
pub struct LlmJudge {
    client: ChatClient,
}

impl LlmJudge {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: LlmConfig) -> Self {
        Self::new(ChatClient::new(config))
    }

    fn render_contexts(contexts: &[String]) -> String {
        contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn grading_prompt(sample: &RagSample, answer: &str) -> String {
        let reference = sample
            .expected_answer
            .as_deref()
            .map(|a| format!("\nReference Answer: {}\n", a))
            .unwrap_or_default();

        format!(
            r#"You are an expert judge grading a retrieval-augmented answer.

Question: {}

Retrieved Context:
{}
{}
Generated Answer: {}

Rate each criterion from 1 (poor) to 5 (excellent):
1. faithfulness: every claim in the answer is supported by the context
2. answer_relevance: the answer directly addresses the question
3. context_relevance: the context contains what is needed to answer

Respond in JSON format:
{{
    "faithfulness": <1-5>,
    "answer_relevance": <1-5>,
    "context_relevance": <1-5>
}}

Respond with only the JSON, no other text."#,
            sample.question,
            Self::render_contexts(&sample.contexts),
            reference,
            answer
        )
    }

    fn parse_grades(response: &str) -> Result<RagAssessment> {
        #[derive(Deserialize)]
        struct RawGrades {
            faithfulness: f64,
            answer_relevance: f64,
            context_relevance: f64,
        }

        let raw: RawGrades = serde_json::from_str(&extract_json(response)).map_err(|e| {
            BenchError::LlmParse(format!(
                "Failed to parse judge response: {}. Response: {}",
                e, response
            ))
        })?;

        Ok(RagAssessment {
            faithfulness: normalize_grade(raw.faithfulness),
            answer_relevance: normalize_grade(raw.answer_relevance),
            context_relevance: normalize_grade(raw.context_relevance),
        })
    }
}

#[async_trait]
impl RagJudge for LlmJudge {
    async fn assess(&self, sample: &RagSample) -> Result<RagAssessment> {
        let question = format!(
            "Context:\n{}\n\nQuestion: {}",
            Self::render_contexts(&sample.contexts),
            sample.question
        );
        let answer = self.client.complete(Some(ANSWER_SYSTEM), &question).await?;
        let grades = self
            .client
            .complete(None, &Self::grading_prompt(sample, answer.trim()))
            .await?;
        Self::parse_grades(&grades)
    }
}

/// Map a 1-5 grade onto [0, 1], clamping out-of-range grades.
fn normalize_grade(grade: f64) -> f64 {
    ((grade.clamp(1.0, 5.0) - 1.0) / 4.0).clamp(0.0, 1.0)
}

/// Pull a JSON object out of a model response, tolerating code fences and
/// surrounding prose.
pub(crate) fn extract_json(response: &str) -> String {
    let response = response.trim();

    if let Some(rest) = response.strip_prefix("```") {
        let body = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = body.rfind("```") {
            return body[..end].trim().to_string();
        }
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => response[start..=end].to_string(),
        _ => response.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grades_normalizes() {
        let grades = LlmJudge::parse_grades(
            r#"{"faithfulness": 5, "answer_relevance": 3, "context_relevance": 1}"#,
        )
        .unwrap();
        assert_eq!(grades.faithfulness, 1.0);
        assert_eq!(grades.answer_relevance, 0.5);
        assert_eq!(grades.context_relevance, 0.0);
    }

    #[test]
    fn test_parse_grades_clamps_and_rejects() {
        let grades = LlmJudge::parse_grades(
            "Sure!\n```json\n{\"faithfulness\": 9, \"answer_relevance\": 0, \"context_relevance\": 4}\n```",
        )
        .unwrap();
        assert_eq!(grades.faithfulness, 1.0);
        assert_eq!(grades.answer_relevance, 0.0);
        assert_eq!(grades.context_relevance, 0.75);

        let err = LlmJudge::parse_grades("no json here").unwrap_err();
        assert_eq!(err.kind(), "llm_parse");
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("Here: {\"a\": 1} done"), "{\"a\": 1}");
    }

    #[test]
    fn test_grading_prompt_includes_reference() {
        let sample = RagSample {
            question: "Who created Rust?".to_string(),
            contexts: vec!["Rust was started at Mozilla.".to_string()],
            expected_answer: Some("Graydon Hoare".to_string()),
        };
        let prompt = LlmJudge::grading_prompt(&sample, "Mozilla");
        assert!(prompt.contains("[1] Rust was started at Mozilla."));
        assert!(prompt.contains("Reference Answer: Graydon Hoare"));
    }

    #[test]
    fn test_chat_endpoint() {
        let client = ChatClient::new(LlmConfig {
            api_base: "http://localhost:8000/".to_string(),
            ..Default::default()
        });
        assert_eq!(client.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(client.timeout(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_chat_request_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept the connection but never answer.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut config = LlmConfig {
            api_base: format!("http://{}", addr),
            ..Default::default()
        };
        config.timeout_secs = 1;
        let client = ChatClient::new(config);

        let started = std::time::Instant::now();
        let err = client.complete(None, "hello").await.unwrap_err();
        assert_eq!(err.kind(), "http");
        assert!(started.elapsed() < Duration::from_secs(10));
        server.abort();
    }
}
