//! Media analyzer (C9): image/audio/video → structured `AnalysisResult`.
//!
//! The JSON recovery ladder (direct parse → repair → fenced-block extraction
//! → fail) follows the defensive parsing style
//! `Smebbs-lytt::transcription::gpt4o`/`whisper` use on model output that
//! isn't guaranteed to be schema-conformant.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;

use crate::domain::{AnalysisResult, MediaType};
use crate::error::AnalyzeError;
use crate::logging::Logger;

use crate::embedding::retry::{classify_status, retry_with_backoff, RetryPolicy};

/// The analyzer contract the media queue and reprocess service depend on.
#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        media_path: &str,
        media_type: MediaType,
        user_prompt: Option<&str>,
        context_text: Option<&str>,
    ) -> Result<AnalysisResult, AnalyzeError>;
}

fn fenced_json_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("static pattern is valid"))
}

/// Repairs the most common small JSON mistakes: trailing commas before a
/// closing brace/bracket. Deliberately conservative — anything this can't
/// fix falls through to the next recovery stage.
fn repair_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ',' {
            let mut lookahead = chars.clone();
            while let Some(next) = lookahead.peek() {
                if next.is_whitespace() {
                    lookahead.next();
                } else {
                    break;
                }
            }
            if matches!(lookahead.peek(), Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Parses analyzer output into `AnalysisResult` via direct parse, then
/// trailing-comma repair, then fenced-code-block extraction.
pub fn recover_analysis_result(raw: &str) -> Result<AnalysisResult, AnalyzeError> {
    if let Ok(result) = serde_json::from_str(raw) {
        return Ok(result);
    }
    let repaired = repair_json(raw);
    if let Ok(result) = serde_json::from_str(&repaired) {
        return Ok(result);
    }
    if let Some(caps) = fenced_json_pattern().captures(raw) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if let Ok(result) = serde_json::from_str(inner) {
            return Ok(result);
        }
        let inner_repaired = repair_json(inner);
        if let Ok(result) = serde_json::from_str(&inner_repaired) {
            return Ok(result);
        }
    }
    Err(AnalyzeError::Schema(format!("could not parse analyzer output as AnalysisResult: {raw:.200}")))
}

#[derive(Debug, Serialize)]
struct AnalyzeRequestBody<'a> {
    media_path: &'a str,
    media_type: &'a str,
    prompt: String,
}

fn render_prompt(media_type: MediaType, user_prompt: Option<&str>, context_text: Option<&str>, language: &str) -> String {
    let mut prompt = format!("Analyze this {media_type} and respond in {language}.");
    if let Some(ctx) = context_text {
        prompt.push_str("\n\nContext:\n");
        prompt.push_str(ctx);
    }
    if let Some(instructions) = user_prompt {
        prompt.push_str("\n\nInstructions:\n");
        prompt.push_str(instructions);
    }
    prompt
}

/// A vendor-agnostic HTTP media analyzer, same request/retry shape as
/// [`crate::embedding::HttpEmbedder`].
pub struct HttpMediaAnalyzer {
    http: reqwest::Client,
    endpoint: String,
    language: String,
    retry_policy: RetryPolicy,
    timeout: Duration,
    logger: Logger,
}

impl HttpMediaAnalyzer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            language: "en".to_string(),
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
            logger: Logger::root(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MediaAnalyzer for HttpMediaAnalyzer {
    async fn analyze(
        &self,
        media_path: &str,
        media_type: MediaType,
        user_prompt: Option<&str>,
        context_text: Option<&str>,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let prompt = render_prompt(media_type, user_prompt, context_text, &self.language);
        let logger = self.logger.bind("media_path", media_path);
        logger.info("submitting media analysis request");

        let raw = retry_with_backoff(&self.retry_policy, |_attempt| {
            let body = AnalyzeRequestBody { media_path, media_type: &media_type.to_string(), prompt: prompt.clone() };
            async move {
                let response = self.http.post(&self.endpoint).timeout(self.timeout).json(&body).send().await;
                match response {
                    Ok(resp) => {
                        let status = resp.status();
                        if status.is_success() {
                            resp.text().await.map_err(|e| {
                                (classify_status(Some(status.as_u16()), false, false), AnalyzeError::Upstream(e.to_string()))
                            })
                        } else {
                            let classification = classify_status(Some(status.as_u16()), false, false);
                            Err((classification, AnalyzeError::Upstream(format!("upstream returned HTTP {status}"))))
                        }
                    }
                    Err(e) => {
                        let classification = classify_status(None, e.is_timeout(), true);
                        Err((classification, AnalyzeError::Upstream(e.to_string())))
                    }
                }
            }
        })
        .await?;

        recover_analysis_result(&raw)
    }
}

/// Deterministic analyzer used by tests and the media pipeline's own unit
/// tests, grounded on the corpus's `MockEmbeddingProvider`-style test
/// doubles.
pub struct MockAnalyzer {
    pub result: AnalysisResult,
}

impl MockAnalyzer {
    pub fn new(result: AnalysisResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl MediaAnalyzer for MockAnalyzer {
    async fn analyze(
        &self,
        _media_path: &str,
        _media_type: MediaType,
        _user_prompt: Option<&str>,
        _context_text: Option<&str>,
    ) -> Result<AnalysisResult, AnalyzeError> {
        Ok(self.result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_parse_succeeds_on_well_formed_json() {
        let raw = r#"{"description": "a cat", "keywords": ["cat", "pet"]}"#;
        let result = recover_analysis_result(raw).unwrap();
        assert_eq!(result.description, "a cat");
    }

    #[test]
    fn trailing_comma_is_repaired() {
        let raw = r#"{"description": "a cat", "keywords": ["cat", "pet",],}"#;
        let result = recover_analysis_result(raw).unwrap();
        assert_eq!(result.keywords, vec!["cat", "pet"]);
    }

    #[test]
    fn extracts_from_fenced_json_block() {
        let raw = "Here is the analysis:\n```json\n{\"description\": \"a dog\"}\n```\nthanks";
        let result = recover_analysis_result(raw).unwrap();
        assert_eq!(result.description, "a dog");
    }

    #[test]
    fn unrecoverable_input_fails_with_schema_error() {
        let result = recover_analysis_result("not json at all");
        assert!(matches!(result, Err(AnalyzeError::Schema(_))));
    }

    #[tokio::test]
    async fn mock_analyzer_returns_configured_result() {
        let analyzer = MockAnalyzer::new(AnalysisResult { description: "x".into(), ..Default::default() });
        let result = analyzer.analyze("/a.png", MediaType::Image, None, None).await.unwrap();
        assert_eq!(result.description, "x");
    }
}
