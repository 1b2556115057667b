use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use planwright_core::errors::GatewayError;
use planwright_core::generation::GenerationGateway;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-2.0-flash".into(),
            max_output_tokens: 8192,
            temperature: 0.7,
        }
    }
}

/// Google Gemini `generateContent` over plain HTTPS with an API key.
///
/// Without a key the gateway reports not-ready and every call fails with
/// [`GatewayError::NotConfigured`].
pub struct GeminiGateway {
    client: Client,
    api_key: Option<SecretString>,
    config: GeminiConfig,
}

impl GeminiGateway {
    pub fn new(api_key: Option<SecretString>, config: GeminiConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("build HTTP client: {e}")))?;
        let api_key = api_key.filter(|k| !k.expose_secret().trim().is_empty());
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "maxOutputTokens": self.config.max_output_tokens,
                "temperature": self.config.temperature,
            }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn extract_text(resp: GenerateContentResponse) -> Result<String, GatewayError> {
    let Some(candidate) = resp.candidates.into_iter().next() else {
        let reason = resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".into());
        return Err(GatewayError::MalformedResponse(reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "empty content".into());
        return Err(GatewayError::MalformedResponse(reason));
    }
    Ok(text)
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_ready(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let Some(key) = &self.api_key else {
            return Err(GatewayError::NotConfigured("GEMINI_API_KEY is not set".into()));
        };

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", key.expose_secret())
            .header("content-type", "application/json")
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(GatewayError::RateLimited {
                retry_after: retry_after(resp.headers()),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer, key: Option<&str>) -> GeminiGateway {
        GeminiGateway::new(
            key.map(|k| SecretString::from(k.to_string())),
            GeminiConfig {
                base_url: server.uri(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    const ENDPOINT: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

    #[tokio::test]
    async fn returns_joined_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "# Project "}, {"text": "Brief"}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = gateway(&server, Some("test-key")).generate("fill it").await.unwrap();
        assert_eq!(text, "# Project Brief");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let server = MockServer::start().await;
        let gw = gateway(&server, None);
        assert!(!gw.is_ready());
        let err = gw.generate("hi").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn blank_key_counts_as_missing() {
        let server = MockServer::start().await;
        assert!(!gateway(&server, Some("  ")).is_ready());
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = gateway(&server, Some("k")).generate("hi").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[tokio::test]
    async fn server_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = gateway(&server, Some("k")).generate("hi").await.unwrap_err();
        assert!(matches!(err, GatewayError::ServerError { status: 503, .. }));
    }

    #[tokio::test]
    async fn blocked_prompt_is_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let err = gateway(&server, Some("k")).generate("hi").await.unwrap_err();
        assert_eq!(err, GatewayError::MalformedResponse("SAFETY".into()));
    }

    #[test]
    fn request_body_shape() {
        let gw = GeminiGateway::new(None, GeminiConfig::default()).unwrap();
        let body = gw.request_body("hello");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }
}
