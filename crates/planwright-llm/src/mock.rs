use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use planwright_core::errors::GatewayError;
use planwright_core::generation::GenerationGateway;

/// Pre-programmed responses for deterministic runs without network access.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Text(String),
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Gateway that replays queued responses in order and records every prompt.
///
/// Once the queue is empty it answers with the fallback text if one was set,
/// otherwise with an `InvalidRequest` error.
pub struct MockGateway {
    responses: Mutex<VecDeque<MockResponse>>,
    fallback: Option<String>,
    ready: bool,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl MockGateway {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            ready: true,
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Answers every call with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::new(Vec::new())
        }
    }

    /// A gateway that reports not-ready and refuses every call.
    pub fn unready() -> Self {
        Self {
            ready: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl GenerationGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        if !self.ready {
            return Err(GatewayError::NotConfigured("mock gateway is disabled".into()));
        }
        self.prompts.lock().push(prompt.to_owned());

        let next = self.responses.lock().pop_front();
        let mut response = match (next, &self.fallback) {
            (Some(r), _) => r,
            (None, Some(text)) => MockResponse::Text(text.clone()),
            (None, None) => {
                return Err(GatewayError::InvalidRequest(format!(
                    "MockGateway: no response configured for call {idx}"
                )))
            }
        };

        loop {
            match response {
                MockResponse::Text(text) => return Ok(text),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_errors() {
        let gw = MockGateway::new(vec![
            MockResponse::text("one"),
            MockResponse::Error(GatewayError::RateLimited { retry_after: None }),
        ]);
        assert_eq!(gw.generate("a").await.unwrap(), "one");
        assert!(matches!(
            gw.generate("b").await,
            Err(GatewayError::RateLimited { .. })
        ));
        assert!(matches!(
            gw.generate("c").await,
            Err(GatewayError::InvalidRequest(_))
        ));
        assert_eq!(gw.call_count(), 3);
        assert_eq!(gw.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn always_repeats_fallback() {
        let gw = MockGateway::always("same");
        for _ in 0..3 {
            assert_eq!(gw.generate("x").await.unwrap(), "same");
        }
    }

    #[tokio::test]
    async fn unready_refuses() {
        let gw = MockGateway::unready();
        assert!(!gw.is_ready());
        assert!(matches!(
            gw.generate("x").await,
            Err(GatewayError::NotConfigured(_))
        ));
        assert!(gw.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response_waits() {
        let gw = MockGateway::new(vec![MockResponse::delayed(
            Duration::from_secs(5),
            MockResponse::text("late"),
        )]);
        let start = tokio::time::Instant::now();
        assert_eq!(gw.generate("x").await.unwrap(), "late");
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
