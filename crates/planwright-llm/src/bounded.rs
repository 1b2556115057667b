use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use planwright_core::errors::GatewayError;
use planwright_core::generation::GenerationGateway;

/// Wraps a gateway with a per-call deadline and a shutdown token.
///
/// - Each call is bounded by `timeout`; expiry yields [`GatewayError::Timeout`]
/// - Cancelling `shutdown` aborts in-flight calls with [`GatewayError::Cancelled`]
/// - Failures are returned as-is; there are no retries
pub struct BoundedGateway {
    inner: Arc<dyn GenerationGateway>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl BoundedGateway {
    pub fn new(inner: Arc<dyn GenerationGateway>, timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            inner,
            timeout,
            shutdown,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl GenerationGateway for BoundedGateway {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn is_ready(&self) -> bool {
        !self.shutdown.is_cancelled() && self.inner.is_ready()
    }

    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let started = Instant::now();
        debug!(provider = self.inner.name(), prompt_chars = prompt.len(), "generation started");

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(GatewayError::Cancelled),
            r = tokio::time::timeout(self.timeout, self.inner.generate(prompt)) => {
                r.unwrap_or(Err(GatewayError::Timeout(self.timeout)))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(text) => debug!(elapsed_ms, response_chars = text.len(), "generation finished"),
            Err(e) => warn!(
                provider = self.inner.name(),
                error_kind = e.error_kind(),
                elapsed_ms,
                error = %e,
                "generation failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockGateway, MockResponse};

    fn bounded(mock: MockGateway, timeout: Duration) -> (BoundedGateway, CancellationToken) {
        let token = CancellationToken::new();
        (
            BoundedGateway::new(Arc::new(mock), timeout, token.clone()),
            token,
        )
    }

    #[tokio::test]
    async fn passes_through_success() {
        let (gw, _) = bounded(MockGateway::new(vec![MockResponse::text("ok")]), Duration::from_secs(1));
        assert_eq!(gw.generate("p").await.unwrap(), "ok");
        assert_eq!(gw.name(), "mock");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let (gw, _) = bounded(
            MockGateway::new(vec![MockResponse::delayed(
                Duration::from_secs(60),
                MockResponse::text("too late"),
            )]),
            Duration::from_secs(2),
        );
        let err = gw.generate("p").await.unwrap_err();
        assert_eq!(err, GatewayError::Timeout(Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_in_flight_call() {
        let (gw, token) = bounded(
            MockGateway::new(vec![MockResponse::delayed(
                Duration::from_secs(60),
                MockResponse::text("never"),
            )]),
            Duration::from_secs(120),
        );
        let gw = Arc::new(gw);
        let call = tokio::spawn({
            let gw = Arc::clone(&gw);
            async move { gw.generate("p").await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        assert_eq!(call.await.unwrap().unwrap_err(), GatewayError::Cancelled);
        assert!(!gw.is_ready());
    }

    #[tokio::test]
    async fn errors_are_not_retried() {
        let mock = Arc::new(MockGateway::new(vec![
            MockResponse::Error(GatewayError::ServerError { status: 500, body: "x".into() }),
            MockResponse::text("second"),
        ]));
        let gw = BoundedGateway::new(mock.clone(), Duration::from_secs(1), CancellationToken::new());
        assert!(gw.generate("p").await.is_err());
        assert_eq!(mock.call_count(), 1);
    }
}
